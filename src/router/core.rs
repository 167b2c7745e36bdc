//! Router core - matches `(method, raw path)` against the compiled routing table.

use crate::registry::{RegistrationError, RouteRegistry};
use crate::route::{request_path, RouteModel, Segment};
use http::Method;
use regex::Regex;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Maximum number of path parameters before heap allocation.
/// Most REST APIs have ≤4 path params (e.g., /users/{id}/posts/{post_id}).
pub const MAX_INLINE_PARAMS: usize = 8;

/// Stack-allocated parameter storage for the hot path.
///
/// Param names are `Arc<str>` shared with the routing table; values are
/// per-request data from the URL, already percent-decoded.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// Result of successfully matching a request path to a route
#[derive(Debug, Clone)]
pub struct RouteMatch {
    /// The matched route (Arc to avoid expensive clones)
    pub route: Arc<RouteModel>,
    /// Path parameters bound positionally from the URL (`{id}` → `("id", "123")`)
    pub path_params: ParamVec,
}

impl RouteMatch {
    /// Get a path parameter by name
    #[inline]
    #[must_use]
    pub fn get_path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Convert path_params to a HashMap
    /// Note: This allocates - use get_path_param() in hot paths instead
    #[must_use]
    pub fn path_params_map(&self) -> HashMap<String, String> {
        self.path_params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }
}

/// Why a request did not match any route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// No pattern matches the path
    NotFound { method: Method, path: String },
    /// At least one pattern matches the path, none accepts the method
    MethodNotAllowed {
        method: Method,
        path: String,
        /// Methods accepted by the routes whose pattern matched, in registration order
        allowed: Vec<Method>,
    },
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteError::NotFound { method, path } => {
                write!(f, "no route matches {method} {path}")
            }
            RouteError::MethodNotAllowed {
                method,
                path,
                allowed,
            } => {
                let allowed: Vec<&str> = allowed.iter().map(Method::as_str).collect();
                write!(
                    f,
                    "method {method} not allowed for {path} (allowed: {})",
                    allowed.join(", ")
                )
            }
        }
    }
}

impl std::error::Error for RouteError {}

struct CompiledRoute {
    regex: Regex,
    param_names: Vec<Arc<str>>,
    route: Arc<RouteModel>,
}

/// Matches requests against every registered route in registration order.
///
/// Each pattern is compiled to an anchored regex (`/items/{id}` becomes
/// `^/items/([^/]+)$`), so segment counts must agree, literal segments match
/// exactly and a placeholder binds exactly one non-empty segment. Routes are
/// tried in registration order and the first whose pattern and method both
/// match wins; for overlapping patterns this means the earliest registration
/// wins (`/a/{x}` registered before `/a/static` captures `/a/static`).
#[derive(Clone)]
pub struct Router {
    routes: Arc<[CompiledRoute]>,
    strict_slashes: bool,
}

impl Router {
    /// Compile the routing table from a registry.
    pub fn new(registry: &RouteRegistry) -> Result<Self, RegistrationError> {
        let routes = registry
            .iter()
            .map(|route| {
                let (regex, param_names) = Self::path_to_regex(route)?;
                Ok(CompiledRoute {
                    regex,
                    param_names,
                    route: Arc::clone(route),
                })
            })
            .collect::<Result<Vec<_>, RegistrationError>>()?;

        let routes_summary: Vec<String> = routes
            .iter()
            .take(10)
            .map(|r| format!("{:?} {}", r.route.methods(), r.route.path()))
            .collect();

        info!(
            routes_count = routes.len(),
            routes_summary = ?routes_summary,
            "Routing table loaded"
        );

        Ok(Self {
            routes: routes.into(),
            strict_slashes: false,
        })
    }

    /// Treat `/items/` as distinct from `/items` (it will not match).
    #[must_use]
    pub fn with_strict_slashes(mut self, strict: bool) -> Self {
        self.strict_slashes = strict;
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Match a request to a route.
    ///
    /// A query string on `raw_path` is ignored, and so is one trailing slash
    /// unless strict mode is on. Empty segments are kept, so `/a//b` does not
    /// match `/a/{x}`. Bound parameter values are percent-decoded.
    ///
    /// ```rust,ignore
    /// let m = router.route(&Method::GET, "/items/42?verbose=1")?;
    /// assert_eq!(m.get_path_param("item_id"), Some("42"));
    /// ```
    pub fn route(&self, method: &Method, raw_path: &str) -> Result<RouteMatch, RouteError> {
        debug!(method = %method, path = %raw_path, "Route match attempt");
        let match_start = Instant::now();

        let path_only = request_path(raw_path, true);
        if self.strict_slashes && path_only.len() > 1 && path_only.ends_with('/') {
            warn!(method = %method, path = %raw_path, "Trailing slash rejected in strict mode");
            return Err(RouteError::NotFound {
                method: method.clone(),
                path: path_only.to_string(),
            });
        }
        let path = request_path(raw_path, self.strict_slashes).to_string();

        let mut allowed: Vec<Method> = Vec::new();
        for compiled in self.routes.iter() {
            let Some(caps) = compiled.regex.captures(&path) else {
                continue;
            };
            if !compiled.route.allows(method) {
                for m in compiled.route.methods() {
                    if !allowed.contains(m) {
                        allowed.push(m.clone());
                    }
                }
                continue;
            }

            let mut path_params = ParamVec::new();
            for (name, value) in compiled.param_names.iter().zip(caps.iter().skip(1)) {
                let raw = value.map(|m| m.as_str()).unwrap_or_default();
                let decoded = urlencoding::decode(raw)
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| raw.to_string());
                path_params.push((Arc::clone(name), decoded));
            }

            let match_duration = match_start.elapsed();
            if match_duration > Duration::from_millis(1) {
                warn!(
                    method = %method,
                    path = %path,
                    route_name = %compiled.route.name(),
                    route_pattern = %compiled.route.path(),
                    path_params = ?path_params,
                    duration_us = match_duration.as_micros(),
                    "Slow route matching detected"
                );
            } else {
                info!(
                    method = %method,
                    path = %path,
                    route_name = %compiled.route.name(),
                    route_pattern = %compiled.route.path(),
                    path_params = ?path_params,
                    duration_us = match_duration.as_micros(),
                    "Route matched"
                );
            }

            return Ok(RouteMatch {
                route: Arc::clone(&compiled.route),
                path_params,
            });
        }

        let match_duration = match_start.elapsed();
        if allowed.is_empty() {
            warn!(
                method = %method,
                path = %path,
                duration_us = match_duration.as_micros(),
                "No route matched"
            );
            Err(RouteError::NotFound {
                method: method.clone(),
                path,
            })
        } else {
            warn!(
                method = %method,
                path = %path,
                allowed = ?allowed,
                duration_us = match_duration.as_micros(),
                "Method not allowed"
            );
            Err(RouteError::MethodNotAllowed {
                method: method.clone(),
                path,
                allowed,
            })
        }
    }

    /// Every registered path pattern, in registration order.
    #[must_use]
    pub fn get_all_path_patterns(&self) -> Vec<String> {
        self.routes
            .iter()
            .map(|r| r.route.path().to_string())
            .collect()
    }

    /// Convert a route's pattern to an anchored regex and its ordered parameter names.
    pub(crate) fn path_to_regex(
        route: &RouteModel,
    ) -> Result<(Regex, Vec<Arc<str>>), RegistrationError> {
        let segments = route.pattern().segments();
        let mut pattern = String::with_capacity(route.path().len() + 8);
        pattern.push('^');
        let mut param_names = Vec::with_capacity(segments.len());

        for segment in segments {
            match segment {
                Segment::Literal(lit) => {
                    pattern.push('/');
                    pattern.push_str(&regex::escape(lit));
                }
                Segment::Param(name) => {
                    pattern.push_str("/([^/]+)");
                    param_names.push(Arc::from(name.as_str()));
                }
            }
        }
        if segments.is_empty() {
            pattern.push('/');
        }
        pattern.push('$');

        let regex = Regex::new(&pattern).map_err(|e| RegistrationError::InvalidPattern {
            path: route.path().to_string(),
            reason: e.to_string(),
        })?;
        Ok((regex, param_names))
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.get_all_path_patterns())
            .field("strict_slashes", &self.strict_slashes)
            .finish()
    }
}
