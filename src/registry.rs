//! Route registry: every composed [`RouteModel`] plus path and tag indexes.
//!
//! Built during startup, then moved behind an `Arc` by the dispatcher builder
//! and never mutated again.

use crate::route::{normalize_path, Param, ParamLocation, ParamType, RouteModel, RouteSpec};
use http::Method;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Startup-time failure while registering a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// The (normalized path, method) pair is already registered
    DuplicateRoute {
        /// Normalized path pattern
        path: String,
        /// Offending method
        method: Method,
    },
    /// The path pattern is malformed
    InvalidPattern {
        /// Pattern as given
        path: String,
        /// What is wrong with it
        reason: String,
    },
    /// A path parameter was declared that has no placeholder in the pattern
    UndeclaredPathParam {
        path: String,
        param: String,
    },
    /// Two declared parameters share a name
    DuplicateParameter {
        path: String,
        param: String,
    },
    /// A route was declared with an empty method set
    NoMethods {
        path: String,
    },
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationError::DuplicateRoute { path, method } => {
                write!(f, "route {method} {path} is already registered")
            }
            RegistrationError::InvalidPattern { path, reason } => {
                write!(f, "invalid path pattern '{path}': {reason}")
            }
            RegistrationError::UndeclaredPathParam { path, param } => {
                write!(
                    f,
                    "path parameter '{param}' is not a placeholder in '{path}'"
                )
            }
            RegistrationError::DuplicateParameter { path, param } => {
                write!(f, "parameter '{param}' is declared twice on '{path}'")
            }
            RegistrationError::NoMethods { path } => {
                write!(f, "route '{path}' declares no methods")
            }
        }
    }
}

impl std::error::Error for RegistrationError {}

/// Indexed store of route models, queryable by path and by tag.
#[derive(Debug, Default)]
pub struct RouteRegistry {
    routes: Vec<Arc<RouteModel>>,
    by_path: HashMap<String, Vec<usize>>,
    by_tag: HashMap<String, Vec<usize>>,
    pairs: HashSet<(String, Method)>,
}

impl RouteRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compose a spec with no group prefix and register it.
    pub fn add(&mut self, spec: RouteSpec) -> Result<Arc<RouteModel>, RegistrationError> {
        self.register(RouteModel::from_spec(spec)?)
    }

    /// Store a fully prefixed route model and update both indexes.
    ///
    /// Fails without modifying the registry if any of the route's
    /// (path, method) pairs already exists.
    pub fn register(&mut self, route: RouteModel) -> Result<Arc<RouteModel>, RegistrationError> {
        let path = route.path().to_string();
        for method in route.methods() {
            if self.pairs.contains(&(path.clone(), method.clone())) {
                return Err(RegistrationError::DuplicateRoute {
                    path,
                    method: method.clone(),
                });
            }
        }

        let index = self.routes.len();
        for method in route.methods() {
            self.pairs.insert((path.clone(), method.clone()));
        }
        for tag in route.tags() {
            self.by_tag.entry(tag.clone()).or_default().push(index);
        }
        self.by_path.entry(path).or_default().push(index);

        let route = Arc::new(route);
        self.routes.push(Arc::clone(&route));
        Ok(route)
    }

    /// Routes whose pattern equals `path` after normalization, in registration order.
    #[must_use]
    pub fn get_by_path(&self, path: &str) -> Vec<Arc<RouteModel>> {
        self.lookup(self.by_path.get(&normalize_path(path)))
    }

    /// Routes carrying `tag`, in registration order.
    #[must_use]
    pub fn get_by_tag(&self, tag: &str) -> Vec<Arc<RouteModel>> {
        self.lookup(self.by_tag.get(tag))
    }

    /// Stable-ordered snapshot of every route.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<RouteModel>> {
        self.routes.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<RouteModel>> {
        self.routes.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Metadata for an external schema generator, one entry per route.
    #[must_use]
    pub fn describe(&self) -> Vec<RouteDescription> {
        self.routes.iter().map(|r| RouteDescription::from(r.as_ref())).collect()
    }

    /// Log the routing table.
    pub fn dump_routes(&self) {
        info!(routes_count = self.routes.len(), "Route registry");
        for route in &self.routes {
            let methods: Vec<&str> = route.methods().iter().map(Method::as_str).collect();
            info!(
                methods = ?methods,
                path = %route.path(),
                name = %route.name(),
                tags = ?route.tags(),
                "Registered route"
            );
        }
    }

    fn lookup(&self, indexes: Option<&Vec<usize>>) -> Vec<Arc<RouteModel>> {
        indexes
            .map(|idx| {
                idx.iter()
                    .filter_map(|&i| self.routes.get(i).map(Arc::clone))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Serializable view of one route.
#[derive(Debug, Clone, Serialize)]
pub struct RouteDescription {
    pub methods: Vec<String>,
    pub path: String,
    pub name: String,
    pub tags: Vec<String>,
    pub summary: Option<String>,
    pub parameters: Vec<ParameterDescription>,
    pub dependencies: Vec<String>,
    pub status: u16,
    pub response_shape: Option<Value>,
    pub deprecated: bool,
    pub include_in_schema: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParameterDescription {
    pub name: String,
    pub location: ParamLocation,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub ty: Option<ParamType>,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Model name for body parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

impl From<&RouteModel> for RouteDescription {
    fn from(route: &RouteModel) -> Self {
        let parameters = route
            .params()
            .iter()
            .filter_map(|p| match p {
                Param::Value(v) => Some(ParameterDescription {
                    name: v.name.clone(),
                    location: v.location,
                    ty: Some(v.ty),
                    required: v.required,
                    default: v.default.clone(),
                    model: None,
                    schema: None,
                }),
                Param::Body(b) => Some(ParameterDescription {
                    name: b.name.clone(),
                    location: ParamLocation::Body,
                    ty: None,
                    required: b.required,
                    default: None,
                    model: Some(b.model.name().to_string()),
                    schema: b.model.schema(),
                }),
                Param::Depends { .. } => None,
            })
            .collect();

        Self {
            methods: route.methods().iter().map(|m| m.to_string()).collect(),
            path: route.path().to_string(),
            name: route.name().to_string(),
            tags: route.tags().to_vec(),
            summary: route.summary().map(str::to_string),
            parameters,
            dependencies: route
                .resolution_plan()
                .iter()
                .map(|(_, d)| d.provider().to_string())
                .collect(),
            status: route.status().as_u16(),
            response_shape: route.response_shape().cloned(),
            deprecated: route.deprecated(),
            include_in_schema: route.include_in_schema(),
        }
    }
}
