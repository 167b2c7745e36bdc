//! Path pattern parsing and normalization.
//!
//! Patterns use whole-segment placeholders (`/users/{id}/posts/{post_id}`).
//! Normalization of patterns and group prefixes collapses duplicate slashes,
//! forces a leading slash and drops a trailing one, so `"/api/" + "/users/"`
//! composes to `/api/users`. Request paths are never normalized this way; see
//! [`request_path`].

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

#[allow(clippy::expect_used)]
static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\{([A-Za-z_][A-Za-z0-9_]*)\}$").expect("placeholder regex must compile")
});

/// One segment of a compiled path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Must equal the request segment exactly.
    Literal(String),
    /// Binds any single non-empty request segment.
    Param(String),
}

/// Reason a path pattern was rejected at registration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternError {
    pub path: String,
    pub reason: String,
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid path pattern '{}': {}", self.path, self.reason)
    }
}

impl std::error::Error for PatternError {}

/// Collapse duplicate slashes, force a leading slash and drop a trailing one.
///
/// ```
/// use routekit::route::normalize_path;
///
/// assert_eq!(normalize_path("//api///users/"), "/api/users");
/// assert_eq!(normalize_path(""), "/");
/// ```
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// The part of a request path the router matches against.
///
/// Drops the query string and fragment and, unless `strict_slashes` is set,
/// one trailing slash. Duplicate slashes are kept as empty segments, which no
/// pattern segment matches.
///
/// ```
/// use routekit::route::request_path;
///
/// assert_eq!(request_path("/items/7/?full=true", false), "/items/7");
/// assert_eq!(request_path("/items/7/", true), "/items/7/");
/// assert_eq!(request_path("/a//b", false), "/a//b");
/// assert_eq!(request_path("?q=1", false), "/");
/// ```
#[must_use]
pub fn request_path(raw: &str, strict_slashes: bool) -> &str {
    let path = raw.split(['?', '#']).next().unwrap_or_default();
    if path.is_empty() {
        return "/";
    }
    if !strict_slashes && path.len() > 1 {
        if let Some(stripped) = path.strip_suffix('/') {
            return stripped;
        }
    }
    path
}

/// Concatenate a group prefix and a route path, then normalize.
#[must_use]
pub fn join_paths(prefix: &str, path: &str) -> String {
    let mut joined = String::with_capacity(prefix.len() + path.len() + 1);
    joined.push_str(prefix);
    joined.push('/');
    joined.push_str(path);
    normalize_path(&joined)
}

/// A normalized, validated path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Parse and validate a pattern.
    ///
    /// Braces must wrap a whole segment and name an identifier, and a placeholder
    /// name may appear at most once.
    pub fn parse(path: &str) -> Result<Self, PatternError> {
        let raw = normalize_path(path);
        let mut segments = Vec::new();

        for part in raw.split('/').filter(|s| !s.is_empty()) {
            if !part.contains('{') && !part.contains('}') {
                segments.push(Segment::Literal(part.to_string()));
                continue;
            }
            let Some(caps) = PLACEHOLDER.captures(part) else {
                return Err(PatternError {
                    path: raw.clone(),
                    reason: format!(
                        "segment '{part}' must be a single placeholder like '{{name}}'"
                    ),
                });
            };
            let name = caps[1].to_string();
            if segments
                .iter()
                .any(|s| matches!(s, Segment::Param(existing) if *existing == name))
            {
                return Err(PatternError {
                    path: raw.clone(),
                    reason: format!("placeholder '{name}' appears more than once"),
                });
            }
            segments.push(Segment::Param(name));
        }

        Ok(Self { raw, segments })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Placeholder names in positional order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    #[must_use]
    pub fn has_param(&self, name: &str) -> bool {
        self.param_names().any(|p| p == name)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_slashes() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("items"), "/items");
        assert_eq!(normalize_path("/items/"), "/items");
        assert_eq!(normalize_path("//a//b"), "/a/b");
    }

    #[test]
    fn joins_prefix_without_double_slashes() {
        assert_eq!(join_paths("/api/", "/users"), "/api/users");
        assert_eq!(join_paths("", "/users"), "/users");
        assert_eq!(join_paths("/api", "/"), "/api");
    }

    #[test]
    fn parses_segments_in_order() {
        let p = PathPattern::parse("/users/{id}/posts/{post_id}").unwrap();
        assert_eq!(p.segments().len(), 4);
        assert_eq!(p.param_names().collect::<Vec<_>>(), vec!["id", "post_id"]);
        assert!(p.has_param("id"));
        assert!(!p.has_param("user"));
    }

    #[test]
    fn root_has_no_segments() {
        let p = PathPattern::parse("/").unwrap();
        assert!(p.segments().is_empty());
        assert_eq!(p.as_str(), "/");
    }

    #[test]
    fn rejects_partial_placeholder() {
        let err = PathPattern::parse("/files/{name}.json").unwrap_err();
        assert!(err.reason.contains("single placeholder"));
    }

    #[test]
    fn rejects_repeated_placeholder() {
        let err = PathPattern::parse("/org/{id}/user/{id}").unwrap_err();
        assert!(err.reason.contains("more than once"));
    }
}
