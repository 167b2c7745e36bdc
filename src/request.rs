//! Request types: what a transport hands to the dispatcher, and the read-only
//! view providers, the binder and handlers see.

use crate::ids::RequestId;
use crate::route::request_path;
use crate::router::ParamVec;
use http::Method;
use serde_json::Value;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;

/// Maximum inline headers before heap allocation
/// Most requests have ≤16 headers
pub const MAX_INLINE_HEADERS: usize = 16;

/// Stack-allocated header storage.
///
/// Header names are `Arc<str>` so repeated names (`content-type`, ...) clone in O(1).
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// An incoming request, as received from the transport.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub method: Method,
    /// Raw path, optionally with a query string (`/items/42?verbose=true`)
    pub path: String,
    pub headers: HeaderVec,
    pub body: Option<Vec<u8>>,
}

impl DispatchRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderVec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((Arc::from(name), value.into()));
        self
    }

    /// Raw body bytes, passed to the body parameter's model as-is.
    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `value` as the body and set `content-type: application/json`.
    #[must_use]
    pub fn json(self, value: &Value) -> Self {
        self.header("content-type", "application/json")
            .body(value.to_string())
    }

    /// Get a header by name (case-insensitive per RFC 7230)
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        header_lookup(&self.headers, name)
    }

    /// Copy of method, path and headers, without the body.
    #[must_use]
    pub fn head(&self) -> DispatchRequest {
        DispatchRequest {
            method: self.method.clone(),
            path: self.path.clone(),
            headers: self.headers.clone(),
            body: None,
        }
    }
}

/// Parse query string parameters from a URL path
///
/// Extracts everything after the `?` character and URL-decodes names and
/// values. Repeated keys are kept, in order.
///
/// ```
/// use routekit::request::parse_query_params;
///
/// let q = parse_query_params("/items?tag=a&tag=b&limit=10");
/// assert_eq!(q.len(), 3);
/// assert_eq!(q[1], ("tag".to_string(), "b".to_string()));
/// ```
#[must_use]
pub fn parse_query_params(path: &str) -> Vec<(String, String)> {
    match path.split_once('?') {
        Some((_, query)) => {
            let query = query.split('#').next().unwrap_or_default();
            url::form_urlencoded::parse(query.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect()
        }
        None => Vec::new(),
    }
}

/// Read-only view of a matched request.
#[derive(Debug, Clone)]
pub struct RequestParts {
    pub request_id: RequestId,
    pub method: Method,
    /// Normalized path, without the query string
    pub path: String,
    /// Path parameters bound by the router (percent-decoded)
    pub path_params: ParamVec,
    /// Query parameters in request order; repeated keys are kept
    pub query_params: Vec<(String, String)>,
    pub headers: HeaderVec,
    pub body: Option<Vec<u8>>,
}

impl RequestParts {
    #[must_use]
    pub fn new(request_id: RequestId, request: DispatchRequest, path_params: ParamVec) -> Self {
        let query_params = parse_query_params(&request.path);
        let path = request_path(&request.path, true).to_string();
        Self {
            request_id,
            method: request.method,
            path,
            path_params,
            query_params,
            headers: request.headers,
            body: request.body,
        }
    }

    /// Get a path parameter by name
    #[inline]
    #[must_use]
    pub fn get_path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Get a query parameter by name
    ///
    /// Uses "last write wins" semantics: for `?limit=10&limit=20` this returns `20`.
    #[inline]
    #[must_use]
    pub fn get_query_param(&self, name: &str) -> Option<&str> {
        self.query_params
            .iter()
            .rfind(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Every value of a repeated query key, in request order.
    #[must_use]
    pub fn query_values(&self, name: &str) -> Vec<&str> {
        self.query_params
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Get a header by name (case-insensitive per RFC 7230)
    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        header_lookup(&self.headers, name)
    }

    /// Every value of a repeated header, in request order.
    #[must_use]
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Convert path_params to HashMap
    /// Note: This allocates - use get_path_param() in hot paths
    #[must_use]
    pub fn path_params_map(&self) -> HashMap<String, String> {
        self.path_params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }
}

fn header_lookup<'a>(headers: &'a HeaderVec, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}
