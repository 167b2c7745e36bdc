use crate::request::HeaderVec;
use http::StatusCode;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::sync::Arc;

/// Response produced by the pipeline, or pre-built by a handler or middleware.
#[derive(Debug, Clone, Serialize)]
pub struct HandlerResponse {
    #[serde(serialize_with = "serialize_status")]
    pub status: StatusCode,
    /// Response headers (stack-allocated for ≤16 headers)
    #[serde(skip_serializing)]
    pub headers: HeaderVec,
    pub body: Value,
}

fn serialize_status<S: Serializer>(status: &StatusCode, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u16(status.as_u16())
}

impl HandlerResponse {
    #[must_use]
    pub fn new(status: StatusCode, headers: HeaderVec, body: Value) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// JSON response with a `content-type` header.
    #[must_use]
    pub fn json(status: StatusCode, body: Value) -> Self {
        let mut headers = HeaderVec::new();
        headers.push((Arc::from("content-type"), "application/json".to_string()));
        Self {
            status,
            headers,
            body,
        }
    }

    /// Response with no body (`null`), e.g. 204.
    #[must_use]
    pub fn empty(status: StatusCode) -> Self {
        Self::new(status, HeaderVec::new(), Value::Null)
    }

    /// Get a header by name (case-insensitive)
    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Add or replace a header
    pub fn set_header(&mut self, name: &str, value: String) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((Arc::from(name), value));
    }

    /// Builder form of [`set_header`](Self::set_header).
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_header(name, value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_header_replaces_case_insensitively() {
        let mut resp = HandlerResponse::json(StatusCode::OK, json!({}));
        resp.set_header("Content-Type", "text/plain".into());
        assert_eq!(resp.headers.len(), 1);
        assert_eq!(resp.get_header("content-type"), Some("text/plain"));
    }

    #[test]
    fn serializes_status_as_number() {
        let resp = HandlerResponse::json(StatusCode::CREATED, json!({"id": 1}));
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v, json!({"status": 201, "body": {"id": 1}}));
    }
}
