//! Compiled JSON Schema validators, shared across requests.
//!
//! Schemas are compiled once when the dispatcher is built and looked up by route
//! name and kind afterwards. Validators are `Arc`-wrapped so a lookup is a
//! read lock plus a reference-count bump.

use super::model::{compile_schema, schema_errors, FieldError};
use jsonschema::Validator;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error};

/// Thread-safe cache of compiled validators keyed by `{route_name}:{kind}`.
#[derive(Clone, Default)]
pub struct ValidatorCache {
    cache: Arc<RwLock<HashMap<String, Arc<Validator>>>>,
}

impl ValidatorCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn cache_key(route_name: &str, kind: &str) -> String {
        format!("{route_name}:{kind}")
    }

    /// Cached validator, if one was compiled for this route and kind.
    #[must_use]
    pub fn get(&self, route_name: &str, kind: &str) -> Option<Arc<Validator>> {
        let key = Self::cache_key(route_name, kind);
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        cache.get(&key).map(Arc::clone)
    }

    /// Get a cached validator or compile and cache a new one.
    pub fn get_or_compile(
        &self,
        route_name: &str,
        kind: &str,
        schema: &Value,
    ) -> anyhow::Result<Arc<Validator>> {
        if let Some(validator) = self.get(route_name, kind) {
            debug!(route_name, kind, "Schema validator cache hit");
            return Ok(validator);
        }

        let validator = match compile_schema(schema) {
            Ok(v) => Arc::new(v),
            Err(e) => {
                error!(route_name, kind, error = %e, "Failed to compile JSON Schema");
                return Err(e);
            }
        };

        let key = Self::cache_key(route_name, kind);
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have compiled it while we waited for the write lock
        let validator = Arc::clone(cache.entry(key).or_insert(validator));
        debug!(route_name, kind, cache_size = cache.len(), "Schema validator compiled and cached");
        Ok(validator)
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl std::fmt::Debug for ValidatorCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorCache")
            .field("size", &self.size())
            .finish()
    }
}

/// Validate a handler's JSON reply against a compiled response shape.
#[must_use]
pub fn validate_response(validator: &Validator, body: &Value) -> Vec<FieldError> {
    schema_errors(validator, body)
        .into_iter()
        .map(|e| e.under("response"))
        .collect()
}
