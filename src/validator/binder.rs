use super::coerce::coerce_primitive;
use super::model::{FieldError, ModelValue};
use crate::route::{BodyParam, Param, ParamLocation, ParamType, ValueParam};
use crate::request::RequestParts;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Handler parameters after coercion and model parsing.
#[derive(Default, Clone)]
pub struct BoundParams {
    values: HashMap<String, Value>,
    models: HashMap<String, ModelValue>,
}

impl BoundParams {
    /// JSON form of a path, query or header parameter (or `null` when optional and absent).
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Parsed body model.
    #[must_use]
    pub fn model(&self, name: &str) -> Option<&ModelValue> {
        self.models.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len() + self.models.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for BoundParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundParams")
            .field("values", &self.values)
            .field("models", &self.models.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Binds declared parameters from request data.
pub struct Binder;

impl Binder {
    /// Bind every non-dependency parameter.
    ///
    /// All field errors from all parameters are collected before returning, so
    /// the caller sees every problem at once.
    pub fn bind(params: &[Param], parts: &RequestParts) -> Result<BoundParams, Vec<FieldError>> {
        let mut bound = BoundParams::default();
        let mut errors = Vec::new();

        for param in params {
            match param {
                Param::Value(p) => match Self::bind_value(p, parts) {
                    Ok(v) => {
                        bound.values.insert(p.name.clone(), v);
                    }
                    Err(mut e) => errors.append(&mut e),
                },
                Param::Body(p) => match Self::bind_body(p, parts) {
                    Ok(Some(model)) => {
                        bound.models.insert(p.name.clone(), model);
                    }
                    Ok(None) => {
                        bound.values.insert(p.name.clone(), Value::Null);
                    }
                    Err(mut e) => errors.append(&mut e),
                },
                Param::Depends { .. } => {}
            }
        }

        if errors.is_empty() {
            Ok(bound)
        } else {
            debug!(
                request_id = %parts.request_id,
                error_count = errors.len(),
                "Parameter binding failed"
            );
            Err(errors)
        }
    }

    fn bind_value(param: &ValueParam, parts: &RequestParts) -> Result<Value, Vec<FieldError>> {
        let location = param.location.to_string();
        let raws: Vec<&str> = match param.location {
            ParamLocation::Path => parts.get_path_param(&param.name).into_iter().collect(),
            ParamLocation::Query => parts.query_values(&param.name),
            ParamLocation::Header => parts.header_values(&param.name),
            ParamLocation::Body => Vec::new(),
        };

        if raws.is_empty() {
            return match (&param.default, param.required) {
                (Some(default), _) => Ok(default.clone()),
                (None, true) => Err(vec![FieldError::missing(vec![
                    location,
                    param.name.clone(),
                ])]),
                (None, false) => Ok(Value::Null),
            };
        }

        match param.ty {
            ParamType::Scalar(ty) => {
                let raw = raws.last().copied().unwrap_or_default();
                coerce_primitive(raw, ty).map_err(|e| {
                    vec![FieldError::new(
                        vec![location, param.name.clone()],
                        e.message,
                        e.kind,
                    )]
                })
            }
            ParamType::List(ty) => {
                let mut items = Vec::with_capacity(raws.len());
                let mut errors = Vec::new();
                for (idx, raw) in raws.iter().enumerate() {
                    match coerce_primitive(raw, ty) {
                        Ok(v) => items.push(v),
                        Err(e) => errors.push(FieldError::new(
                            vec![location.clone(), param.name.clone(), idx.to_string()],
                            e.message,
                            e.kind,
                        )),
                    }
                }
                if errors.is_empty() {
                    Ok(Value::Array(items))
                } else {
                    Err(errors)
                }
            }
        }
    }

    fn bind_body(
        param: &BodyParam,
        parts: &RequestParts,
    ) -> Result<Option<ModelValue>, Vec<FieldError>> {
        let body = parts
            .body
            .as_deref()
            .filter(|b| !b.iter().all(u8::is_ascii_whitespace));
        let Some(body) = body else {
            return if param.required {
                Err(vec![FieldError::missing(vec!["body".to_string()])])
            } else {
                Ok(None)
            };
        };

        let raw: Value = serde_json::from_slice(body).map_err(|e| {
            vec![FieldError::new(
                vec!["body".to_string()],
                format!("invalid JSON: {e}"),
                "json_invalid",
            )]
        })?;

        param
            .model
            .parse(&raw)
            .map(Some)
            .map_err(|errs| errs.into_iter().map(|e| e.under("body")).collect())
    }
}
