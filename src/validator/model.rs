use anyhow::{anyhow, Context};
use jsonschema::error::ValidationErrorKind;
use jsonschema::Validator;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Value produced by a successful [`ValidationModel::parse`].
pub type ModelValue = Arc<dyn Any + Send + Sync>;

/// One field-level validation problem.
///
/// `loc` is the path to the offending value, starting with where it came from
/// (`["path", "item_id"]`, `["query", "limit"]`, `["body", "items", "0", "qty"]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub loc: Vec<String>,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl FieldError {
    pub fn new(loc: Vec<String>, message: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            loc,
            message: message.into(),
            kind: kind.into(),
        }
    }

    /// Required value was absent.
    #[must_use]
    pub fn missing(loc: Vec<String>) -> Self {
        Self::new(loc, "field required", "missing")
    }

    /// Prepend `prefix` to the location.
    #[must_use]
    pub fn under(mut self, prefix: &str) -> Self {
        self.loc.insert(0, prefix.to_string());
        self
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.loc.join("."), self.message, self.kind)
    }
}

/// Contract a body model satisfies: raw JSON in, constructed value or every
/// field error out.
pub trait ValidationModel: Send + Sync {
    /// Name used in logs and route descriptions.
    fn name(&self) -> &str;

    /// Parse a raw JSON value. Error locations are relative to the body root.
    fn parse(&self, raw: &Value) -> Result<ModelValue, Vec<FieldError>>;

    /// JSON Schema describing accepted input, when the model has one.
    fn schema(&self) -> Option<Value> {
        None
    }
}

/// Model backed by a compiled JSON Schema. The parsed value is the JSON itself.
#[derive(Clone)]
pub struct SchemaModel {
    name: String,
    schema: Value,
    validator: Arc<Validator>,
}

impl SchemaModel {
    pub fn new(name: impl Into<String>, schema: Value) -> anyhow::Result<Self> {
        let name = name.into();
        let validator = compile_schema(&schema)
            .with_context(|| format!("invalid JSON schema for model '{name}'"))?;
        Ok(Self {
            name,
            schema,
            validator: Arc::new(validator),
        })
    }
}

impl ValidationModel for SchemaModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn parse(&self, raw: &Value) -> Result<ModelValue, Vec<FieldError>> {
        let errors = schema_errors(&self.validator, raw);
        if errors.is_empty() {
            Ok(Arc::new(raw.clone()))
        } else {
            Err(errors)
        }
    }

    fn schema(&self) -> Option<Value> {
        Some(self.schema.clone())
    }
}

impl fmt::Debug for SchemaModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaModel")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .finish()
    }
}

/// Model that deserializes into `T`, optionally checking a JSON Schema first.
///
/// Handlers read the value back with `args.body::<T>("name")`.
pub struct TypedModel<T> {
    name: String,
    schema: Option<(Value, Arc<Validator>)>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedModel<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            _marker: PhantomData,
        }
    }

    /// Validate against `schema` before deserializing, so every violation is
    /// reported rather than serde's first.
    pub fn with_schema(mut self, schema: Value) -> anyhow::Result<Self> {
        let validator = compile_schema(&schema)
            .with_context(|| format!("invalid JSON schema for model '{}'", self.name))?;
        self.schema = Some((schema, Arc::new(validator)));
        Ok(self)
    }
}

impl<T> ValidationModel for TypedModel<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn parse(&self, raw: &Value) -> Result<ModelValue, Vec<FieldError>> {
        if let Some((_, validator)) = &self.schema {
            let errors = schema_errors(validator, raw);
            if !errors.is_empty() {
                return Err(errors);
            }
        }
        T::deserialize(raw)
            .map(|v| Arc::new(v) as ModelValue)
            .map_err(|e| vec![serde_field_error(&e)])
    }

    fn schema(&self) -> Option<Value> {
        self.schema.as_ref().map(|(s, _)| s.clone())
    }
}

/// Compile a JSON Schema, keeping the error text.
pub(crate) fn compile_schema(schema: &Value) -> anyhow::Result<Validator> {
    jsonschema::validator_for(schema).map_err(|e| anyhow!("{e}"))
}

/// Every schema violation of `instance`, with JSON pointer locations split into segments.
pub(crate) fn schema_errors(validator: &Validator, instance: &Value) -> Vec<FieldError> {
    validator
        .iter_errors(instance)
        .map(|err| {
            let mut loc: Vec<String> = err
                .instance_path()
                .as_str()
                .split('/')
                .filter(|s| !s.is_empty())
                .map(|s| s.replace("~1", "/").replace("~0", "~"))
                .collect();
            match err.kind() {
                ValidationErrorKind::Required { property } => {
                    loc.push(
                        property
                            .as_str()
                            .map_or_else(|| property.to_string(), str::to_string),
                    );
                    FieldError::new(loc, "field required", "missing")
                }
                kind => FieldError::new(loc, err.to_string(), kind.keyword()),
            }
        })
        .collect()
}

fn serde_field_error(err: &serde_json::Error) -> FieldError {
    let text = err.to_string();
    if let Some(rest) = text.strip_prefix("missing field `") {
        if let Some((field, _)) = rest.split_once('`') {
            return FieldError::missing(vec![field.to_string()]);
        }
    }
    FieldError::new(Vec::new(), text, "value_error")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn item_schema() -> Value {
        json!({
            "type": "object",
            "required": ["name", "price"],
            "properties": {
                "name": {"type": "string"},
                "price": {"type": "number", "minimum": 0},
                "tags": {"type": "array", "items": {"type": "string"}}
            }
        })
    }

    #[test]
    fn schema_model_reports_all_errors() {
        let model = SchemaModel::new("Item", item_schema()).unwrap();
        let errors = model
            .parse(&json!({"price": -1, "tags": ["ok", 3]}))
            .unwrap_err();

        assert!(errors.contains(&FieldError::missing(vec!["name".into()])));
        assert!(errors
            .iter()
            .any(|e| e.loc == vec!["price"] && e.kind == "minimum"));
        assert!(errors
            .iter()
            .any(|e| e.loc == vec!["tags", "1"] && e.kind == "type"));
    }

    #[test]
    fn schema_model_returns_the_json() {
        let model = SchemaModel::new("Item", item_schema()).unwrap();
        let raw = json!({"name": "pen", "price": 1.5});
        let value = model.parse(&raw).unwrap();
        assert_eq!(value.downcast_ref::<Value>(), Some(&raw));
    }

    #[test]
    fn invalid_schema_rejected() {
        assert!(SchemaModel::new("Bad", json!({"type": 12})).is_err());
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        name: String,
        price: f64,
    }

    #[test]
    fn typed_model_names_missing_field() {
        let model = TypedModel::<Item>::new("Item");
        let errors = model.parse(&json!({"price": 2.0})).unwrap_err();
        assert_eq!(errors, vec![FieldError::missing(vec!["name".into()])]);

        let value = model.parse(&json!({"name": "a", "price": 2.0})).unwrap();
        assert_eq!(
            value.downcast_ref::<Item>(),
            Some(&Item {
                name: "a".into(),
                price: 2.0
            })
        );
    }

    #[test]
    fn typed_model_with_schema_checks_schema_first() {
        let model = TypedModel::<Item>::new("Item")
            .with_schema(item_schema())
            .unwrap();
        let errors = model.parse(&json!({})).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(model.schema().is_some());
    }
}
