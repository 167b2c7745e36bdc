use crate::route::Primitive;
use serde_json::Value;

/// Why a raw string could not be coerced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoercionError {
    pub kind: &'static str,
    pub message: String,
}

/// Convert a raw parameter string into the declared primitive.
///
/// - integer: `i64`, surrounding whitespace ignored
/// - float: any finite `f64`
/// - boolean: `true/false`, `1/0`, `yes/no`, `on/off` (case-insensitive)
/// - string: passed through unchanged
///
/// ```
/// use routekit::route::Primitive;
/// use routekit::validator::coerce_primitive;
/// use serde_json::json;
///
/// assert_eq!(coerce_primitive("42", Primitive::Integer).unwrap(), json!(42));
/// assert_eq!(coerce_primitive("Off", Primitive::Boolean).unwrap(), json!(false));
/// assert!(coerce_primitive("4x", Primitive::Integer).is_err());
/// ```
pub fn coerce_primitive(raw: &str, ty: Primitive) -> Result<Value, CoercionError> {
    match ty {
        Primitive::Integer => raw
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| CoercionError {
                kind: "int_parsing",
                message: "value is not a valid integer".to_string(),
            }),
        Primitive::Float => match raw.trim().parse::<f64>() {
            Ok(f) if f.is_finite() => Ok(Value::from(f)),
            _ => Err(CoercionError {
                kind: "float_parsing",
                message: "value is not a valid number".to_string(),
            }),
        },
        Primitive::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Value::Bool(true)),
            "false" | "0" | "no" | "off" => Ok(Value::Bool(false)),
            _ => Err(CoercionError {
                kind: "bool_parsing",
                message: "value is not a valid boolean".to_string(),
            }),
        },
        Primitive::String => Ok(Value::String(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integers() {
        assert_eq!(coerce_primitive(" -7 ", Primitive::Integer).unwrap(), json!(-7));
        assert_eq!(
            coerce_primitive("1.5", Primitive::Integer).unwrap_err().kind,
            "int_parsing"
        );
        assert!(coerce_primitive("99999999999999999999", Primitive::Integer).is_err());
    }

    #[test]
    fn floats_must_be_finite() {
        assert_eq!(coerce_primitive("2.5", Primitive::Float).unwrap(), json!(2.5));
        assert_eq!(coerce_primitive("3", Primitive::Float).unwrap(), json!(3.0));
        assert!(coerce_primitive("NaN", Primitive::Float).is_err());
        assert!(coerce_primitive("inf", Primitive::Float).is_err());
    }

    #[test]
    fn booleans() {
        for t in ["true", "TRUE", "1", "yes", "on"] {
            assert_eq!(coerce_primitive(t, Primitive::Boolean).unwrap(), json!(true));
        }
        for f in ["false", "0", "No", "off"] {
            assert_eq!(coerce_primitive(f, Primitive::Boolean).unwrap(), json!(false));
        }
        assert!(coerce_primitive("maybe", Primitive::Boolean).is_err());
    }

    #[test]
    fn strings_pass_through() {
        assert_eq!(
            coerce_primitive(" a b ", Primitive::String).unwrap(),
            json!(" a b ")
        );
    }
}
