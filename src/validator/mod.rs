//! # Validator / Parameter Binder
//!
//! Turns raw request data into typed handler inputs:
//!
//! - path, query and header parameters are coerced to their declared
//!   primitive (or list of primitives)
//! - the body is parsed as JSON and handed to a [`ValidationModel`]
//!   ([`SchemaModel`] for JSON Schema, [`TypedModel`] for serde types)
//!
//! Every failure becomes a [`FieldError`] and the [`Binder`] collects all of
//! them before giving up.

mod binder;
mod cache;
mod coerce;
mod model;

pub use binder::{Binder, BoundParams};
pub use cache::{validate_response, ValidatorCache};
pub use coerce::{coerce_primitive, CoercionError};
pub use model::{FieldError, ModelValue, SchemaModel, TypedModel, ValidationModel};
