//! # Route Model
//!
//! A [`RouteSpec`] is the registration contract: path pattern, methods, handler,
//! tags, dependencies, declared parameters and response metadata. Registration
//! turns it into an immutable [`RouteModel`] once every group prefix, tag and
//! dependency has been composed in.
//!
//! Path patterns use whole-segment placeholders (`/items/{item_id}`); see
//! [`PathPattern`].

mod path;
mod types;

pub use path::{join_paths, normalize_path, request_path, PathPattern, PatternError, Segment};
pub use types::{
    BodyParam, Param, ParamLocation, ParamType, Primitive, RouteModel, RouteSpec, ValueParam,
};
