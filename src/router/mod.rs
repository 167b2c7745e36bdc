//! # Router Module
//!
//! Path matching and route composition.
//!
//! ## Overview
//!
//! - [`RouteGroup`] composes sub-routers at startup: prefixes are concatenated
//!   (duplicate slashes collapsed), tags are unioned and dependency lists are
//!   concatenated parent first. The result populates a
//!   [`RouteRegistry`](crate::registry::RouteRegistry).
//! - [`Router`] compiles the registry into anchored regexes and matches
//!   `(method, raw path)` pairs, returning a [`RouteMatch`] with positional
//!   path parameter bindings or a [`RouteError`] distinguishing "nothing
//!   matched" from "wrong verb".
//!
//! The router performs no prefix logic at request time.
//!
//! ## Example
//!
//! ```rust,ignore
//! use routekit::router::{RouteGroup, Router};
//!
//! let mut api = RouteGroup::with_prefix("/api");
//! api.route(RouteSpec::get("/items/{item_id}", get_item));
//! let registry = api.into_registry()?;
//! let router = Router::new(&registry)?;
//!
//! let m = router.route(&Method::GET, "/api/items/42")?;
//! assert_eq!(m.get_path_param("item_id"), Some("42"));
//! ```

mod core;
mod group;
#[cfg(test)]
mod performance_tests;

pub use core::{ParamVec, RouteError, RouteMatch, Router, MAX_INLINE_PARAMS};
pub use group::RouteGroup;
