//! # routekit
//!
//! **routekit** is the request-dispatch core of a web framework: everything between
//! "an HTTP request arrived" and "a handler's reply is ready to be written",
//! with no transport of its own.
//!
//! ## Overview
//!
//! A request goes through five stages:
//!
//! 1. **Registration**: routes are declared with [`RouteSpec`], optionally
//!    nested in [`RouteGroup`]s that add path prefixes, tags and
//!    dependencies, and collected in a [`RouteRegistry`].
//! 2. **Routing**: the [`Router`] compiles every path template to a regex and
//!    matches `(method, path)` in registration order, distinguishing
//!    "not found" from "method not allowed".
//! 3. **Dependency resolution**: the [`Resolver`] walks the route's
//!    dependency graph depth-first, caching each provider's value per request,
//!    detecting cycles and registering generator cleanups.
//! 4. **Binding**: the [`Binder`] coerces path, query and header parameters to
//!    their declared primitive types and parses the body through a
//!    [`ValidationModel`], collecting every error.
//! 5. **Execution**: the [`Dispatcher`] runs the handler, packages its reply
//!    or error, and tears down the request's cleanups in reverse order.
//!
//! ## Architecture
//!
//! - **[`route`]** - route model, path templates, parameter declarations
//! - **[`registry`]** - route storage, lookup by path and tag, descriptions
//! - **[`router`]** - regex matching and route groups
//! - **[`depends`]** - providers, resolver, resolution context, app scope
//! - **[`validator`]** - coercion, body models, parameter binding
//! - **[`handler`]** - the handler contract
//! - **[`dispatcher`]** - pipeline, error taxonomy, builder
//! - **[`middleware`]** - before/after hooks
//! - **[`config`]** / **[`logging`]** - runtime configuration and tracing setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use routekit::{
//!     Depends, DispatchRequest, Dispatcher, Handler, Json, Primitive, Provider, RouteRegistry,
//!     RouteSpec, ValueParam,
//! };
//! use serde_json::json;
//!
//! struct Db;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let mut registry = RouteRegistry::new();
//! registry.add(
//!     RouteSpec::get(
//!         "/items/{item_id}",
//!         Handler::sync(|args| {
//!             let item_id: i64 = args.param_as("item_id")?;
//!             let _db = args.dep::<Db>("db")?;
//!             Ok(Json(json!({ "item_id": item_id })))
//!         }),
//!     )
//!     .param(ValueParam::path("item_id", Primitive::Integer))
//!     .depends("db", Depends::on("get_db")),
//! )?;
//!
//! let dispatcher = Dispatcher::builder(registry)
//!     .provider(Provider::sync("get_db", |_| Ok(Db)))
//!     .build()
//!     .await?;
//!
//! let outcome = dispatcher.dispatch(DispatchRequest::get("/items/42")).await;
//! assert_eq!(outcome.response.body, json!({ "item_id": 42 }));
//! dispatcher.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Logging
//!
//! Every stage emits `tracing` events (route matched, provider invoked, cache
//! hit, cleanup ran, state transitions). Install a subscriber with
//! [`logging::init_logging_with_config`] or bring your own.

pub mod config;
pub mod depends;
pub mod dispatcher;
pub mod handler;
pub mod ids;
pub mod logging;
pub mod middleware;
pub mod registry;
pub mod request;
pub mod route;
pub mod router;
pub mod validator;

pub use config::DispatchConfig;
pub use depends::{
    Acquired, AppState, Depends, Outcome, Provider, ProviderArgs, ProviderRegistry, ResolveError,
    Resolver, Scope,
};
pub use dispatcher::{
    DispatchError, DispatchOutcome, Dispatcher, DispatcherBuilder, ErrorKind, HandlerResponse,
    HttpError, PipelineState, StartupError,
};
pub use handler::{Handler, HandlerArgs, IntoReply, Json, Reply};
pub use ids::RequestId;
pub use middleware::Middleware;
pub use registry::{RegistrationError, RouteRegistry};
pub use request::{DispatchRequest, RequestParts};
pub use route::{BodyParam, Param, ParamLocation, ParamType, Primitive, RouteModel, RouteSpec, ValueParam};
pub use router::{RouteError, RouteGroup, RouteMatch, Router};
pub use validator::{Binder, FieldError, SchemaModel, TypedModel, ValidationModel};
