//! # Dependency Resolver
//!
//! Providers produce the values handlers (and other providers) declare as
//! dependencies. A provider is one of three kinds:
//!
//! - **sync**: a plain function, invoked immediately
//! - **async**: a function returning a future, awaited
//! - **generator**: awaited to an [`Acquired`] value whose cleanup runs once
//!   the request pipeline reaches a terminal state
//!
//! Per request, a [`ResolutionContext`] holds the cache (provider name to
//! value), the call stack used for cycle detection and the cleanup stack.
//! Cleanups run in reverse acquisition order and receive the pipeline
//! [`Outcome`]; a failing cleanup is logged and the rest still run.
//!
//! App-scoped providers ([`Scope::App`]) are resolved once when the dispatcher
//! is built and shared read-only by every request. They may only depend on
//! other app-scoped providers. Their cleanups run on dispatcher shutdown.
//!
//! ## Example
//!
//! ```rust,ignore
//! let settings = Provider::sync("settings", |_| Ok(Settings::default()))
//!     .in_scope(Scope::App);
//! let db = Provider::generator("db", |args| async move {
//!     let settings = args.dep::<Settings>("settings")?;
//!     let conn = connect(&settings.url).await?;
//!     Ok(Acquired::new(conn).on_cleanup(|conn, _outcome| async move { conn.close().await }))
//! })
//! .depends_on("settings", Depends::on("settings"));
//! ```

mod app;
mod context;
mod provider;
mod resolver;
#[cfg(test)]
mod tests;

pub use app::{AppScope, AppState};
pub use context::{ResolutionContext, TeardownReport};
pub use provider::{
    Acquired, Cleanup, DepValue, Depends, Outcome, Provider, ProviderArgs, ProviderKind,
    ProviderRegistry, Scope,
};
pub use resolver::{ResolveError, Resolver};

pub(crate) use context::panic_message;
pub(crate) use provider::downcast_dep;
