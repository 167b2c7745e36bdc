//! # Dispatcher Module
//!
//! Runs one request through the pipeline:
//!
//! ```text
//! route ──► Matched ──► ResolvingDependencies ──► Validating ──► Executing ──► Succeeded
//!   │           │                 │                    │              │
//!   ▼           └─────────────────┴────────────────────┴──────────────┴──► Failed
//! 404 / 405
//! ```
//!
//! Routing failures never enter the pipeline. Every other failure is packaged
//! as an error response by [`DispatchError::to_response`]. Request-scoped
//! cleanups run in reverse acquisition order before `dispatch` returns,
//! whatever the outcome.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use routekit::{Dispatcher, DispatchRequest, Provider, RouteRegistry, RouteSpec};
//!
//! let dispatcher = Dispatcher::builder(registry)
//!     .provider(Provider::generator("get_db", |_| async { Ok(Acquired::new(Db::connect()?)) }))
//!     .build()
//!     .await?;
//!
//! let outcome = dispatcher.dispatch(DispatchRequest::get("/items/42")).await;
//! assert_eq!(outcome.response.status, 200);
//! ```
//!
//! ## Error Handling
//!
//! | Kind | Status |
//! |------|--------|
//! | `NotFound` | 404 |
//! | `MethodNotAllowed` | 405, with an `allow` header |
//! | `CircularDependency` | 500 |
//! | `DependencyProvider` | 500 |
//! | `Validation` | 422, with `field_errors` |
//! | `Handler` | the [`HttpError`]'s own status |
//! | `Unhandled` | 500, also used for handler panics |

mod core;
mod error;
mod pipeline;
mod response;

pub use core::{DispatchOutcome, Dispatcher, DispatcherBuilder};
pub use error::{DispatchError, ErrorKind, HttpError, StartupError};
pub use pipeline::{Pipeline, PipelineState};
pub use response::HandlerResponse;
