use super::response::HandlerResponse;
use crate::depends::ResolveError;
use crate::registry::RegistrationError;
use crate::router::RouteError;
use crate::validator::FieldError;
use http::{Method, StatusCode};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt;

/// Domain error a handler or provider raises to choose its own status.
///
/// ```rust,ignore
/// Handler::sync(|args| {
///     let id: i64 = args.param_as("item_id")?;
///     let item = store.get(id).ok_or_else(|| HttpError::not_found("item not found"))?;
///     Ok(Json(item))
/// })
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    pub status: StatusCode,
    pub message: String,
    /// Machine-readable error code
    pub code: Option<String>,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code: None,
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status.as_u16(), self.message)
    }
}

impl std::error::Error for HttpError {}

/// Error kind reported as `status_kind` in error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    MethodNotAllowed,
    CircularDependency,
    DependencyProvider,
    Validation,
    Handler,
    Unhandled,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::MethodNotAllowed => "method_not_allowed",
            ErrorKind::CircularDependency => "circular_dependency",
            ErrorKind::DependencyProvider => "dependency_provider",
            ErrorKind::Validation => "validation",
            ErrorKind::Handler => "handler",
            ErrorKind::Unhandled => "unhandled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every way a dispatch can fail.
#[derive(Debug)]
pub enum DispatchError {
    /// No route matches the path
    NotFound { method: Method, path: String },
    /// The path matches, the method does not
    MethodNotAllowed {
        method: Method,
        path: String,
        allowed: Vec<Method>,
    },
    /// The dependency graph loops; no handler code ran
    CircularDependency { cycle: Vec<String> },
    /// A provider failed during resolution
    DependencyProvider {
        provider: String,
        source: anyhow::Error,
    },
    /// One or more parameters failed coercion or model parsing
    Validation { errors: Vec<FieldError> },
    /// A handler or provider raised an [`HttpError`]
    Handler(HttpError),
    /// Anything else, including handler panics
    Unhandled { source: anyhow::Error },
}

impl DispatchError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::NotFound { .. } => ErrorKind::NotFound,
            DispatchError::MethodNotAllowed { .. } => ErrorKind::MethodNotAllowed,
            DispatchError::CircularDependency { .. } => ErrorKind::CircularDependency,
            DispatchError::DependencyProvider { .. } => ErrorKind::DependencyProvider,
            DispatchError::Validation { .. } => ErrorKind::Validation,
            DispatchError::Handler(_) => ErrorKind::Handler,
            DispatchError::Unhandled { .. } => ErrorKind::Unhandled,
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::NotFound { .. } => StatusCode::NOT_FOUND,
            DispatchError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            DispatchError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            DispatchError::Handler(e) => e.status,
            DispatchError::CircularDependency { .. }
            | DispatchError::DependencyProvider { .. }
            | DispatchError::Unhandled { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the caller gets a precise, actionable payload.
    #[must_use]
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            DispatchError::Validation { .. } | DispatchError::Handler(_)
        )
    }

    /// Map an error returned by a handler: an [`HttpError`] anywhere in the
    /// chain selects the handler kind, anything else is unhandled.
    #[must_use]
    pub fn from_handler_error(err: anyhow::Error) -> Self {
        match find_http_error(&err) {
            Some(http) => DispatchError::Handler(http),
            None => DispatchError::Unhandled { source: err },
        }
    }

    /// Build the error response. Internal details (provider names, error
    /// chains, cycles) are only included when `expose_details` is set.
    #[must_use]
    pub fn to_response(&self, expose_details: bool) -> HandlerResponse {
        let mut body = Map::new();
        let message = match self {
            DispatchError::NotFound { .. } => "Not Found".to_string(),
            DispatchError::MethodNotAllowed { .. } => "Method Not Allowed".to_string(),
            DispatchError::Validation { .. } => "Validation failed".to_string(),
            DispatchError::Handler(e) => e.message.clone(),
            DispatchError::CircularDependency { .. }
            | DispatchError::DependencyProvider { .. }
            | DispatchError::Unhandled { .. } => "Internal Server Error".to_string(),
        };
        body.insert("message".into(), Value::String(message));
        body.insert("status_kind".into(), json!(self.kind()));

        match self {
            DispatchError::Validation { errors } => {
                body.insert("field_errors".into(), json!(errors));
            }
            DispatchError::Handler(HttpError {
                code: Some(code), ..
            }) => {
                body.insert("code".into(), Value::String(code.clone()));
            }
            _ => {}
        }

        if expose_details && !self.is_expected() {
            body.insert("detail".into(), Value::String(self.to_string()));
        }

        let mut response = HandlerResponse::json(self.status(), Value::Object(body));
        if let DispatchError::MethodNotAllowed { allowed, .. } = self {
            let allow: Vec<&str> = allowed.iter().map(Method::as_str).collect();
            response.set_header("allow", allow.join(", "));
        }
        response
    }
}

impl From<RouteError> for DispatchError {
    fn from(err: RouteError) -> Self {
        match err {
            RouteError::NotFound { method, path } => DispatchError::NotFound { method, path },
            RouteError::MethodNotAllowed {
                method,
                path,
                allowed,
            } => DispatchError::MethodNotAllowed {
                method,
                path,
                allowed,
            },
        }
    }
}

impl From<ResolveError> for DispatchError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Circular { cycle } => DispatchError::CircularDependency { cycle },
            ResolveError::Provider { provider, source } => match find_http_error(&source) {
                Some(http) => DispatchError::Handler(http),
                None => DispatchError::DependencyProvider { provider, source },
            },
            other => DispatchError::DependencyProvider {
                provider: other.provider().to_string(),
                source: anyhow::Error::new(other),
            },
        }
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::NotFound { method, path } => {
                write!(f, "no route matches {method} {path}")
            }
            DispatchError::MethodNotAllowed { method, path, .. } => {
                write!(f, "method {method} not allowed for {path}")
            }
            DispatchError::CircularDependency { cycle } => {
                write!(f, "circular dependency: {}", cycle.join(" -> "))
            }
            DispatchError::DependencyProvider { provider, source } => {
                write!(f, "provider '{provider}' failed: {source:#}")
            }
            DispatchError::Validation { errors } => {
                write!(f, "{} validation error(s)", errors.len())
            }
            DispatchError::Handler(e) => write!(f, "{e}"),
            DispatchError::Unhandled { source } => write!(f, "unhandled error: {source:#}"),
        }
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DispatchError::DependencyProvider { source, .. }
            | DispatchError::Unhandled { source } => Some(source.as_ref()),
            DispatchError::Handler(e) => Some(e),
            _ => None,
        }
    }
}

fn find_http_error(err: &anyhow::Error) -> Option<HttpError> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<HttpError>())
        .cloned()
}

/// Failure while building a dispatcher.
#[derive(Debug)]
pub enum StartupError {
    /// A route could not be registered or compiled
    Registration(RegistrationError),
    /// Two providers share a name
    DuplicateProvider { provider: String },
    /// A route or provider depends on a name nothing provides
    UnknownProvider {
        provider: String,
        /// Route name or provider name that declared the dependency
        required_by: String,
    },
    /// An app-scoped provider depends on a request-scoped one
    ScopeMismatch { provider: String, dependency: String },
    /// An app-scoped provider failed at startup
    AppScope(ResolveError),
    /// A route's response shape is not a valid JSON Schema
    InvalidResponseShape { route: String, source: anyhow::Error },
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupError::Registration(e) => write!(f, "route registration failed: {e}"),
            StartupError::DuplicateProvider { provider } => {
                write!(f, "provider '{provider}' is registered twice")
            }
            StartupError::UnknownProvider {
                provider,
                required_by,
            } => write!(
                f,
                "'{required_by}' depends on '{provider}', which no provider supplies"
            ),
            StartupError::ScopeMismatch {
                provider,
                dependency,
            } => write!(
                f,
                "app-scoped provider '{provider}' cannot depend on request-scoped '{dependency}'"
            ),
            StartupError::AppScope(e) => write!(f, "app scope failed to start: {e}"),
            StartupError::InvalidResponseShape { route, source } => {
                write!(f, "invalid response shape on route '{route}': {source:#}")
            }
        }
    }
}

impl std::error::Error for StartupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StartupError::Registration(e) => Some(e),
            StartupError::AppScope(e) => Some(e),
            StartupError::InvalidResponseShape { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<RegistrationError> for StartupError {
    fn from(err: RegistrationError) -> Self {
        StartupError::Registration(err)
    }
}

impl From<ResolveError> for StartupError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::ScopeMismatch {
                provider,
                dependency,
            } => StartupError::ScopeMismatch {
                provider,
                dependency,
            },
            other => StartupError::AppScope(other),
        }
    }
}
