//! Dispatcher core: builder, startup checks and the per-request pipeline.

use super::error::{DispatchError, ErrorKind, StartupError};
use super::pipeline::{Pipeline, PipelineState};
use super::response::HandlerResponse;
use crate::config::DispatchConfig;
use crate::depends::{
    panic_message, AppScope, AppState, Outcome, Provider, ProviderRegistry, ResolutionContext,
    Resolver, TeardownReport,
};
use crate::handler::{HandlerArgs, Reply};
use crate::ids::RequestId;
use crate::middleware::Middleware;
use crate::registry::{RouteDescription, RouteRegistry};
use crate::request::{DispatchRequest, RequestParts};
use crate::route::RouteModel;
use crate::router::{RouteMatch, Router};
use crate::validator::{validate_response, Binder, ValidatorCache};
use anyhow::anyhow;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Collects routes, providers, state and middleware, then validates them all
/// in [`build`](Self::build).
pub struct DispatcherBuilder {
    registry: RouteRegistry,
    providers: ProviderRegistry,
    state: AppState,
    middlewares: Vec<Arc<dyn Middleware>>,
    config: DispatchConfig,
    // first provider registration error, reported by build()
    deferred: Option<StartupError>,
}

impl DispatcherBuilder {
    #[must_use]
    pub fn new(registry: RouteRegistry) -> Self {
        Self {
            registry,
            providers: ProviderRegistry::new(),
            state: AppState::new(),
            middlewares: Vec::new(),
            config: DispatchConfig::default(),
            deferred: None,
        }
    }

    #[must_use]
    pub fn provider(mut self, provider: Provider) -> Self {
        if let Err(err) = self.providers.register(provider) {
            if self.deferred.is_none() {
                self.deferred = Some(err);
            }
        }
        self
    }

    /// Substitute the provider registered under `name`, typically in tests.
    #[must_use]
    pub fn override_provider(mut self, name: &str, replacement: Provider) -> Self {
        self.providers.override_with(name, replacement);
        self
    }

    /// Make `value` available to providers and handlers through `state::<T>()`.
    #[must_use]
    pub fn state<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.state.insert(value);
        self
    }

    #[must_use]
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    #[must_use]
    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate every route and provider, compile the router and response
    /// validators, and start the app scope.
    pub async fn build(self) -> Result<Dispatcher, StartupError> {
        let started = Instant::now();
        if let Some(err) = self.deferred {
            return Err(err);
        }

        self.providers.validate()?;
        for route in self.registry.iter() {
            for (_, dependency) in route.resolution_plan() {
                if self.providers.effective(dependency.provider()).is_none() {
                    return Err(StartupError::UnknownProvider {
                        provider: dependency.provider().to_string(),
                        required_by: route.name().to_string(),
                    });
                }
            }
        }

        let router = Router::new(&self.registry)?.with_strict_slashes(self.config.strict_slashes);

        let validators = ValidatorCache::new();
        for route in self.registry.iter() {
            if let Some(shape) = route.response_shape() {
                validators
                    .get_or_compile(route.name(), "response", shape)
                    .map_err(|source| StartupError::InvalidResponseShape {
                        route: route.name().to_string(),
                        source,
                    })?;
            }
        }

        let resolver = Resolver::new(Arc::new(self.providers));
        let state = Arc::new(self.state);
        let app = AppScope::start(&resolver, state).await?;

        info!(
            routes = router.len(),
            providers = resolver.providers().len(),
            app_values = app.len(),
            response_validators = validators.size(),
            middlewares = self.middlewares.len(),
            duration_us = started.elapsed().as_micros() as u64,
            "Dispatcher built"
        );

        Ok(Dispatcher {
            inner: Arc::new(Inner {
                registry: self.registry,
                router,
                resolver,
                app: Arc::new(app),
                validators,
                middlewares: self.middlewares,
                config: self.config,
            }),
        })
    }
}

impl fmt::Debug for DispatcherBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherBuilder")
            .field("routes", &self.registry.len())
            .field("providers", &self.providers.len())
            .field("middlewares", &self.middlewares.len())
            .field("config", &self.config)
            .finish()
    }
}

struct Inner {
    registry: RouteRegistry,
    router: Router,
    resolver: Resolver,
    app: Arc<AppScope>,
    validators: ValidatorCache,
    middlewares: Vec<Arc<dyn Middleware>>,
    config: DispatchConfig,
}

/// Result of one dispatch.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub response: HandlerResponse,
    /// Terminal pipeline state; `None` when routing failed or a middleware
    /// short-circuited
    pub state: Option<PipelineState>,
    pub history: Vec<PipelineState>,
    pub request_id: RequestId,
    pub error_kind: Option<ErrorKind>,
    /// Request-scoped cleanups that ran before the response was returned
    pub teardown: TeardownReport,
}

/// Routes requests, resolves dependencies, binds parameters and runs handlers.
///
/// Cheap to clone; all shared data is read-only behind an `Arc`.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    #[must_use]
    pub fn builder(registry: RouteRegistry) -> DispatcherBuilder {
        DispatcherBuilder::new(registry)
    }

    /// Dispatch one request. Always produces a response; failures are
    /// packaged as error responses.
    pub async fn dispatch(&self, request: DispatchRequest) -> DispatchOutcome {
        let started = Instant::now();
        let inner = &self.inner;
        let request_id =
            RequestId::from_header_or_new(request.get_header(&inner.config.request_id_header));
        let head = (!inner.middlewares.is_empty()).then(|| request.head());

        if let Some(head) = &head {
            for mw in &inner.middlewares {
                if let Some(response) = mw.before(head) {
                    debug!(%request_id, method = %head.method, path = %head.path, "Middleware short-circuited request");
                    return self.finish(
                        head,
                        started,
                        DispatchOutcome {
                            response,
                            state: None,
                            history: Vec::new(),
                            request_id,
                            error_kind: None,
                            teardown: TeardownReport::default(),
                        },
                    );
                }
            }
        }

        let outcome = match inner.router.route(&request.method, &request.path) {
            Ok(route_match) => self.run_pipeline(route_match, request, request_id).await,
            Err(route_err) => {
                let err = DispatchError::from(route_err);
                debug!(%request_id, error = %err, "Routing failed");
                DispatchOutcome {
                    response: err.to_response(inner.config.expose_error_details),
                    state: None,
                    history: Vec::new(),
                    request_id,
                    error_kind: Some(err.kind()),
                    teardown: TeardownReport::default(),
                }
            }
        };

        match &head {
            Some(head) => self.finish(head, started, outcome),
            None => self.stamp(outcome),
        }
    }

    async fn run_pipeline(
        &self,
        route_match: RouteMatch,
        request: DispatchRequest,
        request_id: RequestId,
    ) -> DispatchOutcome {
        let started = Instant::now();
        let inner = &self.inner;
        let route = Arc::clone(&route_match.route);
        let parts = Arc::new(RequestParts::new(
            request_id,
            request,
            route_match.path_params,
        ));
        let mut pipeline = Pipeline::start();
        let mut ctx = ResolutionContext::for_request(Arc::clone(&parts), Arc::clone(&inner.app));

        let result = self.execute(&mut pipeline, &mut ctx, &route, &parts).await;

        let (response, error_kind, outcome) = match result {
            Ok(response) => {
                pipeline.advance(PipelineState::Succeeded);
                (response, None, Outcome::Succeeded)
            }
            Err(err) => {
                pipeline.fail();
                if err.is_expected() {
                    debug!(%request_id, route = %route.name(), kind = %err.kind(), error = %err, "Request failed");
                } else {
                    error!(%request_id, route = %route.name(), kind = %err.kind(), error = %err, "Request failed");
                }
                let kind = err.kind();
                (
                    err.to_response(inner.config.expose_error_details),
                    Some(kind),
                    Outcome::Failed,
                )
            }
        };

        let teardown = ctx.teardown(outcome).await;
        if !teardown.failed.is_empty() {
            warn!(%request_id, failed = ?teardown.failed, "Some cleanups failed");
        }

        info!(
            %request_id,
            method = %parts.method,
            path = %parts.path,
            route = %route.name(),
            status = response.status.as_u16(),
            state = %pipeline.state(),
            duration_us = started.elapsed().as_micros() as u64,
            "Request dispatched"
        );

        DispatchOutcome {
            response,
            state: Some(pipeline.state()),
            history: pipeline.into_history(),
            request_id,
            error_kind,
            teardown,
        }
    }

    async fn execute(
        &self,
        pipeline: &mut Pipeline,
        ctx: &mut ResolutionContext,
        route: &Arc<RouteModel>,
        parts: &Arc<RequestParts>,
    ) -> Result<HandlerResponse, DispatchError> {
        let inner = &self.inner;

        pipeline.advance(PipelineState::ResolvingDependencies);
        let deps = inner
            .resolver
            .resolve(ctx, route.resolution_plan())
            .await?;

        pipeline.advance(PipelineState::Validating);
        let params = Binder::bind(route.params(), parts)
            .map_err(|errors| DispatchError::Validation { errors })?;

        pipeline.advance(PipelineState::Executing);
        let args = HandlerArgs::new(
            Arc::clone(parts),
            Arc::clone(route),
            params,
            deps,
            Arc::clone(inner.app.state()),
        );
        let handler = route.handler().clone();
        let reply = match AssertUnwindSafe(async move { handler.call(args).await })
            .catch_unwind()
            .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(err)) => return Err(DispatchError::from_handler_error(err)),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(route = %route.name(), panic_message = %message, "Handler panicked");
                return Err(DispatchError::Unhandled {
                    source: anyhow!("handler '{}' panicked: {message}", route.name()),
                });
            }
        };

        self.package(route, reply)
    }

    fn package(&self, route: &RouteModel, reply: Reply) -> Result<HandlerResponse, DispatchError> {
        match reply {
            Reply::Response(response) => Ok(response),
            Reply::Json(body) => {
                if self.inner.config.validate_responses {
                    if let Some(validator) = self.inner.validators.get(route.name(), "response") {
                        let errors = validate_response(&validator, &body);
                        if !errors.is_empty() {
                            let summary: Vec<String> =
                                errors.iter().map(ToString::to_string).collect();
                            return Err(DispatchError::Unhandled {
                                source: anyhow!(
                                    "reply of route '{}' does not match its response shape: {}",
                                    route.name(),
                                    summary.join("; ")
                                ),
                            });
                        }
                    }
                }
                Ok(HandlerResponse::json(route.status(), body))
            }
        }
    }

    fn finish(
        &self,
        head: &DispatchRequest,
        started: Instant,
        outcome: DispatchOutcome,
    ) -> DispatchOutcome {
        let mut outcome = outcome;
        let latency: Duration = started.elapsed();
        for mw in &self.inner.middlewares {
            mw.after(head, &mut outcome.response, latency);
        }
        self.stamp(outcome)
    }

    fn stamp(&self, mut outcome: DispatchOutcome) -> DispatchOutcome {
        outcome.response.set_header(
            &self.inner.config.request_id_header,
            outcome.request_id.to_string(),
        );
        outcome
    }

    /// Run app-scoped cleanups. Call once, after the last dispatch.
    pub async fn shutdown(&self) -> TeardownReport {
        let report = self.inner.app.shutdown().await;
        info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            "Dispatcher shut down"
        );
        report
    }

    #[must_use]
    pub fn registry(&self) -> &RouteRegistry {
        &self.inner.registry
    }

    #[must_use]
    pub fn router(&self) -> &Router {
        &self.inner.router
    }

    #[must_use]
    pub fn config(&self) -> &DispatchConfig {
        &self.inner.config
    }

    /// Value of an app-scoped provider, resolved at build.
    #[must_use]
    pub fn app_value<T: Any + Send + Sync>(&self, provider: &str) -> Option<Arc<T>> {
        self.inner
            .app
            .get(provider)
            .and_then(|v| Arc::clone(v).downcast::<T>().ok())
    }

    /// Route metadata for schema generators.
    #[must_use]
    pub fn describe(&self) -> Vec<RouteDescription> {
        self.inner.registry.describe()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("router", &self.inner.router)
            .field("resolver", &self.inner.resolver)
            .field("app", &self.inner.app)
            .field("config", &self.inner.config)
            .finish()
    }
}
