//! Handler contract: what a handler receives and what it may return.

use crate::depends::{downcast_dep, AppState, DepValue};
use crate::dispatcher::HandlerResponse;
use crate::request::RequestParts;
use crate::route::RouteModel;
use crate::validator::BoundParams;
use anyhow::{anyhow, Context};
use futures::future::{self, BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Everything a handler declared, resolved and bound.
pub struct HandlerArgs {
    request: Arc<RequestParts>,
    route: Arc<RouteModel>,
    params: BoundParams,
    deps: HashMap<String, DepValue>,
    state: Arc<AppState>,
}

impl HandlerArgs {
    pub(crate) fn new(
        request: Arc<RequestParts>,
        route: Arc<RouteModel>,
        params: BoundParams,
        deps: HashMap<String, DepValue>,
        state: Arc<AppState>,
    ) -> Self {
        Self {
            request,
            route,
            params,
            deps,
            state,
        }
    }

    /// Coerced path, query or header parameter as JSON.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.value(name)
    }

    /// Coerced parameter deserialized into `T`.
    ///
    /// ```rust,ignore
    /// let item_id: i64 = args.param_as("item_id")?;
    /// let tags: Vec<String> = args.param_as("tag")?;
    /// ```
    pub fn param_as<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<T> {
        let value = self
            .params
            .value(name)
            .ok_or_else(|| anyhow!("parameter '{name}' is not declared on this route"))?;
        T::deserialize(value).with_context(|| format!("parameter '{name}'"))
    }

    /// Parsed body model, as produced by its `ValidationModel`.
    pub fn body<T: Any + Send + Sync>(&self, name: &str) -> anyhow::Result<Arc<T>> {
        downcast_dep(self.params.model(name), name)
    }

    /// Injected dependency bound under `name`. Route-level dependencies are
    /// bound under their provider name.
    pub fn dep<T: Any + Send + Sync>(&self, name: &str) -> anyhow::Result<Arc<T>> {
        downcast_dep(self.deps.get(name), name)
    }

    #[must_use]
    pub fn dep_value(&self, name: &str) -> Option<&DepValue> {
        self.deps.get(name)
    }

    #[must_use]
    pub fn state<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.state.get::<T>()
    }

    #[must_use]
    pub fn request(&self) -> &RequestParts {
        &self.request
    }

    #[must_use]
    pub fn route(&self) -> &RouteModel {
        &self.route
    }
}

/// What a handler produced.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Sent with the route's declared status code
    Json(Value),
    /// Sent as-is
    Response(HandlerResponse),
}

/// Serializable reply wrapper.
#[derive(Debug, Clone)]
pub struct Json<T>(pub T);

pub trait IntoReply {
    fn into_reply(self) -> anyhow::Result<Reply>;
}

impl IntoReply for Reply {
    fn into_reply(self) -> anyhow::Result<Reply> {
        Ok(self)
    }
}

impl IntoReply for Value {
    fn into_reply(self) -> anyhow::Result<Reply> {
        Ok(Reply::Json(self))
    }
}

impl IntoReply for HandlerResponse {
    fn into_reply(self) -> anyhow::Result<Reply> {
        Ok(Reply::Response(self))
    }
}

impl<T: Serialize> IntoReply for Json<T> {
    fn into_reply(self) -> anyhow::Result<Reply> {
        let value = serde_json::to_value(self.0).context("failed to serialize handler reply")?;
        Ok(Reply::Json(value))
    }
}

type HandlerFn = Arc<dyn Fn(HandlerArgs) -> BoxFuture<'static, anyhow::Result<Reply>> + Send + Sync>;

/// A route's handler, sync or async.
#[derive(Clone)]
pub struct Handler(HandlerFn);

impl Handler {
    pub fn sync<F, R>(f: F) -> Self
    where
        F: Fn(HandlerArgs) -> anyhow::Result<R> + Send + Sync + 'static,
        R: IntoReply,
    {
        Self(Arc::new(move |args| {
            future::ready(f(args).and_then(IntoReply::into_reply)).boxed()
        }))
    }

    pub fn new_async<F, Fut, R>(f: F) -> Self
    where
        F: Fn(HandlerArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: IntoReply,
    {
        Self(Arc::new(move |args| {
            f(args)
                .map(|r| r.and_then(IntoReply::into_reply))
                .boxed()
        }))
    }

    pub(crate) fn call(&self, args: HandlerArgs) -> BoxFuture<'static, anyhow::Result<Reply>> {
        (self.0)(args)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler")
    }
}
