use super::context::{panic_message, Mode, ResolutionContext};
use super::provider::{DepValue, Depends, Provider, ProviderArgs, ProviderKind, ProviderRegistry, Scope};
use anyhow::anyhow;
use futures::FutureExt;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Failure while resolving a dependency graph.
#[derive(Debug)]
pub enum ResolveError {
    /// The graph loops back on itself; `cycle` starts and ends with the repeated provider
    Circular { cycle: Vec<String> },
    /// Nothing is registered under the requested name
    UnknownProvider { provider: String },
    /// The provider returned an error or panicked
    Provider {
        provider: String,
        source: anyhow::Error,
    },
    /// An app-scoped provider reached a request-scoped one
    ScopeMismatch { provider: String, dependency: String },
}

impl ResolveError {
    /// Provider named by the error.
    #[must_use]
    pub fn provider(&self) -> &str {
        match self {
            ResolveError::Circular { cycle } => cycle.first().map(String::as_str).unwrap_or_default(),
            ResolveError::UnknownProvider { provider }
            | ResolveError::Provider { provider, .. }
            | ResolveError::ScopeMismatch { provider, .. } => provider,
        }
    }
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::Circular { cycle } => {
                write!(f, "circular dependency: {}", cycle.join(" -> "))
            }
            ResolveError::UnknownProvider { provider } => {
                write!(f, "no provider registered for '{provider}'")
            }
            ResolveError::Provider { provider, source } => {
                write!(f, "provider '{provider}' failed: {source}")
            }
            ResolveError::ScopeMismatch {
                provider,
                dependency,
            } => write!(
                f,
                "app-scoped provider '{provider}' cannot depend on request-scoped '{dependency}'"
            ),
        }
    }
}

impl std::error::Error for ResolveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResolveError::Provider { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// One provider being resolved: its dependencies are filled in one by one,
/// then it is invoked.
struct Frame {
    identity: Arc<str>,
    provider: Provider,
    next_dep: usize,
    resolved: HashMap<String, DepValue>,
    /// Binding under which the parent frame receives the value
    binding: String,
}

/// Walks provider graphs against a [`ResolutionContext`].
///
/// Resolution is depth-first in declaration order and runs on an explicit
/// frame stack, so graph depth is bounded by memory rather than the host call
/// stack. The context's call stack mirrors the frame stack and drives cycle
/// detection.
#[derive(Clone, Debug)]
pub struct Resolver {
    providers: Arc<ProviderRegistry>,
}

impl Resolver {
    #[must_use]
    pub fn new(providers: Arc<ProviderRegistry>) -> Self {
        Self { providers }
    }

    #[must_use]
    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Resolve every `(binding, dependency)` site in order.
    pub async fn resolve(
        &self,
        ctx: &mut ResolutionContext,
        plan: &[(String, Depends)],
    ) -> Result<HashMap<String, DepValue>, ResolveError> {
        let mut out = HashMap::with_capacity(plan.len());
        for (binding, dependency) in plan {
            let value = self.resolve_one(ctx, dependency).await?;
            out.insert(binding.clone(), value);
        }
        Ok(out)
    }

    /// Resolve a single dependency site.
    pub async fn resolve_one(
        &self,
        ctx: &mut ResolutionContext,
        dependency: &Depends,
    ) -> Result<DepValue, ResolveError> {
        let base_depth = ctx.call_stack.len();
        let result = self.walk(ctx, dependency).await;
        if result.is_err() {
            ctx.call_stack.truncate(base_depth);
        }
        result
    }

    async fn walk(
        &self,
        ctx: &mut ResolutionContext,
        root: &Depends,
    ) -> Result<DepValue, ResolveError> {
        if let Some(value) = self.lookup(ctx, root)? {
            return Ok(value);
        }
        let mut stack = vec![self.enter(ctx, root, String::new(), None)?];

        loop {
            let Some(frame) = stack.last_mut() else {
                return Err(ResolveError::UnknownProvider {
                    provider: root.provider().to_string(),
                });
            };

            if let Some((binding, child)) = frame.provider.dependencies.get(frame.next_dep).cloned() {
                frame.next_dep += 1;
                if let Some(value) = self.lookup(ctx, &child)? {
                    frame.resolved.insert(binding, value);
                    continue;
                }
                let parent = Arc::clone(&frame.identity);
                let child_frame = self.enter(ctx, &child, binding, Some(&parent))?;
                stack.push(child_frame);
                continue;
            }

            let Some(frame) = stack.pop() else {
                continue;
            };
            let value = self.invoke(ctx, &frame.identity, &frame.provider, frame.resolved).await?;
            ctx.call_stack.pop();
            ctx.cache.insert(Arc::clone(&frame.identity), Arc::clone(&value));

            match stack.last_mut() {
                Some(parent) => {
                    parent.resolved.insert(frame.binding, value);
                }
                None => return Ok(value),
            }
        }
    }

    /// Value available without invoking anything: app scope, or the request cache.
    fn lookup(
        &self,
        ctx: &ResolutionContext,
        dependency: &Depends,
    ) -> Result<Option<DepValue>, ResolveError> {
        let name = dependency.provider();
        let provider = self.effective(name)?;

        if provider.scope == Scope::App {
            if ctx.mode == Mode::Request {
                let value = ctx.app.as_ref().and_then(|app| app.get(name)).map(Arc::clone);
                return match value {
                    Some(value) => Ok(Some(value)),
                    None => Err(ResolveError::Provider {
                        provider: name.to_string(),
                        source: anyhow!("app-scoped provider was not started"),
                    }),
                };
            }
            // App scope values are singletons: always reused once resolved.
            return Ok(ctx.cache.get(name).map(Arc::clone));
        }

        if dependency.use_cache() {
            if let Some(value) = ctx.cache.get(name) {
                debug!(provider = %name, "Dependency cache hit");
                return Ok(Some(Arc::clone(value)));
            }
        }
        Ok(None)
    }

    fn enter(
        &self,
        ctx: &mut ResolutionContext,
        dependency: &Depends,
        binding: String,
        parent: Option<&Arc<str>>,
    ) -> Result<Frame, ResolveError> {
        let identity = Arc::clone(dependency.provider_arc());

        if let Some(pos) = ctx.call_stack.iter().position(|p| *p == identity) {
            let mut cycle: Vec<String> = ctx.call_stack[pos..].iter().map(|p| p.to_string()).collect();
            cycle.push(identity.to_string());
            warn!(cycle = ?cycle, "Circular dependency detected");
            return Err(ResolveError::Circular { cycle });
        }

        let provider = self.effective(&identity)?.clone();
        if ctx.mode == Mode::Startup && provider.scope == Scope::Request {
            return Err(ResolveError::ScopeMismatch {
                provider: parent.map(ToString::to_string).unwrap_or_default(),
                dependency: identity.to_string(),
            });
        }

        debug!(
            provider = %identity,
            kind = provider.kind.label(),
            depth = ctx.call_stack.len(),
            use_cache = dependency.use_cache(),
            "Resolving dependency"
        );
        ctx.call_stack.push(Arc::clone(&identity));

        Ok(Frame {
            identity,
            next_dep: 0,
            resolved: HashMap::with_capacity(provider.dependencies.len()),
            provider,
            binding,
        })
    }

    async fn invoke(
        &self,
        ctx: &mut ResolutionContext,
        identity: &Arc<str>,
        provider: &Provider,
        resolved: HashMap<String, DepValue>,
    ) -> Result<DepValue, ResolveError> {
        let args = ProviderArgs::new(
            Arc::clone(identity),
            resolved,
            ctx.request.as_ref().map(Arc::clone),
            Arc::clone(&ctx.state),
        );
        let started = Instant::now();
        let failed = |source: anyhow::Error| ResolveError::Provider {
            provider: identity.to_string(),
            source,
        };
        let panicked = |payload: Box<dyn std::any::Any + Send>| ResolveError::Provider {
            provider: identity.to_string(),
            source: anyhow!("provider panicked: {}", panic_message(payload.as_ref())),
        };

        let value = match &provider.kind {
            ProviderKind::Sync(f) => std::panic::catch_unwind(AssertUnwindSafe(|| f(args)))
                .map_err(panicked)?
                .map_err(failed)?,
            ProviderKind::Async(f) => {
                let f = Arc::clone(f);
                AssertUnwindSafe(async move { f(args).await })
                    .catch_unwind()
                    .await
                    .map_err(panicked)?
                    .map_err(failed)?
            }
            ProviderKind::Generator(f) => {
                let f = Arc::clone(f);
                let (value, cleanup) = AssertUnwindSafe(async move { f(args).await })
                    .catch_unwind()
                    .await
                    .map_err(panicked)?
                    .map_err(failed)?;
                if let Some(cleanup) = cleanup {
                    ctx.push_cleanup(Arc::clone(identity), cleanup);
                }
                value
            }
        };

        debug!(
            provider = %identity,
            kind = provider.kind.label(),
            duration_us = started.elapsed().as_micros(),
            "Provider invoked"
        );
        Ok(value)
    }

    fn effective(&self, name: &str) -> Result<&Provider, ResolveError> {
        self.providers
            .effective(name)
            .ok_or_else(|| ResolveError::UnknownProvider {
                provider: name.to_string(),
            })
    }
}
