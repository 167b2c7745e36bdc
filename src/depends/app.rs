use super::context::{run_cleanups, PendingCleanup, ResolutionContext, TeardownReport};
use super::provider::{DepValue, Depends, Outcome, Scope};
use super::resolver::{ResolveError, Resolver};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Typed application state shared by every request.
///
/// Replaces a free-form attribute bag: one value per type, inserted while the
/// dispatcher is being built and read-only afterwards.
#[derive(Default)]
pub struct AppState {
    values: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl AppState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the previous one of the same type.
    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) -> Option<T> {
        self.values
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|b| *b)
    }

    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|b| b.downcast_ref::<T>())
    }

    #[must_use]
    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.values.contains_key(&TypeId::of::<T>())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("entries", &self.values.len())
            .finish()
    }
}

/// Values of every app-scoped provider, resolved once at startup.
pub struct AppScope {
    state: Arc<AppState>,
    values: HashMap<Arc<str>, DepValue>,
    cleanups: Mutex<Vec<PendingCleanup>>,
}

impl AppScope {
    /// Resolve every app-scoped provider, in registration order.
    ///
    /// On failure the cleanups of providers already acquired run before the
    /// error is returned.
    pub(crate) async fn start(resolver: &Resolver, state: Arc<AppState>) -> Result<Self, ResolveError> {
        let mut ctx = ResolutionContext::for_startup(Arc::clone(&state));
        let names: Vec<Arc<str>> = resolver
            .providers()
            .names()
            .into_iter()
            .filter(|name| {
                resolver
                    .providers()
                    .effective(name)
                    .is_some_and(|p| p.scope() == Scope::App)
            })
            .collect();

        for name in &names {
            debug!(provider = %name, "Resolving app-scoped provider");
            if let Err(err) = resolver.resolve_one(&mut ctx, &Depends::on(Arc::clone(name))).await {
                ctx.teardown(Outcome::Failed).await;
                return Err(err);
            }
        }

        let values = ctx.take_cache();
        let cleanups = ctx.take_cleanups();
        info!(
            app_providers = values.len(),
            pending_cleanups = cleanups.len(),
            "App scope started"
        );

        Ok(Self {
            state,
            values,
            cleanups: Mutex::new(cleanups),
        })
    }

    /// App scope with no provider values, for contexts built outside a dispatcher.
    #[must_use]
    pub fn empty(state: Arc<AppState>) -> Self {
        Self {
            state,
            values: HashMap::new(),
            cleanups: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn get(&self, provider: &str) -> Option<&DepValue> {
        self.values.get(provider)
    }

    #[must_use]
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Run app-scoped cleanups in reverse acquisition order. Later calls are no-ops.
    pub async fn shutdown(&self) -> TeardownReport {
        let cleanups = {
            let mut guard = self
                .cleanups
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };
        run_cleanups(cleanups, Outcome::Succeeded).await
    }
}

impl fmt::Debug for AppScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.values.keys().map(|k| k.as_ref()).collect();
        names.sort_unstable();
        f.debug_struct("AppScope")
            .field("values", &names)
            .field("state", &self.state)
            .finish()
    }
}
