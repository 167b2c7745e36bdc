use super::app::AppState;
use crate::dispatcher::StartupError;
use crate::request::RequestParts;
use anyhow::anyhow;
use futures::future::{BoxFuture, FutureExt};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A resolved dependency value, shared by reference count.
///
/// Cache hits hand out a clone of the same `Arc`, so two lookups of a cached
/// provider within one request satisfy `Arc::ptr_eq`.
pub type DepValue = Arc<dyn Any + Send + Sync>;

/// Deferred cleanup registered by a generator provider.
pub type Cleanup = Box<dyn FnOnce(Outcome) -> BoxFuture<'static, anyhow::Result<()>> + Send>;

pub(crate) type SyncFn = Arc<dyn Fn(ProviderArgs) -> anyhow::Result<DepValue> + Send + Sync>;
pub(crate) type AsyncFn =
    Arc<dyn Fn(ProviderArgs) -> BoxFuture<'static, anyhow::Result<DepValue>> + Send + Sync>;
pub(crate) type GeneratorFn = Arc<
    dyn Fn(ProviderArgs) -> BoxFuture<'static, anyhow::Result<(DepValue, Option<Cleanup>)>>
        + Send
        + Sync,
>;

/// How the pipeline ended, handed to every cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Failed,
    /// The request future was dropped before reaching a terminal state.
    Cancelled,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Succeeded => write!(f, "succeeded"),
            Outcome::Failed => write!(f, "failed"),
            Outcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Lifetime over which a provider's result is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    /// Resolved at most once per request per cacheable site.
    #[default]
    Request,
    /// Resolved once when the dispatcher is built, read-only afterwards.
    App,
}

/// A dependency site: which provider, and whether a cached value may be reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Depends {
    provider: Arc<str>,
    use_cache: bool,
}

impl Depends {
    /// Depend on the provider registered under `provider`, cacheable.
    pub fn on(provider: impl Into<Arc<str>>) -> Self {
        Self {
            provider: provider.into(),
            use_cache: true,
        }
    }

    /// Invoke the provider again at this site even if the request already resolved it.
    #[must_use]
    pub fn no_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub(crate) fn provider_arc(&self) -> &Arc<str> {
        &self.provider
    }

    #[must_use]
    pub fn use_cache(&self) -> bool {
        self.use_cache
    }
}

/// Value produced by a generator provider, plus its cleanup phase.
///
/// ```rust,ignore
/// Provider::generator("db", |_args| async {
///     let conn = pool.acquire().await?;
///     Ok(Acquired::new(conn).on_cleanup(|conn, outcome| async move {
///         conn.release(outcome == Outcome::Succeeded).await
///     }))
/// });
/// ```
pub struct Acquired<T> {
    value: Arc<T>,
    cleanup: Option<Box<dyn FnOnce(Arc<T>, Outcome) -> BoxFuture<'static, anyhow::Result<()>> + Send>>,
}

impl<T: Send + Sync + 'static> Acquired<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Arc::new(value),
            cleanup: None,
        }
    }

    /// Cleanup run once after the pipeline reaches a terminal state. It gets
    /// the acquired value back along with the outcome.
    #[must_use]
    pub fn on_cleanup<F, Fut>(mut self, cleanup: F) -> Self
    where
        F: FnOnce(Arc<T>, Outcome) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.cleanup = Some(Box::new(move |value, outcome| cleanup(value, outcome).boxed()));
        self
    }

    fn into_erased(self) -> (DepValue, Option<Cleanup>) {
        let erased: DepValue = Arc::clone(&self.value) as DepValue;
        let value = self.value;
        let cleanup = self.cleanup.map(|f| -> Cleanup {
            Box::new(move |outcome: Outcome| f(value, outcome))
        });
        (erased, cleanup)
    }
}

/// Provider invocation style.
#[derive(Clone)]
pub enum ProviderKind {
    Sync(SyncFn),
    Async(AsyncFn),
    Generator(GeneratorFn),
}

impl ProviderKind {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            ProviderKind::Sync(_) => "sync",
            ProviderKind::Async(_) => "async",
            ProviderKind::Generator(_) => "generator",
        }
    }
}

/// A named value producer.
#[derive(Clone)]
pub struct Provider {
    pub(crate) name: Arc<str>,
    pub(crate) scope: Scope,
    pub(crate) dependencies: Vec<(String, Depends)>,
    pub(crate) kind: ProviderKind,
}

impl Provider {
    /// Provider invoked synchronously.
    pub fn sync<T, F>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(ProviderArgs) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self::with_kind(
            name,
            ProviderKind::Sync(Arc::new(move |args| f(args).map(|v| Arc::new(v) as DepValue))),
        )
    }

    /// Provider whose future is awaited.
    pub fn new_async<T, F, Fut>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(ProviderArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self::with_kind(
            name,
            ProviderKind::Async(Arc::new(move |args| {
                f(args).map(|r| r.map(|v| Arc::new(v) as DepValue)).boxed()
            })),
        )
    }

    /// Provider driven to its acquired value; its cleanup runs at teardown.
    pub fn generator<T, F, Fut>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(ProviderArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Acquired<T>>> + Send + 'static,
    {
        Self::with_kind(
            name,
            ProviderKind::Generator(Arc::new(move |args| {
                f(args).map(|r| r.map(Acquired::into_erased)).boxed()
            })),
        )
    }

    fn with_kind(name: impl Into<Arc<str>>, kind: ProviderKind) -> Self {
        Self {
            name: name.into(),
            scope: Scope::Request,
            dependencies: Vec::new(),
            kind,
        }
    }

    /// Declare a dependency, available to the provider under `binding`.
    /// Dependencies resolve depth-first in declaration order.
    #[must_use]
    pub fn depends_on(mut self, binding: impl Into<String>, dependency: Depends) -> Self {
        self.dependencies.push((binding.into(), dependency));
        self
    }

    #[must_use]
    pub fn in_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn scope(&self) -> Scope {
        self.scope
    }

    #[must_use]
    pub fn dependencies(&self) -> &[(String, Depends)] {
        &self.dependencies
    }

    #[must_use]
    pub fn kind(&self) -> &ProviderKind {
        &self.kind
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("kind", &self.kind.label())
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

/// What a provider sees when invoked.
pub struct ProviderArgs {
    provider: Arc<str>,
    deps: HashMap<String, DepValue>,
    request: Option<Arc<RequestParts>>,
    state: Arc<AppState>,
}

impl ProviderArgs {
    pub(crate) fn new(
        provider: Arc<str>,
        deps: HashMap<String, DepValue>,
        request: Option<Arc<RequestParts>>,
        state: Arc<AppState>,
    ) -> Self {
        Self {
            provider,
            deps,
            request,
            state,
        }
    }

    /// Name of the provider being invoked.
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Resolved dependency declared under `binding`, downcast to `T`.
    pub fn dep<T: Any + Send + Sync>(&self, binding: &str) -> anyhow::Result<Arc<T>> {
        downcast_dep(self.deps.get(binding), binding)
    }

    #[must_use]
    pub fn dep_value(&self, binding: &str) -> Option<&DepValue> {
        self.deps.get(binding)
    }

    /// The request being dispatched. `None` for app-scoped providers resolved at startup.
    #[must_use]
    pub fn request(&self) -> Option<&RequestParts> {
        self.request.as_deref()
    }

    #[must_use]
    pub fn state<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.state.get::<T>()
    }
}

pub(crate) fn downcast_dep<T: Any + Send + Sync>(
    value: Option<&DepValue>,
    binding: &str,
) -> anyhow::Result<Arc<T>> {
    let value = value.ok_or_else(|| anyhow!("dependency '{binding}' was not resolved"))?;
    Arc::clone(value).downcast::<T>().map_err(|_| {
        anyhow!(
            "dependency '{binding}' is not a {}",
            std::any::type_name::<T>()
        )
    })
}

/// Providers by name, plus test/deployment overrides.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Provider>,
    index: HashMap<Arc<str>, usize>,
    overrides: HashMap<Arc<str>, Provider>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Provider) -> Result<(), StartupError> {
        if self.index.contains_key(&provider.name) {
            return Err(StartupError::DuplicateProvider {
                provider: provider.name.to_string(),
            });
        }
        self.index
            .insert(Arc::clone(&provider.name), self.providers.len());
        self.providers.push(provider);
        Ok(())
    }

    /// Substitute `replacement` wherever `name` is depended on. The cache and
    /// cycle identity stays `name`.
    pub fn override_with(&mut self, name: impl Into<Arc<str>>, replacement: Provider) {
        self.overrides.insert(name.into(), replacement);
    }

    /// The provider that will actually run for `name`.
    #[must_use]
    pub fn effective(&self, name: &str) -> Option<&Provider> {
        self.overrides.get(name).or_else(|| {
            self.index
                .get(name)
                .and_then(|&i| self.providers.get(i))
        })
    }

    #[must_use]
    pub fn is_overridden(&self, name: &str) -> bool {
        self.overrides.contains_key(name)
    }

    /// Registered providers in registration order (overrides not applied).
    pub fn iter(&self) -> impl Iterator<Item = &Provider> {
        self.providers.iter()
    }

    /// Every name that resolves to something, registration order first.
    pub(crate) fn names(&self) -> Vec<Arc<str>> {
        let mut names: Vec<Arc<str>> = self.providers.iter().map(|p| Arc::clone(&p.name)).collect();
        let mut extra: Vec<Arc<str>> = self
            .overrides
            .keys()
            .filter(|k| !self.index.contains_key(*k))
            .map(Arc::clone)
            .collect();
        extra.sort();
        names.extend(extra);
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Check every provider's declared dependencies exist and that app-scoped
    /// providers depend only on app-scoped ones.
    pub fn validate(&self) -> Result<(), StartupError> {
        for name in self.names() {
            let Some(provider) = self.effective(&name) else {
                continue;
            };
            for (_, dep) in &provider.dependencies {
                let Some(target) = self.effective(dep.provider()) else {
                    return Err(StartupError::UnknownProvider {
                        provider: dep.provider().to_string(),
                        required_by: name.to_string(),
                    });
                };
                if provider.scope == Scope::App && target.scope == Scope::Request {
                    return Err(StartupError::ScopeMismatch {
                        provider: name.to_string(),
                        dependency: dep.provider().to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers)
            .field("overrides", &self.overrides.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(name: &str) -> Provider {
        Provider::sync(name.to_string(), |_| Ok(1_u32))
    }

    #[test]
    fn duplicate_provider_rejected() {
        let mut reg = ProviderRegistry::new();
        reg.register(constant("db")).unwrap();
        assert!(matches!(
            reg.register(constant("db")),
            Err(StartupError::DuplicateProvider { .. })
        ));
    }

    #[test]
    fn override_takes_precedence() {
        let mut reg = ProviderRegistry::new();
        reg.register(constant("db")).unwrap();
        reg.override_with("db", Provider::sync("fake_db", |_| Ok("fake")));
        assert_eq!(reg.effective("db").map(Provider::name), Some("fake_db"));
        assert!(reg.is_overridden("db"));
    }

    #[test]
    fn validate_reports_unknown_dependency() {
        let mut reg = ProviderRegistry::new();
        reg.register(constant("a").depends_on("b", Depends::on("b")))
            .unwrap();
        match reg.validate() {
            Err(StartupError::UnknownProvider {
                provider,
                required_by,
            }) => {
                assert_eq!(provider, "b");
                assert_eq!(required_by, "a");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn app_scope_cannot_depend_on_request_scope() {
        let mut reg = ProviderRegistry::new();
        reg.register(constant("user")).unwrap();
        reg.register(
            constant("pool")
                .in_scope(Scope::App)
                .depends_on("user", Depends::on("user")),
        )
        .unwrap();
        assert!(matches!(
            reg.validate(),
            Err(StartupError::ScopeMismatch { .. })
        ));
    }

    #[test]
    fn dep_downcast_reports_type() {
        let value: DepValue = Arc::new(5_u8);
        let err = downcast_dep::<String>(Some(&value), "n").unwrap_err();
        assert!(err.to_string().contains("is not a"));
        assert_eq!(*downcast_dep::<u8>(Some(&value), "n").unwrap(), 5);
    }

    #[test]
    fn depends_defaults_to_cacheable() {
        let d = Depends::on("db");
        assert!(d.use_cache());
        assert!(!d.no_cache().use_cache());
    }
}
