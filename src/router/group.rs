use crate::depends::Depends;
use crate::registry::{RegistrationError, RouteRegistry};
use crate::route::{join_paths, RouteModel, RouteSpec};

enum Entry {
    Route(RouteSpec),
    Group(RouteGroup),
}

/// A sub-router: routes and nested groups sharing a prefix, tags and dependencies.
///
/// Composition happens entirely at startup. Flattening walks entries in
/// insertion order, so the registration order of the resulting registry is the
/// order in which routes and groups were added.
///
/// ```rust,ignore
/// let mut users = RouteGroup::with_prefix("/users").tag("users");
/// users.route(RouteSpec::get("/{id}", get_user));
///
/// let mut api = RouteGroup::with_prefix("/api/").dependency(Depends::on("auth"));
/// api.include(users);
/// let registry = api.into_registry()?; // GET /api/users/{id}, deps [auth]
/// ```
#[derive(Default)]
pub struct RouteGroup {
    prefix: String,
    tags: Vec<String>,
    dependencies: Vec<Depends>,
    entries: Vec<Entry>,
}

impl RouteGroup {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Dependency resolved before those of every route in the group.
    #[must_use]
    pub fn dependency(mut self, dependency: Depends) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn route(&mut self, spec: RouteSpec) -> &mut Self {
        self.entries.push(Entry::Route(spec));
        self
    }

    /// Merge a child group under this group's prefix, tags and dependencies.
    pub fn include(&mut self, child: RouteGroup) -> &mut Self {
        self.entries.push(Entry::Group(child));
        self
    }

    /// Flatten into fully composed route models, in insertion order.
    pub fn compose(self) -> Result<Vec<RouteModel>, RegistrationError> {
        let mut out = Vec::new();
        self.compose_into("", &[], &[], &mut out)?;
        Ok(out)
    }

    /// Compose and register every route into `registry`.
    pub fn register_into(self, registry: &mut RouteRegistry) -> Result<(), RegistrationError> {
        for route in self.compose()? {
            registry.register(route)?;
        }
        Ok(())
    }

    pub fn into_registry(self) -> Result<RouteRegistry, RegistrationError> {
        let mut registry = RouteRegistry::new();
        self.register_into(&mut registry)?;
        Ok(registry)
    }

    fn compose_into(
        self,
        parent_prefix: &str,
        parent_tags: &[String],
        parent_dependencies: &[Depends],
        out: &mut Vec<RouteModel>,
    ) -> Result<(), RegistrationError> {
        let prefix = join_paths(parent_prefix, &self.prefix);

        let mut tags = parent_tags.to_vec();
        for tag in self.tags {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        let mut dependencies = parent_dependencies.to_vec();
        dependencies.extend(self.dependencies);

        for entry in self.entries {
            match entry {
                Entry::Route(spec) => {
                    out.push(RouteModel::compose(spec, &prefix, &tags, &dependencies)?);
                }
                Entry::Group(child) => {
                    child.compose_into(&prefix, &tags, &dependencies, out)?;
                }
            }
        }
        Ok(())
    }
}
