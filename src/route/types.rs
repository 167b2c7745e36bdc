use super::path::{join_paths, PathPattern};
use crate::depends::Depends;
use crate::handler::Handler;
use crate::registry::RegistrationError;
use crate::validator::ValidationModel;
use http::{Method, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Where a declared value parameter is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Body,
}

impl fmt::Display for ParamLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamLocation::Path => write!(f, "path"),
            ParamLocation::Query => write!(f, "query"),
            ParamLocation::Header => write!(f, "header"),
            ParamLocation::Body => write!(f, "body"),
        }
    }
}

/// Scalar type a raw string is coerced into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Primitive {
    Integer,
    Float,
    Boolean,
    String,
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Primitive::Integer => "integer",
            Primitive::Float => "float",
            Primitive::Boolean => "boolean",
            Primitive::String => "string",
        };
        f.write_str(s)
    }
}

/// Declared type of a path, query or header parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    Scalar(Primitive),
    /// Every occurrence of a repeated key, each coerced to the item type.
    List(Primitive),
}

impl From<Primitive> for ParamType {
    fn from(p: Primitive) -> Self {
        ParamType::Scalar(p)
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Scalar(p) => write!(f, "{p}"),
            ParamType::List(p) => write!(f, "list<{p}>"),
        }
    }
}

impl Serialize for ParamType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A path, query or header parameter declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueParam {
    pub name: String,
    pub location: ParamLocation,
    pub ty: ParamType,
    pub required: bool,
    pub default: Option<Value>,
}

impl ValueParam {
    /// Path parameters are always required; their name must be a placeholder in the pattern.
    pub fn path(name: impl Into<String>, ty: Primitive) -> Self {
        Self {
            name: name.into(),
            location: ParamLocation::Path,
            ty: ParamType::Scalar(ty),
            required: true,
            default: None,
        }
    }

    pub fn query(name: impl Into<String>, ty: impl Into<ParamType>) -> Self {
        Self {
            name: name.into(),
            location: ParamLocation::Query,
            ty: ty.into(),
            required: true,
            default: None,
        }
    }

    /// Header lookup is case-insensitive.
    pub fn header(name: impl Into<String>, ty: impl Into<ParamType>) -> Self {
        Self {
            name: name.into(),
            location: ParamLocation::Header,
            ty: ty.into(),
            required: true,
            default: None,
        }
    }

    /// Value bound when the parameter is absent. Implies optional.
    #[must_use]
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self.required = false;
        self
    }

    /// Bind `null` instead of failing when absent.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// A request body parameter parsed through a [`ValidationModel`].
#[derive(Clone)]
pub struct BodyParam {
    pub name: String,
    pub model: Arc<dyn ValidationModel>,
    pub required: bool,
}

impl BodyParam {
    pub fn new(name: impl Into<String>, model: Arc<dyn ValidationModel>) -> Self {
        Self {
            name: name.into(),
            model,
            required: true,
        }
    }

    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

impl fmt::Debug for BodyParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyParam")
            .field("name", &self.name)
            .field("model", &self.model.name())
            .field("required", &self.required)
            .finish()
    }
}

/// One declared handler parameter.
#[derive(Debug, Clone)]
pub enum Param {
    Value(ValueParam),
    Body(BodyParam),
    /// Injected provider value, bound under `name`.
    Depends { name: String, dependency: Depends },
}

impl Param {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Param::Value(p) => &p.name,
            Param::Body(p) => &p.name,
            Param::Depends { name, .. } => name,
        }
    }
}

impl From<ValueParam> for Param {
    fn from(p: ValueParam) -> Self {
        Param::Value(p)
    }
}

impl From<BodyParam> for Param {
    fn from(p: BodyParam) -> Self {
        Param::Body(p)
    }
}

/// Registration contract: everything needed to build a [`RouteModel`].
///
/// ```rust,ignore
/// let spec = RouteSpec::get("/items/{item_id}", handler)
///     .param(ValueParam::path("item_id", Primitive::Integer))
///     .depends("db", Depends::on("get_db"))
///     .tag("items");
/// ```
#[derive(Clone)]
pub struct RouteSpec {
    pub(crate) path: String,
    pub(crate) methods: Vec<Method>,
    pub(crate) handler: Handler,
    pub(crate) name: Option<String>,
    pub(crate) tags: Vec<String>,
    pub(crate) dependencies: Vec<Depends>,
    pub(crate) params: Vec<Param>,
    pub(crate) status: StatusCode,
    pub(crate) response_shape: Option<Value>,
    pub(crate) deprecated: bool,
    pub(crate) include_in_schema: bool,
    pub(crate) summary: Option<String>,
}

impl RouteSpec {
    pub fn new(path: impl Into<String>, methods: &[Method], handler: Handler) -> Self {
        let mut unique: Vec<Method> = Vec::with_capacity(methods.len());
        for m in methods {
            if !unique.contains(m) {
                unique.push(m.clone());
            }
        }
        Self {
            path: path.into(),
            methods: unique,
            handler,
            name: None,
            tags: Vec::new(),
            dependencies: Vec::new(),
            params: Vec::new(),
            status: StatusCode::OK,
            response_shape: None,
            deprecated: false,
            include_in_schema: true,
            summary: None,
        }
    }

    pub fn get(path: impl Into<String>, handler: Handler) -> Self {
        Self::new(path, &[Method::GET], handler)
    }

    pub fn post(path: impl Into<String>, handler: Handler) -> Self {
        Self::new(path, &[Method::POST], handler).status(StatusCode::CREATED)
    }

    pub fn put(path: impl Into<String>, handler: Handler) -> Self {
        Self::new(path, &[Method::PUT], handler)
    }

    pub fn patch(path: impl Into<String>, handler: Handler) -> Self {
        Self::new(path, &[Method::PATCH], handler)
    }

    pub fn delete(path: impl Into<String>, handler: Handler) -> Self {
        Self::new(path, &[Method::DELETE], handler)
    }

    /// Operation name; defaults to `<method>_<path segments>`.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Route-level dependency: resolved before the handler's own, bound under the provider name.
    #[must_use]
    pub fn dependency(mut self, dependency: Depends) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Handler parameter injected from a provider.
    #[must_use]
    pub fn depends(mut self, name: impl Into<String>, dependency: Depends) -> Self {
        self.params.push(Param::Depends {
            name: name.into(),
            dependency,
        });
        self
    }

    #[must_use]
    pub fn param(mut self, param: impl Into<Param>) -> Self {
        self.params.push(param.into());
        self
    }

    #[must_use]
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// JSON schema describing the success body.
    #[must_use]
    pub fn response_shape(mut self, shape: Value) -> Self {
        self.response_shape = Some(shape);
        self
    }

    #[must_use]
    pub fn deprecated(mut self, deprecated: bool) -> Self {
        self.deprecated = deprecated;
        self
    }

    #[must_use]
    pub fn include_in_schema(mut self, include: bool) -> Self {
        self.include_in_schema = include;
        self
    }

    #[must_use]
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}

/// Immutable metadata for one registered endpoint, after prefix composition.
pub struct RouteModel {
    pattern: PathPattern,
    methods: Vec<Method>,
    handler: Handler,
    name: String,
    tags: Vec<String>,
    dependencies: Vec<Depends>,
    params: Vec<Param>,
    status: StatusCode,
    response_shape: Option<Value>,
    deprecated: bool,
    include_in_schema: bool,
    summary: Option<String>,
    resolution_plan: Vec<(String, Depends)>,
}

impl RouteModel {
    /// Build a model from a spec with no inherited prefix, tags or dependencies.
    pub fn from_spec(spec: RouteSpec) -> Result<Self, RegistrationError> {
        Self::compose(spec, "", &[], &[])
    }

    /// Build a model under a group: prefix concatenated, tags unioned (first
    /// occurrence keeps its position) and dependencies ordered parent first.
    pub(crate) fn compose(
        spec: RouteSpec,
        prefix: &str,
        inherited_tags: &[String],
        inherited_dependencies: &[Depends],
    ) -> Result<Self, RegistrationError> {
        let full_path = join_paths(prefix, &spec.path);
        let pattern = PathPattern::parse(&full_path).map_err(|e| {
            RegistrationError::InvalidPattern {
                path: e.path,
                reason: e.reason,
            }
        })?;

        if spec.methods.is_empty() {
            return Err(RegistrationError::NoMethods {
                path: pattern.as_str().to_string(),
            });
        }

        let mut seen_params: Vec<&str> = Vec::with_capacity(spec.params.len());
        for param in &spec.params {
            let name = param.name();
            if seen_params.contains(&name) {
                return Err(RegistrationError::DuplicateParameter {
                    path: pattern.as_str().to_string(),
                    param: name.to_string(),
                });
            }
            seen_params.push(name);
            if let Param::Value(v) = param {
                if v.location == ParamLocation::Path && !pattern.has_param(&v.name) {
                    return Err(RegistrationError::UndeclaredPathParam {
                        path: pattern.as_str().to_string(),
                        param: v.name.clone(),
                    });
                }
            }
        }

        let mut tags: Vec<String> = Vec::with_capacity(inherited_tags.len() + spec.tags.len());
        for tag in inherited_tags.iter().chain(spec.tags.iter()) {
            if !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }

        let mut dependencies = inherited_dependencies.to_vec();
        dependencies.extend(spec.dependencies);

        // route-level dependencies bind under their provider name
        let clash = spec.params.iter().find_map(|p| match p {
            Param::Depends { name, .. }
                if dependencies.iter().any(|d| d.provider() == name.as_str()) =>
            {
                Some(name.clone())
            }
            _ => None,
        });
        if let Some(param) = clash {
            return Err(RegistrationError::DuplicateParameter {
                path: pattern.as_str().to_string(),
                param,
            });
        }

        let resolution_plan = dependencies
            .iter()
            .map(|d| (d.provider().to_string(), d.clone()))
            .chain(spec.params.iter().filter_map(|p| match p {
                Param::Depends { name, dependency } => Some((name.clone(), dependency.clone())),
                _ => None,
            }))
            .collect();

        let name = spec
            .name
            .unwrap_or_else(|| default_route_name(&spec.methods, &pattern));

        Ok(Self {
            pattern,
            methods: spec.methods,
            handler: spec.handler,
            name,
            tags,
            dependencies,
            params: spec.params,
            status: spec.status,
            response_shape: spec.response_shape,
            deprecated: spec.deprecated,
            include_in_schema: spec.include_in_schema,
            summary: spec.summary,
            resolution_plan,
        })
    }

    #[must_use]
    pub fn path(&self) -> &str {
        self.pattern.as_str()
    }

    #[must_use]
    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    #[must_use]
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    #[must_use]
    pub fn allows(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }

    #[must_use]
    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Route-level dependencies, parent groups first.
    #[must_use]
    pub fn dependencies(&self) -> &[Depends] {
        &self.dependencies
    }

    #[must_use]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn response_shape(&self) -> Option<&Value> {
        self.response_shape.as_ref()
    }

    #[must_use]
    pub fn deprecated(&self) -> bool {
        self.deprecated
    }

    #[must_use]
    pub fn include_in_schema(&self) -> bool {
        self.include_in_schema
    }

    #[must_use]
    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    /// Every dependency site in resolution order: route-level dependencies
    /// (bound under their provider name) followed by injected handler parameters.
    #[must_use]
    pub fn resolution_plan(&self) -> &[(String, Depends)] {
        &self.resolution_plan
    }
}

impl fmt::Debug for RouteModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteModel")
            .field("path", &self.pattern.as_str())
            .field("methods", &self.methods)
            .field("name", &self.name)
            .field("tags", &self.tags)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

fn default_route_name(methods: &[Method], pattern: &PathPattern) -> String {
    let method = methods
        .first()
        .map(|m| m.as_str().to_ascii_lowercase())
        .unwrap_or_default();
    let mut name = method;
    for segment in pattern.as_str().split('/').filter(|s| !s.is_empty()) {
        name.push('_');
        name.extend(
            segment
                .trim_start_matches('{')
                .trim_end_matches('}')
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' }),
        );
    }
    if !name.contains('_') {
        name.push_str("_root");
    }
    name
}
