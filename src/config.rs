//! # Dispatch Configuration
//!
//! Runtime behaviour of the [`Dispatcher`](crate::dispatcher::Dispatcher),
//! loaded from a YAML, TOML or JSON file and overridden by environment
//! variables.
//!
//! ## Environment Variables
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | `ROUTEKIT_STRICT_SLASHES` | `strict_slashes` | `false` |
//! | `ROUTEKIT_EXPOSE_ERROR_DETAILS` | `expose_error_details` | `false` |
//! | `ROUTEKIT_VALIDATE_RESPONSES` | `validate_responses` | `false` |
//! | `ROUTEKIT_REQUEST_ID_HEADER` | `request_id_header` | `x-request-id` |
//!
//! Booleans accept `true/false`, `1/0`, `yes/no` and `on/off`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use routekit::config::DispatchConfig;
//!
//! let config = DispatchConfig::load_with_env("config/dispatch.yaml")?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ```yaml
//! strict_slashes: false
//! expose_error_details: true
//! validate_responses: true
//! request_id_header: x-correlation-id
//! ```

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

pub const DEFAULT_REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    /// When set, `/items/` does not match `/items`
    pub strict_slashes: bool,
    /// Include internal error details (provider names, error chains) in
    /// 500 responses. Development only.
    pub expose_error_details: bool,
    /// Check handler JSON replies against the route's response shape
    pub validate_responses: bool,
    /// Header the request id is read from and echoed in
    pub request_id_header: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            strict_slashes: false,
            expose_error_details: false,
            validate_responses: false,
            request_id_header: DEFAULT_REQUEST_ID_HEADER.to_string(),
        }
    }
}

impl DispatchConfig {
    /// Load from a file, choosing the format by extension
    /// (`.yaml`/`.yml`, `.toml` or `.json`).
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let config = match ext.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&raw)
                .with_context(|| format!("invalid YAML in {}", path.display()))?,
            "toml" => toml::from_str(&raw)
                .with_context(|| format!("invalid TOML in {}", path.display()))?,
            "json" => serde_json::from_str(&raw)
                .with_context(|| format!("invalid JSON in {}", path.display()))?,
            other => bail!(
                "unsupported config format '{other}' for {} (expected yaml, yml, toml or json)",
                path.display()
            ),
        };
        Ok(config)
    }

    /// [`load`](Self::load) followed by `ROUTEKIT_*` overrides.
    pub fn load_with_env(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Defaults with `ROUTEKIT_*` overrides.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();
        config.apply_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ROUTEKIT_STRICT_SLASHES") {
            self.strict_slashes = parse_bool("ROUTEKIT_STRICT_SLASHES", &v)?;
        }
        if let Some(v) = lookup("ROUTEKIT_EXPOSE_ERROR_DETAILS") {
            self.expose_error_details = parse_bool("ROUTEKIT_EXPOSE_ERROR_DETAILS", &v)?;
        }
        if let Some(v) = lookup("ROUTEKIT_VALIDATE_RESPONSES") {
            self.validate_responses = parse_bool("ROUTEKIT_VALIDATE_RESPONSES", &v)?;
        }
        if let Some(v) = lookup("ROUTEKIT_REQUEST_ID_HEADER") {
            let v = v.trim();
            if v.is_empty() {
                bail!("ROUTEKIT_REQUEST_ID_HEADER must not be empty");
            }
            self.request_id_header = v.to_ascii_lowercase();
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => bail!("{key}: expected a boolean, got '{other}'"),
    }
}
