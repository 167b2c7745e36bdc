//! Structured logging setup.
//!
//! The crate only emits `tracing` events; installing a subscriber is up to the
//! embedding application. [`init_logging_with_config`] installs one with:
//! - an `EnvFilter` (`RUST_LOG` wins over the configured level)
//! - a sampling layer (all, error-only, sampled)
//! - JSON or pretty formatting
//! - optional non-blocking output through `tracing-appender`
//!
//! ## Environment Variables
//!
//! - `ROUTEKIT_LOG_LEVEL`: trace, debug, info, warn, error (default: info)
//! - `ROUTEKIT_LOG_FORMAT`: json or pretty (default: json)
//! - `ROUTEKIT_LOG_SAMPLING_MODE`: all, error-only or sampled (default: all)
//! - `ROUTEKIT_LOG_SAMPLING_RATE`: 0.0 to 1.0 (default: 1.0)
//! - `ROUTEKIT_LOG_ASYNC`: write through a background thread (default: false)
//! - `ROUTEKIT_LOG_TARGET_FILTER`: extra directives, e.g. `routekit::depends=debug`
//! - `ROUTEKIT_LOG_INCLUDE_LOCATION`: add file and line (default: false)

use anyhow::{Context, Result};
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::Level;
use tracing::{Event, Metadata, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::{Context as LayerContext, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Log format: JSON for production, pretty-print for development
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

/// Which events to emit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingMode {
    All,
    /// Only WARN and ERROR
    ErrorOnly,
    /// Every WARN and ERROR plus a fraction of the rest
    Sampled,
}

impl SamplingMode {
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "error-only" | "error_only" => SamplingMode::ErrorOnly,
            "sampled" => SamplingMode::Sampled,
            _ => SamplingMode::All,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_level: String,
    pub format: LogFormat,
    pub sampling_mode: SamplingMode,
    /// Fraction of non-error events kept in `Sampled` mode
    pub sampling_rate: f64,
    pub async_logging: bool,
    pub target_filter: Option<String>,
    pub include_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            format: LogFormat::Json,
            sampling_mode: SamplingMode::All,
            sampling_rate: 1.0,
            async_logging: false,
            target_filter: None,
            include_location: false,
        }
    }
}

impl LogConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source; unset or unparsable values
    /// keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let flag = |key: &str, default: bool| {
            lookup(key)
                .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes" | "on"))
                .unwrap_or(default)
        };
        Self {
            log_level: lookup("ROUTEKIT_LOG_LEVEL").unwrap_or(defaults.log_level),
            format: lookup("ROUTEKIT_LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.format),
            sampling_mode: lookup("ROUTEKIT_LOG_SAMPLING_MODE")
                .map(|v| SamplingMode::parse(&v))
                .unwrap_or(defaults.sampling_mode),
            sampling_rate: lookup("ROUTEKIT_LOG_SAMPLING_RATE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.sampling_rate),
            async_logging: flag("ROUTEKIT_LOG_ASYNC", defaults.async_logging),
            target_filter: lookup("ROUTEKIT_LOG_TARGET_FILTER"),
            include_location: flag("ROUTEKIT_LOG_INCLUDE_LOCATION", defaults.include_location),
        }
    }

    /// Pretty output, debug level, everything logged.
    #[must_use]
    pub fn default_dev() -> Self {
        Self {
            log_level: "debug".to_string(),
            format: LogFormat::Pretty,
            include_location: true,
            ..Self::default()
        }
    }
}

/// Sampling layer: decides whether to emit an event based on sampling rules
pub struct SamplingLayer {
    mode: SamplingMode,
    sampling_rate: f64,
    counter: AtomicU64,
}

impl SamplingLayer {
    #[must_use]
    pub fn new(mode: SamplingMode, sampling_rate: f64) -> Self {
        Self {
            mode,
            sampling_rate: sampling_rate.clamp(0.0, 1.0),
            counter: AtomicU64::new(0),
        }
    }

    fn should_sample(&self, metadata: &Metadata<'_>) -> bool {
        let is_problem = matches!(*metadata.level(), Level::WARN | Level::ERROR);
        match self.mode {
            SamplingMode::All => true,
            SamplingMode::ErrorOnly => is_problem,
            SamplingMode::Sampled => {
                if is_problem {
                    return true;
                }
                if self.sampling_rate <= 0.0 {
                    return false;
                }
                let count = self.counter.fetch_add(1, Ordering::Relaxed);
                let interval = (1.0 / self.sampling_rate) as u64;
                interval > 0 && count % interval == 0
            }
        }
    }
}

impl<S> Layer<S> for SamplingLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn enabled(&self, metadata: &Metadata<'_>, _ctx: LayerContext<'_, S>) -> bool {
        // spans always pass so request context survives sampling
        metadata.is_span() || self.should_sample(metadata)
    }

    fn on_event(&self, _event: &Event<'_>, _ctx: LayerContext<'_, S>) {}
}

/// Install the global subscriber.
///
/// With `async_logging` the returned guard flushes buffered output when
/// dropped; keep it alive for the lifetime of the program.
///
/// ```no_run
/// use routekit::logging::{init_logging_with_config, LogConfig};
///
/// let _guard = init_logging_with_config(&LogConfig::from_env())?;
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn init_logging_with_config(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if let Some(target_filter) = &config.target_filter {
        for filter in target_filter.split(',').map(str::trim).filter(|f| !f.is_empty()) {
            let directive = filter
                .parse()
                .with_context(|| format!("invalid log filter directive '{filter}'"))?;
            env_filter = env_filter.add_directive(directive);
        }
    }

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(SamplingLayer::new(config.sampling_mode, config.sampling_rate));

    let (writer, guard) = if config.async_logging {
        let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stdout());
        (tracing_subscriber::fmt::writer::BoxMakeWriter::new(non_blocking), Some(guard))
    } else {
        (tracing_subscriber::fmt::writer::BoxMakeWriter::new(std::io::stdout), None)
    };

    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_span_list(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(writer)
            .boxed(),
    };

    registry
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}
