//! Shared tracing configuration for the vkgraph workspace.
//!
//! Every binary, benchmark and integration test installs its `tracing`
//! subscriber through this crate so that graph lifecycle spans, dispatch
//! events and performance timings look the same wherever they are emitted.
//!
//! ```text
//!   TracingConfig ──(from_env / presets)──► resolve_filter ──► EnvFilter
//!        │                                                        │
//!        └──────────────► subscriber_layers ──► fmt layer ────────┤
//!                                                                 ▼
//!                                           Registry::default().with(..)
//! ```
//!
//! Performance spans ([`performance::PerformanceSpan`], [`perf_span!`]) are
//! gated on a process-wide flag that [`init_global_tracing`] sets from
//! [`TracingConfig::enable_performance_tracing`].

pub mod performance;

#[macro_use]
pub mod macros;

use std::env;

pub use tracing::{debug, error, info, trace, warn};

use thiserror::Error;
use tracing::Subscriber;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter, Registry};

/// Environment variable selecting a preset: `local` (default), `ci` or `performance`.
pub const ENV_PROFILE: &str = "VKGRAPH_TRACING_PROFILE";
/// Environment variable overriding the filter directives.
pub const ENV_DIRECTIVES: &str = "VKGRAPH_TRACING_DIRECTIVES";
/// Environment variable selecting the output format: `pretty`, `compact` or `json`.
pub const ENV_FORMAT: &str = "VKGRAPH_TRACING_FORMAT";
/// Environment variable toggling performance spans.
pub const ENV_PERF_TRACING: &str = "VKGRAPH_PERF_TRACING";
/// Environment variable holding the performance span threshold in microseconds.
pub const ENV_PERF_THRESHOLD_US: &str = "VKGRAPH_PERF_THRESHOLD_US";

/// Subscriber settings shared by the engine, its tests and benchmarks.
#[derive(Clone, Debug)]
pub struct TracingConfig {
    /// Explicit filter directives such as `vkgraph_core=debug,info`.
    /// `None` defers to `RUST_LOG`, then to `default_directive`.
    pub directives: Option<String>,
    /// Directive used when nothing else yields a filter.
    pub default_directive: String,
    /// Print module paths next to each event.
    pub include_targets: bool,
    pub ansi: bool,
    pub span_events: FmtSpan,
    pub output: TracingOutput,
    /// Performance spans are inert unless this is set.
    pub enable_performance_tracing: bool,
    /// Spans shorter than this many microseconds are not logged.
    pub performance_threshold_us: Option<u64>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::for_local()
    }
}

impl TracingConfig {
    fn base(output: TracingOutput) -> Self {
        Self {
            directives: None,
            default_directive: String::from("info"),
            include_targets: true,
            ansi: output != TracingOutput::Json,
            span_events: FmtSpan::NONE,
            output,
            enable_performance_tracing: false,
            performance_threshold_us: None,
        }
    }

    /// Coloured pretty output; performance spans follow `debug_assertions`.
    pub fn for_local() -> Self {
        Self {
            enable_performance_tracing: cfg!(debug_assertions),
            ..Self::base(TracingOutput::Pretty)
        }
    }

    /// Plain JSON lines for CI log collection.
    pub fn for_ci() -> Self {
        Self::base(TracingOutput::Json)
    }

    /// Engine and backend at debug level, span close timings, perf spans on.
    pub fn for_performance() -> Self {
        Self {
            directives: Some(String::from("vkgraph_backends=debug,vkgraph_core=debug,info")),
            span_events: FmtSpan::CLOSE,
            enable_performance_tracing: true,
            ..Self::base(TracingOutput::Json)
        }
    }

    /// Build a configuration from the `VKGRAPH_*` environment variables.
    ///
    /// Unparseable values are ignored and the preset's value is kept.
    pub fn from_env() -> Self {
        let mut config = match env::var(ENV_PROFILE).map(|p| p.trim().to_ascii_lowercase()) {
            Ok(p) if p == "ci" => Self::for_ci(),
            Ok(p) if p == "performance" => Self::for_performance(),
            _ => Self::for_local(),
        };

        if let Ok(directives) = env::var(ENV_DIRECTIVES) {
            if !directives.trim().is_empty() {
                config.directives = Some(directives);
            }
        }

        if let Ok(format) = env::var(ENV_FORMAT) {
            if let Some(parsed) = TracingOutput::from_env_value(&format) {
                config.output = parsed;
                if config.output == TracingOutput::Json {
                    config.ansi = false;
                }
            }
        }

        if let Ok(flag) = env::var(ENV_PERF_TRACING) {
            config.enable_performance_tracing = parse_flag(&flag);
        }

        if let Ok(threshold) = env::var(ENV_PERF_THRESHOLD_US) {
            if let Ok(threshold_us) = threshold.trim().parse::<u64>() {
                config.performance_threshold_us = Some(threshold_us);
            }
        }

        config
    }

    fn resolve_filter(&self) -> Result<EnvFilter, TracingSetupError> {
        match &self.directives {
            Some(directives) => {
                EnvFilter::try_new(directives).map_err(|err| TracingSetupError::InvalidFilter(err.to_string()))
            }
            None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_directive))),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    let value = value.trim();
    value == "1" || value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("yes")
}

/// Failure to set up the shared subscriber.
#[derive(Debug, Error)]
pub enum TracingSetupError {
    /// The directive string could not be parsed.
    #[error("invalid tracing directive: {0}")]
    InvalidFilter(String),
    /// Installing the global subscriber failed, usually because one is already set.
    #[error("failed to install global tracing subscriber: {0}")]
    SubscriberInit(#[source] tracing_subscriber::util::TryInitError),
}

/// Formatter used by the fmt layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TracingOutput {
    Compact,
    Pretty,
    Json,
}

impl TracingOutput {
    fn from_env_value(value: &str) -> Option<Self> {
        [Self::Compact, Self::Pretty, Self::Json]
            .into_iter()
            .find(|output| value.trim().eq_ignore_ascii_case(output.as_str()))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

/// Assemble a subscriber from `config` without installing it.
pub fn build_subscriber(config: &TracingConfig) -> Result<impl Subscriber + Send + Sync, TracingSetupError> {
    let (filter, fmt_layer) = subscriber_layers(config)?;
    Ok(Registry::default().with(fmt_layer).with(filter))
}

/// Filter and fmt layer of `config`, for callers composing their own registry.
pub fn subscriber_layers(
    config: &TracingConfig,
) -> Result<(EnvFilter, Box<dyn Layer<Registry> + Send + Sync>), TracingSetupError> {
    let filter = config.resolve_filter()?;
    let span_events = config.span_events.clone();

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.output {
        TracingOutput::Compact => Box::new(
            tracing_fmt::layer()
                .compact()
                .with_target(config.include_targets)
                .with_ansi(config.ansi)
                .with_span_events(span_events),
        ),
        TracingOutput::Pretty => Box::new(
            tracing_fmt::layer()
                .pretty()
                .with_target(config.include_targets)
                .with_ansi(config.ansi)
                .with_span_events(span_events),
        ),
        TracingOutput::Json => Box::new(
            tracing_fmt::layer()
                .json()
                .with_target(config.include_targets)
                .with_span_events(span_events)
                .with_ansi(false),
        ),
    };

    Ok((filter, layer))
}

/// Install the configured subscriber as the process-wide default.
///
/// Also applies the performance-span settings of `config`.
pub fn init_global_tracing(config: &TracingConfig) -> Result<(), TracingSetupError> {
    performance::configure(config.enable_performance_tracing, config.performance_threshold_us);
    build_subscriber(config)?
        .try_init()
        .map_err(TracingSetupError::SubscriberInit)
}

/// Install a compact subscriber for tests, ignoring an already-installed one.
pub fn init_test_tracing() {
    let config = TracingConfig {
        output: TracingOutput::Compact,
        ansi: false,
        default_directive: "warn".to_string(),
        ..TracingConfig::for_local()
    };
    let _ = init_global_tracing(&config);
}
