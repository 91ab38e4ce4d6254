//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use eventrack_core::{
    ContextLocator, DEFAULT_TRACKER_NAME, RetryPolicy, SharedContextLocator,
    TaskLocalContextLocator, ThreadLocalContextLocator,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EventrackConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// The tracker and its component tree.
    #[serde(default)]
    pub tracking: TrackingConfig,

    /// Retry settings for offloaded events.
    #[serde(default)]
    pub offload: OffloadConfig,
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Returns the lowercase name used in configuration and filter directives.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to the equivalent `tracing` level.
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature; falls back to compact otherwise.
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Log file rotation period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Daily,
    Hourly,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base log level. `RUST_LOG` takes priority when set.
    #[serde(default)]
    pub level: LogLevel,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Output destination.
    #[serde(default)]
    pub output: LogOutput,

    /// Span lifecycle events to log.
    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include file names and line numbers.
    #[serde(default)]
    pub file_location: bool,

    /// Log file path, required when `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// How often the log file is rotated.
    #[serde(default)]
    pub rotation: LogRotation,

    /// Per-module level overrides, e.g. `eventrack_core = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            file_location: false,
            file_path: None,
            rotation: LogRotation::default(),
            filters: HashMap::new(),
        }
    }
}

// =============================================================================
// Tracking
// =============================================================================

/// How the tracker scopes its context stack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextLocatorKind {
    /// One stack shared by every caller.
    Shared,
    /// One stack per OS thread.
    #[default]
    Thread,
    /// One stack per tokio task scope, per thread outside of one.
    Task,
}

impl ContextLocatorKind {
    /// Creates a locator of this kind.
    pub fn build(&self) -> Arc<dyn ContextLocator> {
        match self {
            Self::Shared => Arc::new(SharedContextLocator::new()),
            Self::Thread => Arc::new(ThreadLocalContextLocator::new()),
            Self::Task => Arc::new(TaskLocalContextLocator::new()),
        }
    }
}

/// Tracker configuration.
///
/// `backends` and `processors` are component trees; see
/// [`builder`](crate::config::builder) for their format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Whether the runtime registers its tracker.
    #[serde(default)]
    pub enabled: bool,

    /// Name the tracker is registered under.
    #[serde(default = "default_tracker_name")]
    pub tracker_name: String,

    /// Context scoping strategy.
    #[serde(default)]
    pub context_locator: ContextLocatorKind,

    /// Named backend trees of the root node.
    #[serde(default)]
    pub backends: Map<String, Value>,

    /// Processor trees of the root node, in order.
    #[serde(default)]
    pub processors: Vec<Value>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tracker_name: default_tracker_name(),
            context_locator: ContextLocatorKind::default(),
            backends: Map::new(),
            processors: Vec::new(),
        }
    }
}

fn default_tracker_name() -> String {
    DEFAULT_TRACKER_NAME.to_string()
}

// =============================================================================
// Offload
// =============================================================================

/// Retry settings for offloaded events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffloadConfig {
    /// Retries after the first failed attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Seconds to wait before each retry.
    #[serde(default = "default_countdown_secs")]
    pub countdown_secs: u64,
}

impl OffloadConfig {
    /// Converts to the core retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            countdown: Duration::from_secs(self.countdown_secs),
        }
    }
}

impl Default for OffloadConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            countdown_secs: default_countdown_secs(),
        }
    }
}

fn default_max_retries() -> u32 {
    eventrack_core::offload::DEFAULT_MAX_RETRIES
}

fn default_countdown_secs() -> u64 {
    eventrack_core::offload::DEFAULT_COUNTDOWN.as_secs()
}
