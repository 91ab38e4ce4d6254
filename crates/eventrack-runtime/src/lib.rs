//! Eventrack Runtime - configuration, logging and offload for Eventrack.
//!
//! This crate provides:
//! - Layered configuration loading and validation (`ConfigLoader`)
//! - Declarative construction of routing trees (`ComponentRegistry`)
//! - The built-in logger sink (`LoggerBackend`)
//! - A tokio-backed offload queue (`TokioTaskQueue`)
//! - Request-scoped context helpers (`RequestContext`, `RequestTracking`)
//! - Runtime orchestration (`TrackingRuntime`)
//! - Logging configuration (`LoggingBuilder`)
//!
//! # Configuration
//!
//! ```toml
//! [logging]
//! level = "info"
//!
//! [tracking]
//! enabled = true
//!
//! [tracking.backends.log]
//! engine = "logger"
//! options = { name = "app.events", max_event_size = 4096 }
//!
//! [[tracking.processors]]
//! engine = "regex_filter"
//! options = { filter_type = "blocklist", regular_expressions = ["^debug\\."] }
//! ```
//!
//! ```ignore
//! use eventrack_runtime::{TrackingRuntime, load_config, logging};
//!
//! #[tokio::main]
//! async fn main() -> eventrack_runtime::RuntimeResult<()> {
//!     let config = load_config()?;
//!     logging::init_from_config(&config.logging);
//!
//!     let runtime = TrackingRuntime::start(config)?;
//!     runtime.install_global();
//!     eventrack_core::emit("service.started", Default::default())?;
//!
//!     runtime.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod backends;
pub mod config;
pub mod error;
pub mod logging;
pub mod request;
pub mod runtime;
pub mod worker;

// Re-exports
pub use backends::LoggerBackend;
pub use config::{
    BuildContext, ComponentRegistry, ConfigError, ConfigLoader, ConfigResult, EventrackConfig,
    Profile, load_config, load_config_from_file, validate_config,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use request::{RequestContext, RequestTracking, scrub_sensitive};
pub use runtime::TrackingRuntime;
pub use worker::TokioTaskQueue;

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// Provides the logging macros and `Level`.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
