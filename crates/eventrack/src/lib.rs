//! # Eventrack
//!
//! Event tracking with context enrichment and configurable routing trees.
//!
//! ## Overview
//!
//! Application code emits named events with a data payload. A [`Tracker`]
//! stamps each event with a timestamp and the context entered in the
//! caller's scope, then hands it to a tree of routing nodes. Each node runs
//! its processor chain and fans the result out to its backends.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐     ┌──────────────────────────────┐     ┌─────────────┐
//! │ Tracker │────▶│ RoutingNode                  │────▶│ logger      │
//! │ context │     │  processors: filter, rename  │────▶│ RoutingNode │──▶ ...
//! └─────────┘     └──────────────────────────────┘────▶│ async node  │──▶ TaskQueue ──▶ worker
//!                                                      └─────────────┘
//! ```
//!
//! - **Tracker**: Emits events and owns the context stack
//! - **RoutingNode**: Processor chain plus named backends
//! - **Processors**: Transform, replace or drop events
//! - **Sinks**: Deliver events; failures are logged and isolated
//! - **Runtime**: Builds the tree from configuration and runs the offload worker
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use eventrack::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> eventrack::runtime::RuntimeResult<()> {
//!     let config = load_config()?;
//!     init_from_config(&config.logging);
//!
//!     let runtime = TrackingRuntime::start(config)?;
//!     if let Some(tracker) = runtime.tracker() {
//!         let _request = RequestContext::new().with_path("/").enter(tracker);
//!         tracker.emit_name("page.view");
//!     }
//!
//!     runtime.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: Load `eventrack.toml` files (default)
//! - `yaml-config`: Load `eventrack.yaml` files
//! - `json-log`: Enable the JSON log format

pub use eventrack_core as core;
pub use eventrack_runtime as runtime;

pub use eventrack_core::{
    AsyncRoutingNode, BoxError, Component, ContextGuard, ContextLocator, Event, FilterType,
    NameAllowlistProcessor, Outcome, Processed, Processor, ProcessorResult, RegexFilter,
    RoutingNode, Sink, TaskQueue, Tracker, TrackerRegistry, TrackingError, TrackingResult, emit,
    get_tracker, register_tracker,
};
pub use eventrack_runtime::{
    ComponentRegistry, ConfigError, ConfigLoader, EventrackConfig, LoggingBuilder, RequestContext,
    RequestTracking, RuntimeError, TrackingRuntime,
};

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use eventrack::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use eventrack_runtime::logging::init_from_config;
    pub use eventrack_runtime::{TrackingRuntime, load_config};

    // Event model and tracking
    pub use eventrack_core::{ContextGuard, Event, Tracker, TrackerRegistry, emit, get_tracker};

    // Building routing trees by hand
    pub use eventrack_core::{
        Outcome, Processor, ProcessorResult, RoutingNode, Sink, processor_fn, sink_fn,
    };

    // Request helpers
    pub use eventrack_runtime::{RequestContext, RequestTracking};
}
