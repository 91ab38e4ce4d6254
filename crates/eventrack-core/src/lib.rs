//! # Eventrack Core
//!
//! The routing and processing engine of the Eventrack event tracking
//! pipeline.
//!
//! Application code emits named, structured events through a [`Tracker`].
//! Each event runs through a chain of [`Processor`]s and is then handed to
//! every registered [`Sink`]. Failures inside one processor or one sink are
//! logged and isolated; the caller of [`Tracker::emit`] never observes them.
//!
//! ## Architecture Layers
//!
//! ### Foundation Layer
//!
//! - **Events**: the JSON-like record with a name, a UTC timestamp, `data`
//!   and `context` ([`Event`])
//! - **Codec**: JSON encoding with ISO-8601 timestamps ([`encode_event`])
//! - **Context**: named layers merged into every event ([`ContextLocator`])
//!
//! ### Framework Layer
//!
//! - **Processors**: chainable transformations and filters ([`Processor`], [`Outcome`])
//! - **Sinks**: terminal consumers ([`Sink`])
//! - **Routing**: processor chains with fan-out, nestable ([`RoutingNode`])
//! - **Tracking**: the emit API and name lookup ([`Tracker`], [`TrackerRegistry`])
//!
//! ### Offload
//!
//! Queue-backed dispatch for top-level nodes ([`AsyncRoutingNode`], [`send_event`]).
//!
//! ## Data Flow
//!
//! ```text
//! ┌─────────┐ emit ┌─────────┐ route ┌─────────────┐     ┌────────┐
//! │  Caller │─────▶│ Tracker │──────▶│ RoutingNode │────▶│  Sink  │
//! └─────────┘      └─────────┘       │ processors  │────▶│  Sink  │
//!                   + timestamp      └─────────────┘────▶│  Node  │─▶ …
//!                   + context                            └────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use eventrack_core::{MemorySink, NameAllowlistProcessor, RoutingNode, Tracker};
//! use serde_json::Map;
//! use std::sync::Arc;
//!
//! let sink = Arc::new(MemorySink::new());
//! let node = RoutingNode::new()
//!     .with_processor(NameAllowlistProcessor::new(["login"]))
//!     .with_backend("memory", Arc::clone(&sink));
//!
//! let tracker = Tracker::new(node);
//! tracker.emit("login", Map::new());
//! tracker.emit("logout", Map::new());
//!
//! assert_eq!(sink.len(), 1);
//! ```

pub mod error;
pub mod foundation;
pub mod framework;
pub mod offload;
pub mod processors;

pub use error::{BoxError, TrackingError, TrackingResult};

// Re-export foundation types
pub use foundation::{
    ContextLocator, ContextStack, Event, SharedContextLocator, TaskLocalContextLocator,
    ThreadLocalContextLocator, UNKNOWN_EVENT_NAME, decode_event, encode_event,
};

// Re-export framework types
pub use framework::{
    BoxedProcessor, BoxedSink, Component, ContextGuard, DEFAULT_TRACKER_NAME, FnProcessor, FnSink,
    IdentityProcessor, MemorySink, Outcome, Processed, Processor, ProcessorResult, RoutingNode,
    Sink, Tracker, TrackerRegistry, add_field, emit, get_tracker, processor_fn, register_tracker,
    rename_to, sink_fn,
};

// Re-export offload types
pub use offload::{
    AsyncRoutingNode, MemoryTaskQueue, OffloadError, OffloadTask, RetryPolicy, TaskQueue,
    send_event,
};

// Re-export built-in processors
pub use processors::{FilterType, NameAllowlistProcessor, RegexFilter};

/// Prelude for common imports.
pub mod prelude {
    pub use super::error::{BoxError, TrackingError, TrackingResult};
    pub use super::foundation::{ContextLocator, Event};
    pub use super::framework::{
        Outcome, Processor, ProcessorResult, RoutingNode, Sink, Tracker, TrackerRegistry,
        processor_fn, sink_fn,
    };
}
