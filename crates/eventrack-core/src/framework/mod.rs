//! Framework layer - Processing and routing.
//!
//! This module contains the event pipeline itself:
//! - Processor and sink contracts
//! - Type-erased components for configuration-driven construction
//! - Routing nodes that chain processors and fan out to sinks
//! - Trackers and the name-keyed tracker registry

pub mod component;
pub mod processor;
pub mod registry;
pub mod routing;
pub mod sink;
pub mod tracker;

pub use component::{BoxedProcessor, Component};
pub use processor::{
    FnProcessor, IdentityProcessor, Outcome, Processor, ProcessorResult, add_field, processor_fn,
    rename_to,
};
pub use registry::{DEFAULT_TRACKER_NAME, TrackerRegistry, emit, get_tracker, register_tracker};
pub use routing::{Processed, RoutingNode};
pub use sink::{BoxedSink, FnSink, MemorySink, Sink, sink_fn};
pub use tracker::{ContextGuard, Tracker};
