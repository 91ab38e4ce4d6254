//! Type-erased pipeline components.
//!
//! Configuration builders produce [`Component`]s without knowing in advance
//! which slot they will be placed in. The kind is checked when the component
//! is handed to a routing node, so a processor configured as a backend (or
//! the other way round) fails before the node exists.

use std::fmt;
use std::sync::Arc;

use crate::error::{TrackingError, TrackingResult};
use crate::framework::processor::Processor;
use crate::framework::sink::{BoxedSink, Sink};

/// A shared, type-erased processor.
pub type BoxedProcessor = Arc<dyn Processor>;

/// A processor or a sink.
#[derive(Clone)]
pub enum Component {
    /// A chainable processing step.
    Processor(BoxedProcessor),
    /// A terminal consumer, possibly a nested routing node.
    Sink(BoxedSink),
}

impl Component {
    /// Wraps a processor.
    pub fn processor(processor: impl Processor) -> Self {
        Self::Processor(Arc::new(processor))
    }

    /// Wraps a sink.
    pub fn sink(sink: impl Sink) -> Self {
        Self::Sink(Arc::new(sink))
    }

    /// Returns the component kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Processor(_) => "processor",
            Self::Sink(_) => "sink",
        }
    }

    /// Unwraps a sink registered under `name`.
    pub fn into_sink(self, name: &str) -> TrackingResult<BoxedSink> {
        match self {
            Self::Sink(sink) => Ok(sink),
            Self::Processor(processor) => Err(TrackingError::InvalidArgument(format!(
                "backend '{name}' ({}) does not have a callable send method",
                processor.name()
            ))),
        }
    }

    /// Unwraps a processor.
    pub fn into_processor(self) -> TrackingResult<BoxedProcessor> {
        match self {
            Self::Processor(processor) => Ok(processor),
            Self::Sink(_) => Err(TrackingError::InvalidArgument(
                "a sink is not a callable processor".to_string(),
            )),
        }
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Processor(processor) => f
                .debug_tuple("Component::Processor")
                .field(&processor.name())
                .finish(),
            Self::Sink(sink) if sink.as_router().is_some() => f.write_str("Component::Sink(router)"),
            Self::Sink(_) => f.write_str("Component::Sink"),
        }
    }
}
