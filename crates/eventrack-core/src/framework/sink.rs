//! The sink (backend) contract.
//!
//! A [`Sink`] is a terminal consumer of a processed event. Sinks receive the
//! event by shared reference and must not block indefinitely; any error they
//! return is logged by the routing node and never reaches the emitter.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::BoxError;
use crate::foundation::event::Event;
use crate::framework::routing::RoutingNode;

/// A shared, type-erased sink.
pub type BoxedSink = Arc<dyn Sink>;

/// Anything that can receive a processed event.
pub trait Sink: Send + Sync + 'static {
    /// Persists or forwards one event.
    fn send(&self, event: &Event) -> Result<(), BoxError>;

    /// Returns the routing node behind this sink, if it is one.
    ///
    /// The offload worker uses this to dispatch directly to a node's own
    /// sinks instead of going back through [`send`](Self::send).
    fn as_router(&self) -> Option<&RoutingNode> {
        None
    }
}

impl<S: Sink + ?Sized> Sink for Arc<S> {
    fn send(&self, event: &Event) -> Result<(), BoxError> {
        (**self).send(event)
    }

    fn as_router(&self) -> Option<&RoutingNode> {
        (**self).as_router()
    }
}

/// A sink backed by a closure.
///
/// Created with [`sink_fn`].
pub struct FnSink<F> {
    f: F,
}

/// Wraps a closure as a [`Sink`].
pub fn sink_fn<F>(f: F) -> FnSink<F>
where
    F: Fn(&Event) -> Result<(), BoxError> + Send + Sync + 'static,
{
    FnSink { f }
}

impl<F> Sink for FnSink<F>
where
    F: Fn(&Event) -> Result<(), BoxError> + Send + Sync + 'static,
{
    fn send(&self, event: &Event) -> Result<(), BoxError> {
        (self.f)(event)
    }
}

impl<F> fmt::Debug for FnSink<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnSink")
    }
}

/// A sink that keeps every event it receives in memory.
///
/// Useful as a stand-in backend in tests and demos.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every event received so far, oldest first.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Returns the number of events received.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns `true` if no event has been received.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Forgets every received event.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Sink for MemorySink {
    fn send(&self, event: &Event) -> Result<(), BoxError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}
