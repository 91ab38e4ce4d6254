//! Routing nodes: processor chains fanned out to independent sinks.
//!
//! A [`RoutingNode`] owns two things:
//!
//! 1. **Processors**, run in registration order over a single in-flight copy
//!    of the event. Each one may edit the event in place, replace it, or
//!    abort. An abort stops the chain and nothing is dispatched. Any other
//!    failure, including a panic, is logged and the chain continues with
//!    the event as the failing processor left it.
//! 2. **Backends**, named sinks that each receive the processed event in
//!    registration order. A failing or panicking sink is logged and does not
//!    prevent the remaining sinks from receiving the event.
//!
//! A routing node is itself a [`Sink`] whose `send` is [`route`], so nodes
//! nest into trees. An abort inside a nested node only affects that subtree.
//!
//! ```text
//!                 ┌──────────────┐      ┌──────────────┐
//!  route(event) ─▶│ processor[0] │─ … ─▶│ processor[n] │─┬─▶ backend "a"
//!                 └──────────────┘      └──────────────┘ ├─▶ backend "b" (RoutingNode)
//!                                                        └─▶ backend "c"
//! ```
//!
//! [`route`]: RoutingNode::route

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{Level, debug, error, span};

use crate::error::{BoxError, TrackingResult};
use crate::foundation::event::Event;
use crate::framework::component::{BoxedProcessor, Component};
use crate::framework::processor::{Outcome, Processor};
use crate::framework::sink::{BoxedSink, Sink};

/// The result of running a processor chain.
#[derive(Debug, Clone, PartialEq)]
pub enum Processed {
    /// The chain completed; dispatch this event.
    Continue(Event),
    /// A processor aborted; the event must not be dispatched.
    Dropped,
}

impl Processed {
    /// Returns the processed event, or `None` if it was dropped.
    pub fn into_event(self) -> Option<Event> {
        match self {
            Self::Continue(event) => Some(event),
            Self::Dropped => None,
        }
    }
}

/// Turns a caught panic payload into an error.
fn panic_error(payload: Box<dyn Any + Send>) -> BoxError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    format!("panicked: {message}").into()
}

/// Chains processors, then fans events out to named sinks.
///
/// Registration may happen at any time, including while other threads are
/// routing events through the node. Each `route` call works on a snapshot of
/// the processors and backends taken when that stage starts.
#[derive(Default)]
pub struct RoutingNode {
    processors: RwLock<Vec<BoxedProcessor>>,
    backends: RwLock<Vec<(String, BoxedSink)>>,
}

impl RoutingNode {
    /// Creates a node with no processors and no backends.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a node from an unordered set of backends and a processor list.
    ///
    /// Backends are registered in ascending order of their names.
    pub fn from_parts(
        backends: impl IntoIterator<Item = (String, BoxedSink)>,
        processors: impl IntoIterator<Item = BoxedProcessor>,
    ) -> Self {
        let mut backends: Vec<_> = backends.into_iter().collect();
        backends.sort_by(|(a, _), (b, _)| a.cmp(b));

        let node = Self::new();
        for (name, backend) in backends {
            node.register_backend(name, backend);
        }
        for processor in processors {
            node.register_processor(processor);
        }
        node
    }

    /// Creates a node from type-erased components.
    ///
    /// Every component is checked before the node is created: a processor in
    /// the backend slot, or a sink in the processor list, fails with
    /// [`TrackingError::InvalidArgument`](crate::TrackingError::InvalidArgument).
    pub fn from_components(
        backends: impl IntoIterator<Item = (String, Component)>,
        processors: impl IntoIterator<Item = Component>,
    ) -> TrackingResult<Self> {
        let backends = backends
            .into_iter()
            .map(|(name, component)| {
                let sink = component.into_sink(&name)?;
                Ok((name, sink))
            })
            .collect::<TrackingResult<Vec<_>>>()?;
        let processors = processors
            .into_iter()
            .map(Component::into_processor)
            .collect::<TrackingResult<Vec<_>>>()?;

        Ok(Self::from_parts(backends, processors))
    }

    /// Registers a backend (builder pattern).
    pub fn with_backend(self, name: impl Into<String>, backend: impl Sink) -> Self {
        self.register_backend(name, Arc::new(backend));
        self
    }

    /// Registers a processor (builder pattern).
    pub fn with_processor(self, processor: impl Processor) -> Self {
        self.register_processor(Arc::new(processor));
        self
    }

    /// Registers a backend that will receive every processed event.
    ///
    /// Backends are called in registration order. Registering a name that is
    /// already taken replaces that backend in its original position.
    pub fn register_backend(&self, name: impl Into<String>, backend: BoxedSink) {
        let name = name.into();
        let mut backends = self.backends.write();
        match backends.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = backend,
            None => backends.push((name, backend)),
        }
    }

    /// Appends a processor to the chain.
    pub fn register_processor(&self, processor: BoxedProcessor) {
        self.processors.write().push(processor);
    }

    /// Looks up a backend by name.
    pub fn backend(&self, name: &str) -> Option<BoxedSink> {
        self.backends
            .read()
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, backend)| Arc::clone(backend))
    }

    /// Returns the backend names in dispatch order.
    pub fn backend_names(&self) -> Vec<String> {
        self.backends
            .read()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Returns the number of registered backends.
    pub fn backend_count(&self) -> usize {
        self.backends.read().len()
    }

    /// Returns the number of registered processors.
    pub fn processor_count(&self) -> usize {
        self.processors.read().len()
    }

    /// Runs the processor chain over `event`.
    ///
    /// The event is not copied here; callers that need to keep the original
    /// should pass a clone. A processor that fails or panics is skipped, but
    /// edits it made to the event before failing are kept.
    pub fn process(&self, event: Event) -> Processed {
        let processors = self.processors.read().clone();
        let mut current = event;

        for processor in &processors {
            let result = catch_unwind(AssertUnwindSafe(|| processor.process(&mut current)))
                .unwrap_or_else(|payload| Err(panic_error(payload)));
            match result {
                Ok(Outcome::Keep) => {}
                Ok(Outcome::Replace(replacement)) => current = replacement,
                Ok(Outcome::Abort) => {
                    debug!(
                        processor = processor.name(),
                        event = current.name(),
                        "Processor aborted event"
                    );
                    return Processed::Dropped;
                }
                Err(err) => {
                    error!(
                        processor = processor.name(),
                        event = current.name(),
                        error = %err,
                        "Failed to execute processor"
                    );
                }
            }
        }

        Processed::Continue(current)
    }

    /// Sends `event` to every backend in registration order.
    ///
    /// Backend failures and panics are logged and never stop the remaining
    /// backends.
    pub fn dispatch(&self, event: &Event) {
        let backends = self.backends.read().clone();

        for (name, backend) in &backends {
            let result = catch_unwind(AssertUnwindSafe(|| backend.send(event)))
                .unwrap_or_else(|payload| Err(panic_error(payload)));
            if let Err(err) = result {
                error!(
                    backend = %name,
                    event = event.name(),
                    error = %err,
                    "Unable to send event to backend"
                );
            }
        }
    }

    /// Processes a copy of `event` and dispatches the result.
    ///
    /// The caller's event is never modified. A dropped event reaches no
    /// backend.
    pub fn route(&self, event: &Event) {
        let span = span!(Level::TRACE, "route", event = event.name());
        let _enter = span.enter();

        match self.process(event.clone()) {
            Processed::Continue(processed) => self.dispatch(&processed),
            Processed::Dropped => debug!("Event dropped before dispatch"),
        }
    }
}

impl Sink for RoutingNode {
    fn send(&self, event: &Event) -> Result<(), BoxError> {
        self.route(event);
        Ok(())
    }

    fn as_router(&self) -> Option<&RoutingNode> {
        Some(self)
    }
}

impl fmt::Debug for RoutingNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let processors: Vec<String> = self
            .processors
            .read()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        f.debug_struct("RoutingNode")
            .field("processors", &processors)
            .field("backends", &self.backend_names())
            .finish()
    }
}
