//! Out-of-process dispatch for top-level routing nodes.
//!
//! An [`AsyncRoutingNode`] is a sink that does not route synchronously.
//! Its `send` encodes the event to JSON and hands an [`OffloadTask`] to a
//! [`TaskQueue`]. A worker later calls [`send_event`], which finds the node
//! again by tracker and backend name, runs the node's processor chain and
//! dispatches to the node's own sinks exactly once. The worker never goes
//! back through `send`, so a task is never re-enqueued by its own execution.
//!
//! Because the worker only knows names, an `AsyncRoutingNode` must be
//! registered as a backend of a tracker's root node.
//!
//! # Delivery
//!
//! Queues are expected to provide at-least-once delivery: a task whose
//! [`send_event`] call fails with a [retryable](OffloadError::is_retryable)
//! error is run again after [`RetryPolicy::countdown`], up to
//! [`RetryPolicy::max_retries`] times.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::error::{BoxError, TrackingError};
use crate::foundation::codec::{decode_event, encode_event};
use crate::foundation::event::Event;
use crate::framework::registry::{DEFAULT_TRACKER_NAME, TrackerRegistry};
use crate::framework::routing::{Processed, RoutingNode};
use crate::framework::sink::Sink;

/// Retries attempted before a task is given up.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Delay before a failed task is retried.
pub const DEFAULT_COUNTDOWN: Duration = Duration::from_secs(30);

// =============================================================================
// Errors
// =============================================================================

/// Errors raised while offloading or executing an offloaded event.
#[derive(Debug, Error)]
pub enum OffloadError {
    /// The event could not be encoded.
    #[error("failed to encode event: {0}")]
    Encode(#[source] serde_json::Error),

    /// The payload could not be decoded.
    #[error("failed to decode event payload: {0}")]
    Decode(#[source] serde_json::Error),

    /// The queue refused the task.
    #[error("failed to enqueue task: {0}")]
    Enqueue(String),

    /// The tracker or backend is not registered.
    #[error(transparent)]
    Lookup(#[from] TrackingError),

    /// The named backend is not a routing node.
    #[error("backend '{0}' is not a routing node")]
    NotRoutable(String),
}

impl OffloadError {
    /// Returns `true` if running the task again may succeed.
    ///
    /// Lookups are retried because the worker may start before the
    /// application has registered its trackers.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Enqueue(_) | Self::Lookup(_))
    }
}

// =============================================================================
// Tasks & Queues
// =============================================================================

/// One serialized event waiting to be dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffloadTask {
    /// Tracker whose root node holds the backend.
    pub tracker_name: String,
    /// Name of the backend on the tracker's root node.
    pub backend_name: String,
    /// The event encoded as JSON.
    pub payload: String,
    /// Zero for the first run, incremented on every retry.
    pub attempt: u32,
}

impl OffloadTask {
    /// Creates a first-attempt task.
    pub fn new(
        tracker_name: impl Into<String>,
        backend_name: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            tracker_name: tracker_name.into(),
            backend_name: backend_name.into(),
            payload: payload.into(),
            attempt: 0,
        }
    }

    /// Returns a copy of this task for the next attempt.
    pub fn retry(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }
}

/// A queue that executes offload tasks outside of the caller.
pub trait TaskQueue: Send + Sync + 'static {
    /// Schedules a task. Must not block on its execution.
    fn enqueue(&self, task: OffloadTask) -> Result<(), OffloadError>;
}

/// A queue that only stores tasks, for tests and manual draining.
#[derive(Debug, Default)]
pub struct MemoryTaskQueue {
    tasks: Mutex<Vec<OffloadTask>>,
}

impl MemoryTaskQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns every queued task, oldest first.
    pub fn drain(&self) -> Vec<OffloadTask> {
        std::mem::take(&mut *self.tasks.lock())
    }

    /// Returns the number of queued tasks.
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Returns `true` if no task is queued.
    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }
}

impl TaskQueue for MemoryTaskQueue {
    fn enqueue(&self, task: OffloadTask) -> Result<(), OffloadError> {
        self.tasks.lock().push(task);
        Ok(())
    }
}

/// Bounded, fixed-delay retry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before each retry.
    pub countdown: Duration,
}

impl RetryPolicy {
    /// Returns `true` if a task that failed on `attempt` should run again.
    pub fn should_retry(&self, attempt: u32, error: &OffloadError) -> bool {
        error.is_retryable() && attempt < self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            countdown: DEFAULT_COUNTDOWN,
        }
    }
}

// =============================================================================
// Async Routing Node
// =============================================================================

/// A routing node whose `send` enqueues instead of routing.
pub struct AsyncRoutingNode {
    node: RoutingNode,
    tracker_name: String,
    backend_name: String,
    queue: Arc<dyn TaskQueue>,
}

impl AsyncRoutingNode {
    /// Wraps `node`, which must be registered as `backend_name` on the
    /// default tracker.
    pub fn new(node: RoutingNode, backend_name: impl Into<String>, queue: Arc<dyn TaskQueue>) -> Self {
        Self {
            node,
            tracker_name: DEFAULT_TRACKER_NAME.to_string(),
            backend_name: backend_name.into(),
            queue,
        }
    }

    /// Sets the tracker the worker looks the node up on.
    pub fn with_tracker_name(mut self, tracker_name: impl Into<String>) -> Self {
        self.tracker_name = tracker_name.into();
        self
    }

    /// Returns the wrapped node.
    pub fn node(&self) -> &RoutingNode {
        &self.node
    }

    /// Returns the backend name the worker looks up.
    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    /// Returns the tracker name the worker looks up.
    pub fn tracker_name(&self) -> &str {
        &self.tracker_name
    }
}

impl Sink for AsyncRoutingNode {
    fn send(&self, event: &Event) -> Result<(), BoxError> {
        let payload = match encode_event(event).map_err(OffloadError::Encode) {
            Ok(payload) => payload,
            Err(err) => {
                error!(event = event.name(), error = %err, "Could not encode event");
                return Ok(());
            }
        };

        let task = OffloadTask::new(&self.tracker_name, &self.backend_name, payload);
        self.queue.enqueue(task)?;
        info!(
            event = event.name(),
            backend = %self.backend_name,
            "Scheduled task for event processing and routing"
        );
        Ok(())
    }

    fn as_router(&self) -> Option<&RoutingNode> {
        Some(&self.node)
    }
}

impl fmt::Debug for AsyncRoutingNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncRoutingNode")
            .field("tracker_name", &self.tracker_name)
            .field("backend_name", &self.backend_name)
            .field("node", &self.node)
            .finish()
    }
}

// =============================================================================
// Worker Callback
// =============================================================================

/// Executes one offloaded task.
///
/// Decodes the payload, finds the backend on the named tracker, runs the
/// backend's processor chain and dispatches the result to its sinks once.
/// A dropped event counts as success.
pub fn send_event(registry: &TrackerRegistry, task: &OffloadTask) -> Result<(), OffloadError> {
    let event = decode_event(&task.payload).map_err(OffloadError::Decode)?;
    let tracker = registry.get(&task.tracker_name)?;
    let backend = tracker.get_backend(&task.backend_name)?;
    let node = backend
        .as_router()
        .ok_or_else(|| OffloadError::NotRoutable(task.backend_name.clone()))?;

    match node.process(event) {
        Processed::Continue(processed) => node.dispatch(&processed),
        Processed::Dropped => debug!(
            backend = %task.backend_name,
            "Offloaded event dropped by processor"
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::processor::{Outcome, processor_fn, rename_to};
    use crate::framework::sink::MemorySink;
    use crate::framework::tracker::Tracker;
    use chrono::{TimeZone, Utc};

    struct Setup {
        registry: TrackerRegistry,
        queue: Arc<MemoryTaskQueue>,
        sink: Arc<MemorySink>,
    }

    fn setup(inner: RoutingNode) -> Setup {
        let queue = Arc::new(MemoryTaskQueue::new());
        let sink = Arc::new(MemorySink::new());
        let inner = inner.with_backend("memory", Arc::clone(&sink));
        let offload = AsyncRoutingNode::new(inner, "async", queue.clone() as Arc<dyn TaskQueue>);

        let registry = TrackerRegistry::new();
        registry.register_default(Tracker::new(RoutingNode::new().with_backend("async", offload)));
        Setup {
            registry,
            queue,
            sink,
        }
    }

    #[test]
    fn test_send_enqueues_without_dispatching() {
        let setup = setup(RoutingNode::new());
        let tracker = setup.registry.get_default().unwrap();
        tracker.emit_name("x");

        assert!(setup.sink.is_empty());
        let tasks = setup.queue.drain();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].backend_name, "async");
        assert_eq!(tasks[0].tracker_name, DEFAULT_TRACKER_NAME);
        assert_eq!(tasks[0].attempt, 0);
    }

    #[test]
    fn test_worker_processes_and_dispatches_once() {
        let setup = setup(RoutingNode::new().with_processor(rename_to("y")));
        let event = Event::new("x").with_timestamp(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
        setup
            .registry
            .get_default()
            .unwrap()
            .node()
            .route(&event);

        for task in setup.queue.drain() {
            send_event(&setup.registry, &task).unwrap();
        }

        assert!(setup.queue.is_empty());
        let mut expected = event.clone();
        expected.set_name("y");
        assert_eq!(setup.sink.events(), [expected]);
    }

    #[test]
    fn test_worker_respects_abort() {
        let setup = setup(RoutingNode::new().with_processor(processor_fn("abort", |_| Ok(Outcome::Abort))));
        setup.registry.get_default().unwrap().emit_name("x");

        let task = setup.queue.drain().remove(0);
        send_event(&setup.registry, &task).unwrap();
        assert!(setup.sink.is_empty());
    }

    #[test]
    fn test_worker_errors() {
        let setup = setup(RoutingNode::new());
        setup.registry.register(
            "plain",
            Tracker::new(RoutingNode::new().with_backend("memory", MemorySink::new())),
        );

        let err = send_event(&setup.registry, &OffloadTask::new("default", "async", "{")).unwrap_err();
        assert!(matches!(err, OffloadError::Decode(_)));
        assert!(!err.is_retryable());

        let payload = r#"{"name": "x"}"#;
        let err = send_event(&setup.registry, &OffloadTask::new("missing", "async", payload)).unwrap_err();
        assert!(matches!(err, OffloadError::Lookup(TrackingError::TrackerNotFound(_))));
        assert!(err.is_retryable());

        let err = send_event(&setup.registry, &OffloadTask::new("default", "nope", payload)).unwrap_err();
        assert!(matches!(err, OffloadError::Lookup(TrackingError::BackendNotFound(_))));

        let err = send_event(&setup.registry, &OffloadTask::new("plain", "memory", payload)).unwrap_err();
        assert!(matches!(err, OffloadError::NotRoutable(name) if name == "memory"));
    }

    #[test]
    fn test_retry_policy() {
        let policy = RetryPolicy::default();
        let transient = OffloadError::Enqueue("full".into());
        let permanent = OffloadError::NotRoutable("x".into());

        assert!(policy.should_retry(0, &transient));
        assert!(policy.should_retry(2, &transient));
        assert!(!policy.should_retry(3, &transient));
        assert!(!policy.should_retry(0, &permanent));

        let task = OffloadTask::new("t", "b", "{}");
        assert_eq!(task.retry().retry().attempt, 2);
    }
}
