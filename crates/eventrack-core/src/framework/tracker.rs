//! The caller-facing emit API.
//!
//! A [`Tracker`] wraps one root [`RoutingNode`] and one [`ContextLocator`].
//! [`Tracker::emit`] stamps the event with the current UTC time, attaches the
//! resolved context and hands it to the node. Errors from processors or
//! sinks never reach the caller.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};

use crate::error::{TrackingError, TrackingResult};
use crate::foundation::context::{ContextLocator, ThreadLocalContextLocator};
use crate::foundation::event::Event;
use crate::framework::routing::RoutingNode;
use crate::framework::sink::BoxedSink;

/// Emits events through a routing node, merging in the active context.
#[derive(Clone)]
pub struct Tracker {
    node: Arc<RoutingNode>,
    locator: Arc<dyn ContextLocator>,
}

impl Tracker {
    /// Creates a tracker with a per-thread context locator.
    pub fn new(node: RoutingNode) -> Self {
        Self::with_locator(node, ThreadLocalContextLocator::new())
    }

    /// Creates a tracker with the given context locator.
    pub fn with_locator(node: RoutingNode, locator: impl ContextLocator) -> Self {
        Self::from_shared(Arc::new(node), Arc::new(locator))
    }

    /// Creates a tracker from already shared parts.
    pub fn from_shared(node: Arc<RoutingNode>, locator: Arc<dyn ContextLocator>) -> Self {
        Self { node, locator }
    }

    /// Returns the root routing node.
    pub fn node(&self) -> &Arc<RoutingNode> {
        &self.node
    }

    /// Returns the context locator.
    pub fn locator(&self) -> &Arc<dyn ContextLocator> {
        &self.locator
    }

    /// Emits an event.
    ///
    /// An empty `name` becomes [`UNKNOWN_EVENT_NAME`](crate::UNKNOWN_EVENT_NAME).
    pub fn emit(&self, name: &str, data: Map<String, Value>) {
        let event = Event::new(name)
            .with_timestamp(Utc::now())
            .with_data(data)
            .with_context(self.resolve_context());
        self.node.route(&event);
    }

    /// Emits an event with no data.
    pub fn emit_name(&self, name: &str) {
        self.emit(name, Map::new());
    }

    /// Merges every context entered in the caller's scope.
    pub fn resolve_context(&self) -> Map<String, Value> {
        self.locator.resolve()
    }

    /// Enters a named context layer.
    pub fn enter_context(&self, name: &str, values: Map<String, Value>) {
        self.locator.enter(name, values);
    }

    /// Exits a named context layer.
    pub fn exit_context(&self, name: &str) -> TrackingResult<()> {
        self.locator.exit(name).map(drop)
    }

    /// Enters a named context and returns a guard that exits it on drop.
    #[must_use = "the context is exited as soon as the guard is dropped"]
    pub fn context(&self, name: impl Into<String>, values: Map<String, Value>) -> ContextGuard {
        let name = name.into();
        self.enter_context(&name, values);
        ContextGuard {
            locator: Arc::clone(&self.locator),
            name,
            _not_send: PhantomData,
        }
    }

    /// Runs `f` with a named context entered.
    ///
    /// The context is exited when `f` returns or unwinds.
    pub fn with_context<R>(
        &self,
        name: impl Into<String>,
        values: Map<String, Value>,
        f: impl FnOnce() -> R,
    ) -> R {
        let _guard = self.context(name, values);
        f()
    }

    /// Looks up a backend of the root node.
    pub fn get_backend(&self, name: &str) -> TrackingResult<BoxedSink> {
        self.node
            .backend(name)
            .ok_or_else(|| TrackingError::BackendNotFound(name.to_string()))
    }
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker").field("node", &self.node).finish()
    }
}

/// Exits a context layer when dropped.
///
/// Returned by [`Tracker::context`]. The guard cannot leave the thread that
/// entered the context, since a per-thread locator would otherwise exit the
/// wrong thread's stack:
///
/// ```compile_fail
/// use eventrack_core::{RoutingNode, Tracker};
///
/// let tracker = Tracker::new(RoutingNode::new());
/// let guard = tracker.context("request", Default::default());
/// std::thread::spawn(move || drop(guard));
/// ```
pub struct ContextGuard {
    locator: Arc<dyn ContextLocator>,
    name: String,
    _not_send: PhantomData<*const ()>,
}

impl ContextGuard {
    /// Returns the name of the guarded context.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        // Already exited explicitly through the tracker.
        let _ = self.locator.exit(&self.name);
    }
}

impl fmt::Debug for ContextGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextGuard").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::context::SharedContextLocator;
    use crate::framework::sink::MemorySink;
    use serde_json::json;
    use std::panic::{AssertUnwindSafe, catch_unwind};

    fn values(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn tracker_with_sink() -> (Tracker, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let node = RoutingNode::new().with_backend("memory", Arc::clone(&sink));
        (Tracker::with_locator(node, SharedContextLocator::new()), sink)
    }

    #[test]
    fn test_emit_builds_full_event() {
        let (tracker, sink) = tracker_with_sink();
        tracker.enter_context("request", values(json!({"user": "alice"})));
        tracker.emit("login", values(json!({"ok": true})));

        let events = sink.events();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.name(), "login");
        assert!(event.timestamp().is_some());
        assert_eq!(event.data(), Some(&values(json!({"ok": true}))));
        assert_eq!(event.context(), Some(&values(json!({"user": "alice"}))));
    }

    #[test]
    fn test_emit_defaults() {
        let (tracker, sink) = tracker_with_sink();
        tracker.emit("", Map::new());

        let events = sink.events();
        let event = &events[0];
        assert_eq!(event.name(), crate::UNKNOWN_EVENT_NAME);
        assert_eq!(event.data(), Some(&Map::new()));
        assert_eq!(event.context(), Some(&Map::new()));
    }

    #[test]
    fn test_context_guard_exits_on_drop() {
        let (tracker, _) = tracker_with_sink();
        {
            let guard = tracker.context("scoped", values(json!({"x": 1})));
            assert_eq!(guard.name(), "scoped");
            assert_eq!(tracker.resolve_context().get("x"), Some(&json!(1)));
        }
        assert!(tracker.resolve_context().is_empty());
    }

    #[test]
    fn test_with_context_exits_on_panic() {
        let (tracker, _) = tracker_with_sink();
        let result = catch_unwind(AssertUnwindSafe(|| {
            tracker.with_context("scoped", values(json!({"x": 1})), || panic!("boom"))
        }));

        assert!(result.is_err());
        assert!(tracker.resolve_context().is_empty());
    }

    #[test]
    fn test_exit_unknown_context_fails() {
        let (tracker, _) = tracker_with_sink();
        assert_eq!(
            tracker.exit_context("never"),
            Err(TrackingError::ContextNotEntered("never".into()))
        );
    }

    #[test]
    fn test_get_backend() {
        let (tracker, _) = tracker_with_sink();
        assert!(tracker.get_backend("memory").is_ok());
        assert!(matches!(
            tracker.get_backend("missing"),
            Err(TrackingError::BackendNotFound(name)) if name == "missing"
        ));
    }
}
