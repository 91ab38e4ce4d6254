//! Name-keyed lookup of trackers.
//!
//! A [`TrackerRegistry`] is usually created once at startup and passed to
//! whatever needs to reach a tracker by name, most importantly the offload
//! worker. Code that cannot be handed a reference (request middleware in a
//! foreign framework, for example) can use the process-wide instance behind
//! [`TrackerRegistry::global`] and the free functions in this module.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{TrackingError, TrackingResult};
use crate::framework::tracker::Tracker;

/// Conventional name of the default tracker.
pub const DEFAULT_TRACKER_NAME: &str = "default";

/// A thread-safe table of named trackers.
///
/// Entries are only ever added or replaced, never removed.
#[derive(Debug, Default)]
pub struct TrackerRegistry {
    trackers: RwLock<HashMap<String, Arc<Tracker>>>,
}

impl TrackerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide registry.
    pub fn global() -> &'static TrackerRegistry {
        static GLOBAL: OnceLock<TrackerRegistry> = OnceLock::new();
        GLOBAL.get_or_init(TrackerRegistry::new)
    }

    /// Registers `tracker` under `name`, replacing any previous entry.
    pub fn register(&self, name: impl Into<String>, tracker: Tracker) -> Arc<Tracker> {
        let name = name.into();
        let tracker = Arc::new(tracker);
        debug!(tracker = %name, "Registering tracker");
        self.trackers.write().insert(name, Arc::clone(&tracker));
        tracker
    }

    /// Registers `tracker` under [`DEFAULT_TRACKER_NAME`].
    pub fn register_default(&self, tracker: Tracker) -> Arc<Tracker> {
        self.register(DEFAULT_TRACKER_NAME, tracker)
    }

    /// Looks up a tracker by name.
    pub fn get(&self, name: &str) -> TrackingResult<Arc<Tracker>> {
        self.trackers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| TrackingError::TrackerNotFound(name.to_string()))
    }

    /// Looks up the tracker registered under [`DEFAULT_TRACKER_NAME`].
    pub fn get_default(&self) -> TrackingResult<Arc<Tracker>> {
        self.get(DEFAULT_TRACKER_NAME)
    }

    /// Returns `true` if a tracker is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.trackers.read().contains_key(name)
    }

    /// Emits an event through the default tracker.
    ///
    /// Fails with [`TrackingError::TrackerNotFound`] if no default tracker
    /// has been registered.
    pub fn emit(&self, name: &str, data: Map<String, Value>) -> TrackingResult<()> {
        self.get_default()?.emit(name, data);
        Ok(())
    }

    /// Returns the registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.trackers.read().keys().cloned().collect();
        names.sort();
        names
    }
}

// =============================================================================
// Process-wide Shortcuts
// =============================================================================

/// Registers a tracker in the global registry.
pub fn register_tracker(name: impl Into<String>, tracker: Tracker) -> Arc<Tracker> {
    TrackerRegistry::global().register(name, tracker)
}

/// Looks up a tracker in the global registry.
pub fn get_tracker(name: &str) -> TrackingResult<Arc<Tracker>> {
    TrackerRegistry::global().get(name)
}

/// Emits an event through the global default tracker.
pub fn emit(name: &str, data: Map<String, Value>) -> TrackingResult<()> {
    TrackerRegistry::global().emit(name, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::routing::RoutingNode;
    use crate::framework::sink::MemorySink;

    #[test]
    fn test_register_and_get() {
        let registry = TrackerRegistry::new();
        registry.register_default(Tracker::new(RoutingNode::new()));

        assert!(registry.get_default().is_ok());
        assert!(registry.contains(DEFAULT_TRACKER_NAME));
        assert_eq!(
            registry.get("other").unwrap_err(),
            TrackingError::TrackerNotFound("other".into())
        );
    }

    #[test]
    fn test_register_overwrites() {
        let registry = TrackerRegistry::new();
        let sink = Arc::new(MemorySink::new());
        registry.register("t", Tracker::new(RoutingNode::new()));
        registry.register(
            "t",
            Tracker::new(RoutingNode::new().with_backend("s", Arc::clone(&sink))),
        );

        registry.get("t").unwrap().emit_name("x");
        assert_eq!(sink.len(), 1);
        assert_eq!(registry.names(), ["t"]);
    }

    #[test]
    fn test_emit_without_default_tracker_fails() {
        let registry = TrackerRegistry::new();
        assert_eq!(
            registry.emit("x", Map::new()),
            Err(TrackingError::TrackerNotFound(DEFAULT_TRACKER_NAME.into()))
        );

        let sink = Arc::new(MemorySink::new());
        registry.register_default(Tracker::new(
            RoutingNode::new().with_backend("s", Arc::clone(&sink)),
        ));
        registry.emit("x", Map::new()).unwrap();
        assert_eq!(sink.events()[0].name(), "x");
    }

    #[test]
    fn test_global_shortcuts() {
        let sink = Arc::new(MemorySink::new());
        register_tracker(
            "registry-test-global",
            Tracker::new(RoutingNode::new().with_backend("s", Arc::clone(&sink))),
        );

        get_tracker("registry-test-global").unwrap().emit_name("x");
        assert_eq!(sink.len(), 1);
        assert!(get_tracker("registry-test-missing").is_err());
    }
}
