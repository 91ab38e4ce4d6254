//! Runtime wiring a configured tracker into a registry.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use eventrack_runtime::{TrackingRuntime, load_config};
//!
//! #[tokio::main]
//! async fn main() -> eventrack_runtime::RuntimeResult<()> {
//!     let config = load_config()?;
//!     eventrack_runtime::logging::init_from_config(&config.logging);
//!
//!     let runtime = TrackingRuntime::start(config)?;
//!     if let Some(tracker) = runtime.tracker() {
//!         tracker.emit_name("service.started");
//!     }
//!
//!     runtime.shutdown().await;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use eventrack_core::{TaskQueue, Tracker, TrackerRegistry};
use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::config::{BuildContext, ComponentRegistry, EventrackConfig, validate_config};
use crate::error::RuntimeResult;
use crate::worker::TokioTaskQueue;

/// Owns the tracker registry, the offload worker and the configured tracker.
#[derive(Debug)]
pub struct TrackingRuntime {
    config: EventrackConfig,
    registry: Arc<TrackerRegistry>,
    queue: Arc<TokioTaskQueue>,
    tracker: Option<Arc<Tracker>>,
}

impl TrackingRuntime {
    /// Starts the runtime with the built-in engines.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(config: EventrackConfig) -> RuntimeResult<Self> {
        Self::start_with_components(config, ComponentRegistry::with_builtins())
    }

    /// Starts the runtime, resolving engines through `components`.
    pub fn start_with_components(
        config: EventrackConfig,
        components: ComponentRegistry,
    ) -> RuntimeResult<Self> {
        validate_config(&config)?;
        Handle::try_current()?;

        let registry = Arc::new(TrackerRegistry::new());
        let queue = TokioTaskQueue::start(Arc::clone(&registry), config.offload.retry_policy())?;

        let tracking = &config.tracking;
        let tracker = if tracking.enabled {
            let ctx = BuildContext::new(
                tracking.tracker_name.clone(),
                Arc::clone(&queue) as Arc<dyn TaskQueue>,
            );
            let tracker = components.build_tracker(tracking, &ctx)?;
            let tracker = registry.register(tracking.tracker_name.clone(), tracker);
            info!(
                tracker = %tracking.tracker_name,
                backends = ?tracker.node().backend_names(),
                "Tracker registered"
            );
            Some(tracker)
        } else {
            info!("Tracking disabled, no tracker registered");
            None
        };

        Ok(Self {
            config,
            registry,
            queue,
            tracker,
        })
    }

    /// Returns the configuration the runtime was started with.
    pub fn config(&self) -> &EventrackConfig {
        &self.config
    }

    /// Returns the registry the worker resolves trackers from.
    pub fn registry(&self) -> &Arc<TrackerRegistry> {
        &self.registry
    }

    /// Returns the configured tracker, if tracking is enabled.
    pub fn tracker(&self) -> Option<&Arc<Tracker>> {
        self.tracker.as_ref()
    }

    /// Returns the offload queue.
    pub fn queue(&self) -> &Arc<TokioTaskQueue> {
        &self.queue
    }

    /// Registers the configured tracker on the process-wide registry too,
    /// so [`eventrack_core::emit`] reaches it.
    ///
    /// Offloaded events are still resolved through [`registry`](Self::registry).
    pub fn install_global(&self) -> Option<Arc<Tracker>> {
        match &self.tracker {
            Some(tracker) => {
                TrackerRegistry::global().register(
                    self.config.tracking.tracker_name.clone(),
                    tracker.as_ref().clone(),
                );
                Some(Arc::clone(tracker))
            }
            None => {
                warn!("Tracking disabled, nothing installed globally");
                None
            }
        }
    }

    /// Stops the offload worker, waiting for running tasks.
    pub async fn shutdown(&self) {
        self.queue.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigError, Options};
    use crate::error::RuntimeError;
    use eventrack_core::{Component, MemorySink};
    use serde_json::json;
    use std::time::Duration;

    fn tracking_config(backends: serde_json::Value) -> EventrackConfig {
        let mut config = EventrackConfig::default();
        config.tracking.enabled = true;
        config.tracking.backends = backends.as_object().cloned().unwrap();
        config
    }

    #[tokio::test]
    async fn test_disabled_registers_nothing() {
        let runtime = TrackingRuntime::start(EventrackConfig::default()).unwrap();
        assert!(runtime.tracker().is_none());
        assert!(runtime.registry().names().is_empty());
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_registers_configured_tracker() {
        let mut config = tracking_config(json!({"log": {"engine": "logger"}}));
        config.tracking.tracker_name = "main".into();

        let runtime = TrackingRuntime::start(config).unwrap();
        let tracker = runtime.registry().get("main").unwrap();
        assert_eq!(tracker.node().backend_names(), ["log"]);
        assert!(runtime.tracker().is_some());
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_engine() {
        let config = tracking_config(json!({"log": {"engine": "nope"}}));
        let err = TrackingRuntime::start(config).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Config(ConfigError::UnknownEngine(engine)) if engine == "nope"
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_offloaded_delivery() {
        let sink = Arc::new(MemorySink::new());
        let mut components = ComponentRegistry::with_builtins();
        let recorder = Arc::clone(&sink);
        components.register("memory", move |_: &mut Options, _: &BuildContext| {
            Ok(Component::sink(Arc::clone(&recorder)))
        });

        let mut config = tracking_config(json!({
            "async": {
                "engine": "async_routing",
                "options": {
                    "backend_name": "async",
                    "backends": {"memory": {"engine": "memory"}}
                }
            }
        }));
        config.offload.countdown_secs = 1;

        let runtime = TrackingRuntime::start_with_components(config, components).unwrap();
        runtime.tracker().unwrap().emit_name("offloaded");

        tokio::time::timeout(Duration::from_secs(5), async {
            while sink.is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(sink.events()[0].name(), "offloaded");
        runtime.shutdown().await;
    }

    #[test]
    fn test_start_outside_tokio() {
        let err = TrackingRuntime::start(EventrackConfig::default()).unwrap_err();
        assert!(matches!(err, RuntimeError::NoRuntime(_)));
    }
}
