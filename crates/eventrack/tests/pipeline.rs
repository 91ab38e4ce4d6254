//! Routing trees built from configuration, exercised through the facade.

use std::collections::HashMap;
use std::sync::Arc;

use eventrack::core::{MemorySink, MemoryTaskQueue, Outcome, processor_fn, sink_fn};
use eventrack::runtime::config::{BuildContext, Options};
use eventrack::{
    Component, ComponentRegistry, ConfigError, Event, EventrackConfig, RoutingNode, Tracker,
    TrackingError,
};
use serde_json::{Value, json};

/// Builds a component registry where `memory` sinks record into named buffers.
struct Recorders {
    sinks: HashMap<&'static str, Arc<MemorySink>>,
}

impl Recorders {
    fn new(names: &[&'static str]) -> Self {
        Self {
            sinks: names
                .iter()
                .map(|name| (*name, Arc::new(MemorySink::new())))
                .collect(),
        }
    }

    fn names(&self, sink: &str) -> Vec<String> {
        self.sinks[sink]
            .events()
            .iter()
            .map(|event| event.name().to_string())
            .collect()
    }

    fn components(&self) -> ComponentRegistry {
        let mut components = ComponentRegistry::with_builtins();
        let sinks = self.sinks.clone();
        components.register(
            "memory",
            move |options: &mut Options, _: &BuildContext| {
                let id = options
                    .take_string("id")?
                    .ok_or_else(|| options.error("id is required"))?;
                let sink = sinks
                    .get(id.as_str())
                    .ok_or_else(|| options.error(format!("unknown recorder '{id}'")))?;
                Ok(Component::sink(Arc::clone(sink)))
            },
        );
        components
    }
}

fn config(tracking: Value) -> EventrackConfig {
    serde_json::from_value(json!({ "tracking": tracking })).unwrap()
}

fn build(recorders: &Recorders, tracking: Value) -> Result<Tracker, ConfigError> {
    let config = config(tracking);
    let ctx = BuildContext::new(
        config.tracking.tracker_name.clone(),
        Arc::new(MemoryTaskQueue::new()),
    );
    recorders
        .components()
        .build_tracker(&config.tracking, &ctx)
}

#[test]
fn test_configured_tree_filters_per_branch() {
    let recorders = Recorders::new(&["all", "audit", "metrics"]);
    let tracker = build(
        &recorders,
        json!({
            "backends": {
                "all": {"engine": "memory", "options": {"id": "all"}},
                "audit": {
                    "engine": "routing",
                    "options": {
                        "processors": [{
                            "engine": "name_allowlist",
                            "options": {"allowlist": ["login", "logout"]}
                        }],
                        "backends": {"sink": {"engine": "memory", "options": {"id": "audit"}}}
                    }
                },
                "metrics": {
                    "engine": "routing",
                    "options": {
                        "processors": [{
                            "engine": "regex_filter",
                            "options": {
                                "filter_type": "blocklist",
                                "regular_expressions": ["debug\\."]
                            }
                        }],
                        "backends": {"sink": {"engine": "memory", "options": {"id": "metrics"}}}
                    }
                }
            },
            "processors": [{"engine": "identity"}]
        }),
    )
    .unwrap();

    for name in ["login", "debug.trace", "page.view", "logout"] {
        tracker.emit_name(name);
    }

    assert_eq!(
        recorders.names("all"),
        ["login", "debug.trace", "page.view", "logout"]
    );
    assert_eq!(recorders.names("audit"), ["login", "logout"]);
    assert_eq!(recorders.names("metrics"), ["login", "page.view", "logout"]);
}

#[test]
fn test_configured_backends_sorted_by_name() {
    let recorders = Recorders::new(&["x"]);
    let tracker = build(
        &recorders,
        json!({
            "backends": {
                "zeta": {"engine": "memory", "options": {"id": "x"}},
                "alpha": {"engine": "memory", "options": {"id": "x"}},
                "mid": {"engine": "logger", "options": {"max_event_size": null}}
            }
        }),
    )
    .unwrap();

    assert_eq!(tracker.node().backend_names(), ["alpha", "mid", "zeta"]);
}

#[test]
fn test_configuration_errors_fail_construction() {
    let recorders = Recorders::new(&["x"]);

    let err = build(
        &recorders,
        json!({"backends": {"a": {"engine": "does_not_exist"}}}),
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::UnknownEngine(engine) if engine == "does_not_exist"));

    let err = build(
        &recorders,
        json!({"backends": {"a": {"engine": "identity"}}}),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ConfigError::Tracking(TrackingError::InvalidArgument(_))
    ));

    let err = build(
        &recorders,
        json!({"processors": [{
            "engine": "regex_filter",
            "options": {"filter_type": "sometimes", "regular_expressions": []}
        }]}),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ConfigError::Tracking(TrackingError::ImproperlyConfigured(_))
    ));

    let err = build(
        &recorders,
        json!({"processors": [{
            "engine": "regex_filter",
            "options": {"regular_expressions": ["("]}
        }]}),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ConfigError::Tracking(TrackingError::ImproperlyConfigured(_))
    ));
}

// =============================================================================
// Routing properties
// =============================================================================

#[test]
fn test_failing_sink_does_not_block_siblings() {
    let first = Arc::new(MemorySink::new());
    let last = Arc::new(MemorySink::new());
    let node = RoutingNode::new()
        .with_backend("first", Arc::clone(&first))
        .with_backend("broken", sink_fn(|_| Err("disk full".into())))
        .with_backend("last", Arc::clone(&last));

    node.route(&Event::new("x"));

    assert_eq!(first.len(), 1);
    assert_eq!(last.len(), 1);
}

#[test]
fn test_failing_processor_is_a_no_op() {
    let sink = Arc::new(MemorySink::new());
    let node = RoutingNode::new()
        .with_processor(processor_fn("tag", |event| {
            event.insert("tag", json!(1));
            Ok(Outcome::Keep)
        }))
        .with_processor(processor_fn("broken", |_| Err("boom".into())))
        .with_processor(processor_fn("after", |event| {
            event.insert("after", json!(true));
            Ok(Outcome::Keep)
        }))
        .with_backend("sink", Arc::clone(&sink));

    node.route(&Event::new("x"));

    let events = sink.events();
    let delivered = &events[0];
    assert_eq!(delivered.get("tag"), Some(&json!(1)));
    assert_eq!(delivered.get("after"), Some(&json!(true)));
}

#[test]
fn test_route_leaves_caller_event_untouched() {
    let sink = Arc::new(MemorySink::new());
    let node = RoutingNode::new()
        .with_processor(processor_fn("rename", |event| {
            event.set_name("renamed");
            Ok(Outcome::Keep)
        }))
        .with_backend("sink", Arc::clone(&sink));

    let event = Event::new("original");
    node.route(&event);

    assert_eq!(event.name(), "original");
    assert_eq!(sink.events()[0].name(), "renamed");
}
