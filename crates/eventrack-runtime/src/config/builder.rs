//! Declarative construction of processors, sinks and routing nodes.
//!
//! A component tree is plain JSON-like data. Any mapping with an `engine`
//! key describes a component: its `options` mapping (empty when absent) is
//! instantiated first, then handed to the factory registered for that engine
//! in a [`ComponentRegistry`]. Other mappings and lists are walked element by
//! element, and scalars are kept as values.
//!
//! ```toml
//! [tracking.backends.tracking_logs]
//! engine = "routing"
//!
//! [tracking.backends.tracking_logs.options.backends.logger]
//! engine = "logger"
//! options = { name = "tracking", max_event_size = 4096 }
//!
//! [[tracking.backends.tracking_logs.options.processors]]
//! engine = "regex_filter"
//! options = { filter_type = "blocklist", regular_expressions = ["^app\\.internal\\."] }
//! ```
//!
//! # Built-in engines
//!
//! | engine           | kind      | options                                                |
//! |------------------|-----------|--------------------------------------------------------|
//! | `routing`        | sink      | `backends`, `processors`                               |
//! | `async_routing`  | sink      | `backends`, `processors`, `backend_name`               |
//! | `logger`         | sink      | `name`, `level`, `max_event_size`                      |
//! | `name_allowlist` | processor | `allowlist`                                            |
//! | `regex_filter`   | processor | `filter_type`, `regular_expressions`                   |
//! | `identity`       | processor | none                                                   |

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use eventrack_core::{
    AsyncRoutingNode, Component, IdentityProcessor, NameAllowlistProcessor, RegexFilter,
    RoutingNode, TaskQueue, Tracker,
};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::TrackingConfig;
use crate::backends::logger::{DEFAULT_LOGGER_NAME, LoggerBackend, MAX_EVENT_SIZE};

/// Key naming a component's engine.
pub const ENGINE_KEY: &str = "engine";

/// Key holding a component's options.
pub const OPTIONS_KEY: &str = "options";

// =============================================================================
// Instantiated Tree
// =============================================================================

/// A configuration tree after every component in it has been built.
#[derive(Debug, Clone)]
pub enum Node {
    /// A scalar, kept as-is.
    Value(Value),
    /// A list of instantiated elements.
    List(Vec<Node>),
    /// A mapping of instantiated entries.
    Map(Vec<(String, Node)>),
    /// A built component.
    Component(Component),
}

impl Node {
    fn describe(&self) -> &'static str {
        match self {
            Self::Value(Value::String(_)) => "a string",
            Self::Value(Value::Null) => "null",
            Self::Value(_) => "a scalar",
            Self::List(_) => "a list",
            Self::Map(_) => "a mapping",
            Self::Component(component) => component.kind(),
        }
    }
}

/// Everything a factory may need besides its options.
#[derive(Clone)]
pub struct BuildContext {
    /// Tracker the built tree will belong to.
    pub tracker_name: String,
    /// Queue used by `async_routing` nodes.
    pub queue: Arc<dyn TaskQueue>,
}

impl BuildContext {
    /// Creates a build context.
    pub fn new(tracker_name: impl Into<String>, queue: Arc<dyn TaskQueue>) -> Self {
        Self {
            tracker_name: tracker_name.into(),
            queue,
        }
    }
}

impl fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildContext")
            .field("tracker_name", &self.tracker_name)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Options
// =============================================================================

/// The instantiated options of one component.
///
/// Factories take the entries they understand; anything left over is
/// reported with a warning once the factory returns.
#[derive(Debug)]
pub struct Options {
    engine: String,
    entries: Vec<(String, Node)>,
}

impl Options {
    /// Creates options for `engine`.
    pub fn new(engine: impl Into<String>, entries: Vec<(String, Node)>) -> Self {
        Self {
            engine: engine.into(),
            entries,
        }
    }

    /// Returns the engine these options belong to.
    pub fn engine(&self) -> &str {
        &self.engine
    }

    /// Creates an invalid-options error for this engine.
    pub fn error(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::invalid_options(&self.engine, message)
    }

    /// Removes and returns an entry.
    pub fn take(&mut self, key: &str) -> Option<Node> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Takes a mapping of named components. Missing means empty.
    pub fn take_backends(&mut self, key: &str) -> ConfigResult<Vec<(String, Component)>> {
        match self.take(key) {
            None => Ok(Vec::new()),
            Some(Node::Map(entries)) => entries
                .into_iter()
                .map(|(name, node)| match node {
                    Node::Component(component) => Ok((name, component)),
                    other => Err(self.error(format!(
                        "{key}.{name} must be a component, found {}",
                        other.describe()
                    ))),
                })
                .collect(),
            Some(other) => Err(self.error(format!(
                "{key} must be a mapping, found {}",
                other.describe()
            ))),
        }
    }

    /// Takes a list of components. Missing means empty.
    pub fn take_processors(&mut self, key: &str) -> ConfigResult<Vec<Component>> {
        match self.take(key) {
            None => Ok(Vec::new()),
            Some(Node::List(items)) => items
                .into_iter()
                .enumerate()
                .map(|(index, node)| match node {
                    Node::Component(component) => Ok(component),
                    other => Err(self.error(format!(
                        "{key}[{index}] must be a component, found {}",
                        other.describe()
                    ))),
                })
                .collect(),
            Some(other) => Err(self.error(format!(
                "{key} must be a list, found {}",
                other.describe()
            ))),
        }
    }

    /// Takes an optional string.
    pub fn take_string(&mut self, key: &str) -> ConfigResult<Option<String>> {
        match self.take(key) {
            None | Some(Node::Value(Value::Null)) => Ok(None),
            Some(Node::Value(Value::String(s))) => Ok(Some(s)),
            Some(other) => Err(self.error(format!(
                "{key} must be a string, found {}",
                other.describe()
            ))),
        }
    }

    /// Takes an optional list of strings.
    pub fn take_string_list(&mut self, key: &str) -> ConfigResult<Option<Vec<String>>> {
        match self.take(key) {
            None | Some(Node::Value(Value::Null)) => Ok(None),
            Some(Node::List(items)) => items
                .into_iter()
                .map(|node| match node {
                    Node::Value(Value::String(s)) => Ok(s),
                    other => Err(self.error(format!(
                        "{key} must only contain strings, found {}",
                        other.describe()
                    ))),
                })
                .collect::<ConfigResult<Vec<_>>>()
                .map(Some),
            Some(other) => Err(self.error(format!(
                "{key} must be a list of strings, found {}",
                other.describe()
            ))),
        }
    }

    /// Takes a non-negative integer that may be explicitly `null`.
    ///
    /// Returns `None` when the key is missing and `Some(None)` for `null`.
    pub fn take_nullable_u64(&mut self, key: &str) -> ConfigResult<Option<Option<u64>>> {
        match self.take(key) {
            None => Ok(None),
            Some(Node::Value(Value::Null)) => Ok(Some(None)),
            Some(Node::Value(Value::Number(n))) => n
                .as_u64()
                .map(|n| Some(Some(n)))
                .ok_or_else(|| self.error(format!("{key} must be a non-negative integer"))),
            Some(other) => Err(self.error(format!(
                "{key} must be an integer or null, found {}",
                other.describe()
            ))),
        }
    }

    fn warn_unused(&self) {
        for (key, _) in &self.entries {
            warn!(engine = %self.engine, option = %key, "Ignoring unknown option");
        }
    }
}

// =============================================================================
// Component Registry
// =============================================================================

type Factory = Arc<dyn Fn(&mut Options, &BuildContext) -> ConfigResult<Component> + Send + Sync>;

/// A closed table of component factories, keyed by engine name.
#[derive(Clone, Default)]
pub struct ComponentRegistry {
    factories: HashMap<String, Factory>,
}

impl ComponentRegistry {
    /// Creates a registry with no engines.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with every built-in engine.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("routing", build_routing);
        registry.register("async_routing", build_async_routing);
        registry.register("logger", build_logger);
        registry.register("name_allowlist", build_name_allowlist);
        registry.register("regex_filter", build_regex_filter);
        registry.register("identity", |_: &mut Options, _: &BuildContext| {
            Ok(Component::processor(IdentityProcessor))
        });
        registry
    }

    /// Registers a factory, replacing any previous one for the same engine.
    pub fn register<F>(&mut self, engine: impl Into<String>, factory: F)
    where
        F: Fn(&mut Options, &BuildContext) -> ConfigResult<Component> + Send + Sync + 'static,
    {
        self.factories.insert(engine.into(), Arc::new(factory));
    }

    /// Returns `true` if `engine` is registered.
    pub fn contains(&self, engine: &str) -> bool {
        self.factories.contains_key(engine)
    }

    /// Returns the registered engine names, sorted.
    pub fn engines(&self) -> Vec<&str> {
        let mut engines: Vec<_> = self.factories.keys().map(String::as_str).collect();
        engines.sort_unstable();
        engines
    }

    /// Instantiates every component in `value`.
    pub fn instantiate(&self, value: &Value, ctx: &BuildContext) -> ConfigResult<Node> {
        match value {
            Value::Object(map) if map.contains_key(ENGINE_KEY) => {
                self.instantiate_component(map, ctx).map(Node::Component)
            }
            Value::Object(map) => map
                .iter()
                .map(|(key, child)| Ok((key.clone(), self.instantiate(child, ctx)?)))
                .collect::<ConfigResult<Vec<_>>>()
                .map(Node::Map),
            Value::Array(items) => items
                .iter()
                .map(|child| self.instantiate(child, ctx))
                .collect::<ConfigResult<Vec<_>>>()
                .map(Node::List),
            scalar => Ok(Node::Value(scalar.clone())),
        }
    }

    /// Instantiates `value`, which must describe a component.
    pub fn build_component(&self, value: &Value, ctx: &BuildContext) -> ConfigResult<Component> {
        match self.instantiate(value, ctx)? {
            Node::Component(component) => Ok(component),
            other => Err(ConfigError::validation(format!(
                "expected a component, found {}",
                other.describe()
            ))),
        }
    }

    /// Builds a routing node from named backend trees and processor trees.
    ///
    /// Backends are registered in ascending name order.
    pub fn build_node(
        &self,
        backends: &Map<String, Value>,
        processors: &[Value],
        ctx: &BuildContext,
    ) -> ConfigResult<RoutingNode> {
        let backends = backends
            .iter()
            .map(|(name, tree)| Ok((name.clone(), self.build_component(tree, ctx)?)))
            .collect::<ConfigResult<Vec<_>>>()?;
        let processors = processors
            .iter()
            .map(|tree| self.build_component(tree, ctx))
            .collect::<ConfigResult<Vec<_>>>()?;

        Ok(RoutingNode::from_components(backends, processors)?)
    }

    /// Builds the tracker described by `tracking`.
    pub fn build_tracker(
        &self,
        tracking: &TrackingConfig,
        ctx: &BuildContext,
    ) -> ConfigResult<Tracker> {
        let node = self.build_node(&tracking.backends, &tracking.processors, ctx)?;
        debug!(
            tracker = %tracking.tracker_name,
            backends = ?node.backend_names(),
            processors = node.processor_count(),
            "Built tracker from configuration"
        );
        Ok(Tracker::from_shared(
            Arc::new(node),
            tracking.context_locator.build(),
        ))
    }

    fn instantiate_component(
        &self,
        map: &Map<String, Value>,
        ctx: &BuildContext,
    ) -> ConfigResult<Component> {
        let engine = match map.get(ENGINE_KEY) {
            Some(Value::String(engine)) => engine.as_str(),
            _ => {
                return Err(ConfigError::validation(format!(
                    "\"{ENGINE_KEY}\" must be a string"
                )));
            }
        };
        let factory = self
            .factories
            .get(engine)
            .ok_or_else(|| ConfigError::UnknownEngine(engine.to_string()))?;

        let entries = match map.get(OPTIONS_KEY) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Object(options)) => options
                .iter()
                .map(|(key, child)| Ok((key.clone(), self.instantiate(child, ctx)?)))
                .collect::<ConfigResult<Vec<_>>>()?,
            Some(_) => {
                return Err(ConfigError::invalid_options(
                    engine,
                    format!("\"{OPTIONS_KEY}\" must be a mapping"),
                ));
            }
        };

        let mut options = Options::new(engine, entries);
        let component = factory(&mut options, ctx)?;
        options.warn_unused();
        Ok(component)
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("engines", &self.engines())
            .finish()
    }
}

// =============================================================================
// Built-in Factories
// =============================================================================

fn build_routing(options: &mut Options, _ctx: &BuildContext) -> ConfigResult<Component> {
    let backends = options.take_backends("backends")?;
    let processors = options.take_processors("processors")?;
    let node = RoutingNode::from_components(backends, processors)?;
    Ok(Component::sink(node))
}

fn build_async_routing(options: &mut Options, ctx: &BuildContext) -> ConfigResult<Component> {
    let backend_name = options
        .take_string("backend_name")?
        .ok_or_else(|| options.error("backend_name is required"))?;
    let backends = options.take_backends("backends")?;
    let processors = options.take_processors("processors")?;
    let node = RoutingNode::from_components(backends, processors)?;

    let node = AsyncRoutingNode::new(node, backend_name, Arc::clone(&ctx.queue))
        .with_tracker_name(&ctx.tracker_name);
    Ok(Component::sink(node))
}

fn build_logger(options: &mut Options, _ctx: &BuildContext) -> ConfigResult<Component> {
    let name = options
        .take_string("name")?
        .unwrap_or_else(|| DEFAULT_LOGGER_NAME.to_string());
    let level = match options.take_string("level")? {
        Some(level) => level
            .parse::<tracing::Level>()
            .map_err(|_| options.error(format!("unknown level '{level}'")))?,
        None => tracing::Level::INFO,
    };
    let max_event_size = match options.take_nullable_u64("max_event_size")? {
        None => Some(MAX_EVENT_SIZE),
        Some(limit) => limit.map(|n| usize::try_from(n).unwrap_or(usize::MAX)),
    };

    Ok(Component::sink(
        LoggerBackend::new(name)
            .with_level(level)
            .with_max_event_size(max_event_size),
    ))
}

fn build_name_allowlist(options: &mut Options, _ctx: &BuildContext) -> ConfigResult<Component> {
    let allowlist = options.take_string_list("allowlist")?.ok_or_else(|| {
        options.error("must be passed a collection of allowed names using the \"allowlist\" option")
    })?;
    Ok(Component::processor(NameAllowlistProcessor::new(allowlist)))
}

fn build_regex_filter(options: &mut Options, _ctx: &BuildContext) -> ConfigResult<Component> {
    let filter_type = options
        .take_string("filter_type")?
        .unwrap_or_else(|| "allowlist".to_string());
    let expressions = options
        .take_string_list("regular_expressions")?
        .unwrap_or_default();
    Ok(Component::processor(RegexFilter::from_config(
        &filter_type,
        expressions,
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventrack_core::{Event, MemorySink, MemoryTaskQueue, Outcome, TrackingError};
    use serde_json::json;

    fn ctx() -> BuildContext {
        BuildContext::new("default", Arc::new(MemoryTaskQueue::new()))
    }

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_nested_tree_is_instantiated_recursively() {
        let registry = ComponentRegistry::with_builtins();
        let tree = json!({
            "a": {
                "b": {"first": {"engine": "identity"}},
                "c": [{"engine": "routing", "options": {
                    "backends": {"d": {"engine": "logger"}}
                }}],
                "size": 10
            }
        });

        let Node::Map(root) = registry.instantiate(&tree, &ctx()).unwrap() else {
            panic!("expected a mapping");
        };
        let Node::Map(a) = &root[0].1 else {
            panic!("expected a mapping");
        };
        let find = |key: &str| a.iter().find(|(k, _)| k == key).map(|(_, n)| n.clone());

        assert!(matches!(find("size"), Some(Node::Value(v)) if v == json!(10)));
        let Some(Node::List(c)) = find("c") else {
            panic!("expected a list");
        };
        let Node::Component(Component::Sink(sink)) = &c[0] else {
            panic!("expected a sink");
        };
        assert_eq!(sink.as_router().unwrap().backend_names(), ["d"]);
    }

    #[test]
    fn test_build_node_sorts_backends() {
        let registry = ComponentRegistry::with_builtins();
        let backends = object(json!({
            "zeta": {"engine": "logger"},
            "alpha": {"engine": "routing"},
        }));
        let node = registry.build_node(&backends, &[], &ctx()).unwrap();
        assert_eq!(node.backend_names(), ["alpha", "zeta"]);
    }

    #[test]
    fn test_processors_are_built_in_order() {
        let mut registry = ComponentRegistry::with_builtins();
        let sink = Arc::new(MemorySink::new());
        let recorder = Arc::clone(&sink);
        registry.register("memory", move |_: &mut Options, _: &BuildContext| {
            Ok(Component::Sink(recorder.clone()))
        });

        let processors = [
            json!({"engine": "name_allowlist", "options": {"allowlist": ["login", "logout"]}}),
            json!({"engine": "regex_filter", "options": {
                "filter_type": "blocklist",
                "regular_expressions": ["logout"]
            }}),
        ];
        let backends = object(json!({"memory": {"engine": "memory"}}));
        let node = registry.build_node(&backends, &processors, &ctx()).unwrap();

        for name in ["login", "logout", "other"] {
            node.route(&Event::new(name));
        }
        assert_eq!(sink.events(), [Event::new("login")]);
    }

    #[test]
    fn test_unknown_engine() {
        let registry = ComponentRegistry::with_builtins();
        let err = registry
            .build_component(&json!({"engine": "kafka"}), &ctx())
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownEngine(engine) if engine == "kafka"));
    }

    #[test]
    fn test_wrong_kind_in_slot_fails() {
        let registry = ComponentRegistry::with_builtins();
        let backends = object(json!({"bad": {"engine": "identity"}}));
        let err = registry.build_node(&backends, &[], &ctx()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Tracking(TrackingError::InvalidArgument(_))
        ));

        let err = registry
            .build_node(&Map::new(), &[json!({"engine": "logger"})], &ctx())
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Tracking(TrackingError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_option_errors() {
        let registry = ComponentRegistry::with_builtins();
        let build = |tree: Value| registry.build_component(&tree, &ctx()).unwrap_err();

        assert!(matches!(
            build(json!({"engine": "name_allowlist", "options": {"allowlist": "login"}})),
            ConfigError::InvalidOptions { .. }
        ));
        assert!(matches!(
            build(json!({"engine": "name_allowlist"})),
            ConfigError::InvalidOptions { .. }
        ));
        assert!(matches!(
            build(json!({"engine": "regex_filter", "options": {"regular_expressions": ["***"]}})),
            ConfigError::Tracking(TrackingError::ImproperlyConfigured(_))
        ));
        assert!(matches!(
            build(json!({"engine": "regex_filter", "options": {"filter_type": "denylist"}})),
            ConfigError::Tracking(TrackingError::ImproperlyConfigured(_))
        ));
        assert!(matches!(
            build(json!({"engine": "logger", "options": {"level": "loud"}})),
            ConfigError::InvalidOptions { .. }
        ));
        assert!(matches!(
            build(json!({"engine": "async_routing"})),
            ConfigError::InvalidOptions { .. }
        ));
    }

    #[test]
    fn test_async_routing_uses_context() {
        let registry = ComponentRegistry::with_builtins();
        let queue = Arc::new(MemoryTaskQueue::new());
        let ctx = BuildContext::new("web", queue.clone());

        let component = registry
            .build_component(
                &json!({"engine": "async_routing", "options": {"backend_name": "async"}}),
                &ctx,
            )
            .unwrap();
        let sink = component.into_sink("async").unwrap();
        sink.send(&Event::new("x")).unwrap();

        let tasks = queue.drain();
        assert_eq!(tasks[0].tracker_name, "web");
        assert_eq!(tasks[0].backend_name, "async");
    }

    #[test]
    fn test_custom_processor_engine() {
        let mut registry = ComponentRegistry::new();
        registry.register("drop_all", |_: &mut Options, _: &BuildContext| {
            Ok(Component::processor(eventrack_core::processor_fn(
                "drop_all",
                |_| Ok(Outcome::Abort),
            )))
        });
        assert_eq!(registry.engines(), ["drop_all"]);
        assert!(!registry.contains("routing"));
    }
}
