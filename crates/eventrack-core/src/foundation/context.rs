//! Context stacks and the strategies for locating them.
//!
//! A [`ContextStack`] is an ordered set of named layers, each a mapping of
//! key-value pairs. Resolving the stack folds the layers left to right, so a
//! layer entered later overrides the keys of the layers entered before it.
//!
//! A [`ContextLocator`] decides *which* stack a caller sees:
//!
//! - [`SharedContextLocator`]: one stack shared by every caller.
//! - [`ThreadLocalContextLocator`]: one stack per OS thread, allocated on
//!   first access from that thread.
//! - [`TaskLocalContextLocator`]: one stack per tokio task scope, falling back
//!   to per-thread storage outside of a scope. The scope lookup happens on
//!   every access, never at construction time.

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::error::{TrackingError, TrackingResult};

// =============================================================================
// Context Stack
// =============================================================================

/// An ordered collection of named context layers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextStack {
    layers: Vec<(String, Map<String, Value>)>,
}

impl ContextStack {
    /// Creates an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters a named layer.
    ///
    /// Re-entering an existing name replaces its values but keeps its
    /// position in the stack.
    pub fn enter(&mut self, name: impl Into<String>, values: Map<String, Value>) {
        let name = name.into();
        match self.layers.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = values,
            None => self.layers.push((name, values)),
        }
    }

    /// Exits a named layer, returning its values if it was entered.
    pub fn exit(&mut self, name: &str) -> Option<Map<String, Value>> {
        let index = self.layers.iter().position(|(n, _)| n == name)?;
        Some(self.layers.remove(index).1)
    }

    /// Returns the values of a named layer.
    pub fn get(&self, name: &str) -> Option<&Map<String, Value>> {
        self.layers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, values)| values)
    }

    /// Merges every layer into one mapping; later layers win.
    pub fn resolve(&self) -> Map<String, Value> {
        let mut merged = Map::new();
        for (_, values) in &self.layers {
            for (key, value) in values {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged
    }

    /// Returns the layer names in the order they were entered.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.layers.iter().map(|(name, _)| name.as_str())
    }

    /// Returns the number of layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Returns `true` if no layer is entered.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

// =============================================================================
// Locator Trait
// =============================================================================

/// Supplies the context stack for the caller's current scope.
///
/// Implementors only provide [`with_stack`](Self::with_stack); the other
/// operations are built on top of it.
pub trait ContextLocator: Send + Sync + 'static {
    /// Runs `f` against the stack for the current scope, creating the stack
    /// on first use.
    fn with_stack(&self, f: &mut dyn FnMut(&mut ContextStack));

    /// Enters a named layer in the current scope.
    fn enter(&self, name: &str, values: Map<String, Value>) {
        let mut values = Some(values);
        self.with_stack(&mut |stack| {
            if let Some(values) = values.take() {
                stack.enter(name, values);
            }
        });
    }

    /// Exits a named layer in the current scope.
    fn exit(&self, name: &str) -> TrackingResult<Map<String, Value>> {
        let mut removed = None;
        self.with_stack(&mut |stack| removed = stack.exit(name));
        removed.ok_or_else(|| TrackingError::ContextNotEntered(name.to_string()))
    }

    /// Merges every layer of the current scope's stack.
    fn resolve(&self) -> Map<String, Value> {
        let mut merged = Map::new();
        self.with_stack(&mut |stack| merged = stack.resolve());
        merged
    }

    /// Returns a copy of the current scope's stack.
    fn snapshot(&self) -> ContextStack {
        let mut snapshot = ContextStack::new();
        self.with_stack(&mut |stack| snapshot = stack.clone());
        snapshot
    }
}

// =============================================================================
// Shared Locator
// =============================================================================

/// A single stack shared by every caller.
#[derive(Debug, Default)]
pub struct SharedContextLocator {
    stack: Mutex<ContextStack>,
}

impl SharedContextLocator {
    /// Creates a locator with an empty stack.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ContextLocator for SharedContextLocator {
    fn with_stack(&self, f: &mut dyn FnMut(&mut ContextStack)) {
        f(&mut self.stack.lock());
    }
}

// =============================================================================
// Per-Thread Locator
// =============================================================================

static NEXT_LOCATOR_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_STACKS: RefCell<HashMap<u64, ContextStack>> = RefCell::new(HashMap::new());
}

fn next_locator_id() -> u64 {
    NEXT_LOCATOR_ID.fetch_add(1, Ordering::Relaxed)
}

/// Runs `f` against one entry of `stacks`, removing the entry again once it
/// holds no layers.
fn with_entry(
    stacks: &RefCell<HashMap<u64, ContextStack>>,
    id: u64,
    f: &mut dyn FnMut(&mut ContextStack),
) {
    let mut stacks = stacks.borrow_mut();
    let stack = stacks.entry(id).or_default();
    f(stack);
    if stack.is_empty() {
        stacks.remove(&id);
    }
}

fn with_thread_stack(id: u64, f: &mut dyn FnMut(&mut ContextStack)) {
    THREAD_STACKS.with(|stacks| with_entry(stacks, id, f));
}

#[cfg(test)]
fn thread_stack_count() -> usize {
    THREAD_STACKS.with(|stacks| stacks.borrow().len())
}

/// One stack per OS thread.
///
/// Each locator instance owns a separate stack on every thread, so two
/// trackers with their own locators never see each other's contexts.
#[derive(Debug)]
pub struct ThreadLocalContextLocator {
    id: u64,
}

impl ThreadLocalContextLocator {
    /// Creates a locator. No storage is allocated until first use.
    pub fn new() -> Self {
        Self {
            id: next_locator_id(),
        }
    }
}

impl Default for ThreadLocalContextLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextLocator for ThreadLocalContextLocator {
    fn with_stack(&self, f: &mut dyn FnMut(&mut ContextStack)) {
        with_thread_stack(self.id, f);
    }
}

// =============================================================================
// Per-Task Locator
// =============================================================================

tokio::task_local! {
    static TASK_STACKS: RefCell<HashMap<u64, ContextStack>>;
}

/// One stack per tokio task scope.
///
/// Wrap a task's future with [`scope`](Self::scope) to give it isolated
/// storage that follows the task across worker threads. Outside of a scope
/// the locator behaves like [`ThreadLocalContextLocator`].
#[derive(Debug)]
pub struct TaskLocalContextLocator {
    id: u64,
}

impl TaskLocalContextLocator {
    /// Creates a locator. No storage is allocated until first use.
    pub fn new() -> Self {
        Self {
            id: next_locator_id(),
        }
    }

    /// Runs `future` with its own, initially empty, context storage.
    pub async fn scope<F: Future>(future: F) -> F::Output {
        TASK_STACKS.scope(RefCell::new(HashMap::new()), future).await
    }

    /// Runs `f` with its own, initially empty, context storage.
    pub fn sync_scope<R>(f: impl FnOnce() -> R) -> R {
        TASK_STACKS.sync_scope(RefCell::new(HashMap::new()), f)
    }
}

impl Default for TaskLocalContextLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextLocator for TaskLocalContextLocator {
    fn with_stack(&self, f: &mut dyn FnMut(&mut ContextStack)) {
        let in_task = TASK_STACKS
            .try_with(|stacks| with_entry(stacks, self.id, f))
            .is_ok();
        if !in_task {
            with_thread_stack(self.id, f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Barrier};

    fn values(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_resolve_is_a_left_fold() {
        let mut stack = ContextStack::new();
        stack.enter("a", values(json!({"x": 1})));
        stack.enter("b", values(json!({"x": 2, "y": 1})));
        assert_eq!(Value::Object(stack.resolve()), json!({"x": 2, "y": 1}));

        stack.exit("b");
        assert_eq!(Value::Object(stack.resolve()), json!({"x": 1}));
    }

    #[test]
    fn test_reenter_keeps_position() {
        let mut stack = ContextStack::new();
        stack.enter("a", values(json!({"x": 1})));
        stack.enter("b", values(json!({"x": 2})));
        stack.enter("a", values(json!({"x": 3})));

        assert_eq!(stack.names().collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(stack.resolve().get("x"), Some(&json!(2)));
    }

    #[test]
    fn test_exit_unknown_is_an_error() {
        let locator = SharedContextLocator::new();
        assert_eq!(
            locator.exit("missing"),
            Err(TrackingError::ContextNotEntered("missing".into()))
        );
    }

    #[test]
    fn test_thread_local_isolation() {
        let locator = Arc::new(ThreadLocalContextLocator::new());
        let barrier = Arc::new(Barrier::new(2));

        let spawn = |name: &'static str, ctx: Value| {
            let locator = Arc::clone(&locator);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                locator.enter(name, values(ctx));
                barrier.wait();
                let resolved = locator.resolve();
                barrier.wait();
                locator.exit(name).unwrap();
                resolved
            })
        };

        let t1 = spawn("t1", json!({"a": 1}));
        let t2 = spawn("t2", json!({"b": 2}));

        assert_eq!(Value::Object(t1.join().unwrap()), json!({"a": 1}));
        assert_eq!(Value::Object(t2.join().unwrap()), json!({"b": 2}));
    }

    #[test]
    fn test_thread_local_locators_do_not_share_storage() {
        let first = ThreadLocalContextLocator::new();
        let second = ThreadLocalContextLocator::new();
        first.enter("a", values(json!({"x": 1})));

        assert!(second.snapshot().is_empty());
        first.exit("a").unwrap();
    }

    #[test]
    fn test_thread_storage_released_when_empty() {
        let baseline = thread_stack_count();
        for _ in 0..8 {
            let locator = ThreadLocalContextLocator::new();
            locator.enter("a", values(json!({"x": 1})));
            assert_eq!(thread_stack_count(), baseline + 1);
            locator.resolve();
            locator.exit("a").unwrap();
        }
        assert_eq!(thread_stack_count(), baseline);

        ThreadLocalContextLocator::new().resolve();
        assert_eq!(thread_stack_count(), baseline);
    }

    #[test]
    fn test_shared_locator_is_visible_across_threads() {
        let locator = Arc::new(SharedContextLocator::new());
        locator.enter("a", values(json!({"x": 1})));

        let seen = {
            let locator = Arc::clone(&locator);
            std::thread::spawn(move || locator.resolve()).join().unwrap()
        };
        assert_eq!(Value::Object(seen), json!({"x": 1}));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_task_local_isolation() {
        let locator = Arc::new(TaskLocalContextLocator::new());

        let run = |name: &'static str, ctx: Value| {
            let locator = Arc::clone(&locator);
            tokio::spawn(TaskLocalContextLocator::scope(async move {
                locator.enter(name, values(ctx));
                tokio::task::yield_now().await;
                locator.resolve()
            }))
        };

        let first = run("first", json!({"a": 1}));
        let second = run("second", json!({"b": 2}));

        assert_eq!(Value::Object(first.await.unwrap()), json!({"a": 1}));
        assert_eq!(Value::Object(second.await.unwrap()), json!({"b": 2}));
    }

    #[test]
    fn test_task_local_falls_back_outside_scope() {
        let locator = TaskLocalContextLocator::new();
        locator.enter("outer", values(json!({"x": 1})));

        let inner = TaskLocalContextLocator::sync_scope(|| locator.snapshot());
        assert!(inner.is_empty());
        assert_eq!(locator.snapshot().len(), 1);
        locator.exit("outer").unwrap();
    }
}
