//! The processor contract.
//!
//! A [`Processor`] is one step of a routing node's chain. It receives the
//! in-flight event by mutable reference and reports what should happen next
//! through an [`Outcome`]:
//!
//! - [`Outcome::Keep`]: continue with the event as it now stands, including
//!   any in-place edits the processor made.
//! - [`Outcome::Replace`]: continue with a different event.
//! - [`Outcome::Abort`]: drop the event. No later processor runs and no sink
//!   receives it.
//!
//! Returning `Err` marks the processor as failed. The routing node logs the
//! error and moves on to the next processor, so a processor that fails must
//! leave the event untouched.

use std::fmt;

use serde_json::Value;

use crate::error::BoxError;
use crate::foundation::event::Event;

/// What a processor decided for the event it was given.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Continue with the (possibly mutated) event.
    Keep,
    /// Continue with a replacement event.
    Replace(Event),
    /// Drop the event silently.
    Abort,
}

/// Result type returned by processors.
pub type ProcessorResult = Result<Outcome, BoxError>;

/// A chainable transformation or filter step over one event.
pub trait Processor: Send + Sync + 'static {
    /// Processes one event.
    fn process(&self, event: &mut Event) -> ProcessorResult;

    /// Name used when reporting failures.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

// =============================================================================
// Closure Processors
// =============================================================================

/// A processor backed by a closure.
///
/// Created with [`processor_fn`].
pub struct FnProcessor<F> {
    name: &'static str,
    f: F,
}

/// Wraps a closure as a [`Processor`].
///
/// ```rust,ignore
/// let rename = processor_fn("rename", |event: &mut Event| {
///     event.set_name("y");
///     Ok(Outcome::Keep)
/// });
/// ```
pub fn processor_fn<F>(name: &'static str, f: F) -> FnProcessor<F>
where
    F: Fn(&mut Event) -> ProcessorResult + Send + Sync + 'static,
{
    FnProcessor { name, f }
}

impl<F> Processor for FnProcessor<F>
where
    F: Fn(&mut Event) -> ProcessorResult + Send + Sync + 'static,
{
    fn process(&self, event: &mut Event) -> ProcessorResult {
        (self.f)(event)
    }

    fn name(&self) -> &str {
        self.name
    }
}

impl<F> fmt::Debug for FnProcessor<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnProcessor").field("name", &self.name).finish()
    }
}

// =============================================================================
// Built-in Helpers
// =============================================================================

/// Passes every event through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityProcessor;

impl Processor for IdentityProcessor {
    fn process(&self, _event: &mut Event) -> ProcessorResult {
        Ok(Outcome::Keep)
    }

    fn name(&self) -> &str {
        "identity"
    }
}

/// Returns a processor that renames every event.
pub fn rename_to(name: impl Into<String>) -> impl Processor {
    let name = name.into();
    processor_fn("rename_to", move |event| {
        event.set_name(name.clone());
        Ok(Outcome::Keep)
    })
}

/// Returns a processor that sets a top-level field on every event.
pub fn add_field(key: impl Into<String>, value: Value) -> impl Processor {
    let key = key.into();
    processor_fn("add_field", move |event| {
        event.insert(key.clone(), value.clone());
        Ok(Outcome::Keep)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identity_keeps_event() {
        let mut event = Event::new("x");
        assert_eq!(IdentityProcessor.process(&mut event).unwrap(), Outcome::Keep);
        assert_eq!(event, Event::new("x"));
    }

    #[test]
    fn test_helpers_mutate_in_place() {
        let mut event = Event::new("x");
        rename_to("y").process(&mut event).unwrap();
        add_field("k", json!("v")).process(&mut event).unwrap();
        assert_eq!(event, Event::new("y").with_field("k", json!("v")));
    }

    #[test]
    fn test_closure_processor_reports_its_name() {
        let processor = processor_fn("abort_all", |_| Ok(Outcome::Abort));
        assert_eq!(processor.name(), "abort_all");
    }
}
