//! Drops events whose name is not on a fixed list.

use std::collections::HashSet;

use crate::foundation::event::Event;
use crate::framework::processor::{Outcome, Processor, ProcessorResult};

/// Lets through only events whose name is in the allowlist.
#[derive(Debug, Clone, Default)]
pub struct NameAllowlistProcessor {
    allowlist: HashSet<String>,
}

impl NameAllowlistProcessor {
    /// Creates a processor allowing the given names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowlist: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns `true` if `name` is allowed.
    pub fn allows(&self, name: &str) -> bool {
        self.allowlist.contains(name)
    }

    /// Filters a batch, keeping only allowed events in their original order.
    pub fn filter_batch(&self, events: Vec<Event>) -> Vec<Event> {
        events
            .into_iter()
            .filter(|event| self.allows(event.name()))
            .collect()
    }
}

impl Processor for NameAllowlistProcessor {
    fn process(&self, event: &mut Event) -> ProcessorResult {
        if self.allows(event.name()) {
            Ok(Outcome::Keep)
        } else {
            Ok(Outcome::Abort)
        }
    }

    fn name(&self) -> &str {
        "name_allowlist"
    }
}
