//! Foundation layer - Event model and context storage.
//!
//! This module contains the data the pipeline moves around:
//! - The event record and its JSON codec
//! - Context stacks and the locators that scope them

pub mod codec;
pub mod context;
pub mod event;

pub use codec::{decode_event, encode_event, format_timestamp, parse_timestamp};
pub use context::{
    ContextLocator, ContextStack, SharedContextLocator, TaskLocalContextLocator,
    ThreadLocalContextLocator,
};
pub use event::{Event, UNKNOWN_EVENT_NAME};
