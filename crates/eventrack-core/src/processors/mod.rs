//! Built-in filter processors.

pub mod allowlist;
pub mod regex_filter;

pub use allowlist::NameAllowlistProcessor;
pub use regex_filter::{FilterType, RegexFilter};
