//! Built-in sinks.

pub mod logger;

pub use logger::LoggerBackend;
