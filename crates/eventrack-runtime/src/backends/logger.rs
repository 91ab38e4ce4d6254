//! A sink that writes events to the `tracing` pipeline as JSON.
//!
//! Each event is encoded with [`encode_event`] and emitted at the configured
//! level with the logger name as the `logger` field. Events whose encoding is
//! longer than the size limit are dropped without a trace.

use eventrack_core::{BoxError, Event, Sink, encode_event};
use tracing::Level;

/// Default size limit for a single encoded event, in bytes.
pub const MAX_EVENT_SIZE: usize = 1024;

/// Logger name used when none is configured.
pub const DEFAULT_LOGGER_NAME: &str = "eventrack.events";

/// Writes each event as one JSON log line.
#[derive(Debug, Clone)]
pub struct LoggerBackend {
    name: String,
    level: Level,
    max_event_size: Option<usize>,
}

impl LoggerBackend {
    /// Creates a backend logging at `INFO` with the default size limit.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            level: Level::INFO,
            max_event_size: Some(MAX_EVENT_SIZE),
        }
    }

    /// Sets the level events are logged at.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Sets the size limit; `None` logs events of any size.
    pub fn with_max_event_size(mut self, max_event_size: Option<usize>) -> Self {
        self.max_event_size = max_event_size;
        self
    }

    /// Returns the logger name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the level events are logged at.
    pub fn level(&self) -> Level {
        self.level
    }

    /// Returns the size limit.
    pub fn max_event_size(&self) -> Option<usize> {
        self.max_event_size
    }

    /// Encodes `event`, or returns `None` if it exceeds the size limit.
    pub fn format(&self, event: &Event) -> Result<Option<String>, serde_json::Error> {
        let encoded = encode_event(event)?;
        match self.max_event_size {
            Some(limit) if encoded.len() > limit => Ok(None),
            _ => Ok(Some(encoded)),
        }
    }
}

impl Default for LoggerBackend {
    fn default() -> Self {
        Self::new(DEFAULT_LOGGER_NAME)
    }
}

impl Sink for LoggerBackend {
    fn send(&self, event: &Event) -> Result<(), BoxError> {
        let Some(line) = self.format(event)? else {
            return Ok(());
        };

        let logger = self.name.as_str();
        match self.level {
            Level::TRACE => tracing::trace!(logger, "{line}"),
            Level::DEBUG => tracing::debug!(logger, "{line}"),
            Level::INFO => tracing::info!(logger, "{line}"),
            Level::WARN => tracing::warn!(logger, "{line}"),
            _ => tracing::error!(logger, "{line}"),
        }
        Ok(())
    }
}
