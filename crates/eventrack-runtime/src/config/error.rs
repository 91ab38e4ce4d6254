//! Configuration error types.

use std::path::PathBuf;

use eventrack_core::TrackingError;
use thiserror::Error;

/// Errors that can occur during configuration loading, validation and
/// component construction.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File not found at the specified path.
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// The configuration sources could not be merged or extracted.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Invalid configuration value.
    #[error("Invalid configuration: {message}")]
    ValidationError { message: String },

    /// A component tree names an engine that is not registered.
    #[error("Unknown engine: {0}")]
    UnknownEngine(String),

    /// A component's options are missing or of the wrong type.
    #[error("Invalid options for engine '{engine}': {message}")]
    InvalidOptions { engine: String, message: String },

    /// A component rejected its settings or was placed in the wrong slot.
    #[error(transparent)]
    Tracking(#[from] TrackingError),
}

impl ConfigError {
    /// Creates a validation error with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    /// Creates an invalid options error.
    pub fn invalid_options(engine: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidOptions {
            engine: engine.into(),
            message: message.into(),
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::ParseError(err.to_string())
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
