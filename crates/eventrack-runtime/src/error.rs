//! Unified error types for the Eventrack runtime.

use eventrack_core::TrackingError;
use thiserror::Error;

// Re-export the configuration error so callers can use `crate::error::ConfigError`.
pub use crate::config::error::{ConfigError, ConfigResult};

// =============================================================================
// Runtime Errors
// =============================================================================

/// Errors that can occur while starting or running the tracking runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The configuration could not be loaded, validated or built.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A tracker or backend lookup failed.
    #[error("Tracking error: {0}")]
    Tracking(#[from] TrackingError),

    /// The runtime was started outside of a tokio runtime.
    #[error("No tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
