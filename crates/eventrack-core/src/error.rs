//! Unified error types for the Eventrack core.
//!
//! Only configuration mistakes and lookups of unregistered names surface as
//! [`TrackingError`]. Failures raised by user processors and sinks while an
//! event is being routed are logged and swallowed by the routing node; they
//! are expressed with [`BoxError`].

use thiserror::Error;

/// A boxed error type returned by processors and sinks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// =============================================================================
// Tracking Errors
// =============================================================================

/// Errors surfaced to callers of the routing and tracking API.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TrackingError {
    /// A component of the wrong kind was registered.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A component was built with invalid settings.
    #[error("improperly configured: {0}")]
    ImproperlyConfigured(String),

    /// No backend is registered under the given name.
    #[error("backend '{0}' not found")]
    BackendNotFound(String),

    /// No tracker is registered under the given name.
    #[error("tracker '{0}' not found")]
    TrackerNotFound(String),

    /// A context was exited without having been entered.
    #[error("context '{0}' was never entered")]
    ContextNotEntered(String),
}

impl TrackingError {
    /// Creates an improperly-configured error with the given message.
    pub fn improperly_configured(message: impl Into<String>) -> Self {
        Self::ImproperlyConfigured(message.into())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for tracking operations.
pub type TrackingResult<T> = Result<T, TrackingError>;
