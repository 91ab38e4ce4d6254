//! Configuration validation utilities.
//!
//! Validation checks the shape of the configuration before any component is
//! built. Engine names and engine options are checked later, by the
//! [`builder`](super::builder), which knows the registered engines.

use serde_json::Value;

use super::error::{ConfigError, ConfigResult};
use super::schema::{EventrackConfig, LogOutput, LoggingConfig, OffloadConfig, TrackingConfig};
use crate::config::builder::ENGINE_KEY;

/// Validates the entire configuration.
pub fn validate_config(config: &EventrackConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_tracking_config(&config.tracking)?;
    validate_offload_config(&config.offload)?;
    Ok(())
}

/// Validates logging settings.
fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path is required when logging.output is \"file\"",
        ));
    }

    if logging.filters.keys().any(|module| module.trim().is_empty()) {
        return Err(ConfigError::validation(
            "logging.filters keys must be module paths",
        ));
    }

    Ok(())
}

/// Validates the tracker settings and the top level of its component trees.
fn validate_tracking_config(tracking: &TrackingConfig) -> ConfigResult<()> {
    if tracking.tracker_name.trim().is_empty() {
        return Err(ConfigError::validation("tracking.tracker_name cannot be empty"));
    }

    for (name, backend) in &tracking.backends {
        if !is_component(backend) {
            return Err(ConfigError::validation(format!(
                "tracking.backends.{name} must be a table with an \"{ENGINE_KEY}\" key"
            )));
        }
    }

    for (index, processor) in tracking.processors.iter().enumerate() {
        if !is_component(processor) {
            return Err(ConfigError::validation(format!(
                "tracking.processors[{index}] must be a table with an \"{ENGINE_KEY}\" key"
            )));
        }
    }

    Ok(())
}

/// Validates retry settings.
fn validate_offload_config(offload: &OffloadConfig) -> ConfigResult<()> {
    if offload.max_retries > 0 && offload.countdown_secs == 0 {
        return Err(ConfigError::validation(
            "offload.countdown_secs must be greater than 0 when retries are enabled",
        ));
    }
    Ok(())
}

fn is_component(value: &Value) -> bool {
    value
        .as_object()
        .and_then(|map| map.get(ENGINE_KEY))
        .is_some_and(Value::is_string)
}
