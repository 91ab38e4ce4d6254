//! Configuration for the Eventrack runtime.
//!
//! This module provides layered configuration loading (figment), validation,
//! and the builder that turns `engine`/`options` trees into live routing
//! nodes, processors and sinks.

pub mod builder;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use builder::{BuildContext, ComponentRegistry, ENGINE_KEY, Node, OPTIONS_KEY, Options};
pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    ContextLocatorKind, EventrackConfig, LogFormat, LogLevel, LogOutput, LogRotation,
    LoggingConfig, OffloadConfig, SpanEventConfig, TrackingConfig,
};
pub use validation::validate_config;
