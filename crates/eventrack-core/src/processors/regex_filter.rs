//! Filters events by matching their names against regular expressions.
//!
//! Every expression is anchored at the start of the name, so `login` matches
//! `login` and `login.failed` but not `user.login`. The order of the
//! expressions does not matter: an event matches if any of them does.

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use tracing::error;

use crate::error::{TrackingError, TrackingResult};
use crate::foundation::event::Event;
use crate::framework::processor::{Outcome, Processor, ProcessorResult};

/// Whether matching names are kept or dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FilterType {
    /// Keep only events whose name matches.
    #[default]
    Allowlist,
    /// Drop events whose name matches.
    Blocklist,
}

impl FilterType {
    /// Returns the configuration spelling of this filter type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allowlist => "allowlist",
            Self::Blocklist => "blocklist",
        }
    }
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterType {
    type Err = TrackingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allowlist" => Ok(Self::Allowlist),
            "blocklist" => Ok(Self::Blocklist),
            other => {
                error!(
                    filter_type = other,
                    "Unsupported filter type, expected allowlist or blocklist"
                );
                Err(TrackingError::improperly_configured(format!(
                    "invalid filter type '{other}'"
                )))
            }
        }
    }
}

/// Keeps or drops events depending on whether their name matches.
#[derive(Debug, Clone)]
pub struct RegexFilter {
    filter_type: FilterType,
    expressions: Vec<Regex>,
}

impl RegexFilter {
    /// Compiles every expression.
    ///
    /// Fails with [`TrackingError::ImproperlyConfigured`] listing every
    /// expression that does not compile.
    pub fn new<I, S>(filter_type: FilterType, expressions: I) -> TrackingResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut compiled = Vec::new();
        let mut invalid = Vec::new();

        for expression in expressions {
            let expression = expression.as_ref();
            match Regex::new(&format!("^(?:{expression})")) {
                Ok(regex) => compiled.push(regex),
                Err(_) => invalid.push(expression.to_string()),
            }
        }

        if !invalid.is_empty() {
            error!(?invalid, "Invalid regular expressions are configured");
            return Err(TrackingError::improperly_configured(format!(
                "invalid regular expressions: {}",
                invalid.join(", ")
            )));
        }

        Ok(Self {
            filter_type,
            expressions: compiled,
        })
    }

    /// Parses the filter type, then compiles the expressions.
    pub fn from_config<I, S>(filter_type: &str, expressions: I) -> TrackingResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(filter_type.parse()?, expressions)
    }

    /// Returns the filter type.
    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    /// Returns `true` if any expression matches the start of `name`.
    pub fn matches(&self, name: &str) -> bool {
        self.expressions.iter().any(|regex| regex.is_match(name))
    }
}

impl Processor for RegexFilter {
    fn process(&self, event: &mut Event) -> ProcessorResult {
        let keep = match self.filter_type {
            FilterType::Allowlist => self.matches(event.name()),
            FilterType::Blocklist => !self.matches(event.name()),
        };
        Ok(if keep { Outcome::Keep } else { Outcome::Abort })
    }

    fn name(&self) -> &str {
        "regex_filter"
    }
}
