//! Environment variable parsing with type safety.
//!
//! Provides a prefix-scoped parser for the variables the blob store and the
//! device-cloud provider are configured with, collecting validation errors
//! and tracking the source of every value.

use super::source::Sourced;
use std::env;
use thiserror::Error;

/// Errors that can occur during environment variable parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    /// A required variable is unset or empty.
    #[error("Must provide {var} in environment variables")]
    Missing { var: String },

    /// Invalid value for a variable.
    #[error("Invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: String,
        value: String,
    },

    /// Value out of valid range.
    #[error("Value out of range for {var}: {value} (valid: {min}..={max})")]
    OutOfRange {
        var: String,
        value: String,
        min: String,
        max: String,
    },

    /// Invalid log level.
    #[error("Invalid log level for {var}: {value}")]
    InvalidLogLevel { var: String, value: String },
}

impl EnvError {
    /// Name of the offending variable.
    pub fn var(&self) -> &str {
        match self {
            Self::Missing { var }
            | Self::InvalidValue { var, .. }
            | Self::OutOfRange { var, .. }
            | Self::InvalidLogLevel { var, .. } => var,
        }
    }
}

/// Prefix-scoped reader for environment variables.
///
/// Problems are collected rather than returned, so a caller can report every
/// bad variable at once and still get a usable value for each.
pub struct EnvParser {
    prefix: &'static str,
    errors: Vec<EnvError>,
}

impl EnvParser {
    /// Create a parser for variables starting with `prefix` (e.g. `AWS_`).
    pub fn with_prefix(prefix: &'static str) -> Self {
        Self {
            prefix,
            errors: Vec::new(),
        }
    }

    pub fn errors(&self) -> &[EnvError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Drain the collected errors.
    pub fn take_errors(&mut self) -> Vec<EnvError> {
        std::mem::take(&mut self.errors)
    }

    /// `name` with the parser's prefix.
    pub fn var_name(&self, name: &str) -> String {
        format!("{}{name}", self.prefix)
    }

    /// Full variable name and its value; unset and non-UTF-8 both read as `None`.
    fn read(&self, name: &str) -> (String, Option<String>) {
        let var = self.var_name(name);
        let value = env::var(&var).ok();
        (var, value)
    }

    /// String value, or `default` when unset or empty.
    pub fn get_string(&mut self, name: &str, default: &str) -> Sourced<String> {
        match self.read(name) {
            (var, Some(value)) if !value.is_empty() => Sourced::from_env(value, var),
            _ => Sourced::default_value(default.to_string()),
        }
    }

    /// Optional string. An empty value counts as unset but keeps its source.
    pub fn get_optional_string(&mut self, name: &str) -> Sourced<Option<String>> {
        match self.read(name) {
            (var, Some(value)) => {
                let value = (!value.is_empty()).then_some(value);
                Sourced::from_env(value, var)
            }
            (_, None) => Sourced::default_value(None),
        }
    }

    /// Required string; records [`EnvError::Missing`] when unset or empty.
    pub fn require_string(&mut self, name: &str) -> Option<String> {
        let value = self.get_optional_string(name).into_inner();
        if value.is_none() {
            let var = self.var_name(name);
            self.errors.push(EnvError::Missing { var });
        }
        value
    }

    /// Port-style number within `min..=max`; anything else falls back to
    /// `default` and records an error.
    pub fn get_u16_range(&mut self, name: &str, default: u16, min: u16, max: u16) -> Sourced<u16> {
        let (var, raw) = match self.read(name) {
            (var, Some(raw)) => (var, raw),
            (_, None) => return Sourced::default_value(default),
        };
        match raw.trim().parse::<u16>() {
            Ok(n) if (min..=max).contains(&n) => Sourced::from_env(n, var),
            Ok(n) => {
                self.errors.push(EnvError::OutOfRange {
                    var: var.clone(),
                    value: n.to_string(),
                    min: min.to_string(),
                    max: max.to_string(),
                });
                Sourced::from_env(default, var)
            }
            Err(_) => {
                self.errors.push(EnvError::InvalidValue {
                    var,
                    expected: "unsigned 16-bit integer".to_string(),
                    value: raw,
                });
                Sourced::default_value(default)
            }
        }
    }

    /// `tracing` level name, lowercased. Unknown names fall back to `default`.
    pub fn get_log_level(&mut self, name: &str, default: &str) -> Sourced<String> {
        const LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];
        let (var, raw) = match self.read(name) {
            (var, Some(raw)) => (var, raw),
            (_, None) => return Sourced::default_value(default.to_string()),
        };
        let level = raw.to_lowercase();
        if LEVELS.contains(&level.as_str()) {
            return Sourced::from_env(level, var);
        }
        self.errors.push(EnvError::InvalidLogLevel {
            var: var.clone(),
            value: raw,
        });
        Sourced::from_env(default.to_string(), var)
    }
}
