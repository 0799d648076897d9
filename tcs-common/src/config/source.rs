//! Source tracking for configuration values.

use serde::Serialize;

/// Where a configuration value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    /// Read from an environment variable.
    Environment,
    /// Built-in default.
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Environment => write!(f, "environment"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// A configuration value together with its origin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sourced<T> {
    pub value: T,
    pub source: ConfigSource,
    /// Environment variable name, when `source` is `Environment`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub var: Option<String>,
}

impl<T> Sourced<T> {
    pub fn from_env(value: T, var: impl Into<String>) -> Self {
        Self {
            value,
            source: ConfigSource::Environment,
            var: Some(var.into()),
        }
    }

    pub fn default_value(value: T) -> Self {
        Self {
            value,
            source: ConfigSource::Default,
            var: None,
        }
    }

    pub fn is_default(&self) -> bool {
        self.source == ConfigSource::Default
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sourced_from_env_records_var() {
        let sourced = Sourced::from_env(42u32, "TESTOBJECT_PORT");
        assert_eq!(sourced.source, ConfigSource::Environment);
        assert_eq!(sourced.var.as_deref(), Some("TESTOBJECT_PORT"));
        assert!(!sourced.is_default());
    }

    #[test]
    fn test_sourced_default_has_no_var() {
        let sourced = Sourced::default_value("us-east-1".to_string());
        assert!(sourced.is_default());
        assert!(sourced.var.is_none());
        assert_eq!(sourced.into_inner(), "us-east-1");
    }
}
