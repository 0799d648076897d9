//! Logging setup shared by test suites that embed the activation layer.
//!
//! ```ignore
//! use tcs_common::{LogConfig, init_logging};
//!
//! let _guards = init_logging(&LogConfig::from_env("info").with_stderr())?;
//! ```

use crate::config::{EnvError, EnvParser};
use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directive, e.g. `info` or `tcs=debug`.
    pub level: String,
    pub format: LogFormat,
    /// Write to stderr.
    pub stderr: bool,
    /// Directory for daily-rolling JSON log files.
    pub directory: Option<PathBuf>,
    /// Problems found while reading the environment.
    pub env_errors: Vec<EnvError>,
}

impl LogConfig {
    /// Read `TCS_LOG_LEVEL`, `TCS_LOG_FORMAT` and `TCS_LOG_DIR`.
    pub fn from_env(default_level: &str) -> Self {
        let mut parser = EnvParser::with_prefix("TCS_");
        let level = parser.get_log_level("LOG_LEVEL", default_level).into_inner();
        let format_raw = parser.get_string("LOG_FORMAT", "pretty").into_inner();
        let directory = parser
            .get_optional_string("LOG_DIR")
            .into_inner()
            .map(PathBuf::from);

        let mut env_errors = parser.take_errors();
        let format = LogFormat::parse(&format_raw).unwrap_or_else(|| {
            env_errors.push(EnvError::InvalidValue {
                var: parser.var_name("LOG_FORMAT"),
                expected: "pretty or json".to_string(),
                value: format_raw.clone(),
            });
            LogFormat::Pretty
        });

        Self {
            level,
            format,
            stderr: false,
            directory,
            env_errors,
        }
    }

    #[must_use]
    pub fn with_stderr(mut self) -> Self {
        self.stderr = true;
        self
    }

    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            stderr: true,
            directory: None,
            env_errors: Vec::new(),
        }
    }
}

/// Keeps background log writers alive; drop to flush.
#[must_use = "dropping the guards stops file logging"]
pub struct LoggingGuards {
    _guards: Vec<WorkerGuard>,
}

/// Install the global tracing subscriber described by `config`.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<LoggingGuards> {
    let filter = EnvFilter::try_new(&config.level)
        .with_context(|| format!("invalid log filter '{}'", config.level))?;

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    let mut guards = Vec::new();

    if config.stderr {
        let layer = match config.format {
            LogFormat::Pretty => fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .compact()
                .boxed(),
            LogFormat::Json => fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .boxed(),
        };
        layers.push(layer);
    }

    if let Some(directory) = &config.directory {
        std::fs::create_dir_all(directory)
            .with_context(|| format!("failed to create log directory {}", directory.display()))?;
        let appender = tracing_appender::rolling::daily(directory, "tcs.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        guards.push(guard);
        layers.push(
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true)
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("global tracing subscriber already installed")?;

    for error in &config.env_errors {
        tracing::warn!(var = error.var(), "{}", error);
    }

    Ok(LoggingGuards { _guards: guards })
}
