//! Shared types and utilities for Test Cloud Support.
//!
//! Everything the activation layer in `tcs` and its test suites share lives
//! here: the data model, environment-driven configuration, the error catalog,
//! logging setup, and test scaffolding.

pub mod config;
pub mod errors;
pub mod logging;
pub mod testing;
pub mod types;
pub mod util;

pub use config::{ConfigSource, EnvError, EnvParser, Sourced};
pub use errors::{ErrorCategory, ErrorCode, ErrorEntry};
pub use logging::{LogConfig, LogFormat, LoggingGuards, init_logging};
pub use types::{ArtifactKey, Capabilities, CloudAppId, Location};
pub use util::{mask_secret, masked_capabilities};
