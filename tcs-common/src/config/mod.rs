//! Configuration system for Test Cloud Support.
//!
//! Settings come from the process environment (the variables the blob store
//! and device-cloud provider document) or from structs built by the caller.
//! This module provides:
//! - Environment variable parsing with type safety
//! - Source tracking for debugging

pub mod env;
pub mod source;

pub use env::{EnvError, EnvParser};
pub use source::{ConfigSource, Sourced};

