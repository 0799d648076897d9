//! Test scaffolding: environment snapshots and log capture.

pub mod env;
pub mod log;

pub use env::{EnvGuard, process_env_lock};
pub use log::{LogCapture, init_test_logging, strip_ansi};
