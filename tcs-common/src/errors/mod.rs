//! Error codes shared by every Test Cloud Support crate. See [`catalog`].

pub mod catalog;

pub use catalog::{DEVICE_CLOUD_UPLOAD_UI, ErrorCategory, ErrorCode, ErrorEntry};
