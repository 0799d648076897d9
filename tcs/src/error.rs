//! Errors surfaced by the activation layer.

use std::path::PathBuf;

use tcs_common::errors::DEVICE_CLOUD_UPLOAD_UI;
use tcs_common::{ArtifactKey, ErrorCode, ErrorEntry};

pub type Result<T> = std::result::Result<T, Error>;

/// Every failure `enable`, `disable` and the components behind them report.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Must provide {var} in environment variables")]
    Config { var: String },

    #[error("Blob store is not configured: {missing} is not set")]
    StoreConfig { missing: String },

    #[error("Could not package artifact {key}: {source:#}")]
    Packaging {
        key: ArtifactKey,
        #[source]
        source: anyhow::Error,
    },

    #[error(
        "Could not upload {key}: {cause}. Check that you have set the S3 environment variables correctly"
    )]
    Upload { key: ArtifactKey, cause: String },

    #[error("Could not delete {key}: {cause}")]
    Delete { key: ArtifactKey, cause: String },

    #[error(
        "Could not upload {} to the device cloud: {source}. Upload it manually at {} and retry",
        .path.display(),
        DEVICE_CLOUD_UPLOAD_UI
    )]
    AppUpload {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    #[error("Request to {endpoint} failed: {cause}")]
    Transport { endpoint: String, cause: String },

    #[error("Could not stat {}: {source}", .path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Session capabilities must include '{name}'")]
    MissingCapability { name: String },

    #[error("Driver call failed: {0}")]
    Driver(String),

    #[error("Driver is already redirected to the device cloud")]
    AlreadyActivated,

    #[error("Driver is not redirected by this activation")]
    NotActivated,
}

impl Error {
    pub(crate) fn config(var: impl Into<String>) -> Self {
        Self::Config { var: var.into() }
    }

    pub(crate) fn transport(endpoint: impl Into<String>, cause: impl ToString) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            cause: cause.to_string(),
        }
    }

    /// Stable catalog code for this failure.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Config { .. } => ErrorCode::ConfigMissingVar,
            Self::StoreConfig { .. } => ErrorCode::StoreNotConfigured,
            Self::Packaging { .. } => ErrorCode::StorePackagingFailed,
            Self::Upload { .. } => ErrorCode::StoreUploadFailed,
            Self::Delete { .. } => ErrorCode::StoreDeleteFailed,
            Self::AppUpload { .. } => ErrorCode::AppUploadFailed,
            Self::Transport { .. } => ErrorCode::DeviceCloudTransport,
            Self::Stat { .. } => ErrorCode::AppStatFailed,
            Self::MissingCapability { .. } => ErrorCode::CapabilityMissing,
            Self::Driver(_) => ErrorCode::DriverCallFailed,
            Self::AlreadyActivated => ErrorCode::DriverAlreadyActivated,
            Self::NotActivated => ErrorCode::DriverNotActivated,
        }
    }

    /// Catalog entry with remediation steps.
    #[must_use]
    pub fn entry(&self) -> ErrorEntry {
        self.code().entry()
    }
}
