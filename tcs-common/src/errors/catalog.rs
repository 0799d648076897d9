//! Stable error codes for Test Cloud Support.
//!
//! Each failure the activation layer reports carries a `TCS-Exxx` code, a
//! one-line message, the steps that usually fix it and, for provider-side
//! failures, a link to the device-cloud web UI.
//!
//! | Range      | Category    | Covers                                   |
//! |------------|-------------|------------------------------------------|
//! | E001-E099  | Config      | Missing or invalid configuration         |
//! | E100-E199  | Store       | Blob store packaging, upload and cleanup |
//! | E200-E299  | DeviceCloud | Device-cloud app upload                  |
//! | E300-E399  | Driver      | Client interception state machine        |
//! | E500-E599  | Internal    | Logging setup and other internal faults  |

use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};

/// Manual upload page of the device-cloud provider.
pub const DEVICE_CLOUD_UPLOAD_UI: &str = "https://app.testobject.com";

const CODE_PREFIX: &str = "TCS-E";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ErrorCode {
    // Config
    /// Required environment variable or config value is absent
    ConfigMissingVar,
    ConfigInvalidValue,
    /// Blob store has no bucket configured
    StoreNotConfigured,
    /// Session capabilities lack a required entry
    CapabilityMissing,

    // Store
    StoreUploadFailed,
    StoreDeleteFailed,
    /// Local artifact could not be packaged for upload
    StorePackagingFailed,

    // Device cloud
    AppUploadFailed,
    /// Device-cloud endpoint returned an error or was unreachable
    DeviceCloudTransport,
    /// Local app binary could not be inspected
    AppStatFailed,

    // Driver
    DriverAlreadyActivated,
    DriverNotActivated,
    DriverCallFailed,

    // Internal
    InternalLoggingError,
}

impl ErrorCode {
    /// Every code, in numeric order.
    pub const ALL: &'static [ErrorCode] = &[
        Self::ConfigMissingVar,
        Self::ConfigInvalidValue,
        Self::StoreNotConfigured,
        Self::CapabilityMissing,
        Self::StoreUploadFailed,
        Self::StoreDeleteFailed,
        Self::StorePackagingFailed,
        Self::AppUploadFailed,
        Self::DeviceCloudTransport,
        Self::AppStatFailed,
        Self::DriverAlreadyActivated,
        Self::DriverNotActivated,
        Self::DriverCallFailed,
        Self::InternalLoggingError,
    ];

    #[must_use]
    pub const fn code_number(&self) -> u16 {
        match self {
            Self::ConfigMissingVar => 1,
            Self::ConfigInvalidValue => 2,
            Self::StoreNotConfigured => 3,
            Self::CapabilityMissing => 4,
            Self::StoreUploadFailed => 100,
            Self::StoreDeleteFailed => 101,
            Self::StorePackagingFailed => 102,
            Self::AppUploadFailed => 200,
            Self::DeviceCloudTransport => 201,
            Self::AppStatFailed => 202,
            Self::DriverAlreadyActivated => 300,
            Self::DriverNotActivated => 301,
            Self::DriverCallFailed => 302,
            Self::InternalLoggingError => 500,
        }
    }

    /// `TCS-E` followed by the zero-padded number, e.g. `TCS-E001`.
    #[must_use]
    pub fn code_string(&self) -> String {
        format!("{CODE_PREFIX}{:03}", self.code_number())
    }

    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self.code_number() / 100 {
            0 => ErrorCategory::Config,
            1 => ErrorCategory::Store,
            2 => ErrorCategory::DeviceCloud,
            3 => ErrorCategory::Driver,
            _ => ErrorCategory::Internal,
        }
    }

    /// Owned snapshot of this code's catalog data, suitable for serializing.
    #[must_use]
    pub fn entry(&self) -> ErrorEntry {
        ErrorEntry {
            code: self.code_string(),
            category: self.category(),
            message: self.message().to_owned(),
            remediation: self.remediation().iter().map(|step| step.to_string()).collect(),
            doc_url: self.doc_url().map(str::to_owned),
        }
    }

    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::ConfigMissingVar => "Required configuration value is not set",
            Self::ConfigInvalidValue => "Environment variable has invalid value",
            Self::StoreNotConfigured => "Blob store bucket is not configured",
            Self::CapabilityMissing => "Session capabilities are missing a required entry",
            Self::StoreUploadFailed => "Failed to upload artifact to the blob store",
            Self::StoreDeleteFailed => "Failed to delete artifact from the blob store",
            Self::StorePackagingFailed => "Failed to prepare local artifact for upload",
            Self::AppUploadFailed => "Failed to upload app binary to the device cloud",
            Self::DeviceCloudTransport => "Device-cloud request failed",
            Self::AppStatFailed => "Could not read app binary metadata",
            Self::DriverAlreadyActivated => "Driver is already redirected to the device cloud",
            Self::DriverNotActivated => "Driver is not redirected by this activation",
            Self::DriverCallFailed => "Test driver call failed",
            Self::InternalLoggingError => "Failed to initialize logging",
        }
    }

    #[must_use]
    pub const fn remediation(&self) -> &'static [&'static str] {
        match self {
            Self::ConfigMissingVar => &[
                "Export the variable named in the error before running the suite",
                "TESTOBJECT_USERNAME and TESTOBJECT_API_KEY are required for device-cloud runs",
            ],
            Self::ConfigInvalidValue => &["Fix the value of the variable named in the error"],
            Self::StoreNotConfigured => &[
                "Set AWS_S3_BUCKET to the bucket artifacts should be uploaded to",
                "Set AWS_REGION if the bucket is not in us-east-1",
            ],
            Self::CapabilityMissing => &[
                "Pass an 'app' capability pointing at the local app binary to session init",
            ],
            Self::StoreUploadFailed => &[
                "Check that the S3 environment variables are set correctly",
                "Verify the AWS credentials (environment, profile or instance role) can write to the bucket",
            ],
            Self::StoreDeleteFailed => &[
                "The uploaded object expires after one day; removing it manually is optional",
            ],
            Self::StorePackagingFailed => &[
                "Check that the artifact path exists and is readable",
                "Package the artifact (e.g. zip the directory) before enabling the device cloud",
            ],
            Self::AppUploadFailed => &[
                "Upload the app manually through the device-cloud web UI, then re-run",
                "Check TESTOBJECT_USERNAME and TESTOBJECT_API_KEY",
            ],
            Self::DeviceCloudTransport => &[
                "Check network access to the device-cloud host",
                "Inspect the response body in the error for provider details",
            ],
            Self::AppStatFailed => &["Check that the 'app' capability points at an existing file"],
            Self::DriverAlreadyActivated => &[
                "Disable the current activation before enabling the device cloud again",
            ],
            Self::DriverNotActivated => &[
                "Pass the handle returned by the matching enable call",
                "Each handle can be disabled only once",
            ],
            Self::DriverCallFailed => &["Inspect the driver error for details"],
            Self::InternalLoggingError => &["Check TCS_LOG_DIR permissions and TCS_LOG_LEVEL"],
        }
    }

    /// Provider failures link to the manual upload page.
    #[must_use]
    pub const fn doc_url(&self) -> Option<&'static str> {
        match self {
            Self::AppUploadFailed | Self::DeviceCloudTransport => Some(DEVICE_CLOUD_UPLOAD_UI),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code_string(), self.message())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Config,
    Store,
    DeviceCloud,
    Driver,
    Internal,
}

impl ErrorCategory {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Config => "Configuration",
            Self::Store => "Blob Store",
            Self::DeviceCloud => "Device Cloud",
            Self::Driver => "Driver",
            Self::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Catalog data for one code, detached from the enum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// e.g. `TCS-E001`
    pub code: String,
    pub category: ErrorCategory,
    pub message: String,
    pub remediation: Vec<String>,
    pub doc_url: Option<String>,
}

impl ErrorEntry {
    /// Multi-line rendering: code and message, numbered remediation steps,
    /// then the documentation link.
    #[must_use]
    pub fn format_full(&self) -> String {
        let mut out = self.format_brief();
        out.push_str("\n\n");
        let mut steps = (1..).zip(&self.remediation).peekable();
        if steps.peek().is_some() {
            out.push_str("Remediation steps:\n");
        }
        for (n, step) in steps {
            let _ = writeln!(out, "  {n}. {step}");
        }
        if let Some(url) = self.doc_url.as_deref() {
            let _ = writeln!(out, "\nFor more information: {url}");
        }
        out
    }

    /// `[TCS-Exxx] message` on one line.
    #[must_use]
    pub fn format_brief(&self) -> String {
        format!("[{}] {}", self.code, self.message)
    }
}

impl fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_brief())
    }
}
