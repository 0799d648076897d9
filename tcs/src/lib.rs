//! Test Cloud Support - device-cloud activation layer.
//!
//! Redirects a test driver's sessions to a device-cloud provider for the
//! length of a test suite and undoes the redirection afterwards:
//!
//! 1. [`ArtifactCache`] uploads the packaged server artifact to a
//!    [`BlobStore`] once per [`ArtifactKey`].
//! 2. [`ClientInterceptor`] swaps the [`Driver`]'s connector for a wrapper
//!    that points connections at the device cloud and injects capabilities
//!    from [`DeviceCloudClient`] when a session initializes.
//! 3. [`TestCloud`] ties both together with all-or-nothing `enable` and
//!    best-effort-cleanup `disable`.

#![forbid(unsafe_code)]

pub mod app_identity;
pub mod artifact_cache;
pub mod blob_store;
pub mod device_cloud;
pub mod driver;
pub mod error;
pub mod interceptor;
pub mod lifecycle;
pub mod mock;

pub use app_identity::{AppIdentityCache, AppIdentityEntry};
pub use artifact_cache::{ArtifactCache, package_file};
pub use blob_store::{BlobStore, S3BlobStore, S3Config};
pub use device_cloud::{
    AppUploader, DeviceCloudClient, DeviceCloudConfig, DeviceCloudCredentials, HttpAppUploader,
};
pub use driver::{ConnectParams, Connector, Driver, Session};
pub use error::{Error, Result};
pub use interceptor::{ClientInterceptor, InterceptToken};
pub use lifecycle::{ActivationHandle, DisableOutcome, TestCloud};
pub use tcs_common::{ArtifactKey, Capabilities, CloudAppId, Location};
