//! Remote object store holding packaged server artifacts.
//!
//! The store is addressed by [`ArtifactKey`]; the [`Location`] it hands back is
//! what the device cloud downloads the artifact from.

pub mod s3;

use async_trait::async_trait;
use tcs_common::{ArtifactKey, Location};

use crate::error::Result;

pub use s3::{S3BlobStore, S3Config};

/// Capability surface over a remote object store.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Whether an object is stored under `key`.
    ///
    /// A missing key is `Ok(false)`. Only an unconfigured store is an error;
    /// probe failures report `false` so the following `put` surfaces them.
    async fn exists(&self, key: &ArtifactKey) -> Result<bool>;

    /// Store `bytes` under `key` and return where it can be fetched from.
    async fn put(&self, key: &ArtifactKey, bytes: Vec<u8>) -> Result<Location>;

    /// Remove the object under `key`. Removing a missing key succeeds.
    async fn delete(&self, key: &ArtifactKey) -> Result<()>;

    /// Address of `key` derived from configuration alone.
    fn location_of(&self, key: &ArtifactKey) -> Result<Location>;
}
