//! Suite-level enable/disable of device-cloud redirection.
//!
//! ```ignore
//! let cloud = TestCloud::from_env().await?;
//! let handle = cloud
//!     .enable(&driver, ArtifactKey::for_revision("appium", &rev), || package_file("appium.zip"))
//!     .await?;
//! // ... run the suite ...
//! cloud.disable(handle).await?;
//! ```

use std::future::Future;
use std::sync::Arc;

use tcs_common::{ArtifactKey, Location};
use tracing::{info, warn};

use crate::artifact_cache::ArtifactCache;
use crate::blob_store::{BlobStore, S3BlobStore};
use crate::device_cloud::DeviceCloudClient;
use crate::driver::Driver;
use crate::error::Result;
use crate::interceptor::{ClientInterceptor, InterceptToken};

/// Live activation returned by [`TestCloud::enable`].
#[derive(Debug)]
pub struct ActivationHandle {
    token: InterceptToken,
    blob_key: ArtifactKey,
    location: Location,
    driver: Arc<Driver>,
}

impl ActivationHandle {
    pub fn blob_key(&self) -> &ArtifactKey {
        &self.blob_key
    }

    /// Where the server artifact was uploaded.
    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn driver(&self) -> &Arc<Driver> {
        &self.driver
    }

    pub fn activation_id(&self) -> u64 {
        self.token.id()
    }
}

/// Result of [`TestCloud::disable`]. The driver is always restored; blob
/// cleanup may have failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisableOutcome {
    pub blob_key: ArtifactKey,
    pub cleanup_error: Option<String>,
}

impl DisableOutcome {
    pub fn cleaned_up(&self) -> bool {
        self.cleanup_error.is_none()
    }
}

/// Ties artifact upload and driver interception together.
pub struct TestCloud {
    store: Arc<dyn BlobStore>,
    artifacts: ArtifactCache,
    interceptor: ClientInterceptor,
}

impl std::fmt::Debug for TestCloud {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestCloud")
            .field("artifacts", &self.artifacts)
            .field("interceptor", &self.interceptor)
            .finish_non_exhaustive()
    }
}

impl TestCloud {
    pub fn new(store: Arc<dyn BlobStore>, client: Arc<DeviceCloudClient>) -> Self {
        Self {
            artifacts: ArtifactCache::new(store.clone()),
            store,
            interceptor: ClientInterceptor::new(client),
        }
    }

    /// S3 store, HTTP uploader and a fresh app id cache, all configured from
    /// the environment.
    pub async fn from_env() -> Result<Self> {
        let store = Arc::new(S3BlobStore::from_env().await);
        let client = Arc::new(DeviceCloudClient::from_env()?);
        Ok(Self::new(store, client))
    }

    pub fn artifacts(&self) -> &ArtifactCache {
        &self.artifacts
    }

    pub fn interceptor(&self) -> &ClientInterceptor {
        &self.interceptor
    }

    /// Upload the server artifact under `key` (once) and redirect `driver`.
    ///
    /// Nothing is patched unless every step succeeds. An artifact uploaded
    /// before a failed activation stays cached under its key.
    pub async fn enable<F, Fut>(
        &self,
        driver: &Arc<Driver>,
        key: ArtifactKey,
        package: F,
    ) -> Result<ActivationHandle>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Vec<u8>>>,
    {
        let location = self.artifacts.get_or_upload(&key, package).await?;
        let token = self.interceptor.activate(driver, &location)?;
        info!(
            key = %key,
            activation = token.id(),
            "Device cloud enabled with server at {}", location
        );
        Ok(ActivationHandle {
            token,
            blob_key: key,
            location,
            driver: driver.clone(),
        })
    }

    /// Restore the driver, then remove the uploaded artifact.
    ///
    /// A failed removal is logged and reported in the outcome; it never
    /// fails `disable` once the driver is restored.
    pub async fn disable(&self, handle: ActivationHandle) -> Result<DisableOutcome> {
        let ActivationHandle {
            token,
            blob_key,
            driver,
            ..
        } = handle;
        self.interceptor.deactivate(&driver, token)?;

        let cleanup_error = match self.store.delete(&blob_key).await {
            Ok(()) => {
                info!(key = %blob_key, "Device cloud disabled");
                None
            }
            Err(e) => {
                warn!(key = %blob_key, "Could not remove uploaded artifact: {}", e);
                Some(e.to_string())
            }
        };
        Ok(DisableOutcome {
            blob_key,
            cleanup_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_identity::AppIdentityCache;
    use crate::device_cloud::DeviceCloudConfig;
    use crate::driver::Connector;
    use crate::error::Error;
    use crate::mock::{MemoryBlobStore, MockAppUploader, RecordingConnector};

    fn setup() -> (TestCloud, Arc<MemoryBlobStore>, Arc<Driver>, Arc<dyn Connector>) {
        let store = Arc::new(MemoryBlobStore::new("https://blobs.test"));
        let client = DeviceCloudClient::new(
            DeviceCloudConfig::new("user", "key"),
            Arc::new(AppIdentityCache::new()),
            Arc::new(MockAppUploader::new()),
        );
        let cloud = TestCloud::new(store.clone(), Arc::new(client));
        let original: Arc<dyn Connector> = Arc::new(RecordingConnector::new());
        let driver = Arc::new(Driver::new(original.clone()));
        (cloud, store, driver, original)
    }

    #[tokio::test]
    async fn test_enable_then_disable() {
        let (cloud, store, driver, original) = setup();
        let key = ArtifactKey::new("app_v1");

        let handle = cloud
            .enable(&driver, key.clone(), || async { Ok(b"zip".to_vec()) })
            .await
            .unwrap();
        assert!(driver.is_patched());
        assert_eq!(handle.location().as_str(), "https://blobs.test/app_v1");
        assert_eq!(handle.blob_key(), &key);

        let outcome = cloud.disable(handle).await.unwrap();
        assert!(outcome.cleaned_up());
        assert!(!driver.is_patched());
        assert!(Arc::ptr_eq(&driver.connector(), &original));
        assert!(!store.contains(&key));
    }

    #[tokio::test]
    async fn test_failed_upload_leaves_driver_unpatched() {
        let (cloud, store, driver, original) = setup();
        store.fail_next_put("HTTP 403");

        let err = cloud
            .enable(&driver, ArtifactKey::new("app_v1"), || async {
                Ok(b"zip".to_vec())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Upload { .. }));
        assert!(!driver.is_patched());
        assert!(Arc::ptr_eq(&driver.connector(), &original));
    }

    #[tokio::test]
    async fn test_failed_activation_keeps_upload_cached() {
        let (cloud, store, driver, _original) = setup();
        let first = cloud
            .enable(&driver, ArtifactKey::new("app_v1"), || async {
                Ok(b"zip".to_vec())
            })
            .await
            .unwrap();
        let patched = driver.connector();

        let err = cloud
            .enable(&driver, ArtifactKey::new("app_v2"), || async {
                Ok(b"zip2".to_vec())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::AlreadyActivated));
        assert!(Arc::ptr_eq(&driver.connector(), &patched));
        assert!(store.contains(&ArtifactKey::new("app_v2")));
        cloud.disable(first).await.unwrap();
    }

    #[tokio::test]
    async fn test_disable_with_failing_delete_still_restores() {
        let (cloud, store, driver, original) = setup();
        let handle = cloud
            .enable(&driver, ArtifactKey::new("app_v1"), || async {
                Ok(b"zip".to_vec())
            })
            .await
            .unwrap();
        store.fail_next_delete("HTTP 503");

        let outcome = cloud.disable(handle).await.unwrap();

        assert!(!outcome.cleaned_up());
        assert!(outcome.cleanup_error.unwrap().contains("HTTP 503"));
        assert!(!driver.is_patched());
        assert!(Arc::ptr_eq(&driver.connector(), &original));
    }
}
