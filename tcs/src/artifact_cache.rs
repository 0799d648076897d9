//! Upload-once cache for packaged server artifacts.
//!
//! Deduplication is by key identity: once something is stored under a key,
//! later calls reuse its location even if the local source changed. Callers
//! that want a fresh upload pick a new key (e.g. `{name}_{revision}`).

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use tcs_common::{ArtifactKey, Location};
use tracing::{debug, info};

use crate::blob_store::BlobStore;
use crate::error::{Error, Result};

type KeyLock = Arc<tokio::sync::Mutex<()>>;

/// Decides whether a prior upload can be reused and uploads on a miss.
pub struct ArtifactCache {
    store: Arc<dyn BlobStore>,
    key_locks: Mutex<HashMap<ArtifactKey, KeyLock>>,
}

impl ArtifactCache {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    fn lock_for(&self, key: &ArtifactKey) -> KeyLock {
        let mut locks = self
            .key_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(key.clone()).or_default().clone()
    }

    fn release(&self, key: &ArtifactKey, lock: KeyLock) {
        let mut locks = self
            .key_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // One reference in the map plus ours: nobody else is waiting.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
        drop(lock);
    }

    /// Return the location of `key`, packaging and uploading it first when
    /// the store does not have it yet.
    ///
    /// Concurrent calls for the same key are serialized, so only the first
    /// one packages and uploads.
    pub async fn get_or_upload<F, Fut>(&self, key: &ArtifactKey, package: F) -> Result<Location>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Vec<u8>>>,
    {
        let lock = self.lock_for(key);
        let result = {
            let _held = lock.lock().await;
            self.upload_if_missing(key, package).await
        };
        self.release(key, lock);
        result
    }

    async fn upload_if_missing<F, Fut>(&self, key: &ArtifactKey, package: F) -> Result<Location>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Vec<u8>>>,
    {
        if self.store.exists(key).await? {
            let location = self.store.location_of(key)?;
            info!(key = %key, "Artifact already uploaded at {}", location);
            return Ok(location);
        }

        debug!(key = %key, "Artifact not in blob store, packaging");
        let bytes = package().await.map_err(|source| Error::Packaging {
            key: key.clone(),
            source,
        })?;
        self.store.put(key, bytes).await
    }
}

impl std::fmt::Debug for ArtifactCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pending = self
            .key_locks
            .lock()
            .map(|locks| locks.len())
            .unwrap_or_default();
        f.debug_struct("ArtifactCache")
            .field("pending_keys", &pending)
            .finish_non_exhaustive()
    }
}

/// Read an already-packaged artifact (e.g. a zip) from disk.
pub async fn package_file(path: impl AsRef<Path>) -> anyhow::Result<Vec<u8>> {
    let path = path.as_ref();
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Could not find {}", path.display()))
}
