//! Device-cloud app id cache keyed by local binary path.
//!
//! An entry stays valid while the binary's last-modified time is strictly
//! earlier than the moment it was uploaded. Entries never expire by age.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tcs_common::CloudAppId;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Provider id of an uploaded binary and when it was uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppIdentityEntry {
    pub id: CloudAppId,
    pub uploaded_at_epoch_millis: i64,
}

impl AppIdentityEntry {
    pub fn new(id: CloudAppId, uploaded_at_epoch_millis: i64) -> Self {
        Self {
            id,
            uploaded_at_epoch_millis,
        }
    }

    /// Whether a binary last modified at `modified_epoch_millis` is the one
    /// this entry was uploaded from.
    pub fn is_fresh_for(&self, modified_epoch_millis: i64) -> bool {
        modified_epoch_millis < self.uploaded_at_epoch_millis
    }
}

/// Process-scoped cache of device-cloud app ids.
///
/// Two cold-cache `resolve` calls for the same path may both upload; the
/// later one's entry wins.
#[derive(Debug, Default)]
pub struct AppIdentityCache {
    entries: RwLock<HashMap<PathBuf, AppIdentityEntry>>,
}

async fn modified_epoch_millis(path: &Path) -> Result<i64> {
    let stat_error = |source| Error::Stat {
        path: path.to_path_buf(),
        source,
    };
    let modified = tokio::fs::metadata(path)
        .await
        .and_then(|metadata| metadata.modified())
        .map_err(stat_error)?;
    Ok(DateTime::<Utc>::from(modified).timestamp_millis())
}

impl AppIdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached id for `path` while it is fresh, otherwise upload
    /// it with `upload` and remember the new id.
    ///
    /// A cached path that can no longer be stat'ed fails with
    /// [`Error::Stat`] instead of re-uploading.
    pub async fn resolve<F, Fut>(&self, path: &Path, upload: F) -> Result<CloudAppId>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: Future<Output = Result<CloudAppId>>,
    {
        let cached = self.get(path).await;
        if let Some(entry) = cached {
            let modified = modified_epoch_millis(path).await?;
            if entry.is_fresh_for(modified) {
                debug!(
                    path = %path.display(),
                    app_id = %entry.id,
                    "Using cached device-cloud app id"
                );
                return Ok(entry.id);
            }
            info!(
                path = %path.display(),
                "App binary changed since last upload, uploading again"
            );
        }

        let id = upload(path.to_path_buf()).await?;
        let entry = AppIdentityEntry::new(id.clone(), Utc::now().timestamp_millis());
        self.insert(path, entry).await;
        Ok(id)
    }

    pub async fn get(&self, path: &Path) -> Option<AppIdentityEntry> {
        self.entries.read().await.get(path).cloned()
    }

    /// Seed or overwrite the entry for `path`.
    pub async fn insert(&self, path: &Path, entry: AppIdentityEntry) {
        self.entries.write().await.insert(path.to_path_buf(), entry);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}
