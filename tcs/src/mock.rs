//! Deterministic in-memory collaborators for activation tests.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tcs_common::{ArtifactKey, Capabilities, CloudAppId, Location};

use crate::blob_store::BlobStore;
use crate::device_cloud::{AppUploader, DeviceCloudCredentials};
use crate::driver::{ConnectParams, Connector, Session};
use crate::error::{Error, Result};

/// `BlobStore` keeping objects in memory.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    base_url: Option<String>,
    objects: Mutex<BTreeMap<ArtifactKey, Vec<u8>>>,
    put_failures: Mutex<VecDeque<String>>,
    delete_failures: Mutex<VecDeque<String>>,
    exists_calls: AtomicUsize,
    put_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl MemoryBlobStore {
    /// Store whose locations are `{base_url}/{key}`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into().trim_end_matches('/').to_string()),
            ..Self::default()
        }
    }

    /// Store that fails every call like a store without a bucket.
    pub fn unconfigured() -> Self {
        Self::default()
    }

    fn base_url(&self) -> Result<&str> {
        self.base_url.as_deref().ok_or_else(|| Error::StoreConfig {
            missing: crate::blob_store::s3::BUCKET_VAR.to_string(),
        })
    }

    /// Store `bytes` under `key` without counting a `put`.
    pub fn seed(&self, key: &ArtifactKey, bytes: Vec<u8>) {
        self.objects
            .lock()
            .expect("objects mutex poisoned")
            .insert(key.clone(), bytes);
    }

    /// Make the next `put` fail with `cause`. Failures are consumed FIFO.
    pub fn fail_next_put(&self, cause: impl Into<String>) {
        self.put_failures
            .lock()
            .expect("put_failures mutex poisoned")
            .push_back(cause.into());
    }

    /// Make the next `delete` fail with `cause`. Failures are consumed FIFO.
    pub fn fail_next_delete(&self, cause: impl Into<String>) {
        self.delete_failures
            .lock()
            .expect("delete_failures mutex poisoned")
            .push_back(cause.into());
    }

    pub fn contains(&self, key: &ArtifactKey) -> bool {
        self.objects
            .lock()
            .expect("objects mutex poisoned")
            .contains_key(key)
    }

    pub fn object(&self, key: &ArtifactKey) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .expect("objects mutex poisoned")
            .get(key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().expect("objects mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn exists_calls(&self) -> usize {
        self.exists_calls.load(Ordering::SeqCst)
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn exists(&self, key: &ArtifactKey) -> Result<bool> {
        self.base_url()?;
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.contains(key))
    }

    async fn put(&self, key: &ArtifactKey, bytes: Vec<u8>) -> Result<Location> {
        let location = self.location_of(key)?;
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        // Give concurrent callers a chance to interleave, as a network write would.
        tokio::task::yield_now().await;

        let failure = self
            .put_failures
            .lock()
            .expect("put_failures mutex poisoned")
            .pop_front();
        if let Some(cause) = failure {
            return Err(Error::Upload {
                key: key.clone(),
                cause,
            });
        }
        self.seed(key, bytes);
        Ok(location)
    }

    async fn delete(&self, key: &ArtifactKey) -> Result<()> {
        self.base_url()?;
        self.delete_calls.fetch_add(1, Ordering::SeqCst);

        let failure = self
            .delete_failures
            .lock()
            .expect("delete_failures mutex poisoned")
            .pop_front();
        if let Some(cause) = failure {
            return Err(Error::Delete {
                key: key.clone(),
                cause,
            });
        }
        self.objects
            .lock()
            .expect("objects mutex poisoned")
            .remove(key);
        Ok(())
    }

    fn location_of(&self, key: &ArtifactKey) -> Result<Location> {
        Ok(Location::new(format!("{}/{}", self.base_url()?, key)))
    }
}

/// `AppUploader` returning scripted ids.
///
/// Without a scripted result, the n-th call returns `app-{n}`.
#[derive(Debug, Default)]
pub struct MockAppUploader {
    scripted: Mutex<VecDeque<std::result::Result<String, String>>>,
    calls: Mutex<Vec<PathBuf>>,
}

impl MockAppUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a successful upload returning `id`. Results are consumed FIFO.
    pub fn push_id(&self, id: impl Into<String>) {
        self.scripted
            .lock()
            .expect("scripted mutex poisoned")
            .push_back(Ok(id.into()));
    }

    /// Append a failing upload with a transport error carrying `cause`.
    pub fn push_failure(&self, cause: impl Into<String>) {
        self.scripted
            .lock()
            .expect("scripted mutex poisoned")
            .push_back(Err(cause.into()));
    }

    /// Paths of every upload attempt, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().expect("calls mutex poisoned").clone()
    }
}

#[async_trait]
impl AppUploader for MockAppUploader {
    async fn upload(
        &self,
        path: &Path,
        _credentials: &DeviceCloudCredentials,
    ) -> Result<CloudAppId> {
        let attempt = {
            let mut calls = self.calls.lock().expect("calls mutex poisoned");
            calls.push(path.to_path_buf());
            calls.len()
        };
        let scripted = self
            .scripted
            .lock()
            .expect("scripted mutex poisoned")
            .pop_front();
        match scripted {
            Some(Ok(id)) => Ok(CloudAppId::new(id)),
            Some(Err(cause)) => Err(Error::transport("mock://upload", cause)),
            None => Ok(CloudAppId::new(format!("app-{attempt}"))),
        }
    }
}

/// `Connector` recording every connection and session it serves.
#[derive(Debug, Clone, Default)]
pub struct RecordingConnector {
    connects: Arc<Mutex<Vec<ConnectParams>>>,
    inits: Arc<Mutex<Vec<Capabilities>>>,
    quits: Arc<AtomicUsize>,
}

impl RecordingConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameters of every `connect`, in order.
    #[must_use]
    pub fn connects(&self) -> Vec<ConnectParams> {
        self.connects.lock().expect("connects mutex poisoned").clone()
    }

    /// Capabilities of every session `init`, in order.
    #[must_use]
    pub fn inits(&self) -> Vec<Capabilities> {
        self.inits.lock().expect("inits mutex poisoned").clone()
    }

    pub fn quits(&self) -> usize {
        self.quits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for RecordingConnector {
    async fn connect(&self, params: ConnectParams) -> Result<Box<dyn Session>> {
        self.connects
            .lock()
            .expect("connects mutex poisoned")
            .push(params);
        Ok(Box::new(RecordingSession {
            inits: self.inits.clone(),
            quits: self.quits.clone(),
        }))
    }
}

/// Session handed out by [`RecordingConnector`].
#[derive(Debug)]
pub struct RecordingSession {
    inits: Arc<Mutex<Vec<Capabilities>>>,
    quits: Arc<AtomicUsize>,
}

#[async_trait]
impl Session for RecordingSession {
    async fn init(&mut self, capabilities: Capabilities) -> Result<()> {
        self.inits
            .lock()
            .expect("inits mutex poisoned")
            .push(capabilities);
        Ok(())
    }

    async fn quit(&mut self) -> Result<()> {
        self.quits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
