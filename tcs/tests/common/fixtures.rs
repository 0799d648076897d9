use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tcs::mock::{MemoryBlobStore, MockAppUploader, RecordingConnector};
use tcs::{AppIdentityCache, Connector, DeviceCloudClient, DeviceCloudConfig, Driver, TestCloud};
use tempfile::TempDir;

/// Write a fake app binary under `dir`.
pub fn write_app(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, b"fake app binary").expect("Failed to write app binary");
    path
}

/// A `TestCloud` over in-memory collaborators, plus one driver to redirect.
pub struct CloudFixture {
    pub dir: TempDir,
    pub app: PathBuf,
    pub store: Arc<MemoryBlobStore>,
    pub uploader: Arc<MockAppUploader>,
    pub cache: Arc<AppIdentityCache>,
    pub recorder: Arc<RecordingConnector>,
    pub original: Arc<dyn Connector>,
    pub driver: Arc<Driver>,
    pub cloud: TestCloud,
}

impl CloudFixture {
    pub fn new() -> Self {
        Self::with_config(DeviceCloudConfig::new("suite-user", "suite-api-key"))
    }

    pub fn with_config(config: DeviceCloudConfig) -> Self {
        crate::test_log!("FIXTURE: Creating in-memory device cloud");

        let dir = TempDir::new().expect("Failed to create temp dir");
        let app = write_app(dir.path(), "app.apk");

        let store = Arc::new(MemoryBlobStore::new("https://blobs.test"));
        let uploader = Arc::new(MockAppUploader::new());
        let cache = Arc::new(AppIdentityCache::new());
        let client = DeviceCloudClient::new(config, cache.clone(), uploader.clone());
        let cloud = TestCloud::new(store.clone(), Arc::new(client));

        let recorder = Arc::new(RecordingConnector::new());
        let original: Arc<dyn Connector> = recorder.clone();
        let driver = Arc::new(Driver::new(original.clone()));

        Self {
            dir,
            app,
            store,
            uploader,
            cache,
            recorder,
            original,
            driver,
            cloud,
        }
    }

    /// A second driver sharing this fixture's cloud.
    pub fn extra_driver(&self) -> (Arc<Driver>, Arc<RecordingConnector>) {
        let recorder = Arc::new(RecordingConnector::new());
        (Arc::new(Driver::new(recorder.clone())), recorder)
    }

    pub fn app_str(&self) -> String {
        self.app.to_string_lossy().into_owned()
    }
}
