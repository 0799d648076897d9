//! Device-cloud provider client.
//!
//! Uploads the app under test to the provider, keeps the returned id in an
//! [`AppIdentityCache`], and builds the capabilities a redirected session
//! needs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tcs_common::errors::DEVICE_CLOUD_UPLOAD_UI;
use tcs_common::{Capabilities, CloudAppId, EnvParser, masked_capabilities};
use tracing::{debug, info, warn};

use crate::app_identity::AppIdentityCache;
use crate::error::{Error, Result};

pub const CAP_APP: &str = "app";
pub const CAP_PLATFORM_NAME: &str = "platformName";
pub const CAP_PLATFORM_VERSION: &str = "platformVersion";
pub const CAP_APP_ID: &str = "testobject_app_id";
pub const CAP_API_KEY: &str = "testobject_api_key";
pub const CAP_DEVICE: &str = "testobject_device";
pub const CAP_CACHE_DEVICE: &str = "testobject_cache_device";
pub const CAP_REMOTE_APPIUM_URL: &str = "testobject_remote_appium_url";

pub const DEFAULT_HOST: &str = "app.testobject.com";
pub const DEFAULT_PORT: u16 = 443;
pub const DEFAULT_DEVICE: &str = "Google_Pixel_real";
pub const DEFAULT_ANDROID_DEVICE: &str = "Samsung_Galaxy_S9_real";
pub const DEFAULT_IOS_DEVICE: &str = "iPhone_8_real";

pub const USERNAME_VAR: &str = "TESTOBJECT_USERNAME";
pub const API_KEY_VAR: &str = "TESTOBJECT_API_KEY";

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(600);
const UPLOAD_PATH: &str = "/api/storage/upload";

/// Account credentials for the provider API.
#[derive(Clone)]
pub struct DeviceCloudCredentials {
    pub username: String,
    pub api_key: String,
}

impl std::fmt::Debug for DeviceCloudCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceCloudCredentials")
            .field("username", &self.username)
            .field("api_key", &tcs_common::mask_secret(&self.api_key))
            .finish()
    }
}

/// Provider account and session defaults.
///
/// Credentials are optional here and checked when a session is built, so a
/// suite that never starts a redirected session needs none.
#[derive(Clone)]
pub struct DeviceCloudConfig {
    pub username: Option<String>,
    pub api_key: Option<String>,
    /// Overrides the platform default device.
    pub device: Option<String>,
    pub platform_version: Option<String>,
    pub host: String,
    pub port: u16,
}

impl Default for DeviceCloudConfig {
    fn default() -> Self {
        Self {
            username: None,
            api_key: None,
            device: None,
            platform_version: None,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl std::fmt::Debug for DeviceCloudConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceCloudConfig")
            .field("username", &self.username)
            .field(
                "api_key",
                &self.api_key.as_deref().map(tcs_common::mask_secret),
            )
            .field("device", &self.device)
            .field("platform_version", &self.platform_version)
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

impl DeviceCloudConfig {
    pub fn new(username: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    #[must_use]
    pub fn with_platform_version(mut self, version: impl Into<String>) -> Self {
        self.platform_version = Some(version.into());
        self
    }

    /// Read the `TESTOBJECT_*` variables.
    ///
    /// Invalid `TESTOBJECT_PORT` values fall back to the default with a warning.
    pub fn from_env() -> Self {
        let mut parser = EnvParser::with_prefix("TESTOBJECT_");
        let config = Self {
            username: parser.get_optional_string("USERNAME").into_inner(),
            api_key: parser.get_optional_string("API_KEY").into_inner(),
            device: parser.get_optional_string("DEVICE").into_inner(),
            platform_version: parser.get_optional_string("PLATFORM_VERSION").into_inner(),
            host: parser.get_string("HOST", DEFAULT_HOST).into_inner(),
            port: parser
                .get_u16_range("PORT", DEFAULT_PORT, 1, u16::MAX)
                .into_inner(),
        };
        for error in parser.take_errors() {
            warn!("{}", error);
        }
        config
    }

    /// Both credentials, or a [`Error::Config`] naming the first missing one.
    pub fn credentials(&self) -> Result<DeviceCloudCredentials> {
        let username = self
            .username
            .clone()
            .ok_or_else(|| Error::config(USERNAME_VAR))?;
        let api_key = self
            .api_key
            .clone()
            .ok_or_else(|| Error::config(API_KEY_VAR))?;
        Ok(DeviceCloudCredentials { username, api_key })
    }

    /// Device to request for a session on `platform_name`.
    pub fn device_for(&self, platform_name: Option<&str>) -> String {
        if let Some(device) = &self.device {
            return device.clone();
        }
        match platform_name.map(str::to_ascii_lowercase).as_deref() {
            Some("ios") => DEFAULT_IOS_DEVICE.to_string(),
            Some("android") => DEFAULT_ANDROID_DEVICE.to_string(),
            _ => DEFAULT_DEVICE.to_string(),
        }
    }
}

/// Uploads an app binary to the provider and returns its id.
#[async_trait]
pub trait AppUploader: Send + Sync {
    async fn upload(&self, path: &Path, credentials: &DeviceCloudCredentials)
    -> Result<CloudAppId>;
}

/// `AppUploader` over the provider's storage REST endpoint.
#[derive(Debug, Clone)]
pub struct HttpAppUploader {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAppUploader {
    pub fn new(host: &str, port: u16) -> Result<Self> {
        Self::with_endpoint(format!("https://{host}:{port}{UPLOAD_PATH}"))
    }

    /// Uploader posting to `endpoint` verbatim.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self> {
        let endpoint = endpoint.into();
        let client = reqwest::Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(|e| Error::transport(&endpoint, format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, endpoint })
    }

    pub fn from_config(config: &DeviceCloudConfig) -> Result<Self> {
        Self::new(&config.host, config.port)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AppUploader for HttpAppUploader {
    async fn upload(
        &self,
        path: &Path,
        credentials: &DeviceCloudCredentials,
    ) -> Result<CloudAppId> {
        let bytes = tokio::fs::read(path).await.map_err(|source| Error::Stat {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(
            path = %path.display(),
            size = bytes.len(),
            "Uploading app to {}", self.endpoint
        );

        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&credentials.username, Some(&credentials.api_key))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(|e| Error::transport(&self.endpoint, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::transport(&self.endpoint, e))?;
        if !status.is_success() {
            return Err(Error::transport(
                &self.endpoint,
                format!("HTTP {status}: {}", body.trim()),
            ));
        }
        let id = body.trim();
        if id.is_empty() {
            return Err(Error::transport(
                &self.endpoint,
                format!("HTTP {status} with empty app id"),
            ));
        }
        Ok(CloudAppId::new(id))
    }
}

/// Builds device-cloud session capabilities, uploading the app when needed.
pub struct DeviceCloudClient {
    config: DeviceCloudConfig,
    cache: Arc<AppIdentityCache>,
    uploader: Arc<dyn AppUploader>,
}

impl std::fmt::Debug for DeviceCloudClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceCloudClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DeviceCloudClient {
    pub fn new(
        config: DeviceCloudConfig,
        cache: Arc<AppIdentityCache>,
        uploader: Arc<dyn AppUploader>,
    ) -> Self {
        Self {
            config,
            cache,
            uploader,
        }
    }

    /// Client over the HTTP uploader with a fresh cache, configured from the
    /// environment.
    pub fn from_env() -> Result<Self> {
        let config = DeviceCloudConfig::from_env();
        let uploader = Arc::new(HttpAppUploader::from_config(&config)?);
        Ok(Self::new(config, Arc::new(AppIdentityCache::new()), uploader))
    }

    pub fn config(&self) -> &DeviceCloudConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<AppIdentityCache> {
        &self.cache
    }

    /// Upload the binary at `path` and return its provider id.
    ///
    /// On failure, logs where the binary can be uploaded by hand.
    pub async fn upload_app(&self, path: &Path) -> Result<CloudAppId> {
        let credentials = self.config.credentials()?;
        info!(path = %path.display(), "Uploading app to the device cloud");
        match self.uploader.upload(path, &credentials).await {
            Ok(id) => {
                info!(path = %path.display(), app_id = %id, "Uploaded app to the device cloud");
                Ok(id)
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    "Could not upload {} to the device cloud. Upload it manually at {} and retry",
                    path.display(),
                    DEVICE_CLOUD_UPLOAD_UI
                );
                Err(e)
            }
        }
    }

    /// Extend `requested` with everything the provider needs.
    ///
    /// Keys already present in `requested` are never overwritten.
    pub async fn build_session_capabilities(
        &self,
        requested: &Capabilities,
    ) -> Result<Capabilities> {
        let credentials = self.config.credentials()?;

        let app = requested
            .get_str(CAP_APP)
            .map(PathBuf::from)
            .ok_or_else(|| Error::MissingCapability {
                name: CAP_APP.to_string(),
            })?;

        let app_id = self
            .cache
            .resolve(&app, |path| async move { self.upload_app(&path).await })
            .await
            .map_err(|source| Error::AppUpload {
                path: app.clone(),
                source: Box::new(source),
            })?;

        let device = self.config.device_for(requested.get_str(CAP_PLATFORM_NAME));

        let mut provider = Capabilities::new()
            .with(CAP_APP_ID, app_id.as_str())
            .with(CAP_DEVICE, device)
            .with(CAP_API_KEY, credentials.api_key)
            .with(CAP_CACHE_DEVICE, Value::Bool(true));
        if let Some(version) = &self.config.platform_version {
            provider.insert(CAP_PLATFORM_VERSION, version.as_str());
        }

        let capabilities = requested.clone().extended_with(provider);
        debug!(
            "Device-cloud session capabilities: {}",
            serde_json::to_string(&masked_capabilities(&capabilities)).unwrap_or_default()
        );
        Ok(capabilities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockAppUploader;
    use tcs_common::testing::{EnvGuard, LogCapture};

    fn app_file(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("app.apk");
        std::fs::write(&path, b"apk").unwrap();
        path
    }

    fn client(config: DeviceCloudConfig, uploader: Arc<MockAppUploader>) -> DeviceCloudClient {
        DeviceCloudClient::new(config, Arc::new(AppIdentityCache::new()), uploader)
    }

    fn requested(app: &Path) -> Capabilities {
        Capabilities::new().with(CAP_APP, app.to_string_lossy().to_string())
    }

    #[tokio::test]
    async fn test_builds_provider_capabilities() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_file(&dir);
        let uploader = Arc::new(MockAppUploader::new());
        uploader.push_id("1234");
        let client = client(DeviceCloudConfig::new("user", "secret-key"), uploader.clone());

        let caps = client
            .build_session_capabilities(&requested(&app))
            .await
            .unwrap();

        assert_eq!(caps.get_str(CAP_APP_ID), Some("1234"));
        assert_eq!(caps.get_str(CAP_API_KEY), Some("secret-key"));
        assert_eq!(caps.get_str(CAP_DEVICE), Some(DEFAULT_DEVICE));
        assert_eq!(caps.get(CAP_CACHE_DEVICE), Some(&Value::Bool(true)));
        assert!(!caps.contains_key(CAP_PLATFORM_VERSION));
        assert_eq!(caps.get_str(CAP_APP), Some(app.to_string_lossy().as_ref()));
        assert_eq!(uploader.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_caller_keys_win() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_file(&dir);
        let client = client(
            DeviceCloudConfig::new("user", "env-key").with_platform_version("12"),
            Arc::new(MockAppUploader::new()),
        );
        let requested = requested(&app)
            .with(CAP_API_KEY, "caller-key")
            .with(CAP_PLATFORM_VERSION, "11");

        let caps = client.build_session_capabilities(&requested).await.unwrap();

        assert_eq!(caps.get_str(CAP_API_KEY), Some("caller-key"));
        assert_eq!(caps.get_str(CAP_PLATFORM_VERSION), Some("11"));
    }

    #[tokio::test]
    async fn test_platform_version_added_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_file(&dir);
        let client = client(
            DeviceCloudConfig::new("user", "key").with_platform_version("13.0"),
            Arc::new(MockAppUploader::new()),
        );

        let caps = client
            .build_session_capabilities(&requested(&app))
            .await
            .unwrap();

        assert_eq!(caps.get_str(CAP_PLATFORM_VERSION), Some("13.0"));
    }

    #[test]
    fn test_device_selection() {
        let config = DeviceCloudConfig::new("user", "key");
        assert_eq!(config.device_for(Some("iOS")), DEFAULT_IOS_DEVICE);
        assert_eq!(config.device_for(Some("ANDROID")), DEFAULT_ANDROID_DEVICE);
        assert_eq!(config.device_for(Some("windows")), DEFAULT_DEVICE);
        assert_eq!(config.device_for(None), DEFAULT_DEVICE);

        let pinned = config.with_device("Pixel_7_real");
        assert_eq!(pinned.device_for(Some("ios")), "Pixel_7_real");
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_before_upload() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_file(&dir);
        let uploader = Arc::new(MockAppUploader::new());
        let config = DeviceCloudConfig {
            username: Some("user".to_string()),
            ..DeviceCloudConfig::default()
        };
        let client = client(config, uploader.clone());

        let err = client
            .build_session_capabilities(&requested(&app))
            .await
            .unwrap_err();

        match err {
            Error::Config { var } => assert_eq!(var, API_KEY_VAR),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(uploader.calls().is_empty());
    }

    #[tokio::test]
    async fn test_username_checked_first() {
        let client = client(DeviceCloudConfig::default(), Arc::new(MockAppUploader::new()));
        let err = client
            .build_session_capabilities(&Capabilities::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config { ref var } if var == USERNAME_VAR));
    }

    #[tokio::test]
    async fn test_missing_app_capability() {
        let client = client(
            DeviceCloudConfig::new("user", "key"),
            Arc::new(MockAppUploader::new()),
        );
        let err = client
            .build_session_capabilities(&Capabilities::new().with(CAP_PLATFORM_NAME, "iOS"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingCapability { ref name } if name == CAP_APP));
    }

    #[tokio::test]
    async fn test_upload_failure_wrapped_and_logged() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_file(&dir);
        let uploader = Arc::new(MockAppUploader::new());
        uploader.push_failure("HTTP 401");
        let client = client(DeviceCloudConfig::new("user", "key"), uploader);
        let capture = LogCapture::new().strip_colors(true);

        let err = {
            let _default = capture.install();
            client
                .build_session_capabilities(&requested(&app))
                .await
                .unwrap_err()
        };

        match &err {
            Error::AppUpload { path, source } => {
                assert_eq!(path, &app);
                assert!(matches!(**source, Error::Transport { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(capture.contents().contains(&format!(
            "warn: Could not upload {} to the device cloud. Upload it manually at {}",
            app.display(),
            DEVICE_CLOUD_UPLOAD_UI
        )));
        assert!(client.cache().is_empty().await);
    }

    #[tokio::test]
    async fn test_second_session_reuses_app_id() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_file(&dir);
        // Let the upload timestamp move past the file's mtime.
        tokio::time::sleep(Duration::from_millis(5)).await;
        let uploader = Arc::new(MockAppUploader::new());
        let client = client(DeviceCloudConfig::new("user", "key"), uploader.clone());

        let first = client
            .build_session_capabilities(&requested(&app))
            .await
            .unwrap();
        let second = client
            .build_session_capabilities(&requested(&app))
            .await
            .unwrap();

        assert_eq!(first.get(CAP_APP_ID), second.get(CAP_APP_ID));
        assert_eq!(uploader.calls().len(), 1);
    }

    #[test]
    fn test_config_from_env() {
        let mut env = EnvGuard::new();
        env.set("TESTOBJECT_USERNAME", "user");
        env.set("TESTOBJECT_API_KEY", "foobar");
        env.set("TESTOBJECT_DEVICE", "iPhone_X_real");
        env.remove("TESTOBJECT_PLATFORM_VERSION");
        env.remove("TESTOBJECT_HOST");
        env.set("TESTOBJECT_PORT", "not-a-port");

        let config = DeviceCloudConfig::from_env();
        assert_eq!(config.username.as_deref(), Some("user"));
        assert_eq!(config.api_key.as_deref(), Some("foobar"));
        assert_eq!(config.device.as_deref(), Some("iPhone_X_real"));
        assert!(config.platform_version.is_none());
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn test_config_debug_masks_api_key() {
        let config = DeviceCloudConfig::new("user", "0123456789abcdef");
        let debug = format!("{config:?}");
        assert!(!debug.contains("0123456789abcdef"));
        assert!(debug.contains("***cdef"));
    }

    #[test]
    fn test_http_uploader_endpoint() {
        let uploader = HttpAppUploader::new("app.testobject.com", 443).unwrap();
        assert_eq!(
            uploader.endpoint(),
            "https://app.testobject.com:443/api/storage/upload"
        );
    }
}
