//! Reversible redirection of a driver's sessions to the device cloud.
//!
//! Activation installs a [`Connector`] that wraps the driver's current one:
//! connection parameters get the device-cloud endpoint filled in, and every
//! session's `init` receives the provider capabilities plus the URL of the
//! uploaded server artifact. Deactivation puts the captured connector back.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tcs_common::{Capabilities, Location};
use tracing::{debug, info};

use crate::device_cloud::{CAP_REMOTE_APPIUM_URL, DeviceCloudClient};
use crate::driver::{ConnectParams, Connector, Driver, Session};
use crate::error::Result;

static NEXT_ACTIVATION: AtomicU64 = AtomicU64::new(1);

/// Proof of one activation: the connector it replaced and its id.
pub struct InterceptToken {
    id: u64,
    original: Arc<dyn Connector>,
}

impl InterceptToken {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Connector that was in the slot before activation.
    pub fn original(&self) -> &Arc<dyn Connector> {
        &self.original
    }
}

impl std::fmt::Debug for InterceptToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptToken")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Installs and removes the device-cloud connector on drivers.
#[derive(Debug, Clone)]
pub struct ClientInterceptor {
    client: Arc<DeviceCloudClient>,
    endpoint: ConnectParams,
}

impl ClientInterceptor {
    pub fn new(client: Arc<DeviceCloudClient>) -> Self {
        let config = client.config();
        let endpoint = ConnectParams::new()
            .with_host(config.host.clone())
            .with_port(config.port)
            .with_https(true);
        Self { client, endpoint }
    }

    pub fn client(&self) -> &Arc<DeviceCloudClient> {
        &self.client
    }

    /// Device-cloud defaults merged into every connection.
    pub fn endpoint(&self) -> &ConnectParams {
        &self.endpoint
    }

    /// Redirect `driver` to the device cloud, with sessions pointed at the
    /// server artifact at `remote_artifact_url`.
    ///
    /// Fails with [`Error::AlreadyActivated`](crate::Error::AlreadyActivated) and leaves the driver untouched
    /// when another activation owns it.
    pub fn activate(&self, driver: &Driver, remote_artifact_url: &Location) -> Result<InterceptToken> {
        let id = NEXT_ACTIVATION.fetch_add(1, Ordering::Relaxed);
        let original = driver.install(id, |inner| -> Arc<dyn Connector> {
            Arc::new(CloudConnector {
                inner,
                client: self.client.clone(),
                endpoint: self.endpoint.clone(),
                remote_artifact_url: remote_artifact_url.clone(),
            })
        })?;
        info!(
            activation = id,
            "Driver redirected to {}:{}",
            self.client.config().host,
            self.client.config().port
        );
        Ok(InterceptToken { id, original })
    }

    /// Restore the connector `token` captured.
    ///
    /// Fails with [`Error::NotActivated`](crate::Error::NotActivated) when `driver` is not patched or is
    /// patched by a different activation.
    pub fn deactivate(&self, driver: &Driver, token: InterceptToken) -> Result<()> {
        driver.restore(token.id, token.original)?;
        info!(activation = token.id, "Driver redirection removed");
        Ok(())
    }
}

struct CloudConnector {
    inner: Arc<dyn Connector>,
    client: Arc<DeviceCloudClient>,
    endpoint: ConnectParams,
    remote_artifact_url: Location,
}

#[async_trait]
impl Connector for CloudConnector {
    async fn connect(&self, params: ConnectParams) -> Result<Box<dyn Session>> {
        let params = params.filled_from(&self.endpoint);
        debug!(
            host = ?params.host,
            port = ?params.port,
            https = ?params.https,
            "Connecting through the device cloud"
        );
        let inner = self.inner.connect(params).await?;
        Ok(Box::new(CloudSession {
            inner,
            client: self.client.clone(),
            remote_artifact_url: self.remote_artifact_url.clone(),
        }))
    }
}

struct CloudSession {
    inner: Box<dyn Session>,
    client: Arc<DeviceCloudClient>,
    remote_artifact_url: Location,
}

#[async_trait]
impl Session for CloudSession {
    async fn init(&mut self, capabilities: Capabilities) -> Result<()> {
        let mut capabilities = self.client.build_session_capabilities(&capabilities).await?;
        capabilities.insert(CAP_REMOTE_APPIUM_URL, self.remote_artifact_url.as_str());
        self.inner.init(capabilities).await
    }

    async fn quit(&mut self) -> Result<()> {
        self.inner.quit().await
    }
}
