//! Test-driver surface the activation layer redirects.
//!
//! A [`Driver`] owns a swappable [`Connector`]; connecting hands back a
//! [`Session`] whose `init` receives the session capabilities. The interceptor
//! replaces the connector while a device-cloud activation is live and puts
//! the original back afterwards.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tcs_common::Capabilities;

use crate::error::{Error, Result};

/// Connection parameters a connector receives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectParams {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub https: Option<bool>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ConnectParams {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    #[must_use]
    pub fn with_https(mut self, https: bool) -> Self {
        self.https = Some(https);
        self
    }

    #[must_use]
    pub fn with_extra(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }

    /// Fill absent fields from `defaults`; values already set are kept.
    #[must_use]
    pub fn filled_from(mut self, defaults: &ConnectParams) -> Self {
        if self.host.is_none() {
            self.host = defaults.host.clone();
        }
        if self.port.is_none() {
            self.port = defaults.port;
        }
        if self.https.is_none() {
            self.https = defaults.https;
        }
        for (name, value) in &defaults.extra {
            self.extra
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
        self
    }
}

/// A driver session awaiting its capabilities.
#[async_trait]
pub trait Session: Send {
    async fn init(&mut self, capabilities: Capabilities) -> Result<()>;

    async fn quit(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Builds sessions from connection parameters.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, params: ConnectParams) -> Result<Box<dyn Session>>;
}

struct DriverState {
    connector: Arc<dyn Connector>,
    activation: Option<u64>,
}

/// Owner of the connector slot.
pub struct Driver {
    state: RwLock<DriverState>,
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("activation", &self.read().activation)
            .finish_non_exhaustive()
    }
}

impl Driver {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            state: RwLock::new(DriverState {
                connector,
                activation: None,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, DriverState> {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, DriverState> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Connector currently in the slot.
    pub fn connector(&self) -> Arc<dyn Connector> {
        self.read().connector.clone()
    }

    /// Whether a device-cloud activation currently owns the slot.
    pub fn is_patched(&self) -> bool {
        self.read().activation.is_some()
    }

    /// Connect through whatever connector is in the slot right now.
    pub async fn connect(&self, params: ConnectParams) -> Result<Box<dyn Session>> {
        let connector = self.connector();
        connector.connect(params).await
    }

    /// Swap in `wrap(original)` and return the original, unless an
    /// activation already owns the slot.
    pub(crate) fn install<F>(&self, activation: u64, wrap: F) -> Result<Arc<dyn Connector>>
    where
        F: FnOnce(Arc<dyn Connector>) -> Arc<dyn Connector>,
    {
        let mut state = self.write();
        if state.activation.is_some() {
            return Err(Error::AlreadyActivated);
        }
        let original = state.connector.clone();
        state.connector = wrap(original.clone());
        state.activation = Some(activation);
        Ok(original)
    }

    /// Put `original` back if `activation` owns the slot.
    pub(crate) fn restore(&self, activation: u64, original: Arc<dyn Connector>) -> Result<()> {
        let mut state = self.write();
        if state.activation != Some(activation) {
            return Err(Error::NotActivated);
        }
        state.connector = original;
        state.activation = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::RecordingConnector;
    use proptest::prelude::*;

    #[test]
    fn test_filled_from_keeps_caller_values() {
        let defaults = ConnectParams::new()
            .with_host("cloud.example")
            .with_port(443)
            .with_https(true)
            .with_extra("path", "/wd/hub");
        let params = ConnectParams::new()
            .with_host("localhost")
            .with_extra("path", "/custom")
            .with_extra("timeout", 30)
            .filled_from(&defaults);

        assert_eq!(params.host.as_deref(), Some("localhost"));
        assert_eq!(params.port, Some(443));
        assert_eq!(params.https, Some(true));
        assert_eq!(params.extra["path"], "/custom");
        assert_eq!(params.extra["timeout"], 30);
    }

    #[test]
    fn test_params_serialize_flat() {
        let params = ConnectParams::new().with_port(4723).with_extra("path", "/wd/hub");
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["port"], 4723);
        assert_eq!(json["path"], "/wd/hub");
    }

    #[test]
    fn test_install_and_restore() {
        let original: Arc<dyn Connector> = Arc::new(RecordingConnector::new());
        let driver = Driver::new(original.clone());
        let replacement: Arc<dyn Connector> = Arc::new(RecordingConnector::new());

        let captured = driver.install(7, |_| replacement.clone()).unwrap();
        assert!(Arc::ptr_eq(&captured, &original));
        assert!(Arc::ptr_eq(&driver.connector(), &replacement));
        assert!(driver.is_patched());

        assert!(matches!(
            driver.install(8, |inner| inner),
            Err(Error::AlreadyActivated)
        ));
        assert!(matches!(
            driver.restore(8, captured.clone()),
            Err(Error::NotActivated)
        ));

        driver.restore(7, captured).unwrap();
        assert!(Arc::ptr_eq(&driver.connector(), &original));
        assert!(!driver.is_patched());
        assert!(matches!(
            driver.restore(7, original.clone()),
            Err(Error::NotActivated)
        ));
    }

    #[tokio::test]
    async fn test_connect_uses_current_connector() {
        let connector = Arc::new(RecordingConnector::new());
        let driver = Driver::new(connector.clone());

        let mut session = driver
            .connect(ConnectParams::new().with_port(4723))
            .await
            .unwrap();
        session
            .init(Capabilities::new().with("app", "/tmp/app.apk"))
            .await
            .unwrap();

        assert_eq!(connector.connects()[0].port, Some(4723));
        assert_eq!(connector.inits()[0].get_str("app"), Some("/tmp/app.apk"));
    }

    fn params() -> impl Strategy<Value = ConnectParams> {
        (
            proptest::option::of("[a-z]{1,8}\\.example"),
            proptest::option::of(any::<u16>()),
            proptest::option::of(any::<bool>()),
            proptest::collection::btree_map("[a-z]{1,6}", "[a-z0-9]{0,6}", 0..6),
        )
            .prop_map(|(host, port, https, extra)| ConnectParams {
                host,
                port,
                https,
                extra: extra
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            })
    }

    proptest! {
        #[test]
        fn prop_filled_from_never_overwrites_caller_fields(
            caller in params(),
            defaults in params(),
        ) {
            let filled = caller.clone().filled_from(&defaults);

            prop_assert_eq!(filled.host.as_ref(), caller.host.as_ref().or(defaults.host.as_ref()));
            prop_assert_eq!(filled.port, caller.port.or(defaults.port));
            prop_assert_eq!(filled.https, caller.https.or(defaults.https));
            for (name, value) in &caller.extra {
                prop_assert_eq!(filled.extra.get(name), Some(value));
            }
            for name in defaults.extra.keys() {
                prop_assert!(filled.extra.contains_key(name));
            }
        }
    }
}
