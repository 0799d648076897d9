//! Common types used across Test Cloud Support components.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Key identifying a packaged artifact in the blob store.
///
/// Typically `{artifactName}_{revision}`. Deduplication is by key identity:
/// two uploads under the same key are considered the same artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactKey(String);

impl ArtifactKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Build the conventional `{name}_{revision}` key.
    pub fn for_revision(name: &str, revision: &str) -> Self {
        Self(format!("{name}_{revision}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ArtifactKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Dereferenceable address of an uploaded blob.
///
/// Only blob store implementations create these; everything else passes them
/// through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(String);

impl Location {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier the device-cloud provider assigns to an uploaded app binary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CloudAppId(String);

impl CloudAppId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CloudAppId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Flat capability map handed to a test session at initialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capabilities(BTreeMap<String, Value>);

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Insert or replace a capability, returning the previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(name.into(), value.into())
    }

    /// Insert only if the capability is absent. Returns true if inserted.
    pub fn insert_if_absent(&mut self, name: impl Into<String>, value: impl Into<Value>) -> bool {
        let name = name.into();
        if self.0.contains_key(&name) {
            return false;
        }
        self.0.insert(name, value.into());
        true
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// String value of a capability, if present and a JSON string.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Union of `self` (the caller's map) with `defaults`.
    ///
    /// Keys already present in `self` are kept as-is; only missing keys are
    /// taken from `defaults`. Nothing is ever removed.
    #[must_use]
    pub fn extended_with(mut self, defaults: Capabilities) -> Self {
        for (name, value) in defaults.0 {
            self.0.entry(name).or_insert(value);
        }
        self
    }
}

impl FromIterator<(String, Value)> for Capabilities {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Capabilities {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_artifact_key_for_revision() {
        let key = ArtifactKey::for_revision("appium-uiautomator2-driver", "master");
        assert_eq!(key.as_str(), "appium-uiautomator2-driver_master");
        assert_eq!(key.to_string(), "appium-uiautomator2-driver_master");
    }

    #[test]
    fn test_insert_if_absent_keeps_existing() {
        let mut caps = Capabilities::new().with("app", "x");
        assert!(!caps.insert_if_absent("app", "y"));
        assert!(caps.insert_if_absent("device", "pixel"));
        assert_eq!(caps.get_str("app"), Some("x"));
        assert_eq!(caps.get_str("device"), Some("pixel"));
    }

    #[test]
    fn test_extended_with_caller_wins() {
        let caller = Capabilities::new()
            .with("app", "x")
            .with("testobject_api_key", "caller-key");
        let defaults = Capabilities::new()
            .with("testobject_api_key", "configured-key")
            .with("testobject_cache_device", true);

        let merged = caller.extended_with(defaults);
        assert_eq!(merged.get_str("testobject_api_key"), Some("caller-key"));
        assert_eq!(merged.get("testobject_cache_device"), Some(&json!(true)));
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn test_capabilities_serialize_flat() {
        let caps = Capabilities::new().with("a", 1).with("b", "two");
        let value = serde_json::to_value(&caps).unwrap();
        assert_eq!(value, json!({"a": 1, "b": "two"}));
    }

    proptest! {
        #[test]
        fn prop_extension_never_drops_or_overwrites_caller_keys(
            caller in proptest::collection::btree_map("[a-z]{1,6}", "[a-z0-9]{0,6}", 0..8),
            defaults in proptest::collection::btree_map("[a-z]{1,6}", "[a-z0-9]{0,6}", 0..8),
        ) {
            let caller_caps: Capabilities = caller
                .iter()
                .map(|(k, v)| (k.clone(), Value::from(v.clone())))
                .collect();
            let default_caps: Capabilities = defaults
                .iter()
                .map(|(k, v)| (k.clone(), Value::from(v.clone())))
                .collect();

            let merged = caller_caps.extended_with(default_caps);

            for (k, v) in &caller {
                prop_assert_eq!(merged.get_str(k), Some(v.as_str()));
            }
            for (k, v) in &defaults {
                if !caller.contains_key(k) {
                    prop_assert_eq!(merged.get_str(k), Some(v.as_str()));
                }
            }
        }
    }
}
