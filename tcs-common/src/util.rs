//! Shared utilities for Test Cloud Support.

use crate::types::Capabilities;
use serde_json::Value;

/// Capability names whose values must never reach a log line.
const SENSITIVE_CAPABILITY_MARKERS: &[&str] = &["api_key", "apikey", "password", "secret", "token"];

/// Mask a secret for logging, keeping at most the last four characters.
///
/// Short secrets are masked entirely so nothing useful leaks.
pub fn mask_secret(secret: &str) -> String {
    let count = secret.chars().count();
    if count <= 8 {
        return "***".to_string();
    }
    let tail: String = secret.chars().skip(count - 4).collect();
    format!("***{tail}")
}

fn is_sensitive(name: &str) -> bool {
    let lower = name.to_lowercase();
    SENSITIVE_CAPABILITY_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Copy of `caps` with credential-like values masked, for debug logging.
pub fn masked_capabilities(caps: &Capabilities) -> Capabilities {
    caps.iter()
        .map(|(name, value)| {
            let value = if is_sensitive(name) {
                match value {
                    Value::String(s) => Value::String(mask_secret(s)),
                    _ => Value::String("***".to_string()),
                }
            } else {
                value.clone()
            };
            (name.clone(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_secret_short_is_fully_hidden() {
        assert_eq!(mask_secret(""), "***");
        assert_eq!(mask_secret("foobar"), "***");
    }

    #[test]
    fn test_mask_secret_keeps_tail() {
        assert_eq!(mask_secret("0123456789ABCDEF"), "***CDEF");
    }

    #[test]
    fn test_masked_capabilities_hides_api_key_only() {
        let caps = Capabilities::new()
            .with("testobject_api_key", "0123456789ABCDEF")
            .with("testobject_device", "Google_Pixel_real")
            .with("accessToken", 42);

        let masked = masked_capabilities(&caps);
        assert_eq!(masked.get_str("testobject_api_key"), Some("***CDEF"));
        assert_eq!(masked.get_str("testobject_device"), Some("Google_Pixel_real"));
        assert_eq!(masked.get_str("accessToken"), Some("***"));
    }
}
