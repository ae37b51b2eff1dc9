//! Payloads reported by the TV

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `statetype` reported while the TV is in standby
pub const STATE_FAKE_SLEEP: &str = "fake_sleep_0";

pub const STATETYPE_APP: &str = "app";
pub const STATETYPE_SOURCE: &str = "sourceswitch";

fn mac_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^([0-9a-fA-F]{2}[:-]){5}[0-9a-fA-F]{2}").ok())
        .as_ref()
}

/// Normalize a MAC address to `AA:BB:CC:DD:EE:FF`
///
/// Returns `None` when the text does not start with a MAC address.
pub fn normalize_mac(raw: &str) -> Option<String> {
    let found = mac_pattern()?.find(raw.trim())?;
    Some(found.as_str().to_uppercase().replace('-', ":"))
}

/// Result of the device info query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tv_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tv_version: Option<String>,
    /// Interface family in use, e.g. "wlan" or "eth"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_type: Option<String>,
    /// Per-interface MAC addresses (`wlan0`, `eth0`, ...) and anything else
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl DeviceInfo {
    fn interface(&self, name: &str) -> Option<&str> {
        self.extra
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Raw MAC of the active interface, falling back to wlan0 then eth0
    pub fn raw_mac(&self) -> Option<&str> {
        let active = self
            .network_type
            .as_deref()
            .filter(|t| !t.is_empty())
            .and_then(|t| self.interface(&format!("{}0", t)));
        active
            .or_else(|| self.interface("wlan0"))
            .or_else(|| self.interface("eth0"))
    }

    /// Validated MAC address in `AA:BB:CC:DD:EE:FF` form
    pub fn mac_address(&self) -> Option<String> {
        self.raw_mac().and_then(normalize_mac)
    }
}

/// Current TV state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TvState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statetype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub displayname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sourcename: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl TvState {
    pub fn is_fake_sleep(&self) -> bool {
        self.statetype.as_deref() == Some(STATE_FAKE_SLEEP)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppInfo {
    pub name: String,
    #[serde(default, rename = "appId", skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sourceid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sourcename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub displayname: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl SourceInfo {
    /// Name shown to users: `displayname`, else `sourcename`
    pub fn label(&self) -> Option<&str> {
        self.displayname
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.sourcename.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mac_from_active_interface() {
        let info: DeviceInfo = serde_json::from_value(json!({
            "tv_name": "Living Room",
            "model_name": "55A7",
            "network_type": "eth",
            "eth0": "aa-bb-cc-dd-ee-ff",
            "wlan0": "11:22:33:44:55:66"
        }))
        .unwrap();

        assert_eq!(info.tv_name.as_deref(), Some("Living Room"));
        assert_eq!(info.mac_address().as_deref(), Some("AA:BB:CC:DD:EE:FF"));
    }

    #[test]
    fn test_mac_fallbacks() {
        let info: DeviceInfo = serde_json::from_value(json!({
            "network_type": "",
            "wlan0": "",
            "eth0": "01:02:03:04:05:0a"
        }))
        .unwrap();
        assert_eq!(info.mac_address().as_deref(), Some("01:02:03:04:05:0A"));

        let invalid: DeviceInfo =
            serde_json::from_value(json!({ "wlan0": "not-a-mac" })).unwrap();
        assert_eq!(invalid.raw_mac(), Some("not-a-mac"));
        assert!(invalid.mac_address().is_none());
    }

    #[test]
    fn test_state_fake_sleep() {
        let state: TvState =
            serde_json::from_value(json!({ "statetype": "fake_sleep_0" })).unwrap();
        assert!(state.is_fake_sleep());

        let app: TvState =
            serde_json::from_value(json!({ "statetype": "app", "name": "netflix", "url": "x" }))
                .unwrap();
        assert!(!app.is_fake_sleep());
        assert_eq!(app.extra.get("url"), Some(&json!("x")));
    }

    #[test]
    fn test_source_label() {
        let source: SourceInfo =
            serde_json::from_value(json!({ "sourceid": "4", "sourcename": "HDMI1" })).unwrap();
        assert_eq!(source.label(), Some("HDMI1"));

        let named: SourceInfo = serde_json::from_value(
            json!({ "sourcename": "HDMI1", "displayname": "PlayStation" }),
        )
        .unwrap();
        assert_eq!(named.label(), Some("PlayStation"));
    }
}
