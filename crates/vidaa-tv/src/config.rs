//! Typed entry data and options

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;
use vidaa_config_entries::ConfigEntry;

use crate::consts::{
    DEFAULT_NAME, DEFAULT_PORT, DEFAULT_SCAN_INTERVAL, MAX_SCAN_INTERVAL, MIN_SCAN_INTERVAL,
    SCAN_INTERVAL_STEP,
};

/// Connection data stored in a Vidaa config entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VidaaEntryData {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_name")]
    pub name: String,
    /// `AA:BB:CC:DD:EE:FF`
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub sw_version: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_name() -> String {
    DEFAULT_NAME.to_string()
}

impl VidaaEntryData {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            name: DEFAULT_NAME.to_string(),
            mac: None,
            device_id: None,
            model: None,
            sw_version: None,
        }
    }

    pub fn from_entry(entry: &ConfigEntry) -> Result<Self, serde_json::Error> {
        entry.data_as()
    }

    /// The config entry's `data` map
    pub fn to_map(&self) -> HashMap<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map.into_iter().collect(),
            _ => HashMap::new(),
        }
    }

    /// Device identifier: stored device_id, else MAC, else the entry id
    pub fn device_key(&self, entry_id: &str) -> String {
        self.device_id
            .clone()
            .or_else(|| self.mac.clone())
            .unwrap_or_else(|| entry_id.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionsError {
    #[error("scan_interval must be a whole number of seconds")]
    NotANumber,

    #[error("scan_interval must be between {MIN_SCAN_INTERVAL} and {MAX_SCAN_INTERVAL} seconds")]
    OutOfRange,

    #[error("scan_interval must be a multiple of {SCAN_INTERVAL_STEP} seconds")]
    BadStep,
}

/// User options of a Vidaa entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VidaaOptions {
    #[serde(default = "default_scan_interval")]
    pub scan_interval: u64,
}

fn default_scan_interval() -> u64 {
    DEFAULT_SCAN_INTERVAL
}

impl Default for VidaaOptions {
    fn default() -> Self {
        Self {
            scan_interval: DEFAULT_SCAN_INTERVAL,
        }
    }
}

impl VidaaOptions {
    /// Options of an entry; stored values that would not pass the options
    /// flow fall back to defaults
    pub fn from_entry(entry: &ConfigEntry) -> Self {
        Self::parse(&entry.options).unwrap_or_else(|e| {
            warn!(entry_id = %entry.entry_id, error = %e, "Ignoring stored options");
            Self::default()
        })
    }

    /// Validate raw options input from the options flow
    pub fn parse(input: &HashMap<String, Value>) -> Result<Self, OptionsError> {
        let Some(raw) = input.get(crate::consts::CONF_SCAN_INTERVAL) else {
            return Ok(Self::default());
        };
        let seconds = match raw {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))
                .ok_or(OptionsError::NotANumber)?,
            _ => return Err(OptionsError::NotANumber),
        };

        if !(MIN_SCAN_INTERVAL..=MAX_SCAN_INTERVAL).contains(&seconds) {
            return Err(OptionsError::OutOfRange);
        }
        if seconds % SCAN_INTERVAL_STEP != 0 {
            return Err(OptionsError::BadStep);
        }
        Ok(Self {
            scan_interval: seconds,
        })
    }

    pub fn to_map(&self) -> HashMap<String, Value> {
        HashMap::from([(
            crate::consts::CONF_SCAN_INTERVAL.to_string(),
            Value::from(self.scan_interval),
        )])
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_data_defaults() {
        let entry = ConfigEntry::new("vidaa_tv", "TV").with_data(HashMap::from([(
            "host".to_string(),
            json!("192.168.1.50"),
        )]));
        let data = VidaaEntryData::from_entry(&entry).unwrap();
        assert_eq!(data.port, 36669);
        assert_eq!(data.name, "Vidaa TV");
        assert_eq!(data.device_key("entry1"), "entry1");
    }

    #[test]
    fn test_device_key_prefers_device_id() {
        let mut data = VidaaEntryData::new("10.0.0.2");
        data.mac = Some("AA:BB:CC:DD:EE:FF".into());
        assert_eq!(data.device_key("e"), "AA:BB:CC:DD:EE:FF");
        data.device_id = Some("dev".into());
        assert_eq!(data.device_key("e"), "dev");

        let map = data.to_map();
        assert_eq!(map.get("host"), Some(&json!("10.0.0.2")));
        assert_eq!(map.get("device_id"), Some(&json!("dev")));
    }

    #[test]
    fn test_scan_interval_validation() {
        let parse = |v: Value| {
            VidaaOptions::parse(&HashMap::from([("scan_interval".to_string(), v)]))
        };
        assert_eq!(parse(json!(60)).unwrap().scan_interval, 60);
        assert_eq!(parse(json!(10.0)).unwrap().scan_interval, 10);
        assert_eq!(parse(json!(5)), Err(OptionsError::OutOfRange));
        assert_eq!(parse(json!(305)), Err(OptionsError::OutOfRange));
        assert_eq!(parse(json!(42)), Err(OptionsError::BadStep));
        assert_eq!(parse(json!("30")), Err(OptionsError::NotANumber));
        assert_eq!(
            VidaaOptions::parse(&HashMap::new()).unwrap(),
            VidaaOptions::default()
        );
    }

    #[test]
    fn test_stored_options_are_validated() {
        let stored = |v: Value| {
            let entry = ConfigEntry::new("vidaa_tv", "TV")
                .with_options(HashMap::from([("scan_interval".to_string(), v)]));
            VidaaOptions::from_entry(&entry).scan_interval()
        };
        assert_eq!(stored(json!(45)), Duration::from_secs(45));
        assert_eq!(stored(json!(0)), Duration::from_secs(30));
        assert_eq!(stored(json!(7)), Duration::from_secs(30));
        assert_eq!(stored(json!("fast")), Duration::from_secs(30));
    }
}
