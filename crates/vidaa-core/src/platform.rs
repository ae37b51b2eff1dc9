//! Entity platforms exposed by the integration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown platform: {0}")]
pub struct UnknownPlatform(pub String);

/// An entity platform (the domain part of its entity IDs)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    MediaPlayer,
    Remote,
    Button,
    Sensor,
    Switch,
}

impl Platform {
    /// Platforms in the order they are set up
    pub const ALL: [Platform; 5] = [
        Platform::MediaPlayer,
        Platform::Remote,
        Platform::Button,
        Platform::Sensor,
        Platform::Switch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::MediaPlayer => "media_player",
            Platform::Remote => "remote",
            Platform::Button => "button",
            Platform::Sensor => "sensor",
            Platform::Switch => "switch",
        }
    }

    /// Services the platform answers, all targeted by `entity_id`
    pub fn services(&self) -> &'static [&'static str] {
        match self {
            Platform::MediaPlayer => &[
                "turn_on",
                "turn_off",
                "volume_up",
                "volume_down",
                "volume_set",
                "volume_mute",
                "select_source",
                "play_media",
            ],
            Platform::Remote => &[
                "turn_on",
                "turn_off",
                "send_command",
                "learn_command",
                "delete_command",
            ],
            Platform::Button => &["press"],
            Platform::Sensor => &[],
            Platform::Switch => &["turn_on", "turn_off", "toggle"],
        }
    }
}

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownPlatform(s.to_string()))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_names_round_trip() {
        for platform in Platform::ALL {
            assert_eq!(platform.as_str().parse::<Platform>(), Ok(platform));
        }
        assert!("light".parse::<Platform>().is_err());
    }

    #[test]
    fn test_sensor_is_read_only() {
        assert!(Platform::Sensor.services().is_empty());
        assert_eq!(Platform::Button.services(), &["press"]);
    }
}
