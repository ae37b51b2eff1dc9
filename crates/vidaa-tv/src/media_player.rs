//! Media player entity

use std::sync::{Arc, RwLock};

use serde_json::{json, Value};
use tracing::debug;
use vidaa_core::Platform;

use crate::coordinator::Coordinator;
use crate::entity::{opt_str, unsupported, EntityBase, EntityError, EntityResult, EntityState};

/// `media_content_type` accepted by `play_media`
pub const MEDIA_TYPE_APP: &str = "app";

pub struct MediaPlayer {
    pub base: EntityBase,
    source_list: RwLock<Vec<String>>,
}

impl MediaPlayer {
    pub fn new(coordinator: Arc<Coordinator>, device_key: &str) -> Self {
        Self {
            base: EntityBase::new(coordinator, device_key, "media_player"),
            source_list: RwLock::new(Vec::new()),
        }
    }

    pub fn source_list(&self) -> Vec<String> {
        self.source_list.read().map(|l| l.clone()).unwrap_or_default()
    }

    pub(crate) async fn load_sources(&self) {
        match self.base.coordinator.sources().await {
            Ok(sources) => {
                let labels: Vec<String> = sources
                    .iter()
                    .filter_map(|s| s.label().map(String::from))
                    .collect();
                if let Ok(mut list) = self.source_list.write() {
                    *list = labels;
                }
            }
            Err(e) => debug!(error = %e, "Error loading sources"),
        }
    }

    pub(crate) fn state(&self) -> EntityState {
        let data = self.base.coordinator.data();
        let mut state = EntityState::on_off(data.as_ref().map(|d| d.is_on))
            .with_attribute("source_list", json!(self.source_list()));

        if let Some(data) = data.filter(|d| d.is_on) {
            state = state
                .with_attribute(
                    "volume_level",
                    data.volume
                        .map_or(Value::Null, |v| json!(f64::from(v) / 100.0)),
                )
                .with_attribute("is_volume_muted", json!(data.is_muted))
                .with_attribute("source", opt_str(data.source.as_deref()))
                .with_attribute("app_name", opt_str(data.app.as_deref()));
        }
        state
    }

    pub async fn turn_on(&self) -> EntityResult {
        Ok(self.base.coordinator.turn_on().await?)
    }

    pub async fn turn_off(&self) -> EntityResult {
        Ok(self.base.coordinator.turn_off().await?)
    }

    pub async fn volume_up(&self) -> EntityResult {
        Ok(self.base.coordinator.volume_up().await?)
    }

    pub async fn volume_down(&self) -> EntityResult {
        Ok(self.base.coordinator.volume_down().await?)
    }

    /// `level` in 0.0..=1.0
    pub async fn set_volume_level(&self, level: f64) -> EntityResult {
        if !(0.0..=1.0).contains(&level) {
            return Err(EntityError::invalid(
                "volume_level",
                format!("{} is outside 0..1", level),
            ));
        }
        let volume = (level * 100.0).round() as u8;
        Ok(self.base.coordinator.set_volume(volume).await?)
    }

    /// Mute is a toggle on the TV, so only send it when the flag differs
    pub async fn mute_volume(&self, mute: bool) -> EntityResult {
        let muted = self
            .base
            .coordinator
            .data()
            .is_some_and(|d| d.is_muted);
        if muted != mute {
            self.base.coordinator.mute().await?;
        }
        Ok(())
    }

    pub async fn select_source(&self, source: &str) -> EntityResult {
        Ok(self.base.coordinator.select_source(source).await?)
    }

    pub async fn play_media(&self, media_type: &str, media_id: &str) -> EntityResult {
        if media_type != MEDIA_TYPE_APP {
            return Err(EntityError::invalid(
                "media_content_type",
                format!("only '{}' is supported, got '{}'", MEDIA_TYPE_APP, media_type),
            ));
        }
        Ok(self.base.coordinator.launch_app(media_id).await?)
    }

    pub(crate) async fn handle(&self, service: &str, data: &Value) -> EntityResult {
        match service {
            "turn_on" => self.turn_on().await,
            "turn_off" => self.turn_off().await,
            "volume_up" => self.volume_up().await,
            "volume_down" => self.volume_down().await,
            "volume_set" => {
                let level = data
                    .get("volume_level")
                    .and_then(Value::as_f64)
                    .ok_or_else(|| EntityError::invalid("volume_level", "a number is required"))?;
                self.set_volume_level(level).await
            }
            "volume_mute" => {
                let mute = data
                    .get("is_volume_muted")
                    .and_then(Value::as_bool)
                    .ok_or_else(|| EntityError::invalid("is_volume_muted", "a boolean is required"))?;
                self.mute_volume(mute).await
            }
            "select_source" => {
                let source = required_str(data, "source")?;
                self.select_source(source).await
            }
            "play_media" => {
                let media_type = required_str(data, "media_content_type")?;
                let media_id = required_str(data, "media_content_id")?;
                self.play_media(media_type, media_id).await
            }
            other => Err(unsupported(Platform::MediaPlayer, other)),
        }
    }
}

fn required_str<'a>(data: &'a Value, field: &'static str) -> Result<&'a str, EntityError> {
    data.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| EntityError::invalid(field, "a string is required"))
}
