//! Entities exposed for one TV
//!
//! Every entity is a [`VidaaEntity`] variant wrapping its platform type. The
//! variants share an [`EntityBase`] that ties them to the entry's coordinator.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;
use vidaa_client::UnknownKey;
use vidaa_core::{Platform, STATE_OFF, STATE_ON, STATE_UNAVAILABLE, STATE_UNKNOWN};

use crate::button::Button;
use crate::coordinator::{Coordinator, CoordinatorError};
use crate::media_player::MediaPlayer;
use crate::remote::Remote;
use crate::sensor::Sensor;
use crate::switch::Switch;

#[derive(Debug, Error)]
pub enum EntityError {
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error(transparent)]
    UnknownKey(#[from] UnknownKey),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("{platform} does not support {service}")]
    Unsupported { platform: Platform, service: String },
}

impl EntityError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        EntityError::Invalid {
            field,
            reason: reason.into(),
        }
    }

    /// Whether the caller sent bad input rather than the TV failing
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            EntityError::UnknownKey(_) | EntityError::Invalid { .. } | EntityError::Unsupported { .. }
        )
    }
}

pub type EntityResult = Result<(), EntityError>;

/// State value plus platform attributes
#[derive(Debug, Clone, PartialEq)]
pub struct EntityState {
    pub state: String,
    pub attributes: HashMap<String, Value>,
}

impl EntityState {
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: Value) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }

    pub(crate) fn on_off(is_on: Option<bool>) -> Self {
        match is_on {
            Some(true) => Self::new(STATE_ON),
            Some(false) => Self::new(STATE_OFF),
            None => Self::new(STATE_UNKNOWN),
        }
    }
}

/// Fields every Vidaa entity carries
pub struct EntityBase {
    pub coordinator: Arc<Coordinator>,
    /// `{device_id}_{suffix}`
    pub unique_id: String,
    /// `None` names the entity after its device
    pub name: Option<&'static str>,
    pub icon: Option<&'static str>,
    pub enabled_default: bool,
}

impl EntityBase {
    pub fn new(coordinator: Arc<Coordinator>, device_key: &str, suffix: &str) -> Self {
        Self {
            coordinator,
            unique_id: format!("{}_{}", device_key, suffix),
            name: None,
            icon: None,
            enabled_default: true,
        }
    }

    pub fn named(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    pub fn with_icon(mut self, icon: &'static str) -> Self {
        self.icon = Some(icon);
        self
    }

    pub fn enabled_by_default(mut self, enabled: bool) -> Self {
        self.enabled_default = enabled;
        self
    }

    /// On/off from the latest data, `None` before the first refresh
    pub fn is_on(&self) -> Option<bool> {
        self.coordinator.data().map(|d| d.is_on)
    }
}

pub enum VidaaEntity {
    MediaPlayer(MediaPlayer),
    Remote(Remote),
    Button(Button),
    Sensor(Sensor),
    Switch(Switch),
}

impl VidaaEntity {
    pub fn platform(&self) -> Platform {
        match self {
            VidaaEntity::MediaPlayer(_) => Platform::MediaPlayer,
            VidaaEntity::Remote(_) => Platform::Remote,
            VidaaEntity::Button(_) => Platform::Button,
            VidaaEntity::Sensor(_) => Platform::Sensor,
            VidaaEntity::Switch(_) => Platform::Switch,
        }
    }

    pub fn base(&self) -> &EntityBase {
        match self {
            VidaaEntity::MediaPlayer(e) => &e.base,
            VidaaEntity::Remote(e) => &e.base,
            VidaaEntity::Button(e) => &e.base,
            VidaaEntity::Sensor(e) => &e.base,
            VidaaEntity::Switch(e) => &e.base,
        }
    }

    pub fn unique_id(&self) -> &str {
        &self.base().unique_id
    }

    /// Buttons stay usable while the TV is off so they can wake it
    pub fn available(&self) -> bool {
        match self {
            VidaaEntity::Button(_) => true,
            _ => self.base().coordinator.available(),
        }
    }

    /// Rendered state; unavailable entities carry no platform attributes
    pub fn state(&self) -> EntityState {
        if !self.available() {
            return EntityState::new(STATE_UNAVAILABLE);
        }
        match self {
            VidaaEntity::MediaPlayer(e) => e.state(),
            VidaaEntity::Remote(e) => e.state(),
            VidaaEntity::Button(e) => e.state(),
            VidaaEntity::Sensor(e) => e.state(),
            VidaaEntity::Switch(e) => e.state(),
        }
    }

    /// Called once when the entity joins the platform
    pub async fn added(&self) {
        match self {
            VidaaEntity::MediaPlayer(e) => e.load_sources().await,
            VidaaEntity::Remote(e) => e.load_activities().await,
            _ => {}
        }
    }

    /// Run a platform service against this entity
    pub async fn handle(&self, service: &str, data: &Value) -> EntityResult {
        match self {
            VidaaEntity::MediaPlayer(e) => e.handle(service, data).await,
            VidaaEntity::Remote(e) => e.handle(service, data).await,
            VidaaEntity::Button(e) => e.handle(service).await,
            VidaaEntity::Sensor(_) => Err(unsupported(Platform::Sensor, service)),
            VidaaEntity::Switch(e) => e.handle(service).await,
        }
    }
}

pub(crate) fn unsupported(platform: Platform, service: &str) -> EntityError {
    EntityError::Unsupported {
        platform,
        service: service.to_string(),
    }
}

/// Optional string attribute, `null` when absent
pub(crate) fn opt_str(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |s| json!(s))
}
