//! Button entities, one per remote key in the button table

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use vidaa_client::RemoteKey;
use vidaa_core::{Platform, STATE_UNKNOWN};

use crate::consts::ButtonKey;
use crate::coordinator::Coordinator;
use crate::entity::{unsupported, EntityBase, EntityResult, EntityState};

pub struct Button {
    pub base: EntityBase,
    pub key: RemoteKey,
    last_pressed: RwLock<Option<DateTime<Utc>>>,
}

impl Button {
    pub fn new(coordinator: Arc<Coordinator>, device_key: &str, key: &ButtonKey) -> Self {
        let base = EntityBase::new(coordinator, device_key, &format!("button_{}", key.key_id))
            .named(key.name)
            .with_icon(key.icon)
            .enabled_by_default(key.enabled_default);
        Self {
            base,
            key: key.key,
            last_pressed: RwLock::new(None),
        }
    }

    pub fn last_pressed(&self) -> Option<DateTime<Utc>> {
        self.last_pressed.read().ok().and_then(|t| *t)
    }

    /// State is the time of the last press
    pub(crate) fn state(&self) -> EntityState {
        match self.last_pressed() {
            Some(at) => EntityState::new(at.to_rfc3339()),
            None => EntityState::new(STATE_UNKNOWN),
        }
    }

    pub async fn press(&self) -> EntityResult {
        self.base.coordinator.send_key(self.key).await?;
        if let Ok(mut last) = self.last_pressed.write() {
            *last = Some(Utc::now());
        }
        Ok(())
    }

    pub(crate) async fn handle(&self, service: &str) -> EntityResult {
        match service {
            "press" => self.press().await,
            other => Err(unsupported(Platform::Button, other)),
        }
    }
}
