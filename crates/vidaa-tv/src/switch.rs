//! Mute switch

use std::sync::Arc;

use vidaa_core::Platform;

use crate::coordinator::Coordinator;
use crate::entity::{unsupported, EntityBase, EntityResult, EntityState};

pub struct Switch {
    pub base: EntityBase,
}

impl Switch {
    pub fn mute(coordinator: Arc<Coordinator>, device_key: &str) -> Self {
        Self {
            base: EntityBase::new(coordinator, device_key, "switch_mute")
                .named("Mute")
                .with_icon("mdi:volume-off"),
        }
    }

    /// On means muted
    pub fn is_on(&self) -> Option<bool> {
        self.base.coordinator.data().map(|d| d.is_muted)
    }

    pub(crate) fn state(&self) -> EntityState {
        EntityState::on_off(self.is_on())
    }

    pub async fn turn_on(&self) -> EntityResult {
        if self.is_on() != Some(true) {
            self.base.coordinator.mute().await?;
        }
        Ok(())
    }

    pub async fn turn_off(&self) -> EntityResult {
        if self.is_on() == Some(true) {
            self.base.coordinator.mute().await?;
        }
        Ok(())
    }

    pub async fn toggle(&self) -> EntityResult {
        Ok(self.base.coordinator.mute().await?)
    }

    pub(crate) async fn handle(&self, service: &str) -> EntityResult {
        match service {
            "turn_on" => self.turn_on().await,
            "turn_off" => self.turn_off().await,
            "toggle" => self.toggle().await,
            other => Err(unsupported(Platform::Switch, other)),
        }
    }
}
