//! Current app and current source sensors

use std::sync::Arc;

use vidaa_core::STATE_UNKNOWN;

use crate::coordinator::{Coordinator, TvData};
use crate::entity::{EntityBase, EntityState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    App,
    Source,
}

pub struct Sensor {
    pub base: EntityBase,
    pub kind: SensorKind,
}

impl Sensor {
    pub fn new(coordinator: Arc<Coordinator>, device_key: &str, kind: SensorKind) -> Self {
        let base = match kind {
            SensorKind::App => EntityBase::new(coordinator, device_key, "sensor_app")
                .named("Current App")
                .with_icon("mdi:apps"),
            SensorKind::Source => EntityBase::new(coordinator, device_key, "sensor_source")
                .named("Current Source")
                .with_icon("mdi:video-input-hdmi"),
        };
        Self { base, kind }
    }

    pub fn native_value(&self) -> Option<String> {
        let data: TvData = self.base.coordinator.data()?;
        match self.kind {
            SensorKind::App => data.app,
            SensorKind::Source => data.source,
        }
    }

    pub(crate) fn state(&self) -> EntityState {
        EntityState::new(self.native_value().unwrap_or_else(|| STATE_UNKNOWN.to_string()))
    }
}
