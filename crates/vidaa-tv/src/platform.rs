//! Entity platform
//!
//! Registers entities in the entity registry, keeps the live ones, and
//! writes their states into the state machine whenever their coordinator
//! publishes new data.

use std::str::FromStr;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vidaa_config_entries::ConfigEntry;
use vidaa_core::{slugify, Context, EntityId};
use vidaa_registries::{DeviceEntry, DisabledBy, EntityEntry, EntityRegistration};

use crate::consts::DOMAIN;
use crate::coordinator::Coordinator;
use crate::entity::VidaaEntity;
use crate::hass::Hass;

pub struct EntityPlatform {
    hass: Arc<Hass>,
    /// entity_id -> live entity
    entities: DashMap<String, Arc<VidaaEntity>>,
    /// entry_id -> entity_ids in add order
    by_entry: DashMap<String, Vec<String>>,
    /// entry_id -> state writer task
    writers: DashMap<String, JoinHandle<()>>,
}

impl EntityPlatform {
    pub fn new(hass: Arc<Hass>) -> Self {
        Self {
            hass,
            entities: DashMap::new(),
            by_entry: DashMap::new(),
            writers: DashMap::new(),
        }
    }

    /// Register entities for an entry and bring the enabled ones live
    ///
    /// Entities that are disabled in the registry are registered but never
    /// get a state. Returns the live entity ids.
    pub async fn add_entities(
        &self,
        entry: &ConfigEntry,
        device: &DeviceEntry,
        entities: Vec<VidaaEntity>,
    ) -> Vec<String> {
        let device_name = device.display_name().to_string();
        let mut added = Vec::new();

        for entity in entities {
            let base = entity.base();
            let suggested = match base.name {
                Some(name) => slugify(&format!("{} {}", device_name, name)),
                None => slugify(&device_name),
            };
            let registered = self.hass.registries.entities.get_or_create(EntityRegistration {
                domain: entity.platform().as_str(),
                platform: DOMAIN,
                unique_id: &base.unique_id,
                suggested_object_id: &suggested,
                config_entry_id: Some(entry.entry_id.as_str()),
                device_id: Some(device.id.as_str()),
                original_name: base.name,
                original_icon: base.icon,
                has_entity_name: true,
                disabled_by: (!base.enabled_default).then_some(DisabledBy::Integration),
            });

            if registered.is_disabled() {
                debug!(entity_id = %registered.entity_id, "Entity disabled, not adding");
                continue;
            }

            entity.added().await;

            let entity_id = registered.entity_id.clone();
            self.entities.insert(entity_id.clone(), Arc::new(entity));
            self.by_entry
                .entry(entry.entry_id.clone())
                .or_default()
                .push(entity_id.clone());
            self.write_state(&entity_id);
            added.push(entity_id);
        }

        info!(
            entry_id = %entry.entry_id,
            count = added.len(),
            "Added entities"
        );
        added
    }

    pub fn get(&self, entity_id: &str) -> Option<Arc<VidaaEntity>> {
        self.entities.get(entity_id).map(|e| Arc::clone(e.value()))
    }

    pub fn entity_ids(&self, entry_id: &str) -> Vec<String> {
        self.by_entry
            .get(entry_id)
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Write one entity's state, named after its device
    pub fn write_state(&self, entity_id: &str) {
        self.write_state_with(entity_id, Context::new());
    }

    /// Write a state caused by `context`, e.g. a service call
    pub fn write_state_with(&self, entity_id: &str, context: Context) {
        let Some(entity) = self.get(entity_id) else {
            return;
        };
        let id = match EntityId::from_str(entity_id) {
            Ok(id) => id,
            Err(e) => {
                warn!(entity_id, error = %e, "Invalid entity id");
                return;
            }
        };

        let rendered = entity.state();
        let mut attributes = rendered.attributes;

        let registered = self.hass.registries.entities.get(entity_id);
        if let Some(name) = self.friendly_name(registered.as_deref()) {
            attributes.insert("friendly_name".to_string(), json!(name));
        }
        if let Some(icon) = registered.as_deref().and_then(EntityEntry::effective_icon) {
            attributes.insert("icon".to_string(), json!(icon));
        }

        self.hass
            .states
            .set(id, rendered.state, attributes, context);
    }

    fn friendly_name(&self, registered: Option<&EntityEntry>) -> Option<String> {
        let registered = registered?;
        let device_name = registered
            .device_id
            .as_deref()
            .and_then(|id| self.hass.registries.devices.get(id))
            .map(|d| d.display_name().to_string());
        let own_name = registered
            .name
            .clone()
            .or_else(|| registered.original_name.clone());

        match (registered.has_entity_name, device_name, own_name) {
            (true, Some(device), Some(own)) => Some(format!("{} {}", device, own)),
            (true, Some(device), None) => Some(device),
            (_, _, own) => own,
        }
    }

    pub fn write_entry_states(&self, entry_id: &str) {
        for entity_id in self.entity_ids(entry_id) {
            self.write_state(&entity_id);
        }
    }

    /// Rewrite the entry's states after every coordinator update
    pub fn start_writer(self: &Arc<Self>, entry_id: &str, coordinator: &Coordinator) {
        let mut updates = coordinator.subscribe();
        let platform: Weak<Self> = Arc::downgrade(self);
        let id = entry_id.to_string();

        let handle = tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let Some(platform) = platform.upgrade() else {
                    break;
                };
                platform.write_entry_states(&id);
            }
        });

        if let Some(old) = self.writers.insert(entry_id.to_string(), handle) {
            old.abort();
        }
    }

    /// Stop the writer and drop the entry's entities and states
    pub fn remove_entry(&self, entry_id: &str) {
        if let Some((_, handle)) = self.writers.remove(entry_id) {
            handle.abort();
        }

        let Some((_, entity_ids)) = self.by_entry.remove(entry_id) else {
            return;
        };
        for entity_id in &entity_ids {
            self.entities.remove(entity_id);
            if let Ok(id) = EntityId::from_str(entity_id) {
                self.hass.states.remove(&id, Context::new());
            }
        }
        debug!(entry_id, count = entity_ids.len(), "Removed entities");
    }
}
