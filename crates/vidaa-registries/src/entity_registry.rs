//! Entity Registry
//!
//! Tracks every entity the integration has created, keyed by entity_id and
//! indexed by unique_id and config entry. Registry entries survive restarts
//! and carry the user's choices, most importantly `disabled_by`.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::storage::{Storable, Storage, StorageResult};

#[derive(Debug, Error, Clone)]
pub enum EntityRegistryError {
    #[error("Entity not found: {0}")]
    NotFound(String),
}

pub const STORAGE_KEY: &str = "core.entity_registry";
pub const STORAGE_VERSION: u32 = 1;
pub const STORAGE_MINOR_VERSION: u32 = 1;

/// Reason an entity was disabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisabledBy {
    ConfigEntry,
    Device,
    /// The integration marked the entity disabled-by-default on creation
    Integration,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityEntry {
    /// Internal ULID
    pub id: String,
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,
    /// Integration that provides this entity
    pub platform: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_entry_id: Option<String>,

    /// User-set name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Name reported by the integration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(default)]
    pub has_entity_name: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_icon: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_by: Option<DisabledBy>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

impl EntityEntry {
    pub fn new(
        entity_id: impl Into<String>,
        platform: impl Into<String>,
        unique_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ulid::Ulid::new().to_string().to_lowercase(),
            entity_id: entity_id.into(),
            unique_id,
            platform: platform.into(),
            device_id: None,
            config_entry_id: None,
            name: None,
            original_name: None,
            has_entity_name: false,
            icon: None,
            original_icon: None,
            disabled_by: None,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn domain(&self) -> &str {
        self.entity_id
            .split_once('.')
            .map(|(domain, _)| domain)
            .unwrap_or(&self.entity_id)
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled_by.is_some()
    }

    /// User icon if set, else the integration's
    pub fn effective_icon(&self) -> Option<&str> {
        self.icon.as_deref().or(self.original_icon.as_deref())
    }
}

/// What an integration knows about an entity when registering it
#[derive(Debug, Clone, Default)]
pub struct EntityRegistration<'a> {
    pub domain: &'a str,
    pub platform: &'a str,
    pub unique_id: &'a str,
    /// Object id to try first when a new entity_id is generated
    pub suggested_object_id: &'a str,
    pub config_entry_id: Option<&'a str>,
    pub device_id: Option<&'a str>,
    pub original_name: Option<&'a str>,
    pub original_icon: Option<&'a str>,
    pub has_entity_name: bool,
    /// Applied only when the entry is created
    pub disabled_by: Option<DisabledBy>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityRegistryData {
    pub entities: Vec<EntityEntry>,
}

impl Storable for EntityRegistryData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

fn unique_key(domain: &str, platform: &str, unique_id: &str) -> String {
    format!("{}:{}:{}", domain, platform, unique_id)
}

/// Entity registry with secondary indexes
///
/// The primary map keeps insertion order so saved files are stable.
pub struct EntityRegistry {
    storage: Arc<Storage>,

    by_entity_id: RwLock<IndexMap<String, Arc<EntityEntry>>>,

    /// `domain:platform:unique_id` -> entity_id
    by_unique_id: DashMap<String, String>,

    /// config_entry_id -> entity_ids
    by_config_entry_id: DashMap<String, HashSet<String>>,
}

impl EntityRegistry {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            by_entity_id: RwLock::new(IndexMap::new()),
            by_unique_id: DashMap::new(),
            by_config_entry_id: DashMap::new(),
        }
    }

    pub async fn load(&self) -> StorageResult<()> {
        if let Some(data) = self.storage.load_data::<EntityRegistryData>().await? {
            info!("Loading {} entities from storage", data.entities.len());
            for entry in data.entities {
                self.index_entry(Arc::new(entry));
            }
        }
        Ok(())
    }

    pub async fn save(&self) -> StorageResult<()> {
        let data = EntityRegistryData {
            entities: self.iter().iter().map(|e| (**e).clone()).collect(),
        };
        self.storage.save_data(&data).await?;
        debug!("Saved {} entities to storage", data.entities.len());
        Ok(())
    }

    fn index_entry(&self, entry: Arc<EntityEntry>) {
        let entity_id = entry.entity_id.clone();

        if let Some(ref unique_id) = entry.unique_id {
            self.by_unique_id.insert(
                unique_key(entry.domain(), &entry.platform, unique_id),
                entity_id.clone(),
            );
        }

        if let Some(ref config_entry_id) = entry.config_entry_id {
            self.by_config_entry_id
                .entry(config_entry_id.clone())
                .or_default()
                .insert(entity_id.clone());
        }

        if let Ok(mut idx) = self.by_entity_id.write() {
            idx.insert(entity_id, entry);
        }
    }

    fn unindex_secondary(&self, entry: &EntityEntry) {
        if let Some(ref unique_id) = entry.unique_id {
            self.by_unique_id
                .remove(&unique_key(entry.domain(), &entry.platform, unique_id));
        }
        if let Some(ref config_entry_id) = entry.config_entry_id {
            if let Some(mut ids) = self.by_config_entry_id.get_mut(config_entry_id) {
                ids.remove(&entry.entity_id);
            }
        }
    }

    pub fn get(&self, entity_id: &str) -> Option<Arc<EntityEntry>> {
        self.by_entity_id
            .read()
            .ok()
            .and_then(|idx| idx.get(entity_id).cloned())
    }

    /// Look up the entity_id registered for a unique_id
    pub fn get_entity_id(&self, domain: &str, platform: &str, unique_id: &str) -> Option<String> {
        self.by_unique_id
            .get(&unique_key(domain, platform, unique_id))
            .map(|id| id.clone())
    }

    pub fn get_by_config_entry_id(&self, config_entry_id: &str) -> Vec<Arc<EntityEntry>> {
        let mut entries: Vec<Arc<EntityEntry>> = self
            .by_config_entry_id
            .get(config_entry_id)
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default();
        entries.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        entries
    }

    /// Get or create an entity entry
    ///
    /// An existing entry keeps its entity_id and `disabled_by`; only the
    /// integration-owned fields are refreshed.
    pub fn get_or_create(&self, reg: EntityRegistration<'_>) -> Arc<EntityEntry> {
        if let Some(entity_id) = self.get_entity_id(reg.domain, reg.platform, reg.unique_id) {
            let refreshed = self.update(&entity_id, |entry| {
                entry.config_entry_id = reg.config_entry_id.map(String::from);
                entry.device_id = reg.device_id.map(String::from);
                entry.original_name = reg.original_name.map(String::from);
                entry.original_icon = reg.original_icon.map(String::from);
                entry.has_entity_name = reg.has_entity_name;
            });
            if let Ok(entry) = refreshed {
                debug!(entity_id = %entry.entity_id, "Found existing entity by unique_id");
                return entry;
            }
        }

        let entity_id = self.generate_entity_id(reg.domain, reg.suggested_object_id, &[]);
        let mut entry = EntityEntry::new(
            entity_id.clone(),
            reg.platform,
            Some(reg.unique_id.to_string()),
        );
        entry.config_entry_id = reg.config_entry_id.map(String::from);
        entry.device_id = reg.device_id.map(String::from);
        entry.original_name = reg.original_name.map(String::from);
        entry.original_icon = reg.original_icon.map(String::from);
        entry.has_entity_name = reg.has_entity_name;
        entry.disabled_by = reg.disabled_by;

        let entry = Arc::new(entry);
        self.index_entry(Arc::clone(&entry));

        info!(entity_id = %entity_id, disabled = entry.is_disabled(), "Registered new entity");
        entry
    }

    /// Update an entity entry in place
    ///
    /// `modified_at` is bumped when the closure changed anything.
    pub fn update<F>(&self, entity_id: &str, f: F) -> Result<Arc<EntityEntry>, EntityRegistryError>
    where
        F: FnOnce(&mut EntityEntry),
    {
        let current = self
            .get(entity_id)
            .ok_or_else(|| EntityRegistryError::NotFound(entity_id.to_string()))?;

        let mut entry = (*current).clone();
        f(&mut entry);

        let before = serde_json::to_value(&*current).ok();
        let after = serde_json::to_value(&entry).ok();
        if before == after {
            return Ok(current);
        }
        entry.modified_at = Utc::now();

        self.unindex_secondary(&current);
        if entry.entity_id != current.entity_id {
            if let Ok(mut idx) = self.by_entity_id.write() {
                idx.shift_remove(&current.entity_id);
            }
        }
        let entry = Arc::new(entry);
        self.index_entry(Arc::clone(&entry));
        Ok(entry)
    }

    /// Enable or disable an entity on the user's behalf
    pub fn set_disabled_by(
        &self,
        entity_id: &str,
        disabled_by: Option<DisabledBy>,
    ) -> Result<Arc<EntityEntry>, EntityRegistryError> {
        self.update(entity_id, |entry| entry.disabled_by = disabled_by)
    }

    pub fn remove(&self, entity_id: &str) -> Option<Arc<EntityEntry>> {
        let removed = self
            .by_entity_id
            .write()
            .ok()
            .and_then(|mut idx| idx.shift_remove(entity_id));

        if let Some(ref entry) = removed {
            self.unindex_secondary(entry);
            info!(entity_id, "Removed entity");
        }
        removed
    }

    /// Remove every entity belonging to a config entry
    pub fn clear_config_entry(&self, config_entry_id: &str) -> Vec<Arc<EntityEntry>> {
        self.get_by_config_entry_id(config_entry_id)
            .iter()
            .filter_map(|entry| self.remove(&entry.entity_id))
            .collect()
    }

    pub fn is_registered(&self, entity_id: &str) -> bool {
        self.by_entity_id
            .read()
            .map(|idx| idx.contains_key(entity_id))
            .unwrap_or(false)
    }

    /// A free `{domain}.{object_id}`, suffixed `_2`, `_3`, ... on conflict
    pub fn generate_entity_id(
        &self,
        domain: &str,
        suggested_object_id: &str,
        reserved_ids: &[String],
    ) -> String {
        let preferred = format!("{}.{}", domain, suggested_object_id);
        let is_available = |candidate: &str| {
            !self.is_registered(candidate) && !reserved_ids.iter().any(|r| r == candidate)
        };

        if is_available(&preferred) {
            return preferred;
        }

        (2..)
            .map(|n| format!("{}_{}", preferred, n))
            .find(|candidate| is_available(candidate))
            .unwrap_or(preferred)
    }

    pub fn iter(&self) -> Vec<Arc<EntityEntry>> {
        self.by_entity_id
            .read()
            .map(|idx| idx.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_entity_id.read().map(|idx| idx.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
