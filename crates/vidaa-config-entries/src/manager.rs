//! Config Entries Manager
//!
//! Owns every config entry, persists them and drives their lifecycle through
//! the handler registered for each domain.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use vidaa_core::events::ConfigEntryReauthData;
use vidaa_core::Context;
use vidaa_event_bus::EventBus;
use vidaa_registries::{Storable, Storage, StorageResult};

use crate::entry::{ConfigEntry, ConfigEntryState, ConfigEntryUpdate};
use crate::state_machine::{calculate_retry_delay, InvalidTransition};

pub const STORAGE_KEY: &str = "core.config_entries";
pub const STORAGE_VERSION: u32 = 1;
pub const STORAGE_MINOR_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ConfigEntriesError {
    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Entry already exists for domain {domain} with unique_id {unique_id}")]
    AlreadyExists { domain: String, unique_id: String },

    #[error("Cannot unload entry in state {0:?}")]
    CannotUnload(ConfigEntryState),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("Setup not ready, retrying: {0}")]
    NotReady(String),

    #[error("Setup failed: {0}")]
    SetupFailed(String),

    #[error("Unload failed: {0}")]
    UnloadFailed(String),

    #[error("Storage error: {0}")]
    Storage(#[from] vidaa_registries::StorageError),
}

pub type ConfigEntriesResult<T> = Result<T, ConfigEntriesError>;

/// Why an integration could not set up an entry
#[derive(Debug, Clone, Error)]
pub enum SetupError {
    /// The device is unreachable for now; setup is retried with backoff
    #[error("not ready: {0}")]
    NotReady(String),

    /// Credentials were rejected; a reauth is requested
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("{0}")]
    Failed(String),
}

/// Integration hooks called by the manager
#[async_trait]
pub trait EntryHandler: Send + Sync {
    async fn setup_entry(&self, entry: &ConfigEntry) -> Result<(), SetupError>;

    /// Returns false if the entry could not be unloaded
    async fn unload_entry(&self, entry: &ConfigEntry) -> bool;

    /// Called after unload when the entry is deleted
    async fn remove_entry(&self, _entry: &ConfigEntry) {}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigEntriesData {
    pub entries: Vec<ConfigEntry>,
}

impl Storable for ConfigEntriesData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

/// Config Entries Manager
///
/// Setup and unload are serialized by one lock. A `NotReady` setup moves the
/// entry to `SetupRetry` and schedules another attempt.
pub struct ConfigEntries {
    storage: Arc<Storage>,
    event_bus: Arc<EventBus>,

    /// entry_id -> ConfigEntry
    entries: DashMap<String, ConfigEntry>,

    /// domain -> entry_ids
    by_domain: DashMap<String, HashSet<String>>,

    /// (domain, unique_id) -> entry_id
    by_unique_id: DashMap<(String, String), String>,

    setup_lock: Mutex<()>,

    handlers: DashMap<String, Arc<dyn EntryHandler>>,

    /// Pending setup retries by entry_id
    retry_tasks: DashMap<String, JoinHandle<()>>,
}

impl ConfigEntries {
    pub fn new(storage: Arc<Storage>, event_bus: Arc<EventBus>) -> Self {
        Self {
            storage,
            event_bus,
            entries: DashMap::new(),
            by_domain: DashMap::new(),
            by_unique_id: DashMap::new(),
            setup_lock: Mutex::new(()),
            handlers: DashMap::new(),
            retry_tasks: DashMap::new(),
        }
    }

    pub async fn load(&self) -> StorageResult<()> {
        if let Some(data) = self.storage.load_data::<ConfigEntriesData>().await? {
            info!("Loading {} config entries from storage", data.entries.len());
            for entry in data.entries {
                self.index_entry(entry);
            }
        }
        Ok(())
    }

    pub async fn save(&self) -> StorageResult<()> {
        let mut entries: Vec<ConfigEntry> = self.iter().collect();
        entries.sort_by_key(|e| e.created_at);
        let data = ConfigEntriesData { entries };
        self.storage.save_data(&data).await?;
        debug!("Saved {} config entries to storage", data.entries.len());
        Ok(())
    }

    fn index_entry(&self, entry: ConfigEntry) {
        let entry_id = entry.entry_id.clone();

        self.by_domain
            .entry(entry.domain.clone())
            .or_default()
            .insert(entry_id.clone());

        if let Some(ref unique_id) = entry.unique_id {
            self.by_unique_id
                .insert((entry.domain.clone(), unique_id.clone()), entry_id.clone());
        }

        self.entries.insert(entry_id, entry);
    }

    fn unindex_entry(&self, entry: &ConfigEntry) {
        if let Some(mut ids) = self.by_domain.get_mut(&entry.domain) {
            ids.remove(&entry.entry_id);
        }
        if let Some(ref unique_id) = entry.unique_id {
            self.by_unique_id
                .remove(&(entry.domain.clone(), unique_id.clone()));
        }
        self.entries.remove(&entry.entry_id);
    }

    pub fn get(&self, entry_id: &str) -> Option<ConfigEntry> {
        self.entries.get(entry_id).map(|r| r.value().clone())
    }

    pub fn get_by_domain(&self, domain: &str) -> Vec<ConfigEntry> {
        let mut entries: Vec<ConfigEntry> = self
            .by_domain
            .get(domain)
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default();
        entries.sort_by_key(|e| e.created_at);
        entries
    }

    pub fn get_loaded_by_domain(&self, domain: &str) -> Vec<ConfigEntry> {
        self.get_by_domain(domain)
            .into_iter()
            .filter(|e| e.is_loaded())
            .collect()
    }

    pub fn get_by_unique_id(&self, domain: &str, unique_id: &str) -> Option<ConfigEntry> {
        self.by_unique_id
            .get(&(domain.to_string(), unique_id.to_string()))
            .and_then(|entry_id| self.get(&entry_id))
    }

    /// Add and persist a new entry; it is not set up
    pub async fn add(&self, entry: ConfigEntry) -> ConfigEntriesResult<ConfigEntry> {
        if let Some(ref unique_id) = entry.unique_id {
            if self.get_by_unique_id(&entry.domain, unique_id).is_some() {
                return Err(ConfigEntriesError::AlreadyExists {
                    domain: entry.domain.clone(),
                    unique_id: unique_id.clone(),
                });
            }
        }

        self.index_entry(entry.clone());
        self.save().await?;

        info!(
            "Added config entry: {} ({}) [{}]",
            entry.title, entry.domain, entry.entry_id
        );
        Ok(entry)
    }

    /// Apply a partial update and persist it
    pub async fn update(
        &self,
        entry_id: &str,
        update: ConfigEntryUpdate,
    ) -> ConfigEntriesResult<ConfigEntry> {
        let mut updated = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;
        self.unindex_entry(&updated);

        if let Some(data) = update.data {
            updated.data = data;
        }
        if let Some(options) = update.options {
            updated.options = options;
        }
        updated.modified_at = Utc::now();

        self.index_entry(updated.clone());
        self.save().await?;

        debug!("Updated config entry: {}", entry_id);
        Ok(updated)
    }

    /// Replace the options and reload the entry if it is loaded
    pub async fn update_options(
        self: &Arc<Self>,
        entry_id: &str,
        options: HashMap<String, serde_json::Value>,
    ) -> ConfigEntriesResult<ConfigEntry> {
        let updated = self
            .update(entry_id, ConfigEntryUpdate::new().options(options))
            .await?;
        if updated.is_loaded() {
            info!(entry_id, "Options changed, reloading entry");
            self.reload(entry_id).await?;
        }
        Ok(self.get(entry_id).unwrap_or(updated))
    }

    /// Unload, let the integration clean up, then forget the entry
    pub async fn remove(&self, entry_id: &str) -> ConfigEntriesResult<ConfigEntry> {
        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        if let Err(e) = self.unload(entry_id).await {
            warn!(entry_id, error = %e, "Unload before removal failed");
        }

        if let Some(handler) = self.handler(&entry.domain) {
            handler.remove_entry(&entry).await;
        }

        self.unindex_entry(&entry);
        self.save().await?;

        info!(
            "Removed config entry: {} ({}) [{}]",
            entry.title, entry.domain, entry_id
        );
        Ok(entry)
    }

    pub fn register_handler(&self, domain: &str, handler: Arc<dyn EntryHandler>) {
        self.handlers.insert(domain.to_string(), handler);
        debug!("Registered entry handler for domain: {}", domain);
    }

    fn handler(&self, domain: &str) -> Option<Arc<dyn EntryHandler>> {
        self.handlers.get(domain).map(|h| Arc::clone(h.value()))
    }

    fn transition(
        &self,
        entry_id: &str,
        state: ConfigEntryState,
        reason: Option<String>,
    ) -> ConfigEntriesResult<()> {
        let mut entry = self
            .entries
            .get_mut(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;
        entry.try_set_state(state, reason)?;
        debug!("Entry {} state changed to {:?}", entry_id, state);
        Ok(())
    }

    /// Set up an entry through its domain handler
    #[instrument(skip(self))]
    pub async fn setup(self: &Arc<Self>, entry_id: &str) -> ConfigEntriesResult<()> {
        let _lock = self.setup_lock.lock().await;
        self.cancel_retry(entry_id);

        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        if entry.is_disabled() {
            debug!("Skipping setup for disabled entry");
            return Ok(());
        }

        self.transition(entry_id, ConfigEntryState::SetupInProgress, None)?;

        let Some(handler) = self.handler(&entry.domain) else {
            debug!(domain = %entry.domain, "No handler for domain, marking as loaded");
            return self.transition(entry_id, ConfigEntryState::Loaded, None);
        };

        match handler.setup_entry(&entry).await {
            Ok(()) => {
                self.transition(entry_id, ConfigEntryState::Loaded, None)?;
                info!("Setup completed for entry: {}", entry.title);
                Ok(())
            }
            Err(SetupError::NotReady(reason)) => {
                let tries = match self.entries.get_mut(entry_id) {
                    Some(mut e) => {
                        let tries = e.tries;
                        e.tries += 1;
                        tries
                    }
                    None => 0,
                };
                self.transition(entry_id, ConfigEntryState::SetupRetry, Some(reason.clone()))?;

                let delay = calculate_retry_delay(tries);
                warn!(reason = %reason, delay, "Entry not ready, retrying setup");
                self.schedule_retry(entry_id, Duration::from_secs_f64(delay));
                Err(ConfigEntriesError::NotReady(reason))
            }
            Err(SetupError::AuthFailed(reason)) => {
                warn!(reason = %reason, "Authentication failed during setup");
                self.transition(entry_id, ConfigEntryState::SetupError, Some(reason.clone()))?;
                self.start_reauth(&entry, &reason);
                Err(ConfigEntriesError::SetupFailed(reason))
            }
            Err(SetupError::Failed(reason)) => {
                warn!(reason = %reason, "Setup failed");
                self.transition(entry_id, ConfigEntryState::SetupError, Some(reason.clone()))?;
                Err(ConfigEntriesError::SetupFailed(reason))
            }
        }
    }

    fn setup_boxed(self: Arc<Self>, entry_id: String) -> BoxFuture<'static, ConfigEntriesResult<()>> {
        Box::pin(async move { self.setup(&entry_id).await })
    }

    fn schedule_retry(self: &Arc<Self>, entry_id: &str, delay: Duration) {
        let manager = Arc::clone(self);
        let id = entry_id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Drop our own handle so setup does not abort this task
            manager.retry_tasks.remove(&id);
            if let Err(e) = manager.clone().setup_boxed(id.clone()).await {
                debug!(entry_id = %id, error = %e, "Scheduled setup retry failed");
            }
        });
        self.retry_tasks.insert(entry_id.to_string(), handle);
    }

    fn cancel_retry(&self, entry_id: &str) {
        if let Some((_, handle)) = self.retry_tasks.remove(entry_id) {
            handle.abort();
        }
    }

    /// Whether a setup retry is waiting for this entry
    pub fn retry_pending(&self, entry_id: &str) -> bool {
        self.retry_tasks.contains_key(entry_id)
    }

    /// Ask the user to re-pair the device behind an entry
    pub fn start_reauth(&self, entry: &ConfigEntry, reason: &str) {
        info!(entry_id = %entry.entry_id, reason, "Requesting reauthentication");
        self.event_bus.fire_typed(
            ConfigEntryReauthData {
                domain: entry.domain.clone(),
                entry_id: entry.entry_id.clone(),
                reason: reason.to_string(),
            },
            Context::new(),
        );
    }

    /// Unload an entry; a never-loaded entry is a no-op
    #[instrument(skip(self))]
    pub async fn unload(&self, entry_id: &str) -> ConfigEntriesResult<()> {
        let _lock = self.setup_lock.lock().await;
        self.cancel_retry(entry_id);

        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        match entry.state {
            ConfigEntryState::NotLoaded => return Ok(()),
            state if !state.is_recoverable() => {
                return Err(ConfigEntriesError::CannotUnload(state))
            }
            _ => {}
        }

        self.transition(entry_id, ConfigEntryState::UnloadInProgress, None)?;

        if entry.is_loaded() {
            if let Some(handler) = self.handler(&entry.domain) {
                if !handler.unload_entry(&entry).await {
                    let reason = "integration refused to unload".to_string();
                    self.transition(
                        entry_id,
                        ConfigEntryState::FailedUnload,
                        Some(reason.clone()),
                    )?;
                    return Err(ConfigEntriesError::UnloadFailed(reason));
                }
            }
        }

        self.transition(entry_id, ConfigEntryState::NotLoaded, None)?;
        info!("Unloaded entry: {}", entry.title);
        Ok(())
    }

    pub async fn reload(self: &Arc<Self>, entry_id: &str) -> ConfigEntriesResult<()> {
        self.unload(entry_id).await?;
        self.setup(entry_id).await
    }

    /// Set up every entry, collecting each result
    pub async fn setup_all(self: &Arc<Self>) -> Vec<ConfigEntriesResult<()>> {
        let mut results = Vec::new();
        for entry in self.iter().collect::<Vec<_>>() {
            results.push(self.setup(&entry.entry_id).await);
        }
        results
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ConfigEntry> + '_ {
        self.entries.iter().map(|r| r.value().clone())
    }
}
