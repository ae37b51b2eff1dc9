//! Per-entry data coordinator
//!
//! Polls the TV on a fixed interval, caches the latest [`TvData`] and
//! notifies subscribers through a watch channel. Entity commands go through
//! here so they can trigger a refresh afterwards.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};
use vidaa_client::{
    apps, timed, wol, AppInfo, ClientError, DeviceInfo, RemoteKey, SourceInfo, TvClient, TvState,
    STATETYPE_APP, STATETYPE_SOURCE,
};
use vidaa_config_entries::ConfigEntryUpdate;

use crate::config::VidaaEntryData;
use crate::consts::{
    AUTH_FAILURE_LIMIT, DEFAULT_SCAN_INTERVAL, DOMAIN, TIMEOUT_COMMAND, TIMEOUT_DEVICE_INFO,
    TIMEOUT_RECONNECT, TIMEOUT_STATE, TIMEOUT_VOLUME,
};
use crate::hass::Hass;

/// Snapshot of the TV as of the last successful refresh
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TvData {
    pub is_on: bool,
    pub state: Option<TvState>,
    pub statetype: Option<String>,
    /// 0..=100
    pub volume: Option<u8>,
    pub is_muted: bool,
    /// Display name of the foreground app
    pub app: Option<String>,
    /// Display name of the active input
    pub source: Option<String>,
}

impl TvData {
    fn from_state(state: Option<TvState>, volume: Option<u8>, is_muted: bool) -> Self {
        let is_on = state.as_ref().is_some_and(|s| !s.is_fake_sleep());
        let statetype = state.as_ref().and_then(|s| s.statetype.clone());

        let mut app = None;
        let mut source = None;
        if let Some(s) = &state {
            match statetype.as_deref() {
                Some(STATETYPE_APP) => {
                    app = Some(apps::display_name(s.name.as_deref().unwrap_or_default()));
                }
                Some(STATETYPE_SOURCE) => {
                    source = s
                        .displayname
                        .clone()
                        .filter(|d| !d.is_empty())
                        .or_else(|| s.sourcename.clone());
                }
                _ => {}
            }
        }

        Self {
            is_on,
            state,
            statetype,
            volume: if is_on { volume } else { None },
            is_muted: is_on && is_muted,
            app,
            source,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum CoordinatorError {
    #[error("{0}")]
    UpdateFailed(String),

    /// Repeated authentication failures; polling has stopped
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error(transparent)]
    Client(#[from] ClientError),
}

pub struct Coordinator {
    hass: Arc<Hass>,
    client: Arc<dyn TvClient>,
    entry_id: String,
    scan_interval: Duration,

    data: RwLock<Option<TvData>>,
    available: AtomicBool,
    last_update_success: AtomicBool,
    device_info_fetched: AtomicBool,
    auth_failures: AtomicU32,
    /// Set once auth failures hit the limit
    halted: AtomicBool,

    /// Bumped after every refresh attempt
    updates: watch::Sender<u64>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl Coordinator {
    pub fn new(
        hass: Arc<Hass>,
        client: Arc<dyn TvClient>,
        entry_id: impl Into<String>,
        scan_interval: Duration,
    ) -> Self {
        let (updates, _) = watch::channel(0);
        // A zero period cannot drive a ticker
        let scan_interval = if scan_interval.is_zero() {
            Duration::from_secs(DEFAULT_SCAN_INTERVAL)
        } else {
            scan_interval
        };
        Self {
            hass,
            client,
            entry_id: entry_id.into(),
            scan_interval,
            data: RwLock::new(None),
            available: AtomicBool::new(true),
            last_update_success: AtomicBool::new(false),
            device_info_fetched: AtomicBool::new(false),
            auth_failures: AtomicU32::new(0),
            halted: AtomicBool::new(false),
            updates,
            poller: Mutex::new(None),
        }
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    pub fn client(&self) -> &Arc<dyn TvClient> {
        &self.client
    }

    pub fn scan_interval(&self) -> Duration {
        self.scan_interval
    }

    pub fn data(&self) -> Option<TvData> {
        self.data.read().ok().and_then(|d| d.clone())
    }

    pub fn available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    pub fn last_update_success(&self) -> bool {
        self.last_update_success.load(Ordering::SeqCst)
    }

    pub fn auth_failures(&self) -> u32 {
        self.auth_failures.load(Ordering::SeqCst)
    }

    /// Whether polling stopped for a re-pair
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Receiver that changes after every refresh attempt
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.updates.subscribe()
    }

    /// Current entry data, re-read so coordinator writes are visible
    fn entry_data(&self) -> Option<VidaaEntryData> {
        let entry = self.hass.config_entries.get(&self.entry_id)?;
        VidaaEntryData::from_entry(&entry).ok()
    }

    /// Poll the TV once and publish the result
    #[instrument(skip(self), fields(entry_id = %self.entry_id))]
    pub async fn refresh(&self) -> Result<(), CoordinatorError> {
        let started = Instant::now();
        let result = self.fetch().await;

        let outcome = match result {
            Ok(data) => {
                debug!(
                    on = data.is_on,
                    statetype = ?data.statetype,
                    volume = ?data.volume,
                    app = ?data.app,
                    source = ?data.source,
                    elapsed = ?started.elapsed(),
                    "State refreshed"
                );
                if let Ok(mut slot) = self.data.write() {
                    *slot = Some(data);
                }
                self.available.store(true, Ordering::SeqCst);
                self.last_update_success.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(err) => {
                self.available.store(false, Ordering::SeqCst);
                self.last_update_success.store(false, Ordering::SeqCst);
                Err(self.classify_failure(err))
            }
        };

        self.updates.send_modify(|n| *n = n.wrapping_add(1));
        outcome
    }

    /// Refresh after a command; failures only reach the log
    pub async fn request_refresh(&self) {
        if let Err(e) = self.refresh().await {
            debug!(entry_id = %self.entry_id, error = %e, "Refresh after command failed");
        }
    }

    fn classify_failure(&self, err: CoordinatorError) -> CoordinatorError {
        let is_auth = match &err {
            CoordinatorError::Client(e) => e.is_auth(),
            CoordinatorError::UpdateFailed(_) | CoordinatorError::AuthFailed(_) => false,
        };

        if is_auth {
            let failures = self.auth_failures.fetch_add(1, Ordering::SeqCst) + 1;
            warn!(failures, error = %err, "TV rejected credentials");
            if failures >= AUTH_FAILURE_LIMIT {
                let reason = "Authentication failed. Please re-pair with the TV.".to_string();
                let already_halted = self.halted.swap(true, Ordering::SeqCst);
                if !already_halted {
                    if let Some(entry) = self.hass.config_entries.get(&self.entry_id) {
                        self.hass.config_entries.start_reauth(&entry, &reason);
                    }
                }
                return CoordinatorError::AuthFailed(reason);
            }
        }

        match err {
            CoordinatorError::UpdateFailed(msg) => CoordinatorError::UpdateFailed(msg),
            other => CoordinatorError::UpdateFailed(format!("Error communicating with TV: {}", other)),
        }
    }

    async fn fetch(&self) -> Result<TvData, CoordinatorError> {
        if !self.client.is_connected() {
            debug!("TV disconnected, attempting reconnect");
            if let Err(e) = self.client.disconnect().await {
                debug!(error = %e, "Disconnect before reconnect failed");
            }
            let connected = timed("connect", TIMEOUT_RECONNECT, self.client.connect()).await?;
            if !connected {
                self.available.store(false, Ordering::SeqCst);
                return Err(CoordinatorError::UpdateFailed(
                    "Failed to connect to TV".to_string(),
                ));
            }
        }
        self.available.store(true, Ordering::SeqCst);

        self.update_device_info().await;

        let state = timed("get_state", TIMEOUT_STATE, self.client.state()).await?;
        let is_on = state.as_ref().is_some_and(|s| !s.is_fake_sleep());

        let mut volume = None;
        let mut is_muted = false;
        if is_on {
            match timed("get_volume", TIMEOUT_VOLUME, self.client.volume()).await {
                Ok(v) => {
                    volume = v;
                    is_muted = self.client.is_muted();
                }
                Err(e) => debug!(error = %e, "get_volume failed"),
            }
        }

        Ok(TvData::from_state(state, volume, is_muted))
    }

    /// Fetch device info once and sync it into the device registry
    async fn update_device_info(&self) {
        if self.device_info_fetched.load(Ordering::SeqCst) {
            return;
        }

        match timed("get_device_info", TIMEOUT_DEVICE_INFO, self.client.device_info()).await {
            Ok(Some(info)) => {
                debug!(?info, "Got device info");
                self.apply_device_info(&info).await;
                self.device_info_fetched.store(true, Ordering::SeqCst);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Error fetching device info"),
        }
    }

    async fn apply_device_info(&self, info: &DeviceInfo) {
        let Some(mut data) = self.entry_data() else {
            return;
        };

        let device_id = data
            .device_id
            .clone()
            .or_else(|| data.mac.clone())
            .or_else(|| info.mac_address());

        let devices = &self.hass.registries.devices;
        let device = device_id
            .as_deref()
            .and_then(|id| devices.get_by_identifier(DOMAIN, id))
            .or_else(|| devices.get_by_identifier(DOMAIN, &self.entry_id));
        let Some(device) = device else {
            debug!("No registered device to update");
            return;
        };

        let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.is_empty());
        let model = non_empty(&info.model_name);
        let sw_version = non_empty(&info.tv_version);
        let name = non_empty(&info.tv_name);

        let changed = (model.is_some() && model != device.model)
            || (sw_version.is_some() && sw_version != device.sw_version)
            || (name.is_some() && name != device.name);
        if !changed {
            return;
        }

        devices.update(&device.id, |d| {
            if model.is_some() {
                d.model = model.clone();
            }
            if sw_version.is_some() {
                d.sw_version = sw_version.clone();
            }
            if name.is_some() {
                d.name = name.clone();
            }
        });
        if let Err(e) = devices.save().await {
            warn!(error = %e, "Failed to save device registry");
        }

        if model.is_some() {
            data.model = model;
        }
        if sw_version.is_some() {
            data.sw_version = sw_version;
        }
        if device_id.is_some() {
            data.device_id = device_id;
        }
        let update = ConfigEntryUpdate::new().data(data.to_map());
        if let Err(e) = self.hass.config_entries.update(&self.entry_id, update).await {
            warn!(error = %e, "Failed to persist device info");
        }
        info!(device_id = %device.id, "Updated device info");
    }

    /// Start polling at the scan interval; replaces a running poller
    pub fn start_polling(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let period = self.scan_interval;

        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(coordinator) = weak.upgrade() else {
                    break;
                };
                if coordinator.is_halted() {
                    break;
                }
                match coordinator.refresh().await {
                    Err(CoordinatorError::AuthFailed(_)) => {
                        info!(entry_id = %coordinator.entry_id, "Polling stopped until re-paired");
                        break;
                    }
                    Err(e) => debug!(entry_id = %coordinator.entry_id, error = %e, "Update failed"),
                    Ok(()) => {}
                }
            }
        });

        if let Ok(mut poller) = self.poller.lock() {
            if let Some(old) = poller.replace(handle) {
                old.abort();
            }
        }
    }

    pub fn stop_polling(&self) {
        if let Ok(mut poller) = self.poller.lock() {
            if let Some(handle) = poller.take() {
                handle.abort();
            }
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poller
            .lock()
            .map(|p| p.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    /// Stop polling and drop the TV session
    pub async fn shutdown(&self) {
        self.stop_polling();
        if let Err(e) = self.client.disconnect().await {
            debug!(error = %e, "Disconnect on shutdown failed");
        }
    }

    async fn command<F>(&self, op: &'static str, fut: F) -> Result<(), CoordinatorError>
    where
        F: Future<Output = Result<(), ClientError>>,
    {
        timed(op, TIMEOUT_COMMAND, fut).await?;
        Ok(())
    }

    /// Wake-on-LAN when a MAC is known, then power on
    pub async fn turn_on(&self) -> Result<(), CoordinatorError> {
        if let Some(data) = self.entry_data() {
            if let Some(mac) = data.mac.as_deref() {
                let broadcast = wol::broadcast_address(&data.host);
                debug!(mac, ?broadcast, "Sending WoL");
                if let Err(e) = wol::wake(mac, broadcast).await {
                    warn!(mac, error = %e, "Wake-on-LAN failed");
                }
            }
        }

        self.command("power_on", self.client.power_on()).await?;
        self.request_refresh().await;
        Ok(())
    }

    pub async fn turn_off(&self) -> Result<(), CoordinatorError> {
        self.command("power_off", self.client.power_off()).await?;
        self.request_refresh().await;
        Ok(())
    }

    pub async fn volume_up(&self) -> Result<(), CoordinatorError> {
        self.command("volume_up", self.client.volume_up()).await?;
        self.request_refresh().await;
        Ok(())
    }

    pub async fn volume_down(&self) -> Result<(), CoordinatorError> {
        self.command("volume_down", self.client.volume_down()).await?;
        self.request_refresh().await;
        Ok(())
    }

    /// Toggle mute
    pub async fn mute(&self) -> Result<(), CoordinatorError> {
        self.command("mute", self.client.mute()).await?;
        self.request_refresh().await;
        Ok(())
    }

    /// Volumes above 100 are clamped
    pub async fn set_volume(&self, volume: u8) -> Result<(), CoordinatorError> {
        self.command("set_volume", self.client.set_volume(volume.min(100)))
            .await?;
        self.request_refresh().await;
        Ok(())
    }

    pub async fn select_source(&self, source: &str) -> Result<(), CoordinatorError> {
        self.command("set_source", self.client.set_source(source))
            .await?;
        self.request_refresh().await;
        Ok(())
    }

    /// Send one key; no refresh follows
    pub async fn send_key(&self, key: RemoteKey) -> Result<(), CoordinatorError> {
        self.command("send_key", self.client.send_key(key)).await
    }

    pub async fn launch_app(&self, app: &str) -> Result<(), CoordinatorError> {
        self.command("launch_app", self.client.launch_app(app))
            .await?;
        self.request_refresh().await;
        Ok(())
    }

    pub async fn apps(&self) -> Result<Vec<AppInfo>, CoordinatorError> {
        let apps = timed("get_apps", TIMEOUT_COMMAND, self.client.apps()).await?;
        Ok(apps.unwrap_or_default())
    }

    pub async fn sources(&self) -> Result<Vec<SourceInfo>, CoordinatorError> {
        let sources = timed("get_sources", TIMEOUT_COMMAND, self.client.sources()).await?;
        Ok(sources.unwrap_or_default())
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.stop_polling();
    }
}
