//! Config and options flows
//!
//! Manual setup runs `user` -> `pair`. A discovered TV runs `ssdp` ->
//! `confirm` -> `pair`. Re-pairing runs `reauth` -> `reauth_confirm` ->
//! `pair`. One client is kept alive from the step that starts pairing until
//! the PIN is accepted, so the pairing session on the TV stays open.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;
use vidaa_client::{normalize_mac, timed, ClientFactory, ConnectParams, DeviceInfo, TvClient};
use vidaa_config_entries::{
    ConfigEntriesError, ConfigEntry, ConfigEntrySource, ConfigEntryUpdate,
};

use crate::config::{VidaaEntryData, VidaaOptions};
use crate::consts::{
    CONF_HOST, CONF_PORT, CONF_SCAN_INTERVAL, DEFAULT_NAME, DEFAULT_PORT, DOMAIN,
    PIN_DISPLAY_DELAY, TIMEOUT_AUTH, TIMEOUT_CONNECT, TIMEOUT_DEVICE_INFO,
};
use crate::hass::Hass;

pub const ERROR_CANNOT_CONNECT: &str = "cannot_connect";
pub const ERROR_UNKNOWN: &str = "unknown";
pub const ERROR_INVALID_PIN: &str = "invalid_pin";
pub const ERROR_PAIRING_FAILED: &str = "pairing_failed";
pub const ERROR_INVALID_SCAN_INTERVAL: &str = "invalid_scan_interval";

pub const ABORT_ALREADY_CONFIGURED: &str = "already_configured";
pub const ABORT_NOT_VIDAA_TV: &str = "not_vidaa_tv";
pub const ABORT_NO_HOST: &str = "no_host";
pub const ABORT_REAUTH_SUCCESSFUL: &str = "reauth_successful";

/// Outcome of one flow step
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowResult {
    Form {
        step_id: &'static str,
        errors: HashMap<String, String>,
        description_placeholders: HashMap<String, String>,
    },
    CreateEntry {
        entry_id: String,
        title: String,
        data: HashMap<String, Value>,
    },
    Abort {
        reason: String,
    },
}

impl FlowResult {
    fn form(step_id: &'static str) -> Self {
        FlowResult::Form {
            step_id,
            errors: HashMap::new(),
            description_placeholders: HashMap::new(),
        }
    }

    fn abort(reason: &str) -> Self {
        FlowResult::Abort {
            reason: reason.to_string(),
        }
    }

    fn with_error(mut self, field: &str, key: &str) -> Self {
        if let FlowResult::Form { errors, .. } = &mut self {
            errors.insert(field.to_string(), key.to_string());
        }
        self
    }

    fn with_placeholder(mut self, key: &str, value: impl Into<String>) -> Self {
        if let FlowResult::Form {
            description_placeholders,
            ..
        } = &mut self
        {
            description_placeholders.insert(key.to_string(), value.into());
        }
        self
    }

    /// Step id of a form
    pub fn step_id(&self) -> Option<&'static str> {
        match self {
            FlowResult::Form { step_id, .. } => Some(*step_id),
            _ => None,
        }
    }

    /// The form's `base` error
    pub fn base_error(&self) -> Option<&str> {
        match self {
            FlowResult::Form { errors, .. } => errors.get("base").map(String::as_str),
            _ => None,
        }
    }

    pub fn abort_reason(&self) -> Option<&str> {
        match self {
            FlowResult::Abort { reason } => Some(reason.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    ConfigEntries(#[from] ConfigEntriesError),

    #[error("config entry {0} not found")]
    UnknownEntry(String),

    #[error("config entry {0} has unreadable data: {1}")]
    InvalidEntryData(String, String),
}

pub type FlowStep = Result<FlowResult, FlowError>;

/// Input of the `user` step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInput {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl UserInput {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
        }
    }
}

/// An SSDP announcement handed to the flow by discovery
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SsdpDiscovery {
    pub ssdp_location: Option<String>,
    pub ssdp_usn: Option<String>,
    #[serde(default)]
    pub ssdp_headers: HashMap<String, String>,
    /// Device description fields (`friendlyName`, `modelDescription`, ...)
    #[serde(default)]
    pub upnp: HashMap<String, String>,
}

impl SsdpDiscovery {
    /// `vidaa_support=1` on one of the modelDescription lines
    pub fn supports_vidaa(&self) -> bool {
        self.upnp
            .get("modelDescription")
            .map(|desc| {
                desc.lines().any(|line| {
                    line.split_once('=')
                        .is_some_and(|(k, v)| k.trim() == "vidaa_support" && v.trim() == "1")
                })
            })
            .unwrap_or(false)
    }

    /// `_host` header, else the location; URLs are reduced to their host
    pub fn host(&self) -> Option<String> {
        let raw = self
            .ssdp_headers
            .get("_host")
            .filter(|h| !h.is_empty())
            .or(self.ssdp_location.as_ref())?;
        let host = if raw.contains("://") {
            Url::parse(raw).ok()?.host_str()?.to_string()
        } else {
            raw.clone()
        };
        (!host.is_empty()).then_some(host)
    }

    /// UUID from the USN, without the `uuid:` prefix and `::` suffix
    pub fn unique_id(&self) -> Option<String> {
        let usn = self.ssdp_usn.as_deref().filter(|u| !u.is_empty())?;
        let head = usn.split("::").next().unwrap_or(usn);
        Some(head.replace("uuid:", ""))
    }
}

/// Unique id derived from a MAC: no separators, lower-case
pub fn unique_id_from_mac(mac: &str) -> String {
    mac.replace(':', "").to_lowercase()
}

/// Flow that adds or re-pairs a TV
pub struct ConfigFlow {
    hass: Arc<Hass>,
    factory: Arc<dyn ClientFactory>,
    source: ConfigEntrySource,
    host: Option<String>,
    port: u16,
    name: String,
    mac: Option<String>,
    device_id: Option<String>,
    model: Option<String>,
    sw_version: Option<String>,
    unique_id: Option<String>,
    reauth_entry_id: Option<String>,
    client: Option<Arc<dyn TvClient>>,
    pairing_delay: Duration,
}

impl ConfigFlow {
    pub fn new(hass: Arc<Hass>, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            hass,
            factory,
            source: ConfigEntrySource::User,
            host: None,
            port: DEFAULT_PORT,
            name: DEFAULT_NAME.to_string(),
            mac: None,
            device_id: None,
            model: None,
            sw_version: None,
            unique_id: None,
            reauth_entry_id: None,
            client: None,
            pairing_delay: PIN_DISPLAY_DELAY,
        }
    }

    /// Wait after starting pairing before asking for the PIN
    pub fn with_pairing_delay(mut self, delay: Duration) -> Self {
        self.pairing_delay = delay;
        self
    }

    pub fn source(&self) -> ConfigEntrySource {
        self.source
    }

    pub fn unique_id(&self) -> Option<&str> {
        self.unique_id.as_deref()
    }

    /// Manual entry of the TV address
    pub async fn step_user(&mut self, input: Option<UserInput>) -> FlowStep {
        let Some(input) = input else {
            return Ok(FlowResult::form("user"));
        };
        self.host = Some(input.host);
        self.port = input.port;
        self.resolve_mac().await;

        let client = self.open_client().await;
        match timed("connect", TIMEOUT_CONNECT, client.connect()).await {
            Ok(true) => {}
            Ok(false) => {
                self.cleanup_client().await;
                return Ok(FlowResult::form("user").with_error("base", ERROR_CANNOT_CONNECT));
            }
            Err(e) => {
                debug!(error = %e, "Config flow connection error");
                self.cleanup_client().await;
                return Ok(FlowResult::form("user").with_error("base", ERROR_UNKNOWN));
            }
        }

        match timed("device_info", TIMEOUT_DEVICE_INFO, client.device_info()).await {
            Ok(Some(info)) => {
                self.name = info.tv_name.clone().unwrap_or_else(|| DEFAULT_NAME.to_string());
                self.model = info.model_name.clone();
                self.sw_version = info.tv_version.clone();
                self.take_mac(&info);
            }
            Ok(None) => {}
            Err(e) => {
                debug!(error = %e, "Config flow device info error");
                self.cleanup_client().await;
                return Ok(FlowResult::form("user").with_error("base", ERROR_UNKNOWN));
            }
        }

        if let Some(mac) = self.mac.clone() {
            self.device_id = Some(mac.clone());
            self.unique_id = Some(unique_id_from_mac(&mac));
            if let Some(aborted) = self.abort_if_configured(true).await? {
                return Ok(aborted);
            }
        }

        if let Err(e) = self.begin_pairing().await {
            debug!(error = %e, "Could not start pairing");
            self.cleanup_client().await;
            return Ok(FlowResult::form("user").with_error("base", ERROR_UNKNOWN));
        }
        self.step_pair(None).await
    }

    /// PIN entry, using the client that started pairing
    pub async fn step_pair(&mut self, pin: Option<&str>) -> FlowStep {
        let Some(pin) = pin else {
            return Ok(self.pair_form());
        };
        let Some(client) = self.client.clone() else {
            return Ok(self.pair_form().with_error("base", ERROR_CANNOT_CONNECT));
        };

        match timed("authenticate", TIMEOUT_AUTH, client.authenticate(pin)).await {
            Ok(true) => {}
            Ok(false) => {
                if let Err(e) = self.begin_pairing().await {
                    debug!(error = %e, "Could not re-trigger PIN");
                }
                return Ok(self.pair_form().with_error("base", ERROR_INVALID_PIN));
            }
            Err(e) => {
                warn!(error = %e, "Error during pairing");
                return Ok(self.pair_form().with_error("base", ERROR_PAIRING_FAILED));
            }
        }

        match timed("device_info", TIMEOUT_DEVICE_INFO, client.device_info()).await {
            Ok(Some(info)) => {
                if let Some(name) = info.tv_name.clone() {
                    self.name = name;
                }
                self.model = info.model_name.clone().or(self.model.take());
                self.sw_version = info.tv_version.clone().or(self.sw_version.take());
                self.take_mac(&info);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Error reading device info after pairing");
                return Ok(self.pair_form().with_error("base", ERROR_PAIRING_FAILED));
            }
        }
        self.cleanup_client().await;

        if let Some(reauth_entry_id) = self.reauth_entry_id.clone() {
            return self.finish_reauth(&reauth_entry_id).await;
        }

        if let Some(device_id) = self.device_id.clone() {
            self.unique_id = Some(unique_id_from_mac(&device_id));
            if let Some(aborted) = self.abort_if_configured(true).await? {
                return Ok(aborted);
            }
        }

        self.create_entry().await
    }

    /// A TV announced itself over SSDP
    pub async fn step_ssdp(&mut self, discovery: SsdpDiscovery) -> FlowStep {
        debug!(?discovery, "SSDP discovery");
        self.source = ConfigEntrySource::Ssdp;

        if !discovery.supports_vidaa() {
            return Ok(FlowResult::abort(ABORT_NOT_VIDAA_TV));
        }
        let Some(host) = discovery.host() else {
            return Ok(FlowResult::abort(ABORT_NO_HOST));
        };
        self.host = Some(host);
        self.name = discovery
            .upnp
            .get("friendlyName")
            .cloned()
            .unwrap_or_else(|| DEFAULT_NAME.to_string());

        if let Some(unique_id) = discovery.unique_id() {
            self.unique_id = Some(unique_id);
            if let Some(aborted) = self.abort_if_configured(false).await? {
                return Ok(aborted);
            }
        }

        self.step_confirm(false).await
    }

    /// Ask the user before pairing with a discovered TV
    pub async fn step_confirm(&mut self, confirmed: bool) -> FlowStep {
        if !confirmed {
            return Ok(FlowResult::form("confirm")
                .with_placeholder("name", self.name.clone())
                .with_placeholder("host", self.host.clone().unwrap_or_default()));
        }

        self.resolve_mac().await;
        let client = self.open_client().await;
        match timed("connect", TIMEOUT_CONNECT, client.connect()).await {
            Ok(true) => {}
            Ok(false) => {
                self.cleanup_client().await;
                return Ok(FlowResult::abort(ERROR_CANNOT_CONNECT));
            }
            Err(e) => {
                warn!(error = %e, "Error connecting for SSDP pairing");
                self.cleanup_client().await;
                return Ok(FlowResult::abort(ERROR_CANNOT_CONNECT));
            }
        }

        if let Ok(Some(info)) = timed("device_info", TIMEOUT_DEVICE_INFO, client.device_info()).await {
            if let Some(name) = info.tv_name.clone() {
                self.name = name;
            }
            self.model = info.model_name.clone();
            self.sw_version = info.tv_version.clone();
            self.take_mac(&info);
        }

        if let Err(e) = self.begin_pairing().await {
            warn!(error = %e, "Error starting SSDP pairing");
            self.cleanup_client().await;
            return Ok(FlowResult::abort(ERROR_CANNOT_CONNECT));
        }
        self.step_pair(None).await
    }

    /// Re-pair the TV behind an existing entry
    pub async fn step_reauth(&mut self, entry_id: &str) -> FlowStep {
        let entry = self
            .hass
            .config_entries
            .get(entry_id)
            .ok_or_else(|| FlowError::UnknownEntry(entry_id.to_string()))?;
        let data = VidaaEntryData::from_entry(&entry)
            .map_err(|e| FlowError::InvalidEntryData(entry_id.to_string(), e.to_string()))?;

        self.source = ConfigEntrySource::Reauth;
        self.reauth_entry_id = Some(entry.entry_id.clone());
        self.unique_id = entry.unique_id.clone();
        self.host = Some(data.host);
        self.port = data.port;
        self.name = data.name;
        self.mac = data.mac;
        self.device_id = data.device_id;
        self.model = data.model;
        self.sw_version = data.sw_version;

        self.step_reauth_confirm(false).await
    }

    pub async fn step_reauth_confirm(&mut self, confirmed: bool) -> FlowStep {
        if !confirmed {
            return Ok(FlowResult::form("reauth_confirm")
                .with_placeholder("host", self.host.clone().unwrap_or_default()));
        }

        let client = self.open_client().await;
        let started = match timed("connect", TIMEOUT_CONNECT, client.connect()).await {
            Ok(true) => self.begin_pairing().await.map(|_| true),
            Ok(false) => Ok(false),
            Err(e) => Err(e),
        };
        match started {
            Ok(true) => self.step_pair(None).await,
            Ok(false) => {
                self.cleanup_client().await;
                Ok(FlowResult::abort(ERROR_CANNOT_CONNECT))
            }
            Err(e) => {
                warn!(error = %e, "Error during reauth");
                self.cleanup_client().await;
                Ok(FlowResult::abort(ERROR_CANNOT_CONNECT))
            }
        }
    }

    fn pair_form(&self) -> FlowResult {
        FlowResult::form("pair")
            .with_placeholder("name", self.name.clone())
            .with_placeholder("host", self.host.clone().unwrap_or_default())
    }

    /// MAC from this machine's neighbour table; device info may replace it
    async fn resolve_mac(&mut self) {
        let Some(host) = self.host.clone() else {
            return;
        };
        self.mac = self
            .factory
            .resolve_mac(&host)
            .await
            .and_then(|mac| normalize_mac(&mac));
        debug!(mac = ?self.mac, "Resolved MAC from ARP");
    }

    fn take_mac(&mut self, info: &DeviceInfo) {
        if let Some(mac) = info.mac_address() {
            debug!(mac = %mac, "Device info MAC");
            self.device_id = Some(mac.clone());
            self.mac = Some(mac);
        }
    }

    fn entry_data(&self) -> VidaaEntryData {
        VidaaEntryData {
            host: self.host.clone().unwrap_or_default(),
            port: self.port,
            name: self.name.clone(),
            mac: self.mac.clone(),
            device_id: self.device_id.clone(),
            model: self.model.clone(),
            sw_version: self.sw_version.clone(),
        }
    }

    /// Replace any open client with a fresh one for the current address
    async fn open_client(&mut self) -> Arc<dyn TvClient> {
        self.cleanup_client().await;
        let params = ConnectParams {
            host: self.host.clone().unwrap_or_default(),
            port: self.port,
            mac: self.mac.clone(),
            token_path: self.hass.token_path(),
        };
        let client = self.factory.create(&params);
        self.client = Some(Arc::clone(&client));
        client
    }

    async fn cleanup_client(&mut self) {
        if let Some(client) = self.client.take() {
            if let Err(e) = client.disconnect().await {
                debug!(error = %e, "Error disconnecting flow client");
            }
        }
    }

    /// Ask the TV to show its PIN and give it time to appear
    async fn begin_pairing(&self) -> vidaa_client::ClientResult<()> {
        let Some(client) = &self.client else {
            return Err(vidaa_client::ClientError::NotConnected);
        };
        client.start_pairing().await?;
        if !self.pairing_delay.is_zero() {
            tokio::time::sleep(self.pairing_delay).await;
        }
        Ok(())
    }

    /// Abort when the unique id is taken, moving that entry to the new address
    async fn abort_if_configured(&mut self, update_port: bool) -> Result<Option<FlowResult>, FlowError> {
        let Some(unique_id) = self.unique_id.clone() else {
            return Ok(None);
        };
        let entries = &self.hass.config_entries;
        let Some(existing) = entries.get_by_unique_id(DOMAIN, &unique_id) else {
            return Ok(None);
        };

        let mut data = existing.data.clone();
        let mut changed = false;
        if let Some(host) = &self.host {
            changed |= data.insert(CONF_HOST.to_string(), Value::from(host.clone()))
                != Some(Value::from(host.clone()));
        }
        if update_port {
            changed |= data.insert(CONF_PORT.to_string(), Value::from(self.port))
                != Some(Value::from(self.port));
        }

        if changed {
            entries
                .update(&existing.entry_id, ConfigEntryUpdate::new().data(data))
                .await?;
            if existing.is_loaded() {
                info!(entry_id = %existing.entry_id, "TV moved, reloading entry");
                if let Err(e) = entries.reload(&existing.entry_id).await {
                    warn!(entry_id = %existing.entry_id, error = %e, "Reload after address change failed");
                }
            }
        }

        self.cleanup_client().await;
        Ok(Some(FlowResult::abort(ABORT_ALREADY_CONFIGURED)))
    }

    async fn create_entry(&mut self) -> FlowStep {
        let data = self.entry_data().to_map();
        let mut entry = ConfigEntry::new(DOMAIN, self.name.clone())
            .with_data(data.clone())
            .with_source(self.source);
        if let Some(unique_id) = &self.unique_id {
            entry = entry.with_unique_id(unique_id.clone());
        }

        let entry = self.hass.config_entries.add(entry).await?;
        info!(entry_id = %entry.entry_id, title = %entry.title, "Created Vidaa TV entry");

        if let Err(e) = self.hass.config_entries.setup(&entry.entry_id).await {
            debug!(entry_id = %entry.entry_id, error = %e, "Initial setup did not complete");
        }

        Ok(FlowResult::CreateEntry {
            entry_id: entry.entry_id,
            title: entry.title,
            data,
        })
    }

    async fn finish_reauth(&mut self, entry_id: &str) -> FlowStep {
        let entries = &self.hass.config_entries;
        entries
            .update(entry_id, ConfigEntryUpdate::new().data(self.entry_data().to_map()))
            .await?;
        if let Err(e) = entries.reload(entry_id).await {
            debug!(entry_id, error = %e, "Reload after reauth did not complete");
        }
        info!(entry_id, "Reauthentication successful");
        Ok(FlowResult::abort(ABORT_REAUTH_SUCCESSFUL))
    }
}

/// Options of a configured TV
pub struct OptionsFlow {
    hass: Arc<Hass>,
    entry_id: String,
}

impl OptionsFlow {
    pub fn new(hass: Arc<Hass>, entry_id: impl Into<String>) -> Self {
        Self {
            hass,
            entry_id: entry_id.into(),
        }
    }

    pub async fn step_init(&mut self, input: Option<HashMap<String, Value>>) -> FlowStep {
        let entry = self
            .hass
            .config_entries
            .get(&self.entry_id)
            .ok_or_else(|| FlowError::UnknownEntry(self.entry_id.clone()))?;
        let current = VidaaOptions::from_entry(&entry);
        let form = || {
            FlowResult::form("init")
                .with_placeholder(CONF_SCAN_INTERVAL, current.scan_interval.to_string())
        };

        let Some(input) = input else {
            return Ok(form());
        };
        let options = match VidaaOptions::parse(&input) {
            Ok(options) => options,
            Err(e) => {
                debug!(error = %e, "Rejected options");
                return Ok(form().with_error(CONF_SCAN_INTERVAL, ERROR_INVALID_SCAN_INTERVAL));
            }
        };

        let data = options.to_map();
        self.hass
            .config_entries
            .update_options(&self.entry_id, data.clone())
            .await?;
        Ok(FlowResult::CreateEntry {
            entry_id: self.entry_id.clone(),
            title: String::new(),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discovery(desc: &str) -> SsdpDiscovery {
        SsdpDiscovery {
            ssdp_location: Some("http://192.168.1.50:38400/MediaServer/rendererdevicedesc.xml".into()),
            ssdp_usn: Some("uuid:abc-123::urn:schemas-upnp-org:device:MediaRenderer:1".into()),
            ssdp_headers: HashMap::new(),
            upnp: HashMap::from([
                ("modelDescription".to_string(), desc.to_string()),
                ("friendlyName".to_string(), "Living Room".to_string()),
            ]),
        }
    }

    #[test]
    fn test_vidaa_support_line() {
        assert!(discovery("platform=x\nvidaa_support = 1\n").supports_vidaa());
        assert!(!discovery("vidaa_support=0").supports_vidaa());
        assert!(!discovery("").supports_vidaa());
    }

    #[test]
    fn test_host_from_location() {
        assert_eq!(discovery("").host().as_deref(), Some("192.168.1.50"));

        let mut with_header = discovery("");
        with_header
            .ssdp_headers
            .insert("_host".to_string(), "10.0.0.7".to_string());
        assert_eq!(with_header.host().as_deref(), Some("10.0.0.7"));

        let mut none = discovery("");
        none.ssdp_location = None;
        assert_eq!(none.host(), None);
    }

    #[test]
    fn test_unique_id_from_usn() {
        assert_eq!(discovery("").unique_id().as_deref(), Some("abc-123"));

        let mut bare = discovery("");
        bare.ssdp_usn = Some("uuid:abc-456".into());
        assert_eq!(bare.unique_id().as_deref(), Some("abc-456"));
    }

    #[test]
    fn test_unique_id_from_mac() {
        assert_eq!(unique_id_from_mac("AA:BB:CC:DD:EE:FF"), "aabbccddeeff");
    }

    #[test]
    fn test_flow_result_serializes_with_type_tag() {
        let result = FlowResult::abort(ABORT_NO_HOST);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["type"], "abort");
        assert_eq!(json["reason"], "no_host");
    }
}
