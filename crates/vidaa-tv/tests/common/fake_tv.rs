//! In-memory TV implementing the client seam

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use vidaa_client::{
    AppInfo, ClientError, ClientFactory, ClientResult, ConnectParams, DeviceInfo, RemoteKey,
    SourceInfo, TvClient, TvState, STATETYPE_APP, STATETYPE_SOURCE, STATE_FAKE_SLEEP,
};

pub const TV_NAME: &str = "Living Room TV";
pub const TV_MAC: &str = "AA:BB:CC:DD:EE:FF";
pub const TV_PIN: &str = "1234";

struct Inner {
    reachable: bool,
    state: Option<TvState>,
    volume: Option<u8>,
    muted: bool,
    apps: Vec<AppInfo>,
    sources: Vec<SourceInfo>,
    device_info: Option<DeviceInfo>,
    pin: String,
    auth_error: bool,
    fail_commands: bool,
    pairing_requests: u32,
    commands: Vec<String>,
}

/// A TV that is on, showing Netflix at volume 25
pub struct FakeTv {
    inner: Mutex<Inner>,
    connected: AtomicBool,
}

fn tv_state(statetype: &str, name: Option<&str>, source: Option<&str>) -> TvState {
    TvState {
        statetype: Some(statetype.to_string()),
        name: name.map(String::from),
        displayname: source.map(String::from),
        sourcename: source.map(String::from),
        extra: HashMap::new(),
    }
}

fn app(name: &str) -> AppInfo {
    AppInfo {
        name: name.to_string(),
        app_id: Some(name.to_lowercase()),
        extra: HashMap::new(),
    }
}

fn source(name: &str) -> SourceInfo {
    SourceInfo {
        sourceid: Some(name.to_lowercase()),
        sourcename: Some(name.to_string()),
        displayname: Some(name.to_string()),
        extra: HashMap::new(),
    }
}

pub fn device_info(name: &str, mac: &str) -> DeviceInfo {
    serde_json::from_value(json!({
        "tv_name": name,
        "model_name": "65U8",
        "tv_version": "V0000.01.00a.N0407",
        "network_type": "wlan",
        "wlan0": mac.to_lowercase(),
    }))
    .unwrap()
}

impl FakeTv {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                reachable: true,
                state: Some(tv_state(STATETYPE_APP, Some("netflix"), None)),
                volume: Some(25),
                muted: false,
                apps: vec![app("Netflix"), app("YouTube")],
                sources: vec![source("HDMI 1"), source("TV")],
                device_info: Some(device_info(TV_NAME, TV_MAC)),
                pin: TV_PIN.to_string(),
                auth_error: false,
                fail_commands: false,
                pairing_requests: 0,
                commands: Vec::new(),
            }),
            connected: AtomicBool::new(false),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut inner = self.inner.lock().unwrap();
        f(&mut inner)
    }

    pub fn set_app(&self, name: &str) {
        self.with(|i| i.state = Some(tv_state(STATETYPE_APP, Some(name), None)));
    }

    pub fn set_source(&self, name: &str) {
        self.with(|i| i.state = Some(tv_state(STATETYPE_SOURCE, None, Some(name))));
    }

    pub fn set_off(&self) {
        self.with(|i| i.state = Some(tv_state(STATE_FAKE_SLEEP, None, None)));
    }

    pub fn set_no_state(&self) {
        self.with(|i| i.state = None);
    }

    pub fn set_muted(&self, muted: bool) {
        self.with(|i| i.muted = muted);
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.with(|i| i.reachable = reachable);
        if !reachable {
            self.connected.store(false, Ordering::SeqCst);
        }
    }

    pub fn set_auth_error(&self, auth_error: bool) {
        self.with(|i| i.auth_error = auth_error);
    }

    pub fn set_fail_commands(&self, fail: bool) {
        self.with(|i| i.fail_commands = fail);
    }

    pub fn set_device_info(&self, info: Option<DeviceInfo>) {
        self.with(|i| i.device_info = info);
    }

    pub fn commands(&self) -> Vec<String> {
        self.with(|i| i.commands.clone())
    }

    pub fn clear_commands(&self) {
        self.with(|i| i.commands.clear());
    }

    pub fn pairing_requests(&self) -> u32 {
        self.with(|i| i.pairing_requests)
    }

    fn command(&self, name: String, apply: impl FnOnce(&mut Inner)) -> ClientResult<()> {
        self.with(|i| {
            if i.fail_commands {
                return Err(ClientError::Command(format!("{} rejected", name)));
            }
            i.commands.push(name);
            apply(i);
            Ok(())
        })
    }

    fn query<T>(&self, f: impl FnOnce(&Inner) -> T) -> ClientResult<T> {
        self.with(|i| {
            if i.auth_error {
                return Err(ClientError::Auth("401 unauthorized".to_string()));
            }
            if !i.reachable {
                return Err(ClientError::Io("host unreachable".to_string()));
            }
            Ok(f(i))
        })
    }
}

#[async_trait]
impl TvClient for FakeTv {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_muted(&self) -> bool {
        self.with(|i| i.muted)
    }

    async fn connect(&self) -> ClientResult<bool> {
        let reachable = self.with(|i| i.reachable);
        self.connected.store(reachable, Ordering::SeqCst);
        Ok(reachable)
    }

    async fn disconnect(&self) -> ClientResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn start_pairing(&self) -> ClientResult<()> {
        self.with(|i| i.pairing_requests += 1);
        Ok(())
    }

    async fn authenticate(&self, pin: &str) -> ClientResult<bool> {
        Ok(self.with(|i| i.pin == pin))
    }

    async fn device_info(&self) -> ClientResult<Option<DeviceInfo>> {
        self.query(|i| i.device_info.clone())
    }

    async fn state(&self) -> ClientResult<Option<TvState>> {
        self.query(|i| i.state.clone())
    }

    async fn volume(&self) -> ClientResult<Option<u8>> {
        self.query(|i| i.volume)
    }

    async fn power_on(&self) -> ClientResult<()> {
        self.command("power_on".into(), |i| {
            i.state = Some(tv_state(STATETYPE_SOURCE, None, Some("TV")));
        })
    }

    async fn power_off(&self) -> ClientResult<()> {
        self.command("power_off".into(), |i| {
            i.state = Some(tv_state(STATE_FAKE_SLEEP, None, None));
        })
    }

    async fn volume_up(&self) -> ClientResult<()> {
        self.command("volume_up".into(), |i| {
            i.volume = i.volume.map(|v| v.saturating_add(1).min(100));
        })
    }

    async fn volume_down(&self) -> ClientResult<()> {
        self.command("volume_down".into(), |i| {
            i.volume = i.volume.map(|v| v.saturating_sub(1));
        })
    }

    async fn mute(&self) -> ClientResult<()> {
        self.command("mute".into(), |i| i.muted = !i.muted)
    }

    async fn set_volume(&self, volume: u8) -> ClientResult<()> {
        self.command(format!("set_volume:{}", volume), |i| i.volume = Some(volume))
    }

    async fn set_source(&self, name: &str) -> ClientResult<()> {
        let name = name.to_string();
        self.command(format!("set_source:{}", name), |i| {
            i.state = Some(tv_state(STATETYPE_SOURCE, None, Some(&name)));
        })
    }

    async fn send_key(&self, key: RemoteKey) -> ClientResult<()> {
        self.command(format!("send_key:{}", key.as_str()), |_| {})
    }

    async fn launch_app(&self, app: &str) -> ClientResult<()> {
        let app = app.to_string();
        self.command(format!("launch_app:{}", app), |i| {
            i.state = Some(tv_state(STATETYPE_APP, Some(&app), None));
        })
    }

    async fn apps(&self) -> ClientResult<Option<Vec<AppInfo>>> {
        self.query(|i| Some(i.apps.clone()))
    }

    async fn sources(&self) -> ClientResult<Option<Vec<SourceInfo>>> {
        self.query(|i| Some(i.sources.clone()))
    }
}

/// Hands out the same [`FakeTv`] for every connection
pub struct FakeFactory {
    pub tv: Arc<FakeTv>,
    params: Mutex<Vec<ConnectParams>>,
    arp: Mutex<HashMap<String, String>>,
}

impl FakeFactory {
    pub fn new(tv: Arc<FakeTv>) -> Self {
        Self {
            tv,
            params: Mutex::new(Vec::new()),
            arp: Mutex::new(HashMap::new()),
        }
    }

    /// Neighbour table entry seen by the MAC lookup
    pub fn set_arp_entry(&self, host: &str, mac: &str) {
        self.arp
            .lock()
            .unwrap()
            .insert(host.to_string(), mac.to_string());
    }

    /// Parameters of every client created so far
    pub fn created(&self) -> Vec<ConnectParams> {
        self.params.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClientFactory for FakeFactory {
    fn create(&self, params: &ConnectParams) -> Arc<dyn TvClient> {
        self.params.lock().unwrap().push(params.clone());
        Arc::clone(&self.tv) as Arc<dyn TvClient>
    }

    async fn resolve_mac(&self, host: &str) -> Option<String> {
        self.arp.lock().unwrap().get(host).cloned()
    }
}
