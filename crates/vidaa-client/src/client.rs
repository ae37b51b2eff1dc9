//! The TV client seam
//!
//! The session itself (TLS, PIN pairing, key framing) belongs to the TV
//! control library. The integration only talks to it through [`TvClient`],
//! which production code implements over the real library and tests fake.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ClientError;
use crate::keys::RemoteKey;
use crate::payload::{AppInfo, DeviceInfo, SourceInfo, TvState};

pub type ClientResult<T> = Result<T, ClientError>;

/// Default port of the TV's control endpoint
pub const DEFAULT_PORT: u16 = 36669;

/// Everything needed to open a session with one TV
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub mac: Option<String>,
    /// File where the library keeps pairing tokens
    pub token_path: PathBuf,
}

/// One session with one TV
#[async_trait]
pub trait TvClient: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Mute flag as last reported by the TV
    fn is_muted(&self) -> bool;

    /// Returns `false` when the TV refused or did not answer
    async fn connect(&self) -> ClientResult<bool>;

    async fn disconnect(&self) -> ClientResult<()>;

    /// Ask the TV to show a pairing PIN on screen
    async fn start_pairing(&self) -> ClientResult<()>;

    /// Complete pairing; `false` means the PIN was wrong
    async fn authenticate(&self, pin: &str) -> ClientResult<bool>;

    async fn device_info(&self) -> ClientResult<Option<DeviceInfo>>;

    async fn state(&self) -> ClientResult<Option<TvState>>;

    async fn volume(&self) -> ClientResult<Option<u8>>;

    async fn power_on(&self) -> ClientResult<()>;

    async fn power_off(&self) -> ClientResult<()>;

    async fn volume_up(&self) -> ClientResult<()>;

    async fn volume_down(&self) -> ClientResult<()>;

    /// Toggle mute
    async fn mute(&self) -> ClientResult<()>;

    async fn set_volume(&self, volume: u8) -> ClientResult<()>;

    async fn set_source(&self, source: &str) -> ClientResult<()>;

    async fn send_key(&self, key: RemoteKey) -> ClientResult<()>;

    async fn launch_app(&self, app: &str) -> ClientResult<()>;

    async fn apps(&self) -> ClientResult<Option<Vec<AppInfo>>>;

    async fn sources(&self) -> ClientResult<Option<Vec<SourceInfo>>>;
}

/// Builds clients for config flows and entry setup
#[async_trait]
pub trait ClientFactory: Send + Sync {
    fn create(&self, params: &ConnectParams) -> Arc<dyn TvClient>;

    /// MAC address of `host` known to this machine, before any session
    async fn resolve_mac(&self, host: &str) -> Option<String> {
        crate::wol::mac_from_ip(host).await
    }
}

/// Run a client call with a deadline
pub async fn timed<T, F>(op: &'static str, limit: Duration, fut: F) -> ClientResult<T>
where
    F: Future<Output = ClientResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ClientError::Timeout(op)),
    }
}
