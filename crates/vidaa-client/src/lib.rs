//! Vidaa TV client seam
//!
//! Types shared between the integration and the TV control library:
//! - [`TvClient`] / [`ClientFactory`]: the session trait objects
//! - [`RemoteKey`]: remote keys and their lenient parser
//! - [`apps`]: built-in app catalog
//! - [`wol`]: Wake-on-LAN magic packets and ARP table MAC lookup

pub mod apps;
mod client;
mod error;
mod keys;
mod payload;
pub mod wol;

pub use client::{timed, ClientFactory, ClientResult, ConnectParams, TvClient, DEFAULT_PORT};
pub use error::ClientError;
pub use keys::{RemoteKey, UnknownKey};
pub use payload::{
    normalize_mac, AppInfo, DeviceInfo, SourceInfo, TvState, STATETYPE_APP, STATETYPE_SOURCE,
    STATE_FAKE_SLEEP,
};
