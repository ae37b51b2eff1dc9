//! Core types for the Vidaa TV integration host
//!
//! This crate provides the fundamental types shared by every other crate in
//! the workspace: EntityId, State, Event, Context, ServiceCall and the
//! entity platforms the integration exposes.

mod context;
mod entity_id;
mod event;
mod platform;
mod service_call;
mod state;

pub use context::Context;
pub use entity_id::{slugify, EntityId, EntityIdError};
pub use event::{Event, EventData, EventType};
pub use platform::{Platform, UnknownPlatform};
pub use service_call::{ServiceCall, SupportsResponse};
pub use state::State;

/// Maximum length for a state value
pub const MAX_STATE_LENGTH: usize = 255;

/// Entity is switched on
pub const STATE_ON: &str = "on";

/// Entity is switched off
pub const STATE_OFF: &str = "off";

/// Entity cannot currently be reached
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// Entity is reachable but has no value
pub const STATE_UNKNOWN: &str = "unknown";

/// Standard event types fired on the bus
pub mod events {
    use super::*;

    /// Event type for state changes
    pub const STATE_CHANGED: &str = "state_changed";

    /// Fired when a config entry needs to be re-paired
    pub const CONFIG_ENTRY_REAUTH: &str = "config_entry_reauth";

    /// Data for STATE_CHANGED events
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    pub struct StateChangedData {
        pub entity_id: EntityId,
        pub old_state: Option<State>,
        pub new_state: Option<State>,
    }

    impl EventData for StateChangedData {
        fn event_type() -> &'static str {
            STATE_CHANGED
        }
    }

    /// Data for CONFIG_ENTRY_REAUTH events
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    pub struct ConfigEntryReauthData {
        pub domain: String,
        pub entry_id: String,
        pub reason: String,
    }

    impl EventData for ConfigEntryReauthData {
        fn event_type() -> &'static str {
            CONFIG_ENTRY_REAUTH
        }
    }
}
