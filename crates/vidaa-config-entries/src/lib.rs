//! Config Entries
//!
//! A config entry is one configured TV. This crate stores entries in
//! `.storage/core.config_entries` and runs their lifecycle (setup, unload,
//! reload, scheduled retry) through the integration's [`EntryHandler`].
//!
//! # Key Types
//!
//! - [`ConfigEntry`] - A single configured device
//! - [`ConfigEntryState`] - Lifecycle state of an entry
//! - [`ConfigEntries`] - Manager for all config entries

pub mod entry;
pub mod manager;
pub mod state_machine;

pub use entry::{
    ConfigEntry, ConfigEntryDisabledBy, ConfigEntrySource, ConfigEntryState, ConfigEntryUpdate,
};

pub use manager::{
    ConfigEntries, ConfigEntriesData, ConfigEntriesError, ConfigEntriesResult, EntryHandler,
    SetupError, STORAGE_KEY, STORAGE_MINOR_VERSION, STORAGE_VERSION,
};

pub use state_machine::{calculate_retry_delay, InvalidTransition};
