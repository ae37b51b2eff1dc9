//! Runtime container shared by the integration

use std::path::{Path, PathBuf};
use std::sync::Arc;

use vidaa_config_entries::ConfigEntries;
use vidaa_event_bus::EventBus;
use vidaa_registries::{Registries, StorageResult};
use vidaa_service_registry::ServiceRegistry;
use vidaa_state_machine::StateMachine;

use crate::consts::TOKEN_FILE;

/// Everything the integration needs from its host
pub struct Hass {
    pub config_dir: PathBuf,
    /// Event bus for pub/sub communication
    pub bus: Arc<EventBus>,
    /// Entity states
    pub states: Arc<StateMachine>,
    pub services: Arc<ServiceRegistry>,
    /// Entity and device registries
    pub registries: Arc<Registries>,
    pub config_entries: Arc<ConfigEntries>,
}

impl Hass {
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        let config_dir = config_dir.as_ref().to_path_buf();
        let bus = Arc::new(EventBus::new());
        let states = Arc::new(StateMachine::new(bus.clone()));
        let services = Arc::new(ServiceRegistry::new());
        let registries = Arc::new(Registries::new(&config_dir));
        let config_entries = Arc::new(ConfigEntries::new(
            registries.storage.clone(),
            bus.clone(),
        ));

        Self {
            config_dir,
            bus,
            states,
            services,
            registries,
            config_entries,
        }
    }

    /// Load registries and config entries from `.storage/`
    pub async fn load(&self) -> StorageResult<()> {
        self.registries.load_all().await?;
        self.config_entries.load().await
    }

    /// Where the TV library keeps pairing tokens
    pub fn token_path(&self) -> PathBuf {
        self.config_dir.join(TOKEN_FILE)
    }
}
