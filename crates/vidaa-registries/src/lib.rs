//! Persistent registries
//!
//! - Entities (EntityRegistry)
//! - Devices (DeviceRegistry)
//!
//! Both persist as versioned JSON in the `.storage/` directory.

pub mod storage;

pub mod device_registry;
pub mod entity_registry;

pub use storage::{Storable, Storage, StorageError, StorageFile, StorageResult};

pub use entity_registry::{
    DisabledBy, EntityEntry, EntityRegistration, EntityRegistry, EntityRegistryData,
    EntityRegistryError,
};

pub use device_registry::{
    format_mac, DeviceConnection, DeviceEntry, DeviceIdentifier, DeviceRegistry,
    DeviceRegistryData, CONNECTION_NETWORK_MAC,
};

use std::sync::Arc;

/// All registries bundled together
pub struct Registries {
    pub storage: Arc<Storage>,
    pub entities: EntityRegistry,
    pub devices: DeviceRegistry,
}

impl Registries {
    pub fn new(config_dir: impl AsRef<std::path::Path>) -> Self {
        let storage = Arc::new(Storage::new(config_dir));
        Self {
            entities: EntityRegistry::new(storage.clone()),
            devices: DeviceRegistry::new(storage.clone()),
            storage,
        }
    }

    pub async fn load_all(&self) -> StorageResult<()> {
        self.entities.load().await?;
        self.devices.load().await?;
        Ok(())
    }

    pub async fn save_all(&self) -> StorageResult<()> {
        self.entities.save().await?;
        self.devices.save().await?;
        Ok(())
    }

    /// Drop every entity and device owned by a config entry
    pub fn clear_config_entry(&self, config_entry_id: &str) {
        self.entities.clear_config_entry(config_entry_id);
        self.devices.clear_config_entry(config_entry_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_registries_bundle() {
        let temp_dir = TempDir::new().unwrap();
        let registries = Registries::new(temp_dir.path());

        let device = registries.devices.get_or_create(
            &[DeviceIdentifier::new("vidaa_tv", "AA:BB:CC:DD:EE:FF")],
            &[],
            Some("entry1"),
            Some("Living Room TV"),
        );
        registries.entities.get_or_create(EntityRegistration {
            domain: "switch",
            platform: "vidaa_tv",
            unique_id: "AA:BB:CC:DD:EE:FF_switch_mute",
            suggested_object_id: "living_room_tv_mute",
            config_entry_id: Some("entry1"),
            device_id: Some(&device.id),
            ..Default::default()
        });

        registries.save_all().await.unwrap();

        let reloaded = Registries::new(temp_dir.path());
        reloaded.load_all().await.unwrap();
        assert_eq!(reloaded.entities.len(), 1);
        assert_eq!(reloaded.devices.len(), 1);

        reloaded.clear_config_entry("entry1");
        assert!(reloaded.entities.is_empty());
        assert!(reloaded.devices.is_empty());
    }
}
