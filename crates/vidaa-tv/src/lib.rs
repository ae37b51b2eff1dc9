//! Hisense/Vidaa TV integration
//!
//! Wires a [`TvClient`] into entities, services and config flows. The host
//! pieces it runs against (event bus, states, services, registries, config
//! entries) are bundled in [`Hass`].

mod button;
pub mod config;
pub mod config_flow;
pub mod consts;
mod coordinator;
mod entity;
mod hass;
mod media_player;
mod platform;
mod remote;
mod sensor;
pub mod services;
mod switch;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};
use vidaa_client::{timed, ClientFactory, ConnectParams, TvClient};
use vidaa_config_entries::{ConfigEntry, EntryHandler, SetupError};
use vidaa_registries::{DeviceConnection, DeviceEntry, DeviceIdentifier, CONNECTION_NETWORK_MAC};
use vidaa_service_registry::ServiceError;

pub use button::Button;
pub use config::{OptionsError, VidaaEntryData, VidaaOptions};
pub use config_flow::{ConfigFlow, FlowError, FlowResult, OptionsFlow, SsdpDiscovery, UserInput};
pub use coordinator::{Coordinator, CoordinatorError, TvData};
pub use entity::{EntityBase, EntityError, EntityResult, EntityState, VidaaEntity};
pub use hass::Hass;
pub use media_player::MediaPlayer;
pub use platform::EntityPlatform;
pub use remote::Remote;
pub use sensor::{Sensor, SensorKind};
pub use switch::Switch;

use consts::{BUTTON_KEYS, DOMAIN, MANUFACTURER, TIMEOUT_CONNECT};
use services::Runtimes;

/// The integration as registered with the host
pub struct VidaaIntegration {
    hass: Arc<Hass>,
    factory: Arc<dyn ClientFactory>,
    platform: Arc<EntityPlatform>,
    runtimes: Arc<Runtimes>,
}

impl VidaaIntegration {
    /// Register services and the config entry handler
    pub fn register(
        hass: Arc<Hass>,
        factory: Arc<dyn ClientFactory>,
    ) -> Result<Arc<Self>, ServiceError> {
        let platform = Arc::new(EntityPlatform::new(Arc::clone(&hass)));
        let runtimes = Arc::new(Runtimes::new());

        services::register_integration_services(
            &hass.services,
            Arc::downgrade(&hass.config_entries),
            Arc::downgrade(&runtimes),
        )?;
        services::register_platform_services(&hass.services, Arc::downgrade(&platform))?;

        let integration = Arc::new(Self {
            hass: Arc::clone(&hass),
            factory,
            platform,
            runtimes,
        });
        hass.config_entries
            .register_handler(DOMAIN, Arc::clone(&integration) as Arc<dyn EntryHandler>);

        info!("Vidaa TV integration registered");
        Ok(integration)
    }

    pub fn hass(&self) -> &Arc<Hass> {
        &self.hass
    }

    pub fn platform(&self) -> &Arc<EntityPlatform> {
        &self.platform
    }

    /// Coordinator of a set-up entry
    pub fn coordinator(&self, entry_id: &str) -> Option<Arc<Coordinator>> {
        self.runtimes.get(entry_id).map(|c| Arc::clone(&c))
    }

    pub fn config_flow(&self) -> ConfigFlow {
        ConfigFlow::new(Arc::clone(&self.hass), Arc::clone(&self.factory))
    }

    pub fn options_flow(&self, entry_id: &str) -> OptionsFlow {
        OptionsFlow::new(Arc::clone(&self.hass), entry_id)
    }

    /// Register the TV device, merging with any device already known under `keys`
    fn register_device(&self, entry: &ConfigEntry, data: &VidaaEntryData, keys: &[&str]) -> Arc<DeviceEntry> {
        let identifiers: Vec<DeviceIdentifier> = keys
            .iter()
            .map(|key| DeviceIdentifier::new(DOMAIN, *key))
            .collect();
        let connections: Vec<DeviceConnection> = data
            .mac
            .iter()
            .map(|mac| DeviceConnection::new(CONNECTION_NETWORK_MAC, mac.to_lowercase()))
            .collect();

        let devices = &self.hass.registries.devices;
        let device = devices.get_or_create(
            &identifiers,
            &connections,
            Some(entry.entry_id.as_str()),
            Some(data.name.as_str()),
        );
        devices
            .update(&device.id, |d| {
                d.manufacturer = Some(MANUFACTURER.to_string());
                if data.model.is_some() {
                    d.model = data.model.clone();
                }
                if data.sw_version.is_some() {
                    d.sw_version = data.sw_version.clone();
                }
            })
            .unwrap_or(device)
    }

    fn build_entities(coordinator: &Arc<Coordinator>, device_key: &str) -> Vec<VidaaEntity> {
        let mut entities = vec![
            VidaaEntity::MediaPlayer(MediaPlayer::new(Arc::clone(coordinator), device_key)),
            VidaaEntity::Remote(Remote::new(Arc::clone(coordinator), device_key)),
        ];
        entities.extend(
            BUTTON_KEYS
                .iter()
                .map(|key| VidaaEntity::Button(Button::new(Arc::clone(coordinator), device_key, key))),
        );
        entities.extend([
            VidaaEntity::Sensor(Sensor::new(Arc::clone(coordinator), device_key, SensorKind::App)),
            VidaaEntity::Sensor(Sensor::new(Arc::clone(coordinator), device_key, SensorKind::Source)),
            VidaaEntity::Switch(Switch::mute(Arc::clone(coordinator), device_key)),
        ]);
        entities
    }

    async fn disconnect(client: &dyn TvClient) {
        if let Err(e) = client.disconnect().await {
            debug!(error = %e, "Disconnect after failed setup");
        }
    }
}

#[async_trait]
impl EntryHandler for VidaaIntegration {
    #[instrument(skip(self, entry), fields(entry_id = %entry.entry_id))]
    async fn setup_entry(&self, entry: &ConfigEntry) -> Result<(), SetupError> {
        let data = VidaaEntryData::from_entry(entry)
            .map_err(|e| SetupError::Failed(format!("invalid entry data: {}", e)))?;
        let options = VidaaOptions::from_entry(entry);

        let client = self.factory.create(&ConnectParams {
            host: data.host.clone(),
            port: data.port,
            mac: data.mac.clone(),
            token_path: self.hass.token_path(),
        });

        match timed("connect", TIMEOUT_CONNECT, client.connect()).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(SetupError::NotReady(format!(
                    "cannot connect to {}",
                    data.host
                )))
            }
            Err(e) => {
                Self::disconnect(client.as_ref()).await;
                return Err(SetupError::NotReady(format!(
                    "error connecting to {}: {}",
                    data.host, e
                )));
            }
        }

        let initial_key = data.device_key(&entry.entry_id);
        self.register_device(entry, &data, &[initial_key.as_str()]);

        let coordinator = Arc::new(Coordinator::new(
            Arc::clone(&self.hass),
            Arc::clone(&client),
            &entry.entry_id,
            options.scan_interval(),
        ));
        if let Err(e) = coordinator.refresh().await {
            Self::disconnect(client.as_ref()).await;
            return Err(match e {
                CoordinatorError::AuthFailed(reason) => SetupError::AuthFailed(reason),
                other => SetupError::NotReady(other.to_string()),
            });
        }

        // The first refresh may have stored the TV's MAC as device_id
        let data = self
            .hass
            .config_entries
            .get(&entry.entry_id)
            .and_then(|e| VidaaEntryData::from_entry(&e).ok())
            .unwrap_or(data);
        let device_key = data.device_key(&entry.entry_id);
        let device = self.register_device(entry, &data, &[device_key.as_str(), initial_key.as_str()]);

        let entities = Self::build_entities(&coordinator, &device_key);
        self.platform.add_entities(entry, &device, entities).await;
        if let Err(e) = self.hass.registries.save_all().await {
            warn!(error = %e, "Failed to save registries");
        }

        self.runtimes
            .insert(entry.entry_id.clone(), Arc::clone(&coordinator));
        self.platform.start_writer(&entry.entry_id, &coordinator);
        coordinator.start_polling();

        info!(host = %data.host, name = %data.name, "Vidaa TV set up");
        Ok(())
    }

    async fn unload_entry(&self, entry: &ConfigEntry) -> bool {
        if let Some((_, coordinator)) = self.runtimes.remove(&entry.entry_id) {
            coordinator.shutdown().await;
        }
        self.platform.remove_entry(&entry.entry_id);
        debug!(entry_id = %entry.entry_id, "Vidaa TV unloaded");
        true
    }

    async fn remove_entry(&self, entry: &ConfigEntry) {
        self.hass.registries.clear_config_entry(&entry.entry_id);
        if let Err(e) = self.hass.registries.save_all().await {
            warn!(error = %e, "Failed to save registries after removal");
        }
    }
}
