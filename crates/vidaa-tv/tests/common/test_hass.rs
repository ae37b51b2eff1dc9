//! Isolated host with the integration registered against a fake TV

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;
use vidaa_config_entries::ConfigEntry;
use vidaa_core::{Context, State};
use vidaa_service_registry::ServiceResult;
use vidaa_tv::consts::DOMAIN;
use vidaa_tv::{Coordinator, Hass, VidaaIntegration};

use super::fake_tv::{FakeFactory, FakeTv, TV_MAC, TV_NAME};

pub const TV_HOST: &str = "192.168.1.50";
pub const TV_UNIQUE_ID: &str = "aabbccddeeff";

pub struct TestEnv {
    pub dir: TempDir,
    pub hass: Arc<Hass>,
    pub tv: Arc<FakeTv>,
    pub factory: Arc<FakeFactory>,
    pub integration: Arc<VidaaIntegration>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_tv(FakeTv::new())
    }

    pub fn with_tv(tv: FakeTv) -> Self {
        Self::in_dir(TempDir::new().unwrap(), Arc::new(tv))
    }

    /// Build a host over an existing config directory
    pub fn in_dir(dir: TempDir, tv: Arc<FakeTv>) -> Self {
        let hass = Arc::new(Hass::new(dir.path()));
        let factory = Arc::new(FakeFactory::new(Arc::clone(&tv)));
        let integration = VidaaIntegration::register(Arc::clone(&hass), factory.clone()).unwrap();
        Self {
            dir,
            hass,
            tv,
            factory,
            integration,
        }
    }

    pub fn entry_data() -> HashMap<String, Value> {
        HashMap::from([
            ("host".to_string(), json!(TV_HOST)),
            ("port".to_string(), json!(36669)),
            ("name".to_string(), json!(TV_NAME)),
            ("mac".to_string(), json!(TV_MAC)),
            ("device_id".to_string(), json!(TV_MAC)),
        ])
    }

    /// Add a configured TV and set it up
    pub async fn add_entry(&self) -> ConfigEntry {
        let entry = ConfigEntry::new(DOMAIN, TV_NAME)
            .with_data(Self::entry_data())
            .with_unique_id(TV_UNIQUE_ID);
        let entry = self.hass.config_entries.add(entry).await.unwrap();
        let _ = self.hass.config_entries.setup(&entry.entry_id).await;
        self.hass.config_entries.get(&entry.entry_id).unwrap()
    }

    pub fn coordinator(&self, entry_id: &str) -> Arc<Coordinator> {
        self.integration
            .coordinator(entry_id)
            .expect("entry is not set up")
    }

    pub fn state(&self, entity_id: &str) -> Option<State> {
        self.hass.states.get(entity_id)
    }

    pub fn state_value(&self, entity_id: &str) -> Option<String> {
        self.hass.states.get_state(entity_id)
    }

    pub fn attribute(&self, entity_id: &str, name: &str) -> Option<Value> {
        self.state(entity_id)
            .and_then(|s| s.attributes.get(name).cloned())
    }

    pub async fn call(&self, domain: &str, service: &str, data: Value) -> ServiceResult {
        self.hass
            .services
            .call(domain, service, data, Context::new(), false)
            .await
    }
}
