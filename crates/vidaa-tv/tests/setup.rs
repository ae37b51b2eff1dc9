//! Entry lifecycle: setup retry, unload, removal and restart

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::fake_tv::{TV_MAC, TV_NAME};
use common::*;
use serde_json::json;
use vidaa_config_entries::{ConfigEntry, ConfigEntryState};
use vidaa_registries::DisabledBy;
use vidaa_tv::consts::DOMAIN;

const MEDIA_PLAYER: &str = "media_player.living_room_tv";
const RED_BUTTON: &str = "button.living_room_tv_red";

#[tokio::test]
async fn test_unreachable_tv_schedules_retry() {
    let env = TestEnv::new();
    env.tv.set_reachable(false);

    let entry = env.add_entry().await;
    assert_eq!(entry.state, ConfigEntryState::SetupRetry);
    assert!(env.hass.config_entries.retry_pending(&entry.entry_id));
    assert!(env.integration.coordinator(&entry.entry_id).is_none());
    assert!(env.state(MEDIA_PLAYER).is_none());

    env.tv.set_reachable(true);
    env.hass.config_entries.setup(&entry.entry_id).await.unwrap();

    let entry = env.hass.config_entries.get(&entry.entry_id).unwrap();
    assert!(entry.is_loaded());
    assert!(!env.hass.config_entries.retry_pending(&entry.entry_id));
    assert_eq!(env.state_value(MEDIA_PLAYER).as_deref(), Some("on"));
}

#[tokio::test]
async fn test_single_auth_error_during_setup_is_retried() {
    let env = TestEnv::new();
    let mut reauth = env
        .hass
        .bus
        .subscribe_typed::<vidaa_core::events::ConfigEntryReauthData>();
    env.tv.set_auth_error(true);

    let entry = env.add_entry().await;
    assert_eq!(entry.state, ConfigEntryState::SetupRetry);
    assert!(env.hass.config_entries.retry_pending(&entry.entry_id));
    // One rejected token is not yet enough to ask for a new PIN
    assert!(reauth.try_recv().is_err());
    // The session opened for setup is closed again
    assert!(!vidaa_client::TvClient::is_connected(env.tv.as_ref()));
}

#[tokio::test]
async fn test_stored_scan_interval_drives_polling() {
    let env = TestEnv::new();
    let entry = ConfigEntry::new(DOMAIN, TV_NAME)
        .with_data(TestEnv::entry_data())
        .with_options(HashMap::from([("scan_interval".to_string(), json!(45))]));
    let entry = env.hass.config_entries.add(entry).await.unwrap();
    env.hass.config_entries.setup(&entry.entry_id).await.unwrap();

    assert_eq!(
        env.coordinator(&entry.entry_id).scan_interval(),
        Duration::from_secs(45)
    );
}

#[tokio::test]
async fn test_invalid_stored_scan_interval_falls_back_to_default() {
    let env = TestEnv::new();
    let entry = ConfigEntry::new(DOMAIN, TV_NAME)
        .with_data(TestEnv::entry_data())
        .with_options(HashMap::from([("scan_interval".to_string(), json!(0))]));
    let entry = env.hass.config_entries.add(entry).await.unwrap();
    env.hass.config_entries.setup(&entry.entry_id).await.unwrap();

    let coordinator = env.coordinator(&entry.entry_id);
    assert_eq!(coordinator.scan_interval(), Duration::from_secs(30));
    tokio::task::yield_now().await;
    assert!(coordinator.is_polling());
    assert!(env.hass.config_entries.get(&entry.entry_id).unwrap().is_loaded());
}

#[tokio::test]
async fn test_unload_removes_states_and_stops_polling() {
    let env = TestEnv::new();
    let entry = env.add_entry().await;
    let coordinator = env.coordinator(&entry.entry_id);
    assert!(coordinator.is_polling());

    env.hass.config_entries.unload(&entry.entry_id).await.unwrap();

    assert!(!coordinator.is_polling());
    assert!(env.integration.coordinator(&entry.entry_id).is_none());
    assert!(env.state(MEDIA_PLAYER).is_none());
    assert!(env.hass.states.entity_ids("button").is_empty());
    assert!(env.integration.platform().entity_ids(&entry.entry_id).is_empty());
    assert!(env.integration.platform().get(MEDIA_PLAYER).is_none());
    assert!(env.integration.platform().is_empty());

    // Registry entries survive an unload
    assert!(env.hass.registries.entities.get(MEDIA_PLAYER).is_some());
}

#[tokio::test]
async fn test_remove_clears_registries() {
    let env = TestEnv::new();
    let entry = env.add_entry().await;

    env.hass.config_entries.remove(&entry.entry_id).await.unwrap();

    assert!(env.hass.config_entries.get(&entry.entry_id).is_none());
    assert!(env.hass.registries.entities.get(MEDIA_PLAYER).is_none());
    assert!(env
        .hass
        .registries
        .entities
        .get_by_config_entry_id(&entry.entry_id)
        .is_empty());
    assert!(env
        .hass
        .registries
        .devices
        .get_by_identifier(DOMAIN, TV_MAC)
        .is_none());
}

#[tokio::test]
async fn test_services_only_reach_loaded_entries() {
    let env = TestEnv::new();
    let entry = env.add_entry().await;
    env.hass.config_entries.unload(&entry.entry_id).await.unwrap();
    env.tv.clear_commands();

    let result = env
        .call("vidaa_tv", "send_key", json!({"key": "KEY_OK"}))
        .await;
    assert!(result.is_err());
    assert!(env.tv.commands().is_empty());
}

#[tokio::test]
async fn test_entities_keep_ids_across_restart() {
    let env = TestEnv::new();
    let entry = env.add_entry().await;
    env.hass
        .registries
        .entities
        .set_disabled_by(MEDIA_PLAYER, Some(DisabledBy::User))
        .unwrap();
    env.hass.registries.save_all().await.unwrap();
    env.hass.config_entries.unload(&entry.entry_id).await.unwrap();

    let TestEnv { dir, tv, .. } = env;
    let restarted = TestEnv::in_dir(dir, Arc::clone(&tv));
    restarted.hass.load().await.unwrap();
    assert_eq!(restarted.hass.config_entries.len(), 1);

    for result in restarted.hass.config_entries.setup_all().await {
        result.unwrap();
    }

    let loaded: Vec<ConfigEntry> = restarted.hass.config_entries.get_loaded_by_domain(DOMAIN);
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].entry_id, entry.entry_id);

    let entities = &restarted.hass.registries.entities;
    assert_eq!(
        entities.get_by_config_entry_id(&entry.entry_id).len(),
        38
    );
    assert_eq!(
        entities.get(MEDIA_PLAYER).unwrap().disabled_by,
        Some(DisabledBy::User)
    );
    assert_eq!(
        entities.get(RED_BUTTON).unwrap().disabled_by,
        Some(DisabledBy::Integration)
    );
    assert!(restarted.state(MEDIA_PLAYER).is_none());
    assert_eq!(
        restarted.state_value("remote.living_room_tv_remote").as_deref(),
        Some("on")
    );
}
