//! Entity exposure: counts, default-disabled buttons, rendered states

mod common;

use std::collections::HashMap;

use common::fake_tv::{TV_MAC, TV_NAME};
use common::*;
use serde_json::json;
use vidaa_core::{STATE_OFF, STATE_ON, STATE_UNAVAILABLE, STATE_UNKNOWN};
use vidaa_registries::DisabledBy;

const MEDIA_PLAYER: &str = "media_player.living_room_tv";
const REMOTE: &str = "remote.living_room_tv_remote";
const POWER_BUTTON: &str = "button.living_room_tv_power";
const RED_BUTTON: &str = "button.living_room_tv_red";
const APP_SENSOR: &str = "sensor.living_room_tv_current_app";
const SOURCE_SENSOR: &str = "sensor.living_room_tv_current_source";
const MUTE_SWITCH: &str = "switch.living_room_tv_mute";

#[tokio::test]
async fn test_entity_counts_per_platform() {
    let env = TestEnv::new();
    let entry = env.add_entry().await;
    assert!(entry.is_loaded());

    let registered = env
        .hass
        .registries
        .entities
        .get_by_config_entry_id(&entry.entry_id);
    let mut per_domain: HashMap<String, usize> = HashMap::new();
    for e in &registered {
        *per_domain.entry(e.domain().to_string()).or_default() += 1;
    }

    assert_eq!(per_domain.get("media_player"), Some(&1));
    assert_eq!(per_domain.get("remote"), Some(&1));
    assert_eq!(per_domain.get("button"), Some(&33));
    assert_eq!(per_domain.get("sensor"), Some(&2));
    assert_eq!(per_domain.get("switch"), Some(&1));

    let disabled = registered.iter().filter(|e| e.is_disabled()).count();
    assert_eq!(disabled, 15);

    // 1 + 1 + 18 + 2 + 1 enabled entities get a state
    assert_eq!(env.integration.platform().entity_ids(&entry.entry_id).len(), 23);
    assert_eq!(env.integration.platform().len(), 23);
    assert_eq!(env.hass.states.entity_ids("button").len(), 18);
}

#[tokio::test]
async fn test_unique_ids_derive_from_device_id() {
    let env = TestEnv::new();
    let entry = env.add_entry().await;

    let entities = &env.hass.registries.entities;
    let unique_ids: Vec<String> = entities
        .get_by_config_entry_id(&entry.entry_id)
        .iter()
        .filter_map(|e| e.unique_id.clone())
        .collect();

    for suffix in [
        "media_player",
        "remote",
        "button_power",
        "button_0",
        "sensor_app",
        "sensor_source",
        "switch_mute",
    ] {
        let expected = format!("{}_{}", TV_MAC, suffix);
        assert!(unique_ids.contains(&expected), "missing {}", expected);
    }
}

#[tokio::test]
async fn test_disabled_buttons_stay_disabled_until_enabled() {
    let env = TestEnv::new();
    let entry = env.add_entry().await;

    let red = env.hass.registries.entities.get(RED_BUTTON).unwrap();
    assert_eq!(red.disabled_by, Some(DisabledBy::Integration));
    assert!(env.state(RED_BUTTON).is_none());
    assert!(env.integration.platform().get(RED_BUTTON).is_none());

    // A reload alone does not enable it
    env.hass.config_entries.reload(&entry.entry_id).await.unwrap();
    assert!(env.state(RED_BUTTON).is_none());

    env.hass
        .registries
        .entities
        .set_disabled_by(RED_BUTTON, None)
        .unwrap();
    env.hass.config_entries.reload(&entry.entry_id).await.unwrap();

    assert_eq!(env.state_value(RED_BUTTON).as_deref(), Some(STATE_UNKNOWN));
    assert_eq!(env.hass.states.entity_ids("button").len(), 19);
}

#[tokio::test]
async fn test_user_disabled_entity_is_not_added() {
    let env = TestEnv::new();
    let entry = env.add_entry().await;

    env.hass
        .registries
        .entities
        .set_disabled_by(POWER_BUTTON, Some(DisabledBy::User))
        .unwrap();
    env.hass.config_entries.reload(&entry.entry_id).await.unwrap();

    assert!(env.state(POWER_BUTTON).is_none());
}

#[tokio::test]
async fn test_media_player_state_while_in_app() {
    let env = TestEnv::new();
    env.add_entry().await;

    assert_eq!(env.state_value(MEDIA_PLAYER).as_deref(), Some(STATE_ON));
    assert_eq!(env.attribute(MEDIA_PLAYER, "app_name"), Some(json!("Netflix")));
    assert_eq!(env.attribute(MEDIA_PLAYER, "volume_level"), Some(json!(0.25)));
    assert_eq!(env.attribute(MEDIA_PLAYER, "is_volume_muted"), Some(json!(false)));
    assert_eq!(env.attribute(MEDIA_PLAYER, "source"), Some(json!(null)));
    assert_eq!(
        env.attribute(MEDIA_PLAYER, "source_list"),
        Some(json!(["HDMI 1", "TV"]))
    );
    assert_eq!(
        env.attribute(MEDIA_PLAYER, "friendly_name"),
        Some(json!("Living Room TV"))
    );
}

#[tokio::test]
async fn test_remote_and_sensor_states() {
    let env = TestEnv::new();
    env.add_entry().await;

    assert_eq!(env.state_value(REMOTE).as_deref(), Some(STATE_ON));
    assert_eq!(env.attribute(REMOTE, "current_activity"), Some(json!("Netflix")));
    assert_eq!(
        env.attribute(REMOTE, "activity_list"),
        Some(json!(["Netflix", "YouTube"]))
    );
    assert_eq!(
        env.attribute(REMOTE, "friendly_name"),
        Some(json!("Living Room TV Remote"))
    );

    assert_eq!(env.state_value(APP_SENSOR).as_deref(), Some("Netflix"));
    assert_eq!(env.attribute(APP_SENSOR, "icon"), Some(json!("mdi:apps")));
    assert_eq!(env.state_value(SOURCE_SENSOR).as_deref(), Some(STATE_UNKNOWN));
    assert_eq!(env.state_value(MUTE_SWITCH).as_deref(), Some(STATE_OFF));
}

#[tokio::test]
async fn test_states_follow_coordinator_refresh() {
    let env = TestEnv::new();
    let entry = env.add_entry().await;
    let coordinator = env.coordinator(&entry.entry_id);

    env.tv.set_source("HDMI 1");
    coordinator.refresh().await.unwrap();
    env.integration.platform().write_entry_states(&entry.entry_id);

    assert_eq!(env.state_value(SOURCE_SENSOR).as_deref(), Some("HDMI 1"));
    assert_eq!(env.state_value(APP_SENSOR).as_deref(), Some(STATE_UNKNOWN));
    assert_eq!(env.attribute(REMOTE, "current_activity"), Some(json!("HDMI 1")));

    env.tv.set_off();
    coordinator.refresh().await.unwrap();
    env.integration.platform().write_entry_states(&entry.entry_id);

    assert_eq!(env.state_value(MEDIA_PLAYER).as_deref(), Some(STATE_OFF));
    assert!(env.attribute(MEDIA_PLAYER, "volume_level").is_none());
}

#[tokio::test]
async fn test_buttons_stay_available_when_tv_unreachable() {
    let env = TestEnv::new();
    let entry = env.add_entry().await;
    let coordinator = env.coordinator(&entry.entry_id);

    env.tv.set_reachable(false);
    assert!(coordinator.refresh().await.is_err());
    env.integration.platform().write_entry_states(&entry.entry_id);

    assert!(env.state(MEDIA_PLAYER).unwrap().is_unavailable());
    assert_eq!(env.state_value(MUTE_SWITCH).as_deref(), Some(STATE_UNAVAILABLE));
    assert_eq!(env.state_value(APP_SENSOR).as_deref(), Some(STATE_UNAVAILABLE));
    assert_eq!(env.state_value(POWER_BUTTON).as_deref(), Some(STATE_UNKNOWN));
}

#[tokio::test]
async fn test_device_registered_with_tv_details() {
    let env = TestEnv::new();
    let entry = env.add_entry().await;

    let device = env
        .hass
        .registries
        .devices
        .get_by_identifier("vidaa_tv", TV_MAC)
        .unwrap();
    assert_eq!(device.manufacturer.as_deref(), Some("Hisense"));
    assert_eq!(device.model.as_deref(), Some("65U8"));
    assert_eq!(device.name.as_deref(), Some(TV_NAME));
    assert!(device.config_entries.contains(&entry.entry_id));
    assert!(device
        .connections
        .iter()
        .any(|c| c.connection_type() == "mac" && c.id() == "aa:bb:cc:dd:ee:ff"));
}
