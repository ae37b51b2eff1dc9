//! Service registration
//!
//! `vidaa_tv.send_key` and `vidaa_tv.launch_app` act on every loaded TV.
//! Platform services (`media_player.turn_on`, `button.press`, ...) act on
//! the entities named in `entity_id`.

use std::future::Future;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use serde_json::{json, Value};
use tracing::{debug, info};
use vidaa_client::RemoteKey;
use vidaa_config_entries::ConfigEntries;
use vidaa_core::{Platform, ServiceCall};
use vidaa_service_registry::{ServiceDescription, ServiceError, ServiceRegistry, ServiceResult};

use crate::consts::{ATTR_APP, ATTR_KEY, DOMAIN, PLATFORMS, SERVICE_LAUNCH_APP, SERVICE_SEND_KEY};
use crate::coordinator::{Coordinator, CoordinatorError};
use crate::entity::EntityError;
use crate::platform::EntityPlatform;

pub const NO_TVS_CONFIGURED: &str = "no_tvs_configured";

/// Coordinators of set-up entries, by entry_id
pub type Runtimes = DashMap<String, Arc<Coordinator>>;

fn command_failed(err: impl std::fmt::Display) -> ServiceError {
    ServiceError::CallFailed(format!("command_failed: {}", err))
}

/// Run `action` against the coordinator of every loaded entry
async fn call_all_tvs<F, Fut>(
    entries: &ConfigEntries,
    runtimes: &Runtimes,
    action: F,
) -> ServiceResult
where
    F: Fn(Arc<Coordinator>) -> Fut,
    Fut: Future<Output = Result<(), CoordinatorError>>,
{
    let loaded = entries.get_loaded_by_domain(DOMAIN);
    if loaded.is_empty() {
        return Err(ServiceError::CallFailed(NO_TVS_CONFIGURED.to_string()));
    }

    for entry in loaded {
        let Some(coordinator) = runtimes.get(&entry.entry_id).map(|c| Arc::clone(&c)) else {
            continue;
        };
        action(coordinator).await.map_err(command_failed)?;
    }
    Ok(None)
}

/// Register `vidaa_tv.send_key` and `vidaa_tv.launch_app`
pub fn register_integration_services(
    services: &ServiceRegistry,
    entries: Weak<ConfigEntries>,
    runtimes: Weak<Runtimes>,
) -> Result<(), ServiceError> {
    // Services are shared by every entry; keep the first registration
    if !services.has_service(DOMAIN, SERVICE_SEND_KEY) {
        let (send_entries, send_runtimes) = (entries.clone(), runtimes.clone());
        services.register_with_description(
            ServiceDescription::new(DOMAIN, SERVICE_SEND_KEY)
                .with_name("Send key")
                .with_schema(json!({
                    "type": "object",
                    "properties": {
                        ATTR_KEY: {"type": "string", "minLength": 1}
                    },
                    "required": [ATTR_KEY]
                })),
            move |call: ServiceCall| {
                let entries = send_entries.upgrade();
                let runtimes = send_runtimes.upgrade();
                async move {
                    let raw: String = call.get(ATTR_KEY).unwrap_or_default();
                    let key: RemoteKey = raw.parse().map_err(|e: vidaa_client::UnknownKey| {
                        ServiceError::InvalidData(e.to_string())
                    })?;
                    let (Some(entries), Some(runtimes)) = (entries, runtimes) else {
                        return Err(ServiceError::CallFailed(NO_TVS_CONFIGURED.to_string()));
                    };
                    call_all_tvs(&entries, &runtimes, |c| async move { c.send_key(key).await }).await
                }
            },
        )?;
    }

    if !services.has_service(DOMAIN, SERVICE_LAUNCH_APP) {
        services.register_with_description(
            ServiceDescription::new(DOMAIN, SERVICE_LAUNCH_APP)
                .with_name("Launch app")
                .with_schema(json!({
                    "type": "object",
                    "properties": {
                        ATTR_APP: {"type": "string", "minLength": 1}
                    },
                    "required": [ATTR_APP]
                })),
            move |call: ServiceCall| {
                let entries = entries.upgrade();
                let runtimes = runtimes.upgrade();
                async move {
                    let app: String = call.get(ATTR_APP).unwrap_or_default();
                    let (Some(entries), Some(runtimes)) = (entries, runtimes) else {
                        return Err(ServiceError::CallFailed(NO_TVS_CONFIGURED.to_string()));
                    };
                    call_all_tvs(&entries, &runtimes, |c| {
                        let app = app.clone();
                        async move { c.launch_app(&app).await }
                    })
                    .await
                }
            },
        )?;
    }

    info!("Vidaa TV services registered");
    Ok(())
}

fn entity_id_schema() -> Value {
    json!({
        "oneOf": [
            {"type": "string"},
            {"type": "array", "items": {"type": "string"}}
        ]
    })
}

/// JSON schema for a platform service's data
pub fn service_schema(platform: Platform, service: &str) -> Value {
    let mut properties = serde_json::Map::new();
    properties.insert("entity_id".to_string(), entity_id_schema());
    let mut required = vec!["entity_id"];

    match (platform, service) {
        (Platform::MediaPlayer, "volume_set") => {
            properties.insert(
                "volume_level".into(),
                json!({"type": "number", "minimum": 0, "maximum": 1}),
            );
            required.push("volume_level");
        }
        (Platform::MediaPlayer, "volume_mute") => {
            properties.insert("is_volume_muted".into(), json!({"type": "boolean"}));
            required.push("is_volume_muted");
        }
        (Platform::MediaPlayer, "select_source") => {
            properties.insert("source".into(), json!({"type": "string", "minLength": 1}));
            required.push("source");
        }
        (Platform::MediaPlayer, "play_media") => {
            properties.insert("media_content_type".into(), json!({"type": "string"}));
            properties.insert(
                "media_content_id".into(),
                json!({"type": "string", "minLength": 1}),
            );
            required.extend(["media_content_type", "media_content_id"]);
        }
        (Platform::Remote, "turn_on") => {
            properties.insert("activity".into(), json!({"type": "string"}));
        }
        (Platform::Remote, "send_command") => {
            properties.insert(
                "command".into(),
                json!({
                    "oneOf": [
                        {"type": "string", "minLength": 1},
                        {"type": "array", "items": {"type": "string"}, "minItems": 1}
                    ]
                }),
            );
            properties.insert(
                "num_repeats".into(),
                json!({"type": "integer", "minimum": 0}),
            );
            properties.insert("delay_secs".into(), json!({"type": "number", "minimum": 0}));
            required.push("command");
        }
        _ => {}
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

fn entity_error(err: EntityError) -> ServiceError {
    if err.is_invalid_input() {
        ServiceError::InvalidData(err.to_string())
    } else {
        command_failed(err)
    }
}

/// Register every entity platform service
pub fn register_platform_services(
    services: &ServiceRegistry,
    platform: Weak<EntityPlatform>,
) -> Result<(), ServiceError> {
    for target in PLATFORMS {
        for &service in target.services() {
            let platform = platform.clone();
            let description = ServiceDescription::new(target.as_str(), service)
                .with_schema(service_schema(target, service))
                .with_target(json!({"entity": {"domain": target.as_str()}}));

            services.register_with_description(description, move |call: ServiceCall| {
                let platform = platform.upgrade();
                async move {
                    let Some(platform) = platform else {
                        return Ok(None);
                    };
                    for entity_id in call.entity_ids() {
                        let Some(entity) = platform.get(&entity_id) else {
                            debug!(entity_id, "Not a live Vidaa entity, skipping");
                            continue;
                        };
                        if entity.platform() != target {
                            continue;
                        }
                        entity
                            .handle(&call.service, &call.service_data)
                            .await
                            .map_err(entity_error)?;
                        platform.write_state_with(&entity_id, call.context.child());
                    }
                    Ok(None)
                }
            })?;
        }
    }

    debug!("Entity platform services registered");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_requires_entity_id() {
        for platform in PLATFORMS {
            for service in platform.services() {
                let schema = service_schema(platform, service);
                let required = schema["required"].as_array().unwrap();
                assert!(required.contains(&json!("entity_id")));
            }
        }
    }

    #[test]
    fn test_send_command_schema() {
        let schema = service_schema(Platform::Remote, "send_command");
        assert_eq!(schema["required"], json!(["entity_id", "command"]));
        assert_eq!(schema["properties"]["num_repeats"]["type"], "integer");
    }
}
