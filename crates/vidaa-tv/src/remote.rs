//! Remote entity

use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, warn};
use vidaa_client::RemoteKey;
use vidaa_core::Platform;

use crate::coordinator::Coordinator;
use crate::entity::{opt_str, unsupported, EntityBase, EntityError, EntityResult, EntityState};

pub const DEFAULT_NUM_REPEATS: u64 = 1;
pub const DEFAULT_DELAY_SECS: f64 = 0.2;

pub struct Remote {
    pub base: EntityBase,
    activity_list: RwLock<Vec<String>>,
}

impl Remote {
    pub fn new(coordinator: Arc<Coordinator>, device_key: &str) -> Self {
        Self {
            base: EntityBase::new(coordinator, device_key, "remote").named("Remote"),
            activity_list: RwLock::new(Vec::new()),
        }
    }

    /// App names known when the entity was added
    pub fn activity_list(&self) -> Vec<String> {
        self.activity_list.read().map(|l| l.clone()).unwrap_or_default()
    }

    pub(crate) async fn load_activities(&self) {
        match self.base.coordinator.apps().await {
            Ok(apps) if !apps.is_empty() => {
                let names = apps
                    .into_iter()
                    .map(|a| a.name)
                    .filter(|n| !n.is_empty())
                    .collect();
                if let Ok(mut list) = self.activity_list.write() {
                    *list = names;
                }
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "Error updating activities"),
        }
    }

    pub(crate) fn state(&self) -> EntityState {
        let data = self.base.coordinator.data();
        let activity = data
            .as_ref()
            .and_then(|d| d.app.clone().or_else(|| d.source.clone()));
        let activities = self.activity_list();

        EntityState::on_off(data.map(|d| d.is_on))
            .with_attribute("current_activity", opt_str(activity.as_deref()))
            .with_attribute(
                "activity_list",
                if activities.is_empty() {
                    Value::Null
                } else {
                    json!(activities)
                },
            )
    }

    /// Turn on, then launch `activity` if one is given
    pub async fn turn_on(&self, activity: Option<&str>) -> EntityResult {
        self.base.coordinator.turn_on().await?;
        if let Some(activity) = activity {
            self.base.coordinator.launch_app(activity).await?;
        }
        Ok(())
    }

    pub async fn turn_off(&self) -> EntityResult {
        Ok(self.base.coordinator.turn_off().await?)
    }

    /// Send `commands` in order, `num_repeats` times, pausing `delay` after
    /// each key
    ///
    /// Every command is parsed before the first key goes out.
    pub async fn send_command(
        &self,
        commands: &[String],
        num_repeats: u64,
        delay: Duration,
    ) -> EntityResult {
        let keys = commands
            .iter()
            .map(|c| c.parse::<RemoteKey>())
            .collect::<Result<Vec<_>, _>>()?;

        for _ in 0..num_repeats {
            for key in &keys {
                self.base.coordinator.send_key(*key).await?;
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
        Ok(())
    }

    pub fn learn_command(&self) {
        warn!("Learning commands is not supported on Vidaa TV");
    }

    pub fn delete_command(&self) {
        warn!("Deleting commands is not supported on Vidaa TV");
    }

    pub(crate) async fn handle(&self, service: &str, data: &Value) -> EntityResult {
        match service {
            "turn_on" => {
                let activity = data.get("activity").and_then(Value::as_str);
                self.turn_on(activity).await
            }
            "turn_off" => self.turn_off().await,
            "send_command" => {
                let commands = parse_commands(data)?;
                let num_repeats = data
                    .get("num_repeats")
                    .and_then(Value::as_u64)
                    .unwrap_or(DEFAULT_NUM_REPEATS);
                let delay_secs = data
                    .get("delay_secs")
                    .and_then(Value::as_f64)
                    .unwrap_or(DEFAULT_DELAY_SECS);
                if !delay_secs.is_finite() || delay_secs < 0.0 {
                    return Err(EntityError::invalid("delay_secs", "must be zero or more"));
                }
                self.send_command(&commands, num_repeats, Duration::from_secs_f64(delay_secs))
                    .await
            }
            "learn_command" => {
                self.learn_command();
                Ok(())
            }
            "delete_command" => {
                self.delete_command();
                Ok(())
            }
            other => Err(unsupported(Platform::Remote, other)),
        }
    }
}

/// `command` may be a single string or a list
fn parse_commands(data: &Value) -> Result<Vec<String>, EntityError> {
    match data.get("command") {
        Some(Value::String(s)) => Ok(vec![s.clone()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(String::from)
                    .ok_or_else(|| EntityError::invalid("command", "commands must be strings"))
            })
            .collect(),
        _ => Err(EntityError::invalid("command", "a command is required")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse_commands(&json!({"command": "KEY_UP"})).unwrap(),
            vec!["KEY_UP"]
        );
        assert_eq!(
            parse_commands(&json!({"command": ["up", "ok"]})).unwrap(),
            vec!["up", "ok"]
        );
        assert!(parse_commands(&json!({"command": [1]})).is_err());
        assert!(parse_commands(&json!({})).is_err());
    }
}
