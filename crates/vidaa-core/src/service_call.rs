//! Service call type

use crate::Context;
use serde::{Deserialize, Serialize};

/// A call to a registered service, e.g. `vidaa_tv.send_key`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCall {
    /// The domain the service belongs to (e.g., "vidaa_tv", "button")
    pub domain: String,

    /// The service name (e.g., "send_key", "press")
    pub service: String,

    /// Data passed to the service
    pub service_data: serde_json::Value,

    /// Context tracking who initiated this call
    pub context: Context,
}

impl ServiceCall {
    pub fn new(
        domain: impl Into<String>,
        service: impl Into<String>,
        service_data: serde_json::Value,
        context: Context,
    ) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            service_data,
            context,
        }
    }

    /// Get a value from service_data
    pub fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.service_data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Get entity_id(s) from service data, accepting a string or a list
    pub fn entity_ids(&self) -> Vec<String> {
        match self.service_data.get("entity_id") {
            Some(serde_json::Value::String(s)) => vec![s.clone()],
            Some(serde_json::Value::Array(arr)) => arr
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            _ => vec![],
        }
    }
}

/// Whether a service supports returning a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupportsResponse {
    #[default]
    None,
    Optional,
    Only,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_typed_field() {
        let call = ServiceCall::new(
            "vidaa_tv",
            "send_key",
            json!({"key": "KEY_HOME"}),
            Context::new(),
        );

        assert_eq!(call.get::<String>("key").as_deref(), Some("KEY_HOME"));
        assert_eq!(call.get::<String>("app"), None);
    }

    #[test]
    fn test_entity_ids_single_and_list() {
        let single = ServiceCall::new(
            "button",
            "press",
            json!({"entity_id": "button.tv_home"}),
            Context::new(),
        );
        assert_eq!(single.entity_ids(), vec!["button.tv_home"]);

        let many = ServiceCall::new(
            "switch",
            "turn_on",
            json!({"entity_id": ["switch.a_mute", "switch.b_mute"]}),
            Context::new(),
        );
        assert_eq!(many.entity_ids(), vec!["switch.a_mute", "switch.b_mute"]);

        let none = ServiceCall::new("vidaa_tv", "launch_app", json!({}), Context::new());
        assert!(none.entity_ids().is_empty());
    }
}
