//! Service registry with async handlers
//!
//! Services are how callers drive the integration: `vidaa_tv.send_key`,
//! `vidaa_tv.launch_app` and the entity platform services such as
//! `button.press`. A service may carry a JSON schema; service data that
//! fails it is rejected before the handler runs.

use dashmap::DashMap;
use jsonschema::JSONSchema;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use vidaa_core::{Context, ServiceCall, SupportsResponse};

/// Result type for service calls
pub type ServiceResult = Result<Option<serde_json::Value>, ServiceError>;

/// Future type for async service handlers
pub type ServiceFuture = Pin<Box<dyn Future<Output = ServiceResult> + Send>>;

/// Service handler function type
pub type ServiceHandler = Arc<dyn Fn(ServiceCall) -> ServiceFuture + Send + Sync>;

/// Errors that can occur when working with services
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("service not found: {domain}.{service}")]
    NotFound { domain: String, service: String },

    #[error("service call failed: {0}")]
    CallFailed(String),

    #[error("invalid service data: {0}")]
    InvalidData(String),

    #[error("invalid schema for {domain}.{service}: {reason}")]
    InvalidSchema {
        domain: String,
        service: String,
        reason: String,
    },

    #[error("service does not support responses")]
    ResponseNotSupported,
}

/// Information about a registered service
#[derive(Debug, Clone)]
pub struct ServiceDescription {
    pub domain: String,
    pub service: String,
    pub name: Option<String>,
    pub description: Option<String>,
    /// JSON schema for service data
    pub schema: Option<serde_json::Value>,
    /// Entity selector for targeted services
    pub target: Option<serde_json::Value>,
    pub supports_response: SupportsResponse,
}

impl ServiceDescription {
    /// A description with only domain and service set
    pub fn new(domain: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            name: None,
            description: None,
            schema: None,
            target: None,
            supports_response: SupportsResponse::None,
        }
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_target(mut self, target: serde_json::Value) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

struct RegisteredService {
    handler: ServiceHandler,
    validator: Option<Arc<JSONSchema>>,
    description: ServiceDescription,
}

/// The service registry, keyed by `domain.service`
pub struct ServiceRegistry {
    services: DashMap<String, RegisteredService>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
        }
    }

    /// Register a service without a description or schema
    pub fn register<F, Fut>(
        &self,
        domain: impl Into<String>,
        service: impl Into<String>,
        handler: F,
    ) where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult> + Send + 'static,
    {
        self.insert(ServiceDescription::new(domain, service), None, handler);
    }

    /// Register a service with full description
    ///
    /// Fails if the description carries a schema that does not compile.
    pub fn register_with_description<F, Fut>(
        &self,
        description: ServiceDescription,
        handler: F,
    ) -> Result<(), ServiceError>
    where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult> + Send + 'static,
    {
        let validator = match &description.schema {
            Some(schema) => Some(Arc::new(JSONSchema::compile(schema).map_err(|e| {
                ServiceError::InvalidSchema {
                    domain: description.domain.clone(),
                    service: description.service.clone(),
                    reason: e.to_string(),
                }
            })?)),
            None => None,
        };
        self.insert(description, validator, handler);
        Ok(())
    }

    #[instrument(skip_all, fields(domain = %description.domain, service = %description.service))]
    fn insert<F, Fut>(
        &self,
        description: ServiceDescription,
        validator: Option<Arc<JSONSchema>>,
        handler: F,
    ) where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult> + Send + 'static,
    {
        debug!("Registering service");

        let handler: ServiceHandler =
            Arc::new(move |call| Box::pin(handler(call)) as ServiceFuture);
        let key = format!("{}.{}", description.domain, description.service);

        self.services.insert(
            key,
            RegisteredService {
                handler,
                validator,
                description,
            },
        );
    }

    /// Call a service
    ///
    /// Service data is validated against the service's schema first.
    #[instrument(skip(self, service_data, context))]
    pub async fn call(
        &self,
        domain: &str,
        service: &str,
        service_data: serde_json::Value,
        context: Context,
        return_response: bool,
    ) -> ServiceResult {
        let key = format!("{}.{}", domain, service);

        let registered = self.services.get(&key).ok_or_else(|| {
            warn!(domain = %domain, service = %service, "Service not found");
            ServiceError::NotFound {
                domain: domain.to_string(),
                service: service.to_string(),
            }
        })?;

        if return_response && registered.description.supports_response == SupportsResponse::None {
            return Err(ServiceError::ResponseNotSupported);
        }

        let handler = registered.handler.clone();
        let validator = registered.validator.clone();
        drop(registered); // Release the map guard before awaiting the handler

        if let Some(validator) = validator {
            validate(&validator, &service_data)?;
        }

        debug!(domain = %domain, service = %service, "Calling service");
        let result = handler(ServiceCall::new(domain, service, service_data, context)).await?;

        Ok(if return_response { result } else { None })
    }

    pub fn has_service(&self, domain: &str, service: &str) -> bool {
        self.services.contains_key(&format!("{}.{}", domain, service))
    }

    pub fn get_service(&self, domain: &str, service: &str) -> Option<ServiceDescription> {
        self.services
            .get(&format!("{}.{}", domain, service))
            .map(|s| s.description.clone())
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn validate(validator: &JSONSchema, data: &serde_json::Value) -> Result<(), ServiceError> {
    if let Err(errors) = validator.validate(data) {
        let messages: Vec<String> = errors.map(|e| e.to_string()).collect();
        return Err(ServiceError::InvalidData(messages.join("; ")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_and_call() {
        let registry = ServiceRegistry::new();
        registry
            .register_with_description(
                ServiceDescription {
                    supports_response: SupportsResponse::Optional,
                    ..ServiceDescription::new("test", "echo")
                },
                |call: ServiceCall| async move { Ok(Some(call.service_data)) },
            )
            .unwrap();

        let result = registry
            .call("test", "echo", json!({"msg": "hello"}), Context::new(), true)
            .await
            .unwrap();

        assert_eq!(result, Some(json!({"msg": "hello"})));
    }

    #[tokio::test]
    async fn test_service_not_found() {
        let registry = ServiceRegistry::new();
        let result = registry
            .call("vidaa_tv", "missing", json!({}), Context::new(), false)
            .await;
        assert!(matches!(result, Err(ServiceError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_response_not_supported() {
        let registry = ServiceRegistry::new();
        registry.register("button", "press", |_call: ServiceCall| async move { Ok(None) });

        let result = registry
            .call("button", "press", json!({}), Context::new(), true)
            .await;
        assert!(matches!(result, Err(ServiceError::ResponseNotSupported)));
    }

    #[tokio::test]
    async fn test_schema_rejects_bad_data() {
        let registry = ServiceRegistry::new();
        registry
            .register_with_description(
                ServiceDescription::new("vidaa_tv", "send_key").with_schema(json!({
                    "type": "object",
                    "properties": {"key": {"enum": ["KEY_HOME", "KEY_MUTE"]}},
                    "required": ["key"]
                })),
                |_call: ServiceCall| async move { Ok(None) },
            )
            .unwrap();

        let ok = registry
            .call("vidaa_tv", "send_key", json!({"key": "KEY_HOME"}), Context::new(), false)
            .await;
        assert!(ok.is_ok());

        let bad = registry
            .call("vidaa_tv", "send_key", json!({"key": "KEY_NOPE"}), Context::new(), false)
            .await;
        assert!(matches!(bad, Err(ServiceError::InvalidData(_))));

        let missing = registry
            .call("vidaa_tv", "send_key", json!({}), Context::new(), false)
            .await;
        assert!(matches!(missing, Err(ServiceError::InvalidData(_))));
    }

    #[test]
    fn test_invalid_schema_is_rejected() {
        let registry = ServiceRegistry::new();
        let result = registry.register_with_description(
            ServiceDescription::new("vidaa_tv", "broken").with_schema(json!({"type": 12})),
            |_call: ServiceCall| async move { Ok(None) },
        );
        assert!(matches!(result, Err(ServiceError::InvalidSchema { .. })));
        assert!(!registry.has_service("vidaa_tv", "broken"));
    }

    #[test]
    fn test_register_without_schema() {
        let registry = ServiceRegistry::new();
        assert!(!registry.has_service("switch", "turn_on"));
        registry.register("switch", "turn_on", |_: ServiceCall| async { Ok(None) });

        assert!(registry.has_service("switch", "turn_on"));
        let described = registry.get_service("switch", "turn_on").unwrap();
        assert!(described.schema.is_none());
        assert!(described.name.is_none());
    }
}
