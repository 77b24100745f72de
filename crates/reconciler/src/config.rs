//! Runtime configuration shared by every pass.
//!
//! Settings live in the operator's environment, not in the descriptor. They
//! are resolved once at the start of each pass and threaded through the pass
//! as a [`RuntimeConfig`] value.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Container image of the workload.
pub const VS_CODE_IMAGE: &str = "VS_CODE_IMAGE";
/// Host name the routing rule answers on.
pub const ROOT_DOMAIN: &str = "ROOT_DOMAIN";
/// Ingress gateway reference; its presence switches routing on.
///
/// An empty value counts as unset, so `ISTIO_INGRESS_GATEWAY=` leaves
/// routing off.
pub const ISTIO_INGRESS_GATEWAY: &str = "ISTIO_INGRESS_GATEWAY";

/// Operator-wide settings for one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Workload container image reference.
    pub container_image: String,
    /// Root domain served by the routing rule.
    pub root_domain: String,
    /// Gateway the routing rule binds to. `None` disables routing.
    pub routing_gateway: Option<String>,
}

impl RuntimeConfig {
    /// Create a config with routing disabled.
    pub fn new(container_image: impl Into<String>, root_domain: impl Into<String>) -> Self {
        Self {
            container_image: container_image.into(),
            root_domain: root_domain.into(),
            routing_gateway: None,
        }
    }

    /// Enable routing through the given gateway.
    #[must_use]
    pub fn with_routing_gateway(mut self, gateway: impl Into<String>) -> Self {
        self.routing_gateway = Some(gateway.into());
        self
    }

    /// Whether routing resources are part of the desired state.
    pub const fn routing_enabled(&self) -> bool {
        self.routing_gateway.is_some()
    }

    /// Resolve a config from a key lookup.
    ///
    /// Empty values count as absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingConfig`] when the image or the root domain is
    /// absent.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.is_empty());

        let container_image = get(VS_CODE_IMAGE).ok_or(Error::MissingConfig {
            key: VS_CODE_IMAGE,
        })?;
        let root_domain = get(ROOT_DOMAIN).ok_or(Error::MissingConfig { key: ROOT_DOMAIN })?;

        Ok(Self {
            container_image,
            root_domain,
            routing_gateway: get(ISTIO_INGRESS_GATEWAY),
        })
    }
}

/// Source of runtime configuration.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Resolve the configuration for a new pass.
    async fn resolve(&self) -> Result<RuntimeConfig>;
}

/// Reads configuration from the process environment on every pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvConfigSource;

impl EnvConfigSource {
    /// Create a new environment source.
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConfigSource for EnvConfigSource {
    async fn resolve(&self) -> Result<RuntimeConfig> {
        RuntimeConfig::from_lookup(|key| std::env::var(key).ok())
    }
}

/// Fixed key/value configuration, for tests and embedding.
#[derive(Debug, Default, Clone)]
pub struct StaticConfigSource {
    values: HashMap<String, String>,
}

impl StaticConfigSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

#[async_trait]
impl ConfigSource for StaticConfigSource {
    async fn resolve(&self) -> Result<RuntimeConfig> {
        RuntimeConfig::from_lookup(|key| self.values.get(key).cloned())
    }
}

impl From<&RuntimeConfig> for StaticConfigSource {
    fn from(config: &RuntimeConfig) -> Self {
        let source = Self::new()
            .with(VS_CODE_IMAGE, config.container_image.clone())
            .with(ROOT_DOMAIN, config.root_domain.clone());
        match &config.routing_gateway {
            Some(gateway) => source.with(ISTIO_INGRESS_GATEWAY, gateway.clone()),
            None => source,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[tokio::test]
    async fn test_resolve_without_gateway_disables_routing() {
        let source = StaticConfigSource::new()
            .with(VS_CODE_IMAGE, "vscode:1")
            .with(ROOT_DOMAIN, "example.com");

        let config = source.resolve().await.unwrap();
        assert_eq!(config, RuntimeConfig::new("vscode:1", "example.com"));
        assert!(!config.routing_enabled());
    }

    #[tokio::test]
    async fn test_resolve_with_gateway_enables_routing() {
        let source = StaticConfigSource::new()
            .with(VS_CODE_IMAGE, "vscode:1")
            .with(ROOT_DOMAIN, "example.com")
            .with(ISTIO_INGRESS_GATEWAY, "gw1");

        let config = source.resolve().await.unwrap();
        assert!(config.routing_enabled());
        assert_eq!(config.routing_gateway.as_deref(), Some("gw1"));
    }

    #[tokio::test]
    async fn test_missing_image_is_fatal() {
        let source = StaticConfigSource::new().with(ROOT_DOMAIN, "example.com");

        let err = source.resolve().await.unwrap_err();
        assert!(matches!(err, Error::MissingConfig { key: VS_CODE_IMAGE }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_missing_domain_is_fatal() {
        let source = StaticConfigSource::new().with(VS_CODE_IMAGE, "vscode:1");

        let err = source.resolve().await.unwrap_err();
        assert!(matches!(err, Error::MissingConfig { key: ROOT_DOMAIN }));
    }

    #[test]
    fn test_empty_values_count_as_absent() {
        let result = RuntimeConfig::from_lookup(|key| match key {
            VS_CODE_IMAGE => Some("vscode:1".to_string()),
            ROOT_DOMAIN => Some("example.com".to_string()),
            _ => Some(String::new()),
        });
        assert!(!result.unwrap().routing_enabled());

        let result = RuntimeConfig::from_lookup(|key| match key {
            ROOT_DOMAIN => Some("example.com".to_string()),
            _ => Some(String::new()),
        });
        assert!(matches!(result, Err(Error::MissingConfig { .. })));
    }

    #[tokio::test]
    async fn test_static_source_from_config() {
        let config = RuntimeConfig::new("vscode:1", "example.com").with_routing_gateway("gw1");
        let source = StaticConfigSource::from(&config);
        assert_eq!(source.resolve().await.unwrap(), config);
    }
}
