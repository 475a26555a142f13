//! Dispatch registries for resource kinds
//!
//! The scheduler resolves a [`ResourceRef`](crate::ResourceRef)'s kind tag
//! through these registries at run time. Connectors register a provider per
//! kind; an unknown kind is a configuration error when `run` resolves it,
//! not at registration time.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use tideway_core::{SinkStrategy, SourceStrategy, StrategyError, StrategyResult};
use validator::Validate;

/// Factory trait for source strategies of one resource kind
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Derive per-replica construction arguments from the base
    /// configuration.
    ///
    /// How a source kind partitions itself is its own business: a queue
    /// hands every replica the same subscription, a dataset shards its
    /// rows. The default gives every replica the base configuration.
    fn replica_args(
        &self,
        config: &serde_yaml::Value,
        num_replicas: usize,
    ) -> StrategyResult<Vec<serde_yaml::Value>> {
        Ok(vec![config.clone(); num_replicas])
    }

    /// Create a source strategy from one replica's arguments
    async fn create(&self, config: &serde_yaml::Value) -> StrategyResult<Box<dyn SourceStrategy>>;
}

/// Factory trait for sink strategies of one resource kind
#[async_trait]
pub trait SinkProvider: Send + Sync {
    /// Create a sink strategy from the configuration
    async fn create(&self, config: &serde_yaml::Value) -> StrategyResult<Box<dyn SinkStrategy>>;
}

/// Registry of available source kinds
pub struct SourceRegistry {
    providers: HashMap<String, Arc<dyn SourceProvider>>,
}

impl SourceRegistry {
    /// Create an empty source registry
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Register a source provider under a kind tag
    pub fn register(&mut self, kind: &str, provider: Arc<dyn SourceProvider>) {
        self.providers.insert(kind.to_string(), provider);
    }

    /// Get the provider for a kind
    pub fn get(&self, kind: &str) -> Option<Arc<dyn SourceProvider>> {
        self.providers.get(kind).cloned()
    }

    /// Check if a kind is registered
    pub fn contains(&self, kind: &str) -> bool {
        self.providers.contains_key(kind)
    }

    /// Registered kind tags, sorted
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Number of registered kinds
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry of available sink kinds
pub struct SinkRegistry {
    providers: HashMap<String, Arc<dyn SinkProvider>>,
}

impl SinkRegistry {
    /// Create an empty sink registry
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Register a sink provider under a kind tag
    pub fn register(&mut self, kind: &str, provider: Arc<dyn SinkProvider>) {
        self.providers.insert(kind.to_string(), provider);
    }

    /// Get the provider for a kind
    pub fn get(&self, kind: &str) -> Option<Arc<dyn SinkProvider>> {
        self.providers.get(kind).cloned()
    }

    /// Check if a kind is registered
    pub fn contains(&self, kind: &str) -> bool {
        self.providers.contains_key(kind)
    }

    /// Registered kind tags, sorted
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Number of registered kinds
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl Default for SinkRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Deserialize and validate a typed connector configuration from the raw
/// YAML carried by a resource reference. A null value reads as an empty
/// mapping so zero-configuration kinds work without boilerplate.
pub fn parse_config<T>(value: &serde_yaml::Value) -> StrategyResult<T>
where
    T: DeserializeOwned + Validate,
{
    let value = if value.is_null() {
        serde_yaml::Value::Mapping(serde_yaml::Mapping::new())
    } else {
        value.clone()
    };
    let config: T =
        serde_yaml::from_value(value).map_err(|e| StrategyError::Config(e.to_string()))?;
    config
        .validate()
        .map_err(|e| StrategyError::Config(e.to_string()))?;
    Ok(config)
}
