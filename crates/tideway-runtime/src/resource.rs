//! Resource references
//!
//! A [`ResourceRef`] names the backing medium a processor reads from or
//! writes to: an explicit kind tag resolved through the dispatch
//! registries at run time, plus the connector configuration for that kind.

use serde::{Deserialize, Serialize};

/// Reference to a source or sink resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRef {
    /// Dispatch tag resolved against the source/sink registries
    pub kind: String,

    /// Optional instance name; distinguishes two resources of the same
    /// kind and doubles as the sink key in run outputs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Connector configuration, parsed by the provider for this kind
    #[serde(default)]
    pub config: serde_yaml::Value,
}

impl ResourceRef {
    /// Reference a resource kind with no configuration
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: None,
            config: serde_yaml::Value::Null,
        }
    }

    /// The null resource, for processors that synthesize or discard data
    pub fn empty() -> Self {
        Self::new(crate::connectors::empty::KIND)
    }

    /// Attach connector configuration
    pub fn with_config(mut self, config: serde_yaml::Value) -> Self {
        self.config = config;
        self
    }

    /// Name this resource instance
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Identity used as the sink key in run outputs
    pub fn key(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.kind)
    }
}
