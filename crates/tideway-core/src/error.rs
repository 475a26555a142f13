//! Error types for the Tideway runtime
//!
//! Provides structured error handling for both the pipeline runtime and
//! source/sink strategy implementations.

use thiserror::Error;

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Result type alias for strategy operations
pub type StrategyResult<T> = std::result::Result<T, StrategyError>;

/// Main error type for the pipeline runtime
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Configuration error (unknown resource kind, invalid registration, ...)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A processor's one-time setup failed; fatal for its replica
    #[error("Setup error for processor '{processor}': {message}")]
    Setup { processor: String, message: String },

    /// The user transform failed
    #[error("Transform error: {0}")]
    Transform(String),

    /// Source strategy error
    #[error("Source '{name}' error: {message}")]
    Source { name: String, message: String },

    /// Sink strategy error
    #[error("Sink '{name}' error: {message}")]
    Sink { name: String, message: String },

    /// A spawned pipeline task failed to complete (panic or cancellation)
    #[error("Task failure: {0}")]
    Task(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Strategy error (from individual source/sink strategies)
    #[error(transparent)]
    Strategy(#[from] StrategyError),
}

/// Errors that can occur in source/sink strategy operations
#[derive(Debug, Error)]
pub enum StrategyError {
    /// Configuration validation failed
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection to the backing medium failed
    #[error("connection error: {0}")]
    Connection(String),

    /// Acknowledging an unknown or already-acknowledged handle
    #[error("ack error: {0}")]
    Ack(String),

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Timeout waiting for the backing medium
    #[error("timeout: {0}")]
    Timeout(String),

    /// Data serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Transient error that may succeed on retry
    #[error("transient error (retryable): {0}")]
    Transient(String),

    /// Retry budget exhausted acquiring a connection; not retried further
    #[error("connection retries exhausted: {0}")]
    ConnectionExhausted(String),

    /// Fatal error that will not succeed on retry
    #[error("fatal error: {0}")]
    Fatal(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl StrategyError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Timeout(_) | Self::Transient(_)
        )
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create an ack error
    pub fn ack(msg: impl Into<String>) -> Self {
        Self::Ack(msg.into())
    }

    /// Create a transient error
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Create a fatal error
    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }
}

impl PipelineError {
    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a transform error
    pub fn transform(msg: impl Into<String>) -> Self {
        Self::Transform(msg.into())
    }

    /// Create a source error
    pub fn source(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Source {
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create a sink error
    pub fn sink(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Sink {
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Check if this error originated in configuration
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}
