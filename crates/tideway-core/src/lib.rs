//! tideway-core - contracts for the Tideway pipeline runtime
//!
//! This crate defines the interfaces every connector and processor
//! implements; the scheduler that wires them together lives in
//! `tideway-runtime`.
//!
//! - [`SourceStrategy`] / [`SinkStrategy`] - the pull-side and push-side
//!   connector contracts (pull, ack, backlog, batch size, converters)
//! - [`Processor`] / [`ProcessorFactory`] - the user transform bound to one
//!   source and one sink, instantiated once per worker
//! - [`convert`] - the converter boundary between wire payloads and records
//! - [`InfraLifecycle`] - the provisioning collaborator contract
//! - [`testing`] - mock strategies for pipeline tests
//!
//! # Example
//!
//! ```rust
//! use tideway_core::{FnProcessor, ProcessorFactory};
//! use serde_json::json;
//!
//! let factory = FnProcessor::new("uppercase", |record| {
//!     json!(record.as_str().unwrap_or_default().to_uppercase())
//! });
//! let mut processor = factory.create();
//! assert_eq!(processor.process(json!("hi")).unwrap(), json!("HI"));
//! ```

pub mod convert;
pub mod error;
pub mod infra;
pub mod processor;
pub mod sink;
pub mod source;
pub mod testing;

/// The dynamic payload type flowing through a pipeline
pub type Record = serde_json::Value;

pub use convert::{Converter, SchemaHint};
pub use error::{PipelineError, Result, StrategyError, StrategyResult};
pub use infra::{InfraLifecycle, InfraStatus};
pub use processor::{FnProcessor, Processor, ProcessorFactory};
pub use sink::SinkStrategy;
pub use source::{AckId, PullResponse, PulledItem, SourceStrategy, DEFAULT_MAX_BATCH_SIZE};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::convert::{self, Converter, SchemaHint};
    pub use crate::error::{PipelineError, Result, StrategyError, StrategyResult};
    pub use crate::infra::{InfraLifecycle, InfraStatus};
    pub use crate::processor::{FnProcessor, Processor, ProcessorFactory};
    pub use crate::sink::SinkStrategy;
    pub use crate::source::{AckId, PullResponse, PulledItem, SourceStrategy};
    pub use crate::Record;
    pub use async_trait::async_trait;
}
