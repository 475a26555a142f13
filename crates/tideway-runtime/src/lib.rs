//! tideway-runtime - the Tideway pipeline scheduler
//!
//! This crate runs processors defined against the `tideway-core`
//! contracts: register one processor with its input and output resources,
//! then `run(num_replicas)` fans the pull/process/ack cycle out across
//! replicas and returns the aggregated per-sink output.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tideway_core::FnProcessor;
//! use tideway_runtime::{ResourceRef, Runtime};
//!
//! # async fn example() -> tideway_core::Result<()> {
//! let config = serde_yaml::from_str("queue: in").expect("static config");
//! let runtime = Runtime::new();
//! runtime.register_processor(
//!     Arc::new(FnProcessor::new("passthrough", |record| record)),
//!     ResourceRef::new("mem-queue").with_config(config),
//!     ResourceRef::empty(),
//!     None,
//! )?;
//! let output = runtime.run(2).await?;
//! # Ok(())
//! # }
//! ```

pub mod connectors;
pub mod logging;
pub mod registry;
pub mod resource;
pub mod runtime;
pub mod session;
pub mod sink_runner;
pub mod source_runner;
pub mod worker;

pub use registry::{parse_config, SinkProvider, SinkRegistry, SourceProvider, SourceRegistry};
pub use resource::ResourceRef;
pub use runtime::{RunOutput, Runtime, RuntimeState};
pub use session::{SessionTracker, UsageReporter};
pub use sink_runner::SinkActor;
pub use source_runner::SourceActor;
pub use worker::Worker;

// Re-export the contract crate for downstream convenience
pub use tideway_core;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::connectors;
    pub use crate::registry::{
        parse_config, SinkProvider, SinkRegistry, SourceProvider, SourceRegistry,
    };
    pub use crate::resource::ResourceRef;
    pub use crate::runtime::{RunOutput, Runtime, RuntimeState};
    pub use crate::session::{SessionTracker, UsageReporter};
    pub use crate::worker::Worker;
    pub use tideway_core::prelude::*;
}
