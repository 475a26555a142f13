//! Built-in connectors
//!
//! Each connector registers a provider per resource kind; the scheduler
//! resolves kinds through the registries built here. Custom connectors
//! register into their own registries and hand them to
//! [`Runtime::with_registries`](crate::Runtime::with_registries).

pub mod dataset;
pub mod empty;
pub mod local_store;
pub mod mem_queue;

use crate::registry::{SinkRegistry, SourceRegistry};
use std::sync::Arc;

/// Create a source registry with the built-in source kinds
pub fn create_source_registry() -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    registry.register(empty::KIND, Arc::new(empty::EmptySourceProvider));
    registry.register(mem_queue::KIND, Arc::new(mem_queue::MemQueueSourceProvider));
    registry.register(dataset::KIND, Arc::new(dataset::DatasetSourceProvider));
    registry
}

/// Create a sink registry with the built-in sink kinds
pub fn create_sink_registry() -> SinkRegistry {
    let mut registry = SinkRegistry::new();
    registry.register(empty::KIND, Arc::new(empty::EmptySinkProvider));
    registry.register(mem_queue::KIND, Arc::new(mem_queue::MemQueueSinkProvider));
    registry.register(
        local_store::KIND,
        Arc::new(local_store::LocalStoreSinkProvider),
    );
    registry
}
