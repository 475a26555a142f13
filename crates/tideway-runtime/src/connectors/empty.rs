//! Empty source and sink
//!
//! Null objects for processors that synthesize or discard data: the source
//! drains immediately, the sink accepts and drops every batch. Wiring these
//! in means the scheduler never needs a null check on source/sink presence.

use crate::registry::{SinkProvider, SourceProvider};
use async_trait::async_trait;
use tideway_core::{
    AckId, PullResponse, Record, SinkStrategy, SourceStrategy, StrategyError, StrategyResult,
};

pub const KIND: &str = "empty";

/// A bounded source with nothing to pull
pub struct EmptySource;

#[async_trait]
impl SourceStrategy for EmptySource {
    async fn pull(&mut self) -> StrategyResult<PullResponse> {
        Ok(PullResponse::empty())
    }

    async fn ack(&mut self, successful: Vec<AckId>, failed: Vec<AckId>) -> StrategyResult<()> {
        // no handle was ever issued, so any handle is unknown
        if let Some(id) = successful.first().or_else(|| failed.first()) {
            return Err(StrategyError::ack(format!(
                "unknown handle {} for the empty source",
                id
            )));
        }
        Ok(())
    }
}

/// A sink that discards every batch
pub struct EmptySink;

#[async_trait]
impl SinkStrategy for EmptySink {
    async fn push(&mut self, _batch: Vec<Record>) -> StrategyResult<()> {
        Ok(())
    }
}

/// Provider for the empty source; configuration is ignored
pub struct EmptySourceProvider;

#[async_trait]
impl SourceProvider for EmptySourceProvider {
    async fn create(&self, _config: &serde_yaml::Value) -> StrategyResult<Box<dyn SourceStrategy>> {
        Ok(Box::new(EmptySource))
    }
}

/// Provider for the empty sink; configuration is ignored
pub struct EmptySinkProvider;

#[async_trait]
impl SinkProvider for EmptySinkProvider {
    async fn create(&self, _config: &serde_yaml::Value) -> StrategyResult<Box<dyn SinkStrategy>> {
        Ok(Box::new(EmptySink))
    }
}
