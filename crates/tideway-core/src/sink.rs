//! Sink strategy contract

use crate::convert::{self, Converter, SchemaHint};
use crate::error::StrategyResult;
use crate::Record;
use async_trait::async_trait;

/// Trait for sink strategies
///
/// A sink strategy is the push side of a connector. Like sources, instances
/// own their connection state exclusively per replica.
#[async_trait]
pub trait SinkStrategy: Send {
    /// Write all elements of the batch, preserving their order in the
    /// underlying result.
    ///
    /// A batch may carry 1..N elements. Elements must not be silently
    /// dropped: any element-level failure surfaces as an error for the
    /// whole batch, and the caller decides whether the batch is retried.
    async fn push(&mut self, batch: Vec<Record>) -> StrategyResult<()>;

    /// The encode applied to each processor output before `push`.
    /// No declared hint yields the identity.
    fn push_converter(&self, _declared: Option<SchemaHint>) -> Converter {
        convert::identity()
    }
}
