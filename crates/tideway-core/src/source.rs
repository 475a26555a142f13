//! Source strategy contract
//!
//! A source strategy is the pull side of a connector: it fetches batches of
//! payloads from a backing medium (queue, table, file), hands out an opaque
//! ack handle per payload, and later commits or releases those handles.

use crate::convert::{self, Converter, SchemaHint};
use crate::error::StrategyResult;
use crate::Record;
use async_trait::async_trait;
use std::fmt;

/// Default upper bound on the number of items one `pull` may return
pub const DEFAULT_MAX_BATCH_SIZE: usize = 1_000;

/// Opaque handle correlating a pulled payload with its acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AckId(u64);

impl AckId {
    /// Create a handle from a strategy-assigned sequence number
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// The underlying sequence number
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One payload returned by a `pull`, paired with its ack handle
#[derive(Debug, Clone, PartialEq)]
pub struct PulledItem {
    pub payload: Record,
    pub ack_id: AckId,
}

/// Ordered sequence of (payload, ack handle) pairs returned by one `pull`
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PullResponse {
    items: Vec<PulledItem>,
}

impl PullResponse {
    /// Create a response from pulled items
    pub fn new(items: Vec<PulledItem>) -> Self {
        Self { items }
    }

    /// A response carrying no data (the medium had nothing ready)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Append a payload with its handle
    pub fn push(&mut self, payload: Record, ack_id: AckId) {
        self.items.push(PulledItem { payload, ack_id });
    }

    /// Number of pulled items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the pull returned no data
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The handles in pull order
    pub fn ack_ids(&self) -> Vec<AckId> {
        self.items.iter().map(|item| item.ack_id).collect()
    }

    /// Split into payloads and handles, both in pull order
    pub fn into_parts(self) -> (Vec<Record>, Vec<AckId>) {
        let mut payloads = Vec::with_capacity(self.items.len());
        let mut ack_ids = Vec::with_capacity(self.items.len());
        for item in self.items {
            payloads.push(item.payload);
            ack_ids.push(item.ack_id);
        }
        (payloads, ack_ids)
    }

    /// Iterate over the pulled items
    pub fn iter(&self) -> impl Iterator<Item = &PulledItem> {
        self.items.iter()
    }
}

/// Trait for source strategies
///
/// Implementations own their connection state exclusively; the runtime never
/// shares one instance across replicas. `pull` and `ack` take `&mut self`
/// because consumption advances that state.
#[async_trait]
pub trait SourceStrategy: Send {
    /// Fetch at most [`max_batch_size`](SourceStrategy::max_batch_size)
    /// available payloads.
    ///
    /// Suspends the calling task until data is available or a
    /// strategy-defined timeout elapses, and returns an empty response
    /// rather than failing when nothing is ready.
    async fn pull(&mut self) -> StrategyResult<PullResponse>;

    /// Commit consumption for `successful` and release `failed` for
    /// redelivery (the redelivery semantics belong to the medium).
    ///
    /// Every handle returned by a `pull` must eventually appear in exactly
    /// one of the two sets. Unknown or already-acknowledged handles fail
    /// with [`StrategyError::Ack`](crate::StrategyError::Ack).
    async fn ack(&mut self, successful: Vec<AckId>, failed: Vec<AckId>) -> StrategyResult<()>;

    /// Best-effort estimate of unconsumed work, used only as an autoscaling
    /// signal. `None` when the medium cannot estimate it; only meaningful
    /// for streaming sources.
    async fn backlog(&mut self) -> StrategyResult<Option<u64>> {
        Ok(None)
    }

    /// Upper bound respected by `pull`
    fn max_batch_size(&self) -> usize {
        DEFAULT_MAX_BATCH_SIZE
    }

    /// Whether this source is unbounded (polled forever) or bounded
    /// (naturally terminates once drained)
    fn is_streaming(&self) -> bool {
        false
    }

    /// Hint for how many pull/process/ack loop tasks to run per replica
    fn recommended_num_threads(&self) -> usize {
        1
    }

    /// The decode applied to each raw payload before the transform runs.
    /// No declared hint yields the identity.
    fn pull_converter(&self, _declared: Option<SchemaHint>) -> Converter {
        convert::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pull_response_preserves_order() {
        let mut response = PullResponse::empty();
        assert!(response.is_empty());

        response.push(json!("a"), AckId::new(1));
        response.push(json!("b"), AckId::new(2));
        assert_eq!(response.len(), 2);

        let (payloads, ack_ids) = response.into_parts();
        assert_eq!(payloads, vec![json!("a"), json!("b")]);
        assert_eq!(ack_ids, vec![AckId::new(1), AckId::new(2)]);
    }

    #[test]
    fn test_ack_ids_pair_with_payloads() {
        let response = PullResponse::new(vec![
            PulledItem {
                payload: json!({"n": 1}),
                ack_id: AckId::new(10),
            },
            PulledItem {
                payload: json!({"n": 2}),
                ack_id: AckId::new(11),
            },
        ]);
        assert_eq!(response.ack_ids(), vec![AckId::new(10), AckId::new(11)]);
    }

    #[test]
    fn test_ack_id_display() {
        assert_eq!(AckId::new(42).to_string(), "42");
        assert_eq!(AckId::new(42).value(), 42);
    }
}
