//! In-process queue source and sink
//!
//! A process-wide broker of named queues carrying UTF-8 text messages.
//! Pulled messages stay in-flight until acknowledged: committing removes
//! them, failing them puts them back at the head of the queue for
//! redelivery - the in-process analog of a visibility-timeout reset.
//!
//! Every replica subscribing to the same queue name shares the underlying
//! queue, so `replica_args` hands each replica the same configuration.

use crate::registry::{parse_config, SinkProvider, SourceProvider};
use async_trait::async_trait;
use bytes::Bytes;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;
use tideway_core::{
    convert, AckId, Converter, PullResponse, Record, SchemaHint, SinkStrategy, SourceStrategy,
    StrategyError, StrategyResult,
};
use tokio::sync::Notify;
use validator::Validate;

pub const KIND: &str = "mem-queue";

static QUEUES: LazyLock<Mutex<HashMap<String, Arc<MemQueue>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Get or create the named queue in the process-wide broker
pub fn queue(name: &str) -> Arc<MemQueue> {
    let mut queues = QUEUES.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    queues
        .entry(name.to_string())
        .or_insert_with(|| Arc::new(MemQueue::new()))
        .clone()
}

struct QueueState {
    ready: VecDeque<(u64, Bytes)>,
    inflight: HashMap<u64, Bytes>,
    next_id: u64,
}

/// One named in-process queue
pub struct MemQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl MemQueue {
    fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                ready: VecDeque::new(),
                inflight: HashMap::new(),
                next_id: 0,
            }),
            notify: Notify::new(),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publish a message
    pub fn publish(&self, payload: Bytes) {
        let mut state = self.lock_state();
        let id = state.next_id;
        state.next_id += 1;
        state.ready.push_back((id, payload));
        drop(state);
        self.notify.notify_one();
    }

    /// Publish a text message
    pub fn publish_str(&self, text: &str) {
        self.publish(Bytes::copy_from_slice(text.as_bytes()));
    }

    /// Number of messages queued and not yet delivered
    pub fn depth(&self) -> usize {
        self.lock_state().ready.len()
    }

    /// Number of delivered messages awaiting acknowledgement
    pub fn inflight(&self) -> usize {
        self.lock_state().inflight.len()
    }

    /// Take queued messages off the queue for inspection, bypassing
    /// delivery tracking
    pub fn drain(&self, max: usize) -> Vec<Bytes> {
        let mut state = self.lock_state();
        let take = state.ready.len().min(max);
        state
            .ready
            .drain(..take)
            .map(|(_, payload)| payload)
            .collect()
    }

    fn take(&self, max: usize) -> Vec<(u64, Bytes)> {
        let mut state = self.lock_state();
        let take = state.ready.len().min(max);
        let items: Vec<(u64, Bytes)> = state.ready.drain(..take).collect();
        for (id, payload) in &items {
            state.inflight.insert(*id, payload.clone());
        }
        items
    }

    fn resolve(&self, successful: &[u64], failed: &[u64]) -> Result<(), String> {
        let mut state = self.lock_state();

        // validate the whole call before mutating anything
        let mut seen = HashSet::new();
        for id in successful.iter().chain(failed.iter()) {
            if !seen.insert(*id) {
                return Err(format!("handle {} appears more than once", id));
            }
            if !state.inflight.contains_key(id) {
                return Err(format!("unknown or already-acknowledged handle {}", id));
            }
        }

        for id in successful {
            state.inflight.remove(id);
        }
        // requeue failures at the head, preserving their original order
        for id in failed.iter().rev() {
            if let Some(payload) = state.inflight.remove(id) {
                state.ready.push_front((*id, payload));
            }
        }
        let redelivered = !failed.is_empty();
        drop(state);
        if redelivered {
            self.notify.notify_one();
        }
        Ok(())
    }

    async fn wait_for_data(&self) {
        self.notify.notified().await;
    }
}

fn default_max_batch_size() -> usize {
    100
}

fn default_poll_timeout_ms() -> u64 {
    100
}

fn default_num_pull_threads() -> usize {
    1
}

/// Configuration shared by the mem-queue source and sink
#[derive(Debug, Clone, Serialize, Deserialize, Validate, JsonSchema)]
pub struct MemQueueConfig {
    /// Queue name within the process-wide broker
    pub queue: String,

    /// Upper bound on the number of messages one pull returns
    #[serde(default = "default_max_batch_size")]
    #[validate(range(min = 1, max = 10_000))]
    pub max_batch_size: usize,

    /// How long one pull waits for data before returning empty
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// Bounded mode: terminate once the queue is drained instead of
    /// polling forever
    #[serde(default)]
    pub drain: bool,

    /// Loop tasks to run against this source per replica
    #[serde(default = "default_num_pull_threads")]
    #[validate(range(min = 1, max = 64))]
    pub num_pull_threads: usize,
}

/// Source strategy over one named in-process queue
pub struct MemQueueSource {
    queue: Arc<MemQueue>,
    config: MemQueueConfig,
}

impl MemQueueSource {
    pub fn new(config: MemQueueConfig) -> Self {
        Self {
            queue: queue(&config.queue),
            config,
        }
    }
}

#[async_trait]
impl SourceStrategy for MemQueueSource {
    async fn pull(&mut self) -> StrategyResult<PullResponse> {
        let mut batch = self.queue.take(self.config.max_batch_size);
        if batch.is_empty() && !self.config.drain {
            let _ = tokio::time::timeout(
                Duration::from_millis(self.config.poll_timeout_ms),
                self.queue.wait_for_data(),
            )
            .await;
            batch = self.queue.take(self.config.max_batch_size);
        }

        let mut response = PullResponse::empty();
        for (id, payload) in batch {
            let text = String::from_utf8_lossy(&payload).into_owned();
            response.push(Record::String(text), AckId::new(id));
        }
        Ok(response)
    }

    async fn ack(&mut self, successful: Vec<AckId>, failed: Vec<AckId>) -> StrategyResult<()> {
        let successful: Vec<u64> = successful.into_iter().map(AckId::value).collect();
        let failed: Vec<u64> = failed.into_iter().map(AckId::value).collect();
        self.queue
            .resolve(&successful, &failed)
            .map_err(StrategyError::ack)
    }

    async fn backlog(&mut self) -> StrategyResult<Option<u64>> {
        Ok(Some(self.queue.depth() as u64))
    }

    fn max_batch_size(&self) -> usize {
        self.config.max_batch_size
    }

    fn is_streaming(&self) -> bool {
        !self.config.drain
    }

    fn recommended_num_threads(&self) -> usize {
        self.config.num_pull_threads
    }

    fn pull_converter(&self, declared: Option<SchemaHint>) -> Converter {
        match declared {
            Some(SchemaHint::Json) => convert::json_decode(),
            Some(SchemaHint::Text) | None => convert::identity(),
        }
    }
}

/// Sink strategy publishing to one named in-process queue
pub struct MemQueueSink {
    queue: Arc<MemQueue>,
}

impl MemQueueSink {
    pub fn new(config: MemQueueConfig) -> Self {
        Self {
            queue: queue(&config.queue),
        }
    }
}

#[async_trait]
impl SinkStrategy for MemQueueSink {
    async fn push(&mut self, batch: Vec<Record>) -> StrategyResult<()> {
        for record in batch {
            let payload = match record {
                Record::String(text) => Bytes::from(text),
                other => Bytes::from(
                    serde_json::to_vec(&other)
                        .map_err(|e| StrategyError::Serialization(e.to_string()))?,
                ),
            };
            self.queue.publish(payload);
        }
        Ok(())
    }

    fn push_converter(&self, declared: Option<SchemaHint>) -> Converter {
        match declared {
            Some(SchemaHint::Json) => convert::json_encode(),
            Some(SchemaHint::Text) | None => convert::identity(),
        }
    }
}

/// Provider for mem-queue sources
///
/// Replicas are independent subscriptions to the same queue, so every
/// replica gets the base configuration (the default `replica_args`).
pub struct MemQueueSourceProvider;

#[async_trait]
impl SourceProvider for MemQueueSourceProvider {
    async fn create(&self, config: &serde_yaml::Value) -> StrategyResult<Box<dyn SourceStrategy>> {
        let config: MemQueueConfig = parse_config(config)?;
        Ok(Box::new(MemQueueSource::new(config)))
    }
}

/// Provider for mem-queue sinks
pub struct MemQueueSinkProvider;

#[async_trait]
impl SinkProvider for MemQueueSinkProvider {
    async fn create(&self, config: &serde_yaml::Value) -> StrategyResult<Box<dyn SinkStrategy>> {
        let config: MemQueueConfig = parse_config(config)?;
        Ok(Box::new(MemQueueSink::new(config)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(queue: &str) -> MemQueueConfig {
        MemQueueConfig {
            queue: queue.to_string(),
            max_batch_size: default_max_batch_size(),
            poll_timeout_ms: 10,
            drain: false,
            num_pull_threads: 1,
        }
    }

    #[tokio::test]
    async fn test_pull_ack_commits_messages() {
        let mut source = MemQueueSource::new(config("commit"));
        queue("commit").publish_str("one");
        queue("commit").publish_str("two");

        let response = source.pull().await.unwrap();
        assert_eq!(response.len(), 2);
        assert_eq!(queue("commit").inflight(), 2);

        source.ack(response.ack_ids(), vec![]).await.unwrap();
        assert_eq!(queue("commit").inflight(), 0);
        assert_eq!(queue("commit").depth(), 0);
    }

    #[tokio::test]
    async fn test_failed_handles_are_redelivered_in_order() {
        let mut source = MemQueueSource::new(config("redeliver"));
        queue("redeliver").publish_str("a");
        queue("redeliver").publish_str("b");

        let first = source.pull().await.unwrap();
        source.ack(vec![], first.ack_ids()).await.unwrap();

        let again = source.pull().await.unwrap();
        let (payloads, _) = again.into_parts();
        assert_eq!(payloads, vec![json!("a"), json!("b")]);
    }

    #[tokio::test]
    async fn test_unknown_and_duplicate_handles_fail() {
        let mut source = MemQueueSource::new(config("handles"));
        queue("handles").publish_str("x");

        let response = source.pull().await.unwrap();
        let ids = response.ack_ids();

        let err = source
            .ack(vec![AckId::new(9999)], vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, StrategyError::Ack(_)));

        source.ack(ids.clone(), vec![]).await.unwrap();
        // a second acknowledgement of the same handle is an error
        let err = source.ack(ids, vec![]).await.unwrap_err();
        assert!(matches!(err, StrategyError::Ack(_)));
    }

    #[tokio::test]
    async fn test_backlog_tracks_queue_depth() {
        let mut source = MemQueueSource::new(config("backlog"));
        assert_eq!(source.backlog().await.unwrap(), Some(0));
        queue("backlog").publish_str("x");
        queue("backlog").publish_str("y");
        assert_eq!(source.backlog().await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_max_batch_size_is_respected() {
        let mut cfg = config("batched");
        cfg.max_batch_size = 2;
        let mut source = MemQueueSource::new(cfg);
        for i in 0..5 {
            queue("batched").publish_str(&format!("m{i}"));
        }

        let response = source.pull().await.unwrap();
        assert_eq!(response.len(), 2);
        assert_eq!(queue("batched").depth(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_streaming_pull_times_out_empty() {
        let mut source = MemQueueSource::new(config("idle"));
        assert!(source.is_streaming());
        let response = source.pull().await.unwrap();
        assert!(response.is_empty());
    }

    #[tokio::test]
    async fn test_drain_mode_is_bounded() {
        let mut cfg = config("drained");
        cfg.drain = true;
        let mut source = MemQueueSource::new(cfg);
        assert!(!source.is_streaming());
        assert!(source.pull().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sink_publishes_in_order() {
        let mut sink = MemQueueSink::new(config("published"));
        sink.push(vec![json!("first"), json!({"n": 2})]).await.unwrap();

        let messages = queue("published").drain(10);
        assert_eq!(messages.len(), 2);
        assert_eq!(&messages[0][..], &b"first"[..]);
        assert_eq!(&messages[1][..], &br#"{"n":2}"#[..]);
    }

    #[test]
    fn test_converters_follow_declared_hints() {
        let source = MemQueueSource::new(config("hints"));
        let decode = source.pull_converter(Some(SchemaHint::Json));
        assert_eq!(
            decode(json!(r#"{"a":1}"#)).unwrap(),
            json!({"a": 1})
        );

        let sink = MemQueueSink::new(config("hints"));
        let encode = sink.push_converter(Some(SchemaHint::Json));
        assert_eq!(encode(json!({"a": 1})).unwrap(), json!(r#"{"a":1}"#));

        let passthrough = sink.push_converter(None);
        assert_eq!(passthrough(json!({"a": 1})).unwrap(), json!({"a": 1}));
    }
}
