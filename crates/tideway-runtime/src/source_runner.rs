//! Source actor - the pull/process/ack loop
//!
//! One source actor per replica, shared by that replica's loop tasks. The
//! strategy sits behind a lock so concurrent pull and ack calls serialize,
//! while processing between those calls is free to overlap with other
//! tasks' pulls.
//!
//! Every handle returned by a pull ends up in exactly one ack set: the
//! whole batch is committed after a successful deliver, or released for
//! redelivery when decode, transform, or push fails. Failures themselves
//! always propagate to the scheduler - the ack is bookkeeping, not
//! recovery.

use crate::sink_runner::SinkActor;
use std::sync::Arc;
use tideway_core::{
    Converter, PipelineError, Record, Result, SourceStrategy, StrategyResult,
};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Drives pull → deliver → ack against one source strategy
pub struct SourceActor {
    name: String,
    strategy: Mutex<Box<dyn SourceStrategy>>,
    converter: Converter,
    streaming: bool,
    sink: Arc<SinkActor>,
}

impl SourceActor {
    /// Bind a source strategy to a replica's sink actor
    pub fn new(
        name: impl Into<String>,
        strategy: Box<dyn SourceStrategy>,
        converter: Converter,
        sink: Arc<SinkActor>,
    ) -> Self {
        let streaming = strategy.is_streaming();
        Self {
            name: name.into(),
            strategy: Mutex::new(strategy),
            converter,
            streaming,
            sink,
        }
    }

    /// Best-effort backlog estimate from the underlying strategy
    pub async fn backlog(&self) -> StrategyResult<Option<u64>> {
        self.strategy.lock().await.backlog().await
    }

    /// Run the pull/process/ack loop until the source drains (bounded
    /// sources) or a failure aborts the run.
    ///
    /// Streaming sources never drain; their loop polls until the whole
    /// run is torn down.
    pub async fn run(&self) -> Result<()> {
        loop {
            let response = self
                .strategy
                .lock()
                .await
                .pull()
                .await
                .map_err(|e| PipelineError::source(self.name.clone(), e.to_string()))?;

            if response.is_empty() {
                if self.streaming {
                    continue;
                }
                debug!(source = %self.name, "source drained");
                return Ok(());
            }

            let (payloads, ack_ids) = response.into_parts();
            match self.deliver(payloads).await {
                Ok(()) => {
                    self.strategy
                        .lock()
                        .await
                        .ack(ack_ids, Vec::new())
                        .await
                        .map_err(|e| PipelineError::source(self.name.clone(), e.to_string()))?;
                }
                Err(e) => {
                    // release the batch for redelivery, then surface the
                    // original failure
                    if let Err(ack_err) =
                        self.strategy.lock().await.ack(Vec::new(), ack_ids).await
                    {
                        warn!(
                            source = %self.name,
                            error = %ack_err,
                            "failed to release handles after delivery failure"
                        );
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn deliver(&self, payloads: Vec<Record>) -> Result<()> {
        let mut decoded = Vec::with_capacity(payloads.len());
        for payload in payloads {
            decoded.push((self.converter)(payload)?);
        }
        self.sink.write(decoded).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::Worker;
    use serde_json::json;
    use tideway_core::convert;
    use tideway_core::testing::{MockSink, MockSource};
    use tideway_core::FnProcessor;

    async fn sink_actor(factory: FnProcessor, sink: MockSink) -> Arc<SinkActor> {
        let worker = Worker::start(&factory).await.unwrap();
        Arc::new(SinkActor::new(
            "out",
            "mock",
            worker,
            Box::new(sink),
            convert::identity(),
        ))
    }

    #[tokio::test]
    async fn test_loop_acks_every_pulled_handle_on_success() {
        let source = MockSource::new(vec![vec![json!(1), json!(2)], vec![json!(3)]]);
        let log = source.ack_log();
        let sink = sink_actor(FnProcessor::new("id", |r| r), MockSink::new()).await;

        let actor = SourceActor::new("mock", Box::new(source), convert::identity(), sink.clone());
        actor.run().await.unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.issued.len(), 3);
        assert_eq!(log.successful.len(), 3);
        assert!(log.failed.is_empty());
        assert!(log.fully_acknowledged());
        drop(log);

        assert_eq!(sink.take_output().await, vec![json!(1), json!(2), json!(3)]);
    }

    #[tokio::test]
    async fn test_failed_delivery_releases_handles_and_propagates() {
        let source = MockSource::new(vec![vec![json!(1), json!(2)]]);
        let log = source.ack_log();
        let sink = sink_actor(
            FnProcessor::fallible("explode", |_| Err(PipelineError::transform("boom"))),
            MockSink::new(),
        )
        .await;

        let actor = SourceActor::new("mock", Box::new(source), convert::identity(), sink);
        let err = actor.run().await.unwrap_err();
        assert_eq!(err.to_string(), "Transform error: boom");

        let log = log.lock().unwrap();
        assert!(log.successful.is_empty());
        assert_eq!(log.failed.len(), 2);
        assert!(log.fully_acknowledged());
    }

    #[tokio::test]
    async fn test_decode_failure_counts_as_failed_delivery() {
        // json_decode over a structured (non-text) payload fails
        let source = MockSource::new(vec![vec![json!({"oops": true})]]);
        let log = source.ack_log();
        let sink = sink_actor(FnProcessor::new("id", |r| r), MockSink::new()).await;

        let actor = SourceActor::new("mock", Box::new(source), convert::json_decode(), sink);
        let err = actor.run().await.unwrap_err();
        assert!(err.to_string().contains("serialization error"));

        let log = log.lock().unwrap();
        assert_eq!(log.failed.len(), 1);
        assert!(log.fully_acknowledged());
    }

    #[tokio::test]
    async fn test_backlog_passes_through_to_the_strategy() {
        use crate::connectors::mem_queue::{self, MemQueueConfig, MemQueueSource};

        let config = MemQueueConfig {
            queue: "actor-backlog".to_string(),
            max_batch_size: 10,
            poll_timeout_ms: 10,
            drain: true,
            num_pull_threads: 1,
        };
        mem_queue::queue("actor-backlog").publish_str("pending");

        let sink = sink_actor(FnProcessor::new("id", |r| r), MockSink::new()).await;
        let actor = SourceActor::new(
            "mem-queue",
            Box::new(MemQueueSource::new(config)),
            convert::identity(),
            sink,
        );
        assert_eq!(actor.backlog().await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_bounded_source_terminates_on_empty_pull() {
        let source = MockSource::new(vec![]);
        let sink = sink_actor(FnProcessor::new("id", |r| r), MockSink::new()).await;

        let actor = SourceActor::new("mock", Box::new(source), convert::identity(), sink.clone());
        actor.run().await.unwrap();
        assert!(sink.take_output().await.is_empty());
    }
}
