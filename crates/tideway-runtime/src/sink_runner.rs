//! Sink actor - serializes process and push for one replica
//!
//! One sink actor per replica, bound to its worker's batch entry point.
//! Loop tasks within the replica share the actor; a lock serializes their
//! write calls so the worker and sink strategy each see one caller at a
//! time. The actor also accumulates every processed result for the run
//! output.

use crate::worker::Worker;
use tideway_core::{Converter, PipelineError, Record, Result, SinkStrategy};
use tokio::sync::Mutex;
use tracing::debug;

struct SinkActorInner {
    worker: Worker,
    strategy: Box<dyn SinkStrategy>,
    converter: Converter,
    results: Vec<Record>,
}

/// Drives process → encode → push for one replica
pub struct SinkActor {
    key: String,
    name: String,
    inner: Mutex<SinkActorInner>,
}

impl SinkActor {
    /// Bind a sink strategy to a worker's batch entry point
    ///
    /// `key` is the sink identity in the run output; `name` labels errors.
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        worker: Worker,
        strategy: Box<dyn SinkStrategy>,
        converter: Converter,
    ) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            inner: Mutex::new(SinkActorInner {
                worker,
                strategy,
                converter,
                results: Vec::new(),
            }),
        }
    }

    /// The sink identity used in run outputs
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Process a pulled batch through the worker, encode it, and push it.
    ///
    /// Ordering is preserved end-to-end; a transform or push failure
    /// propagates without recording any of the batch in the output.
    pub async fn write(&self, batch: Vec<Record>) -> Result<()> {
        let mut inner = self.inner.lock().await;

        let processed = inner.worker.process_batch(batch)?;

        let mut encoded = Vec::with_capacity(processed.len());
        for record in &processed {
            encoded.push((inner.converter)(record.clone())?);
        }

        inner
            .strategy
            .push(encoded)
            .await
            .map_err(|e| PipelineError::sink(self.name.clone(), e.to_string()))?;

        debug!(sink = %self.name, records = processed.len(), "pushed batch");
        inner.results.extend(processed);
        Ok(())
    }

    /// Drain the accumulated results for the run output
    pub async fn take_output(&self) -> Vec<Record> {
        std::mem::take(&mut self.inner.lock().await.results)
    }
}
