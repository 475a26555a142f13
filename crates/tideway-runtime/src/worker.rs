//! Worker - one processor instance per replica
//!
//! A worker wraps exactly one processor instance. Construction runs the
//! processor's one-time `setup()` before any process call; a setup failure
//! is fatal to the replica and propagates to the scheduler instead of being
//! retried here.

use tideway_core::{PipelineError, Processor, ProcessorFactory, Record, Result, SchemaHint};
use tracing::debug;

/// Wraps one processor instance and exposes its process entry points
pub struct Worker {
    processor: Box<dyn Processor>,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker").finish_non_exhaustive()
    }
}

impl Worker {
    /// Create a processor instance and run its setup
    pub async fn start(factory: &dyn ProcessorFactory) -> Result<Self> {
        let mut processor = factory.create();
        debug!(processor = factory.processor_id(), "running processor setup");
        processor
            .setup()
            .await
            .map_err(|e| PipelineError::Setup {
                processor: factory.processor_id().to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { processor })
    }

    /// Transform a single record
    pub fn process(&mut self, record: Record) -> Result<Record> {
        self.processor.process(record)
    }

    /// Transform a batch sequentially, preserving input order
    ///
    /// A failure on one element propagates and aborts the remaining batch;
    /// no result is returned for the failing element or anything after it.
    pub fn process_batch(&mut self, records: Vec<Record>) -> Result<Vec<Record>> {
        let mut results = Vec::with_capacity(records.len());
        for record in records {
            results.push(self.process(record)?);
        }
        Ok(results)
    }

    /// The processor's declared input shape
    pub fn input_hint(&self) -> Option<SchemaHint> {
        self.processor.input_hint()
    }

    /// The processor's declared output shape
    pub fn output_hint(&self) -> Option<SchemaHint> {
        self.processor.output_hint()
    }
}
