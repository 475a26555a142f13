//! Processor contract
//!
//! A processor binds a user transform to one source and one sink. The
//! runtime creates one processor instance per worker via a
//! [`ProcessorFactory`], runs its one-time [`setup`](Processor::setup)
//! before any pull, and then feeds it decoded records.

use crate::convert::SchemaHint;
use crate::error::Result;
use crate::Record;
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for processors
#[async_trait]
pub trait Processor: Send {
    /// One-time connection/resource acquisition, invoked once per worker
    /// before any record is processed. A failure here is fatal for the
    /// replica and is never silently retried.
    async fn setup(&mut self) -> Result<()> {
        Ok(())
    }

    /// Transform one record
    fn process(&mut self, record: Record) -> Result<Record>;

    /// Declared input shape, used to select the source's pull converter
    fn input_hint(&self) -> Option<SchemaHint> {
        None
    }

    /// Declared output shape, used to select the sink's push converter
    fn output_hint(&self) -> Option<SchemaHint> {
        None
    }
}

/// Factory creating one fresh [`Processor`] instance per worker
pub trait ProcessorFactory: Send + Sync {
    /// Default processor id used when registration does not name one
    fn processor_id(&self) -> &str;

    /// Create a processor instance for a new worker
    fn create(&self) -> Box<dyn Processor>;
}

type TransformFn = dyn Fn(Record) -> Result<Record> + Send + Sync;

/// A processor defined by a plain transform function value
///
/// This is the inline-processor form: an id plus a function, no trait
/// implementation needed. The struct is its own factory, so it can be
/// handed straight to `register_processor`.
///
/// ```rust
/// use tideway_core::FnProcessor;
///
/// let passthrough = FnProcessor::new("passthrough", |record| record);
/// ```
#[derive(Clone)]
pub struct FnProcessor {
    id: String,
    transform: Arc<TransformFn>,
    input_hint: Option<SchemaHint>,
    output_hint: Option<SchemaHint>,
}

impl FnProcessor {
    /// Create a processor from an infallible transform
    pub fn new(
        id: impl Into<String>,
        transform: impl Fn(Record) -> Record + Send + Sync + 'static,
    ) -> Self {
        Self::fallible(id, move |record| Ok(transform(record)))
    }

    /// Create a processor from a fallible transform
    pub fn fallible(
        id: impl Into<String>,
        transform: impl Fn(Record) -> Result<Record> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            transform: Arc::new(transform),
            input_hint: None,
            output_hint: None,
        }
    }

    /// Declare the input shape
    pub fn with_input_hint(mut self, hint: SchemaHint) -> Self {
        self.input_hint = Some(hint);
        self
    }

    /// Declare the output shape
    pub fn with_output_hint(mut self, hint: SchemaHint) -> Self {
        self.output_hint = Some(hint);
        self
    }
}

impl ProcessorFactory for FnProcessor {
    fn processor_id(&self) -> &str {
        &self.id
    }

    fn create(&self) -> Box<dyn Processor> {
        Box::new(FnProcessorInstance {
            transform: self.transform.clone(),
            input_hint: self.input_hint,
            output_hint: self.output_hint,
        })
    }
}

struct FnProcessorInstance {
    transform: Arc<TransformFn>,
    input_hint: Option<SchemaHint>,
    output_hint: Option<SchemaHint>,
}

#[async_trait]
impl Processor for FnProcessorInstance {
    fn process(&mut self, record: Record) -> Result<Record> {
        (self.transform)(record)
    }

    fn input_hint(&self) -> Option<SchemaHint> {
        self.input_hint
    }

    fn output_hint(&self) -> Option<SchemaHint> {
        self.output_hint
    }
}
