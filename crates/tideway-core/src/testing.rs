//! Mock strategies for testing pipelines
//!
//! These are deliberately simple in-memory implementations of the strategy
//! contracts, useful for exercising workers, actors, and the scheduler
//! without a real backing medium.

use crate::error::{StrategyError, StrategyResult};
use crate::sink::SinkStrategy;
use crate::source::{AckId, PullResponse, SourceStrategy};
use crate::Record;
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

/// Record of every handle a [`MockSource`] issued and acknowledged
#[derive(Debug, Default)]
pub struct AckLog {
    pub issued: Vec<AckId>,
    pub successful: Vec<AckId>,
    pub failed: Vec<AckId>,
    pub ack_calls: usize,
}

impl AckLog {
    /// True when every issued handle landed in exactly one of the
    /// successful/failed sets.
    pub fn fully_acknowledged(&self) -> bool {
        let mut seen = HashSet::new();
        for id in self.successful.iter().chain(self.failed.iter()) {
            if !seen.insert(*id) {
                return false;
            }
        }
        seen.len() == self.issued.len() && self.issued.iter().all(|id| seen.contains(id))
    }
}

/// A bounded source that serves scripted batches and records every ack
pub struct MockSource {
    batches: VecDeque<Vec<Record>>,
    next_id: u64,
    log: Arc<Mutex<AckLog>>,
}

impl MockSource {
    /// Create a source that serves the given batches in order, then drains
    pub fn new(batches: Vec<Vec<Record>>) -> Self {
        Self {
            batches: batches.into(),
            next_id: 0,
            log: Arc::new(Mutex::new(AckLog::default())),
        }
    }

    /// Handle to the ack log, valid after the source has been moved into
    /// an actor
    pub fn ack_log(&self) -> Arc<Mutex<AckLog>> {
        self.log.clone()
    }
}

#[async_trait]
impl SourceStrategy for MockSource {
    async fn pull(&mut self) -> StrategyResult<PullResponse> {
        let Some(batch) = self.batches.pop_front() else {
            return Ok(PullResponse::empty());
        };
        let mut response = PullResponse::empty();
        let mut log = self.log.lock().unwrap();
        for payload in batch {
            let ack_id = AckId::new(self.next_id);
            self.next_id += 1;
            log.issued.push(ack_id);
            response.push(payload, ack_id);
        }
        Ok(response)
    }

    async fn ack(&mut self, successful: Vec<AckId>, failed: Vec<AckId>) -> StrategyResult<()> {
        let mut log = self.log.lock().unwrap();
        log.ack_calls += 1;
        log.successful.extend(successful);
        log.failed.extend(failed);
        Ok(())
    }
}

/// A sink that captures every pushed batch, optionally failing every push
pub struct MockSink {
    pushes: Arc<Mutex<Vec<Vec<Record>>>>,
    fail_with: Option<String>,
}

impl MockSink {
    /// Create a recording sink
    pub fn new() -> Self {
        Self {
            pushes: Arc::new(Mutex::new(Vec::new())),
            fail_with: None,
        }
    }

    /// Create a sink that fails every push with the given message
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            pushes: Arc::new(Mutex::new(Vec::new())),
            fail_with: Some(message.into()),
        }
    }

    /// Handle to the captured batches, valid after the sink has been moved
    /// into an actor
    pub fn pushes(&self) -> Arc<Mutex<Vec<Vec<Record>>>> {
        self.pushes.clone()
    }
}

impl Default for MockSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SinkStrategy for MockSink {
    async fn push(&mut self, batch: Vec<Record>) -> StrategyResult<()> {
        if let Some(message) = &self.fail_with {
            return Err(StrategyError::fatal(message.clone()));
        }
        self.pushes.lock().unwrap().push(batch);
        Ok(())
    }
}
