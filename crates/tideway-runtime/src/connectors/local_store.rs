//! Local single-writer store sink
//!
//! An embedded store laid out as a directory of JSONL tables guarded by an
//! exclusive lock file: only one writer may hold the store at a time, so
//! concurrent replicas contend for the write handle exactly like they
//! would against an embedded database file.
//!
//! Two failure classes are handled locally, both over typed error tags:
//! - `Locked` is retried on a fixed delay up to a fixed attempt cap;
//!   exhausting the cap raises `ConnectionExhausted` naming the likely
//!   cause instead of the raw lock error.
//! - `MissingTable` falls back, at most once per push, to creating the
//!   table from the batch's own schema.
//!
//! Everything else propagates immediately.

use crate::registry::{parse_config, SinkProvider};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tideway_core::{Record, SinkStrategy, StrategyError, StrategyResult};
use tracing::{info, warn};
use validator::Validate;

pub const KIND: &str = "local-store";

/// Typed store failures; the retry policy branches on these tags
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another writer holds the store
    #[error("store locked: {0}")]
    Locked(String),

    /// The target table does not exist yet
    #[error("table '{0}' does not exist")]
    MissingTable(String),

    /// A row could not be serialized
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Underlying IO failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Only lock contention is worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Locked(_))
    }
}

impl From<StoreError> for StrategyError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Locked(msg) => StrategyError::Connection(msg),
            StoreError::MissingTable(table) => {
                StrategyError::NotFound(format!("table '{}'", table))
            }
            StoreError::Serialization(msg) => StrategyError::Serialization(msg),
            StoreError::Io(e) => StrategyError::Io(e),
        }
    }
}

/// Bounded fixed-delay retry discipline for acquiring the write handle
#[derive(Debug, Clone)]
pub struct LockRetryPolicy {
    /// Total open attempts before giving up
    pub max_attempts: u32,
    /// Fixed wait between attempts
    pub delay: Duration,
}

impl Default for LockRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            delay: Duration::from_secs(2),
        }
    }
}

/// A store that can hand out exclusive write handles
pub trait StoreBackend: Send + Sync {
    fn open_writer(&self) -> Result<Box<dyn StoreWriter>, StoreError>;
}

/// An exclusive write handle; dropping it releases the store
pub trait StoreWriter: Send {
    /// Append rows to an existing table
    fn append(&mut self, table: &str, batch: &[Record]) -> Result<(), StoreError>;

    /// Create a table from the batch's own schema and write the batch
    fn create_table(&mut self, table: &str, batch: &[Record]) -> Result<(), StoreError>;
}

impl std::fmt::Debug for dyn StoreWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StoreWriter")
    }
}

/// Acquire a write handle, retrying lock contention on a fixed delay
pub async fn open_writer_with_retry(
    backend: &dyn StoreBackend,
    policy: &LockRetryPolicy,
) -> StrategyResult<Box<dyn StoreWriter>> {
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match backend.open_writer() {
            Ok(writer) => return Ok(writer),
            Err(e) if e.is_retryable() => {
                if attempts >= policy.max_attempts {
                    return Err(StrategyError::ConnectionExhausted(format!(
                        "could not acquire a write handle after {} attempts; \
                         did a connection stay open elsewhere? (last error: {})",
                        attempts, e
                    )));
                }
                warn!(
                    attempts,
                    delay_secs = policy.delay.as_secs(),
                    "store locked by a concurrent writer, waiting before retry"
                );
                tokio::time::sleep(policy.delay).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Filesystem store: one directory, `<table>.jsonl` per table, an
/// exclusive `.write.lock` file as the single-writer gate
pub struct FsStore {
    dir: PathBuf,
}

impl FsStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl StoreBackend for FsStore {
    fn open_writer(&self) -> Result<Box<dyn StoreWriter>, StoreError> {
        fs::create_dir_all(&self.dir)?;
        let lock_path = self.dir.join(".write.lock");
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(_) => Ok(Box::new(FsWriter {
                dir: self.dir.clone(),
                lock_path,
            })),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(StoreError::Locked(format!(
                "write lock held at {}",
                lock_path.display()
            ))),
            Err(e) => Err(e.into()),
        }
    }
}

struct FsWriter {
    dir: PathBuf,
    lock_path: PathBuf,
}

impl Drop for FsWriter {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}

impl FsWriter {
    fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{table}.jsonl"))
    }

    fn write_rows(file: &mut fs::File, batch: &[Record]) -> Result<(), StoreError> {
        for row in batch {
            let line = serde_json::to_string(row)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            writeln!(file, "{line}")?;
        }
        Ok(())
    }
}

impl StoreWriter for FsWriter {
    fn append(&mut self, table: &str, batch: &[Record]) -> Result<(), StoreError> {
        let path = self.table_path(table);
        if !path.exists() {
            return Err(StoreError::MissingTable(table.to_string()));
        }
        let mut file = OpenOptions::new().append(true).open(&path)?;
        Self::write_rows(&mut file, batch)
    }

    fn create_table(&mut self, table: &str, batch: &[Record]) -> Result<(), StoreError> {
        // schema sidecar from the first row's shape
        let fields: Vec<String> = batch
            .first()
            .and_then(|row| row.as_object())
            .map(|object| object.keys().cloned().collect())
            .unwrap_or_default();
        let schema = serde_json::to_string(&serde_json::json!({ "fields": fields }))
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        fs::write(self.dir.join(format!("{table}.schema.json")), schema)?;

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.table_path(table))?;
        Self::write_rows(&mut file, batch)
    }
}

fn default_path() -> String {
    "tideway-store".to_string()
}

/// Configuration for the local store sink
#[derive(Debug, Clone, Serialize, Deserialize, Validate, JsonSchema)]
pub struct LocalStoreConfig {
    /// Directory holding the store
    #[serde(default = "default_path")]
    pub path: String,

    /// Table appended to on push
    #[validate(length(min = 1))]
    pub table: String,
}

/// Sink strategy writing batches into a single-writer local store
pub struct LocalStoreSink {
    backend: Box<dyn StoreBackend>,
    table: String,
    policy: LockRetryPolicy,
}

impl LocalStoreSink {
    pub fn new(backend: Box<dyn StoreBackend>, table: impl Into<String>) -> Self {
        Self {
            backend,
            table: table.into(),
            policy: LockRetryPolicy::default(),
        }
    }

    /// Override the lock retry discipline
    pub fn with_policy(mut self, policy: LockRetryPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[async_trait]
impl SinkStrategy for LocalStoreSink {
    async fn push(&mut self, batch: Vec<Record>) -> StrategyResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut writer = open_writer_with_retry(self.backend.as_ref(), &self.policy).await?;
        match writer.append(&self.table, &batch) {
            Err(StoreError::MissingTable(_)) => {
                // one-shot fallback per push, never looped
                info!(table = %self.table, "table missing, creating it from the batch schema");
                writer
                    .create_table(&self.table, &batch)
                    .map_err(StrategyError::from)
            }
            other => other.map_err(StrategyError::from),
        }
    }
}

/// Provider for local store sinks
pub struct LocalStoreSinkProvider;

#[async_trait]
impl SinkProvider for LocalStoreSinkProvider {
    async fn create(&self, config: &serde_yaml::Value) -> StrategyResult<Box<dyn SinkStrategy>> {
        let config: LocalStoreConfig = parse_config(config)?;
        Ok(Box::new(LocalStoreSink::new(
            Box::new(FsStore::new(config.path)),
            config.table,
        )))
    }
}
