//! Bounded dataset source
//!
//! Serves a fixed set of rows - inline in the configuration or loaded from
//! a JSON file - and terminates once drained. Replication shards the rows:
//! `replica_args` splits them into contiguous chunks, one per replica, so
//! no row is delivered twice across the run.

use crate::registry::{parse_config, SourceProvider};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use tideway_core::{
    AckId, PullResponse, Record, SourceStrategy, StrategyError, StrategyResult,
};
use tracing::warn;
use validator::Validate;

pub const KIND: &str = "dataset";

fn default_batch_size() -> usize {
    256
}

/// Configuration for the dataset source
#[derive(Debug, Clone, Serialize, Deserialize, Validate, JsonSchema)]
pub struct DatasetConfig {
    /// Rows served by this source
    #[serde(default)]
    pub rows: Vec<Record>,

    /// Path to a JSON file holding an array of rows; takes precedence over
    /// inline rows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Upper bound on the number of rows one pull returns
    #[serde(default = "default_batch_size")]
    #[validate(range(min = 1))]
    pub batch_size: usize,
}

fn load_rows(config: &DatasetConfig) -> StrategyResult<Vec<Record>> {
    match &config.path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            let rows: Vec<Record> = serde_json::from_str(&raw)?;
            Ok(rows)
        }
        None => Ok(config.rows.clone()),
    }
}

/// Source strategy over a bounded set of rows
pub struct DatasetSource {
    pending: VecDeque<Record>,
    inflight: HashSet<u64>,
    next_id: u64,
    batch_size: usize,
}

impl DatasetSource {
    pub fn new(config: DatasetConfig) -> StrategyResult<Self> {
        let rows = load_rows(&config)?;
        Ok(Self {
            pending: rows.into(),
            inflight: HashSet::new(),
            next_id: 0,
            batch_size: config.batch_size,
        })
    }
}

#[async_trait]
impl SourceStrategy for DatasetSource {
    async fn pull(&mut self) -> StrategyResult<PullResponse> {
        let mut response = PullResponse::empty();
        for _ in 0..self.batch_size {
            let Some(row) = self.pending.pop_front() else {
                break;
            };
            let id = self.next_id;
            self.next_id += 1;
            self.inflight.insert(id);
            response.push(row, AckId::new(id));
        }
        Ok(response)
    }

    async fn ack(&mut self, successful: Vec<AckId>, failed: Vec<AckId>) -> StrategyResult<()> {
        for id in successful.iter().chain(failed.iter()) {
            if !self.inflight.remove(&id.value()) {
                return Err(StrategyError::ack(format!(
                    "unknown or already-acknowledged handle {}",
                    id
                )));
            }
        }
        if !failed.is_empty() {
            // a bounded table has no redelivery; the run is failing anyway
            warn!(handles = failed.len(), "dataset rows failed delivery");
        }
        Ok(())
    }

    fn max_batch_size(&self) -> usize {
        self.batch_size
    }
}

/// Provider for dataset sources; shards rows across replicas
pub struct DatasetSourceProvider;

#[async_trait]
impl SourceProvider for DatasetSourceProvider {
    fn replica_args(
        &self,
        config: &serde_yaml::Value,
        num_replicas: usize,
    ) -> StrategyResult<Vec<serde_yaml::Value>> {
        let config: DatasetConfig = parse_config(config)?;
        let rows = load_rows(&config)?;
        let chunk = rows.len().div_ceil(num_replicas.max(1)).max(1);

        let mut args = Vec::with_capacity(num_replicas);
        for replica in 0..num_replicas {
            let shard: Vec<Record> = rows
                .iter()
                .skip(replica * chunk)
                .take(chunk)
                .cloned()
                .collect();
            let shard_config = DatasetConfig {
                rows: shard,
                path: None,
                batch_size: config.batch_size,
            };
            args.push(serde_yaml::to_value(&shard_config)?);
        }
        Ok(args)
    }

    async fn create(&self, config: &serde_yaml::Value) -> StrategyResult<Box<dyn SourceStrategy>> {
        let config: DatasetConfig = parse_config(config)?;
        Ok(Box::new(DatasetSource::new(config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn config(rows: Vec<Record>) -> DatasetConfig {
        DatasetConfig {
            rows,
            path: None,
            batch_size: default_batch_size(),
        }
    }

    #[tokio::test]
    async fn test_pull_respects_batch_size_and_drains() {
        let mut cfg = config(vec![json!(1), json!(2), json!(3)]);
        cfg.batch_size = 2;
        let mut source = DatasetSource::new(cfg).unwrap();

        let first = source.pull().await.unwrap();
        assert_eq!(first.len(), 2);
        let second = source.pull().await.unwrap();
        assert_eq!(second.len(), 1);
        assert!(source.pull().await.unwrap().is_empty());
        assert!(!source.is_streaming());

        source.ack(first.ack_ids(), vec![]).await.unwrap();
        source.ack(second.ack_ids(), vec![]).await.unwrap();
    }

    #[tokio::test]
    async fn test_ack_validates_handles() {
        let mut source = DatasetSource::new(config(vec![json!(1)])).unwrap();
        let response = source.pull().await.unwrap();
        let ids = response.ack_ids();

        let err = source.ack(vec![AckId::new(99)], vec![]).await.unwrap_err();
        assert!(matches!(err, StrategyError::Ack(_)));

        source.ack(ids.clone(), vec![]).await.unwrap();
        let err = source.ack(ids, vec![]).await.unwrap_err();
        assert!(matches!(err, StrategyError::Ack(_)));
    }

    #[test]
    fn test_replica_args_shard_without_loss() {
        let provider = DatasetSourceProvider;
        let base = serde_yaml::to_value(config(vec![json!("a"), json!("b"), json!("c")])).unwrap();

        let args = provider.replica_args(&base, 2).unwrap();
        assert_eq!(args.len(), 2);

        let shards: Vec<DatasetConfig> = args
            .iter()
            .map(|arg| parse_config(arg).unwrap())
            .collect();
        assert_eq!(shards[0].rows, vec![json!("a"), json!("b")]);
        assert_eq!(shards[1].rows, vec![json!("c")]);
    }

    #[test]
    fn test_replica_args_with_more_replicas_than_rows() {
        let provider = DatasetSourceProvider;
        let base = serde_yaml::to_value(config(vec![json!("only")])).unwrap();

        let args = provider.replica_args(&base, 3).unwrap();
        assert_eq!(args.len(), 3);
        let total: usize = args
            .iter()
            .map(|arg| parse_config::<DatasetConfig>(arg).unwrap().rows.len())
            .sum();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn test_rows_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"id": 1}}, {{"id": 2}}]"#).unwrap();

        let cfg = DatasetConfig {
            rows: vec![],
            path: Some(file.path().to_string_lossy().into_owned()),
            batch_size: default_batch_size(),
        };
        let mut source = DatasetSource::new(cfg).unwrap();
        let response = source.pull().await.unwrap();
        assert_eq!(response.len(), 2);
    }
}
