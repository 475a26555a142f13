//! Converter boundary between wire payloads and processor records
//!
//! Strategies select a converter per processor at setup time: the source's
//! `pull_converter` decodes each pulled payload before the transform runs,
//! and the sink's `push_converter` encodes each transform output before it
//! is pushed. With no declared hint both sides are the identity.

use crate::error::{StrategyError, StrategyResult};
use crate::Record;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A record conversion function bound per processor
pub type Converter = Arc<dyn Fn(Record) -> StrategyResult<Record> + Send + Sync>;

/// Declared payload shape used to select a converter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaHint {
    /// Structured JSON carried as text on the wire
    Json,
    /// Plain text, passed through unchanged
    Text,
}

/// The identity converter
pub fn identity() -> Converter {
    Arc::new(|record| Ok(record))
}

/// Decode a text record into its structured JSON value
pub fn json_decode() -> Converter {
    Arc::new(|record| match record {
        Record::String(text) => {
            serde_json::from_str(&text).map_err(|e| StrategyError::Serialization(e.to_string()))
        }
        other => Err(StrategyError::Serialization(format!(
            "expected a text record to decode, got: {}",
            other
        ))),
    })
}

/// Encode a structured JSON value into a compact text record
pub fn json_encode() -> Converter {
    Arc::new(|record| {
        let text =
            serde_json::to_string(&record).map_err(|e| StrategyError::Serialization(e.to_string()))?;
        Ok(Record::String(text))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identity_passes_through() {
        let convert = identity();
        let record = json!({"id": 1});
        assert_eq!(convert(record.clone()).unwrap(), record);
    }

    #[test]
    fn test_json_roundtrip() {
        let record = json!({"id": 1, "name": "alice"});
        let encoded = json_encode()(record.clone()).unwrap();
        assert!(encoded.is_string());
        let decoded = json_decode()(encoded).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_json_decode_rejects_non_text() {
        let err = json_decode()(json!({"already": "structured"})).unwrap_err();
        assert!(matches!(err, StrategyError::Serialization(_)));
    }

    #[test]
    fn test_json_decode_rejects_invalid_json() {
        let err = json_decode()(Record::String("{not json".to_string())).unwrap_err();
        assert!(matches!(err, StrategyError::Serialization(_)));
    }
}
