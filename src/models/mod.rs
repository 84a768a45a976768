//! Ledger documents
//!
//! Every entity is stored as a flat JSON object keyed by its `id`, with a
//! `type` field naming the entity kind. Rich queries filter on that field.

pub mod alert;
pub mod batch;
pub mod harvest_limit;
pub mod season_window;
pub mod timestamp;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{ComplianceError, Result};
use crate::ledger::LedgerError;

pub use alert::{Alert, AlertStatistics, AlertStatus, AlertType, NewAlert, Severity};
pub use batch::{Batch, BatchHistory, BatchStatus, HistoryEntry, NewBatch};
pub use harvest_limit::{limit_key, season_key_for, HarvestLimit, LimitStatus, NewHarvestLimit};
pub use season_window::{SeasonWindow, SeasonWindowInput};

/// A typed entity that round-trips through the ledger's byte format.
pub trait Document: Serialize + DeserializeOwned {
    /// Value of the `type` discriminator
    const DOC_TYPE: &'static str;

    fn id(&self) -> &str;

    /// Encode as a JSON object carrying the `type` discriminator.
    fn encode(&self) -> Result<Vec<u8>> {
        let mut value = serde_json::to_value(self).map_err(encoding_error)?;
        match value.as_object_mut() {
            Some(obj) => {
                obj.insert("type".to_string(), Value::from(Self::DOC_TYPE));
            }
            None => {
                return Err(encoding_error(format!(
                    "{} did not serialize to an object",
                    Self::DOC_TYPE
                )))
            }
        }
        serde_json::to_vec(&value).map_err(encoding_error)
    }

    /// Decode stored bytes, rejecting documents of another type.
    fn decode(key: &str, bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes).map_err(|e| decode_error(key, e))?;
        let doc_type = value.get("type").and_then(Value::as_str);
        if doc_type != Some(Self::DOC_TYPE) {
            return Err(decode_error(
                key,
                format!(
                    "expected type {}, found {}",
                    Self::DOC_TYPE,
                    doc_type.unwrap_or("none")
                ),
            ));
        }
        serde_json::from_value(value).map_err(|e| decode_error(key, e))
    }
}

fn encoding_error(e: impl std::fmt::Display) -> ComplianceError {
    ComplianceError::Ledger(LedgerError::Encoding(e.to_string()))
}

fn decode_error(key: &str, e: impl std::fmt::Display) -> ComplianceError {
    ComplianceError::Decode {
        key: key.to_string(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_adds_type_discriminator() {
        let batch = Batch::new(
            NewBatch {
                id: "BATCH-1".into(),
                species: "Ashwagandha".into(),
                total_quantity: 12.5,
                unit: "kg".into(),
                collection_event_ids: None,
                created_by: "farmer-1".into(),
            },
            timestamp::now(),
        );
        let bytes = batch.encode().unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["type"], "Batch");
        assert_eq!(value["id"], "BATCH-1");
        assert_eq!(value["totalQuantity"], 12.5);
        assert_eq!(value["collectionEventIds"], serde_json::json!([]));
        assert!(value.get("assignedProcessor").is_none());

        let decoded = Batch::decode("BATCH-1", &bytes).unwrap();
        assert_eq!(decoded, batch);
    }

    #[test]
    fn test_decode_rejects_wrong_type() {
        let err = Batch::decode("a1", br#"{"type":"Alert","id":"a1"}"#).unwrap_err();
        assert!(matches!(err, ComplianceError::Decode { ref key, .. } if key == "a1"));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = Batch::decode("b1", b"\xff\xfe").unwrap_err();
        assert!(matches!(err, ComplianceError::Decode { .. }));
    }

    #[test]
    fn test_decode_rejects_missing_fields() {
        let err = Batch::decode("b1", br#"{"type":"Batch","id":"b1"}"#).unwrap_err();
        assert!(matches!(err, ComplianceError::Decode { .. }));
    }
}
