//! Batch: harvested material aggregated for processing

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{timestamp, Document};
use crate::error::ComplianceError;
use crate::ledger::KeyModification;

/// Batch processing stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Collected,
    Assigned,
    Testing,
    Processing,
    Manufactured,
}

impl BatchStatus {
    pub const ALL: [BatchStatus; 5] = [
        BatchStatus::Collected,
        BatchStatus::Assigned,
        BatchStatus::Testing,
        BatchStatus::Processing,
        BatchStatus::Manufactured,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Collected => "collected",
            BatchStatus::Assigned => "assigned",
            BatchStatus::Testing => "testing",
            BatchStatus::Processing => "processing",
            BatchStatus::Manufactured => "manufactured",
        }
    }

    /// Forward transitions accepted when strict ordering is enabled.
    pub fn can_transition_to(&self, next: BatchStatus) -> bool {
        use BatchStatus::*;
        matches!(
            (self, next),
            (Collected, Assigned)
                | (Assigned, Testing)
                | (Assigned, Processing)
                | (Testing, Processing)
                | (Processing, Manufactured)
        )
    }
}

impl FromStr for BatchStatus {
    type Err = ComplianceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BatchStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ComplianceError::InvalidStatus(s.to_string()))
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Harvester submission for a new batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewBatch {
    pub id: String,
    pub species: String,
    pub total_quantity: f64,
    pub unit: String,
    pub collection_event_ids: Option<Vec<String>>,
    /// Farmer ID
    pub created_by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: String,
    pub species: String,
    pub total_quantity: f64,
    pub unit: String,
    #[serde(default)]
    pub collection_event_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_processor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor_name: Option<String>,
    pub status: BatchStatus,
    #[serde(with = "timestamp")]
    pub created_date: DateTime<Utc>,
    pub created_by: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "timestamp::option"
    )]
    pub assigned_date: Option<DateTime<Utc>>,
    /// Admin ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_by: Option<String>,
    /// Last modification
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl Batch {
    /// Build a freshly collected batch from a validated submission.
    pub fn new(input: NewBatch, now: DateTime<Utc>) -> Self {
        Self {
            id: input.id,
            species: input.species,
            total_quantity: input.total_quantity,
            unit: input.unit,
            collection_event_ids: input.collection_event_ids.unwrap_or_default(),
            assigned_processor: None,
            processor_name: None,
            status: BatchStatus::Collected,
            created_date: now,
            created_by: input.created_by,
            assigned_date: None,
            assigned_by: None,
            timestamp: now,
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.assigned_processor.is_some()
    }
}

impl Document for Batch {
    const DOC_TYPE: &'static str = "Batch";

    fn id(&self) -> &str {
        &self.id
    }
}

/// One committed version of a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub tx_id: String,
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    pub is_delete: bool,
    /// Snapshot at this version; absent for deletes
    pub data: Option<Batch>,
}

/// Full version timeline of a batch.
///
/// Holds the raw modifications and decodes them on each call to
/// [`entries`](Self::entries), so the sequence can be walked any number of
/// times and is never mutated while being read.
#[derive(Debug, Clone)]
pub struct BatchHistory {
    pub batch_id: String,
    /// Current state
    pub batch: Batch,
    modifications: Vec<KeyModification>,
}

impl BatchHistory {
    pub(crate) fn new(batch: Batch, modifications: Vec<KeyModification>) -> Self {
        Self {
            batch_id: batch.id.clone(),
            batch,
            modifications,
        }
    }

    /// Entries oldest to newest. Versions that no longer decode as a batch are skipped.
    pub fn entries(&self) -> impl Iterator<Item = HistoryEntry> + '_ {
        self.modifications.iter().filter_map(move |m| {
            let data = match (&m.value, m.is_delete) {
                (_, true) | (None, _) => None,
                (Some(bytes), false) => Some(Batch::decode(&self.batch_id, bytes).ok()?),
            };
            Some(HistoryEntry {
                tx_id: m.tx_id.clone(),
                timestamp: m.timestamp,
                is_delete: m.is_delete,
                data,
            })
        })
    }

    pub fn event_count(&self) -> usize {
        self.entries().count()
    }
}

impl Serialize for BatchHistory {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let history: Vec<HistoryEntry> = self.entries().collect();
        let mut s = serializer.serialize_struct("BatchHistory", 4)?;
        s.serialize_field("batchId", &self.batch_id)?;
        s.serialize_field("batch", &self.batch)?;
        s.serialize_field("eventCount", &history.len())?;
        s.serialize_field("history", &history)?;
        s.end()
    }
}
