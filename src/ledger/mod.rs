//! Ledger access port
//!
//! The compliance engine never talks to a storage engine directly. Every
//! read and write goes through the [`Ledger`] trait, which models a versioned
//! key-value ledger with:
//!
//! - conditional writes (optimistic concurrency on a per-key version)
//! - rich queries over JSON documents tagged by a `type` field
//! - per-key version history
//!
//! ## Implementations
//!
//! - [`MemoryLedger`] - DashMap-backed, used by tests and embedded callers
//! - [`SledLedger`] - persistent, used by the CLI
//!
//! Ordering of commits across callers is the ledger's concern. A write whose
//! [`ExpectedVersion`] no longer matches fails with [`LedgerError::Conflict`].

pub mod memory;
pub mod query;
pub mod sled_store;
pub mod txn;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::MemoryLedger;
pub use query::{Predicate, Selector, Sort};
pub use sled_store::SledLedger;
pub use txn::LedgerTxn;

/// Per-key version token. Starts at 1 for the first write.
pub type Version = u64;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Version conflict on {key}: expected {expected}, found {actual}")]
    Conflict {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("Storage error: {0}")]
    Sled(#[from] sled::Error),

    #[error("Encoding error: {0}")]
    Encoding(String),
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Condition a write places on the key's current version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Unconditional write
    Any,
    /// Key must have no live value
    Absent,
    /// Key must be at exactly this version
    Exact(Version),
}

impl ExpectedVersion {
    /// Check the condition against the key's current live version.
    pub fn check(self, key: &str, current: Option<Version>) -> LedgerResult<()> {
        let ok = match (self, current) {
            (ExpectedVersion::Any, _) => true,
            (ExpectedVersion::Absent, None) => true,
            (ExpectedVersion::Exact(want), Some(have)) => want == have,
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(LedgerError::Conflict {
                key: key.to_string(),
                expected: self.to_string(),
                actual: match current {
                    Some(v) => format!("version {}", v),
                    None => "absent".to_string(),
                },
            })
        }
    }
}

impl std::fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExpectedVersion::Any => write!(f, "any"),
            ExpectedVersion::Absent => write!(f, "absent"),
            ExpectedVersion::Exact(v) => write!(f, "version {}", v),
        }
    }
}

/// A live value together with the version that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedValue {
    pub version: Version,
    pub value: Vec<u8>,
}

/// One row of a rich query result.
#[derive(Debug, Clone)]
pub struct QueryRecord {
    pub key: String,
    pub value: Vec<u8>,
}

/// One committed modification of a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyModification {
    pub tx_id: String,
    pub timestamp: DateTime<Utc>,
    pub is_delete: bool,
    /// Bytes written; `None` for deletes
    pub value: Option<Vec<u8>>,
}

impl KeyModification {
    pub(crate) fn write(value: Vec<u8>) -> Self {
        Self {
            tx_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            is_delete: false,
            value: Some(value),
        }
    }

    pub(crate) fn delete() -> Self {
        Self {
            tx_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            is_delete: true,
            value: None,
        }
    }
}

/// Versioned key-value ledger.
pub trait Ledger: Send + Sync {
    /// Current live value of `key`, if any.
    fn get(&self, key: &str) -> LedgerResult<Option<VersionedValue>>;

    /// Write `value` if `expected` holds. Returns the new version.
    fn put(&self, key: &str, value: Vec<u8>, expected: ExpectedVersion) -> LedgerResult<Version>;

    /// Tombstone `key` if `expected` holds. History is kept.
    fn delete(&self, key: &str, expected: ExpectedVersion) -> LedgerResult<()>;

    /// Live documents matching `selector`, ordered by its sort (key order otherwise).
    fn rich_query(&self, selector: &Selector) -> LedgerResult<Vec<QueryRecord>>;

    /// All committed modifications of `key`, oldest first.
    fn history_of(&self, key: &str) -> LedgerResult<Vec<KeyModification>>;
}
