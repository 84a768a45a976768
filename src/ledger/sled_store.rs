//! Persistent ledger backed by sled
//!
//! Layout:
//!
//! ```text
//! ledger.sled/
//! ├── state     key -> msgpack { version, value }   (value = None after delete)
//! └── history   key 0x00 version(be) -> msgpack KeyModification
//! ```
//!
//! Each write is one sled transaction over both trees: the version check,
//! the new envelope and its history record commit together or not at all.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionResult};
use sled::{Db, IVec, Transactional, Tree};
use tracing::{debug, info, warn};

use super::{
    ExpectedVersion, KeyModification, Ledger, LedgerError, LedgerResult, QueryRecord, Selector,
    Version, VersionedValue,
};

#[derive(Debug, Serialize, Deserialize)]
struct StateEnvelope {
    version: Version,
    value: Option<Vec<u8>>,
}

impl StateEnvelope {
    fn live_version(&self) -> Option<Version> {
        self.value.as_ref().map(|_| self.version)
    }
}

fn encode<T: Serialize>(value: &T) -> LedgerResult<Vec<u8>> {
    rmp_serde::to_vec(value).map_err(|e| LedgerError::Encoding(e.to_string()))
}

fn decode_state(bytes: &IVec) -> LedgerResult<StateEnvelope> {
    rmp_serde::from_slice(bytes).map_err(|e| LedgerError::Encoding(e.to_string()))
}

fn history_prefix(key: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(key.len() + 1);
    prefix.extend_from_slice(key.as_bytes());
    prefix.push(0);
    prefix
}

fn history_key(key: &str, version: Version) -> Vec<u8> {
    let mut k = history_prefix(key);
    k.extend_from_slice(&version.to_be_bytes());
    k
}

/// Ledger persisted in a sled database.
pub struct SledLedger {
    db: Db,
    state: Tree,
    history: Tree,
}

impl SledLedger {
    /// Open or create the ledger at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> LedgerResult<Self> {
        let db = sled::open(path.as_ref())?;
        info!(path = %path.as_ref().display(), "Opened ledger database");
        Self::from_db(db)
    }

    /// Open a throwaway ledger that is removed on drop (for testing)
    pub fn temporary() -> LedgerResult<Self> {
        debug!("Opening temporary ledger database");
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> LedgerResult<Self> {
        let state = db.open_tree("state")?;
        let history = db.open_tree("history")?;
        Ok(Self { db, state, history })
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> LedgerResult<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Check `expected` and write the new state together with its history
    /// record in one transaction over both trees.
    fn commit(
        &self,
        key: &str,
        expected: ExpectedVersion,
        modification: KeyModification,
    ) -> LedgerResult<Option<Version>> {
        // History comes first in the tuple so its record lands before the
        // state a reader would pair it with
        let result: TransactionResult<Option<Version>, LedgerError> =
            (&self.history, &self.state).transaction(|(history, state)| {
                let current = match state.get(key)? {
                    Some(bytes) => Some(decode_state(&bytes).map_err(ConflictableTransactionError::Abort)?),
                    None => None,
                };
                let live = current.as_ref().and_then(StateEnvelope::live_version);
                expected
                    .check(key, live)
                    .map_err(ConflictableTransactionError::Abort)?;

                if modification.is_delete && live.is_none() {
                    return Ok(None);
                }

                let next = StateEnvelope {
                    version: current.as_ref().map(|c| c.version).unwrap_or(0) + 1,
                    value: modification.value.clone(),
                };
                let record = encode(&modification).map_err(ConflictableTransactionError::Abort)?;
                let envelope = encode(&next).map_err(ConflictableTransactionError::Abort)?;

                history.insert(history_key(key, next.version), record)?;
                state.insert(key, envelope)?;
                Ok(Some(next.version))
            });

        match result {
            Ok(version) => Ok(version),
            Err(TransactionError::Abort(e)) => {
                debug!(key = %key, error = %e, "Ledger write aborted");
                Err(e)
            }
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }
}

impl Ledger for SledLedger {
    fn get(&self, key: &str) -> LedgerResult<Option<VersionedValue>> {
        let Some(bytes) = self.state.get(key)? else {
            return Ok(None);
        };
        let envelope = decode_state(&bytes)?;
        Ok(envelope.value.map(|value| VersionedValue {
            version: envelope.version,
            value,
        }))
    }

    fn put(&self, key: &str, value: Vec<u8>, expected: ExpectedVersion) -> LedgerResult<Version> {
        let version = self.commit(key, expected, KeyModification::write(value))?;
        version.ok_or_else(|| LedgerError::Encoding(format!("write to {} produced no version", key)))
    }

    fn delete(&self, key: &str, expected: ExpectedVersion) -> LedgerResult<()> {
        self.commit(key, expected, KeyModification::delete())?;
        Ok(())
    }

    fn rich_query(&self, selector: &Selector) -> LedgerResult<Vec<QueryRecord>> {
        let mut rows = Vec::new();
        for item in self.state.iter() {
            let (key, bytes) = item?;
            let Ok(key) = String::from_utf8(key.to_vec()) else {
                continue;
            };
            let envelope = match decode_state(&bytes) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping undecodable ledger entry");
                    continue;
                }
            };
            let Some(value) = envelope.value else {
                continue;
            };
            if let Some(doc) = selector.matches_bytes(&value) {
                rows.push((key, doc, value));
            }
        }
        selector.order(&mut rows);
        Ok(rows
            .into_iter()
            .map(|(key, _, value)| QueryRecord { key, value })
            .collect())
    }

    fn history_of(&self, key: &str) -> LedgerResult<Vec<KeyModification>> {
        let mut out = Vec::new();
        for item in self.history.scan_prefix(history_prefix(key)) {
            let (_, bytes) = item?;
            let modification: KeyModification = rmp_serde::from_slice(&bytes)
                .map_err(|e| LedgerError::Encoding(e.to_string()))?;
            out.push(modification);
        }
        Ok(out)
    }
}
