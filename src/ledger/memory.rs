//! In-memory ledger
//!
//! Each key's state lives in a DashMap shard entry, so the version check and
//! the write in [`Ledger::put`] happen under the same shard lock. Writers on
//! different keys never block each other.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::trace;

use super::{
    ExpectedVersion, KeyModification, Ledger, LedgerResult, QueryRecord, Selector, Version,
    VersionedValue,
};

#[derive(Debug, Default)]
struct KeyRecord {
    /// Last committed version, including deletes
    version: Version,
    value: Option<Vec<u8>>,
    history: Vec<KeyModification>,
}

impl KeyRecord {
    fn live_version(&self) -> Option<Version> {
        self.value.as_ref().map(|_| self.version)
    }

    fn commit(&mut self, modification: KeyModification) -> Version {
        self.version += 1;
        self.value = modification.value.clone();
        self.history.push(modification);
        self.version
    }
}

/// Ledger held entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    entries: DashMap<String, KeyRecord>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with a live value
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.value.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Ledger for MemoryLedger {
    fn get(&self, key: &str) -> LedgerResult<Option<VersionedValue>> {
        Ok(self.entries.get(key).and_then(|record| {
            record.value.as_ref().map(|value| VersionedValue {
                version: record.version,
                value: value.clone(),
            })
        }))
    }

    fn put(&self, key: &str, value: Vec<u8>, expected: ExpectedVersion) -> LedgerResult<Version> {
        let version = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                expected.check(key, record.live_version())?;
                record.commit(KeyModification::write(value))
            }
            Entry::Vacant(vacant) => {
                expected.check(key, None)?;
                let mut record = KeyRecord::default();
                let version = record.commit(KeyModification::write(value));
                vacant.insert(record);
                version
            }
        };
        trace!(key = %key, version, "Committed write");
        Ok(version)
    }

    fn delete(&self, key: &str, expected: ExpectedVersion) -> LedgerResult<()> {
        match self.entries.get_mut(key) {
            Some(mut record) => {
                let live = record.live_version();
                expected.check(key, live)?;
                if live.is_some() {
                    record.commit(KeyModification::delete());
                }
            }
            None => expected.check(key, None)?,
        }
        Ok(())
    }

    fn rich_query(&self, selector: &Selector) -> LedgerResult<Vec<QueryRecord>> {
        let mut rows = Vec::new();
        for entry in self.entries.iter() {
            if let Some(value) = &entry.value {
                if let Some(doc) = selector.matches_bytes(value) {
                    rows.push((entry.key().clone(), doc, value.clone()));
                }
            }
        }
        selector.order(&mut rows);
        Ok(rows
            .into_iter()
            .map(|(key, _, value)| QueryRecord { key, value })
            .collect())
    }

    fn history_of(&self, key: &str) -> LedgerResult<Vec<KeyModification>> {
        Ok(self
            .entries
            .get(key)
            .map(|record| record.history.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerError;
    use serde_json::json;

    fn doc(v: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&v).unwrap()
    }

    #[test]
    fn test_put_get_versions() {
        let ledger = MemoryLedger::new();
        assert!(ledger.get("k").unwrap().is_none());

        let v1 = ledger.put("k", b"one".to_vec(), ExpectedVersion::Absent).unwrap();
        assert_eq!(v1, 1);
        let v2 = ledger.put("k", b"two".to_vec(), ExpectedVersion::Exact(1)).unwrap();
        assert_eq!(v2, 2);

        let current = ledger.get("k").unwrap().unwrap();
        assert_eq!(current.version, 2);
        assert_eq!(current.value, b"two");
    }

    #[test]
    fn test_stale_write_conflicts() {
        let ledger = MemoryLedger::new();
        ledger.put("k", b"one".to_vec(), ExpectedVersion::Absent).unwrap();
        ledger.put("k", b"two".to_vec(), ExpectedVersion::Exact(1)).unwrap();

        let err = ledger
            .put("k", b"stale".to_vec(), ExpectedVersion::Exact(1))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Conflict { .. }));
        assert_eq!(ledger.get("k").unwrap().unwrap().value, b"two");
    }

    #[test]
    fn test_absent_on_existing_conflicts() {
        let ledger = MemoryLedger::new();
        ledger.put("k", b"one".to_vec(), ExpectedVersion::Absent).unwrap();
        assert!(ledger.put("k", b"dup".to_vec(), ExpectedVersion::Absent).is_err());
    }

    #[test]
    fn test_exact_on_missing_key_does_not_create() {
        let ledger = MemoryLedger::new();
        assert!(ledger.put("k", b"x".to_vec(), ExpectedVersion::Exact(1)).is_err());
        assert!(ledger.is_empty());
        assert!(ledger.history_of("k").unwrap().is_empty());
    }

    #[test]
    fn test_delete_keeps_history() {
        let ledger = MemoryLedger::new();
        ledger.put("k", b"one".to_vec(), ExpectedVersion::Absent).unwrap();
        ledger.delete("k", ExpectedVersion::Exact(1)).unwrap();
        assert!(ledger.get("k").unwrap().is_none());

        let history = ledger.history_of("k").unwrap();
        assert_eq!(history.len(), 2);
        assert!(!history[0].is_delete);
        assert!(history[1].is_delete);
        assert!(history[1].value.is_none());

        // Recreate after delete
        let v = ledger.put("k", b"again".to_vec(), ExpectedVersion::Absent).unwrap();
        assert_eq!(v, 3);
    }

    #[test]
    fn test_rich_query_filters_and_sorts() {
        let ledger = MemoryLedger::new();
        ledger
            .put("a1", doc(json!({"type": "Alert", "severity": "low", "timestamp": "2025-01-01"})), ExpectedVersion::Any)
            .unwrap();
        ledger
            .put("a2", doc(json!({"type": "Alert", "severity": "high", "timestamp": "2025-02-01"})), ExpectedVersion::Any)
            .unwrap();
        ledger
            .put("b1", doc(json!({"type": "Batch", "severity": "low"})), ExpectedVersion::Any)
            .unwrap();
        ledger.put("junk", b"not json".to_vec(), ExpectedVersion::Any).unwrap();

        let all = ledger
            .rich_query(&Selector::doc_type("Alert").sort_desc("timestamp"))
            .unwrap();
        let keys: Vec<&str> = all.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["a2", "a1"]);

        let low = ledger
            .rich_query(&Selector::doc_type("Alert").eq("severity", "low"))
            .unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].key, "a1");
    }

    #[test]
    fn test_concurrent_cas_increments_are_exact() {
        use std::sync::Arc;

        let ledger = Arc::new(MemoryLedger::new());
        ledger.put("counter", b"0".to_vec(), ExpectedVersion::Absent).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        loop {
                            let current = ledger.get("counter").unwrap().unwrap();
                            let n: u64 = String::from_utf8(current.value).unwrap().parse().unwrap();
                            let next = (n + 1).to_string().into_bytes();
                            match ledger.put("counter", next, ExpectedVersion::Exact(current.version)) {
                                Ok(_) => break,
                                Err(LedgerError::Conflict { .. }) => continue,
                                Err(e) => panic!("unexpected error: {}", e),
                            }
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let final_value = ledger.get("counter").unwrap().unwrap();
        assert_eq!(final_value.value, b"400");
        assert_eq!(final_value.version, 401);
    }
}
