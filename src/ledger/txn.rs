//! Per-operation read set
//!
//! A [`LedgerTxn`] is one logical operation's window onto the ledger. Every
//! `get` remembers the version it saw; a later `put` of the same key is only
//! committed if the key is still at that version. This gives each
//! read-modify-write the same guarantee as an MVCC read-set check: if another
//! writer committed in between, the write fails with a conflict instead of
//! overwriting the other writer's result.

use std::collections::HashMap;

use super::{ExpectedVersion, Ledger, LedgerResult, Version, VersionedValue};

pub struct LedgerTxn<'a> {
    ledger: &'a dyn Ledger,
    reads: HashMap<String, ExpectedVersion>,
}

impl<'a> LedgerTxn<'a> {
    pub fn new(ledger: &'a dyn Ledger) -> Self {
        Self {
            ledger,
            reads: HashMap::new(),
        }
    }

    /// Read `key` and record the observed version.
    pub fn get(&mut self, key: &str) -> LedgerResult<Option<Vec<u8>>> {
        let current = self.ledger.get(key)?;
        let seen = match &current {
            Some(VersionedValue { version, .. }) => ExpectedVersion::Exact(*version),
            None => ExpectedVersion::Absent,
        };
        self.reads.insert(key.to_string(), seen);
        Ok(current.map(|v| v.value))
    }

    /// Write `key`, conditional on the version observed by an earlier `get`.
    /// Keys never read in this operation are written unconditionally.
    pub fn put(&mut self, key: &str, value: Vec<u8>) -> LedgerResult<Version> {
        let expected = self
            .reads
            .get(key)
            .copied()
            .unwrap_or(ExpectedVersion::Any);
        let version = self.ledger.put(key, value, expected)?;
        // Our own write is now the base for any further write in this operation
        self.reads
            .insert(key.to_string(), ExpectedVersion::Exact(version));
        Ok(version)
    }
}
