//! Entity store - typed documents over the ledger port
//!
//! Encodes and decodes the four entity kinds, enforces id uniqueness on
//! create, and scopes read-modify-write operations in a [`StoreTxn`] so that
//! a write based on a stale read fails with a conflict.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{ComplianceError, Result};
use crate::ledger::{ExpectedVersion, KeyModification, Ledger, LedgerError, LedgerTxn, Selector};
use crate::models::Document;

/// Typed access to ledger documents.
pub struct EntityStore {
    ledger: Arc<dyn Ledger>,
}

impl EntityStore {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    /// Start one logical read-modify-write operation.
    pub fn begin(&self) -> StoreTxn<'_> {
        StoreTxn {
            txn: LedgerTxn::new(self.ledger.as_ref()),
        }
    }

    pub fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.ledger.get(id)?.is_some())
    }

    /// Insert a new document. Fails with `AlreadyExists` if the id is taken,
    /// including when a concurrent create of the same id committed first.
    pub fn create<D: Document>(&self, doc: &D) -> Result<()> {
        let bytes = doc.encode()?;
        match self.ledger.put(doc.id(), bytes, ExpectedVersion::Absent) {
            Ok(version) => {
                debug!(kind = D::DOC_TYPE, id = %doc.id(), version, "Document created");
                Ok(())
            }
            Err(LedgerError::Conflict { .. }) => Err(ComplianceError::AlreadyExists {
                kind: D::DOC_TYPE,
                id: doc.id().to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch a single document. Decode failure is fatal here.
    pub fn get<D: Document>(&self, id: &str) -> Result<D> {
        match self.ledger.get(id)? {
            Some(current) => D::decode(id, &current.value),
            None => Err(not_found::<D>(id)),
        }
    }

    /// Documents matching `selector`, in the selector's order.
    ///
    /// A document that fails to decode is logged and skipped; it never aborts
    /// the rest of the result set.
    pub fn query<D: Document>(&self, selector: &Selector) -> Result<Vec<D>> {
        let records = self.ledger.rich_query(selector)?;
        let total = records.len();
        let docs: Vec<D> = records
            .into_iter()
            .filter_map(|record| match D::decode(&record.key, &record.value) {
                Ok(doc) => Some(doc),
                Err(e) => {
                    warn!(key = %record.key, error = %e, "Skipping undecodable document");
                    None
                }
            })
            .collect();
        debug!(kind = D::DOC_TYPE, matched = total, decoded = docs.len(), "Rich query");
        Ok(docs)
    }

    pub fn history(&self, id: &str) -> Result<Vec<KeyModification>> {
        Ok(self.ledger.history_of(id)?)
    }
}

/// Read set for one operation. See [`LedgerTxn`].
pub struct StoreTxn<'a> {
    txn: LedgerTxn<'a>,
}

impl StoreTxn<'_> {
    pub fn load_optional<D: Document>(&mut self, id: &str) -> Result<Option<D>> {
        match self.txn.get(id)? {
            Some(bytes) => D::decode(id, &bytes).map(Some),
            None => Ok(None),
        }
    }

    pub fn load<D: Document>(&mut self, id: &str) -> Result<D> {
        self.load_optional(id)?.ok_or_else(|| not_found::<D>(id))
    }

    /// Overwrite the document. Fails with `Conflict` if it changed since `load`.
    pub fn save<D: Document>(&mut self, doc: &D) -> Result<()> {
        let version = self.txn.put(doc.id(), doc.encode()?)?;
        debug!(kind = D::DOC_TYPE, id = %doc.id(), version, "Document saved");
        Ok(())
    }
}

fn not_found<D: Document>(id: &str) -> ComplianceError {
    ComplianceError::NotFound {
        kind: D::DOC_TYPE,
        id: id.to_string(),
    }
}
