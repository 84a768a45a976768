//! Batch service - batch creation, assignment, status and history
//!
//! Status changes are permissive by default: any of the five statuses may
//! follow any other. With strict transitions enabled only the forward
//! processing order in [`BatchStatus::can_transition_to`] is accepted.

use std::sync::Arc;

use tracing::info;

use crate::error::{require_non_blank, ComplianceError, Result};
use crate::ledger::Selector;
use crate::models::{timestamp, Batch, BatchHistory, BatchStatus, Document, NewBatch};
use crate::store::EntityStore;

use super::events::{ComplianceEvent, EventBus};

pub struct BatchService {
    store: Arc<EntityStore>,
    events: Arc<EventBus>,
    strict_transitions: bool,
}

impl BatchService {
    pub fn new(store: Arc<EntityStore>, events: Arc<EventBus>, strict_transitions: bool) -> Self {
        Self {
            store,
            events,
            strict_transitions,
        }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    pub fn get(&self, id: &str) -> Result<Batch> {
        require_non_blank("batchId", id)?;
        self.store.get(id)
    }

    /// Current state plus every committed version, oldest first
    pub fn history(&self, id: &str) -> Result<BatchHistory> {
        let batch = self.get(id)?;
        let modifications = self.store.history(id)?;
        Ok(BatchHistory::new(batch, modifications))
    }

    pub fn by_status(&self, status: BatchStatus) -> Result<Vec<Batch>> {
        self.store
            .query(&Selector::doc_type(Batch::DOC_TYPE).eq("status", status.as_str()))
    }

    pub fn by_processor(&self, processor_id: &str) -> Result<Vec<Batch>> {
        require_non_blank("processorId", processor_id)?;
        self.store
            .query(&Selector::doc_type(Batch::DOC_TYPE).eq("assignedProcessor", processor_id))
    }

    /// Collected batches with no processor yet
    pub fn pending_unassigned(&self) -> Result<Vec<Batch>> {
        self.store.query(
            &Selector::doc_type(Batch::DOC_TYPE)
                .eq("status", BatchStatus::Collected.as_str())
                .exists("assignedProcessor", false),
        )
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    pub fn create(&self, input: NewBatch) -> Result<Batch> {
        validate(&input)?;

        let batch = Batch::new(input, timestamp::now());
        self.store.create(&batch)?;

        info!(
            id = %batch.id,
            species = %batch.species,
            quantity = batch.total_quantity,
            unit = %batch.unit,
            "Batch created"
        );
        self.events.emit(ComplianceEvent::BatchCreated {
            batch_id: batch.id.clone(),
            species: batch.species.clone(),
            total_quantity: batch.total_quantity,
            created_by: batch.created_by.clone(),
            timestamp: batch.timestamp,
        });

        Ok(batch)
    }

    /// One-way assignment. Forces status to `assigned`.
    pub fn assign_to_processor(
        &self,
        id: &str,
        processor_id: &str,
        processor_name: &str,
        admin_id: &str,
    ) -> Result<Batch> {
        require_non_blank("batchId", id)?;
        require_non_blank("processorId", processor_id)?;
        require_non_blank("adminId", admin_id)?;

        let now = timestamp::now();
        let mut txn = self.store.begin();
        let mut batch: Batch = txn.load(id)?;
        if let Some(processor) = &batch.assigned_processor {
            return Err(ComplianceError::AlreadyAssigned {
                batch_id: batch.id,
                processor: processor.clone(),
            });
        }

        batch.assigned_processor = Some(processor_id.to_string());
        batch.processor_name = Some(processor_name.to_string());
        batch.assigned_by = Some(admin_id.to_string());
        batch.assigned_date = Some(now);
        batch.status = BatchStatus::Assigned;
        batch.timestamp = now;
        txn.save(&batch)?;

        info!(id = %id, processor = %processor_id, admin = %admin_id, "Batch assigned");
        self.events.emit(ComplianceEvent::BatchAssigned {
            batch_id: batch.id.clone(),
            processor_id: processor_id.to_string(),
            processor_name: processor_name.to_string(),
            assigned_by: admin_id.to_string(),
            timestamp: now,
        });

        Ok(batch)
    }

    pub fn update_status(&self, id: &str, new_status: &str) -> Result<Batch> {
        require_non_blank("batchId", id)?;
        require_non_blank("status", new_status)?;
        let next: BatchStatus = new_status.parse()?;

        let now = timestamp::now();
        let mut txn = self.store.begin();
        let mut batch: Batch = txn.load(id)?;
        let previous = batch.status;
        if self.strict_transitions && !previous.can_transition_to(next) {
            return Err(ComplianceError::InvalidState {
                id: batch.id,
                status: previous.to_string(),
                action: "move batch to the requested status",
            });
        }

        batch.status = next;
        batch.timestamp = now;
        txn.save(&batch)?;

        info!(id = %id, from = %previous, to = %next, "Batch status updated");
        self.events.emit(ComplianceEvent::BatchStatusUpdated {
            batch_id: batch.id.clone(),
            old_status: previous,
            new_status: next,
            timestamp: now,
        });

        Ok(batch)
    }
}

fn validate(input: &NewBatch) -> Result<()> {
    require_non_blank("id", &input.id)?;
    require_non_blank("species", &input.species)?;
    if !(input.total_quantity.is_finite() && input.total_quantity > 0.0) {
        return Err(ComplianceError::validation(
            "totalQuantity",
            "must be greater than zero",
        ));
    }
    require_non_blank("unit", &input.unit)?;
    require_non_blank("createdBy", &input.created_by)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;

    fn service(strict: bool) -> (BatchService, tokio::sync::broadcast::Receiver<ComplianceEvent>) {
        let store = Arc::new(EntityStore::new(Arc::new(MemoryLedger::new())));
        let events = Arc::new(EventBus::new());
        let rx = events.subscribe();
        (BatchService::new(store, events, strict), rx)
    }

    fn new_batch(id: &str) -> NewBatch {
        NewBatch {
            id: id.into(),
            species: "Ashwagandha".into(),
            total_quantity: 25.0,
            unit: "kg".into(),
            collection_event_ids: None,
            created_by: "farmer-9".into(),
        }
    }

    #[test]
    fn test_create_and_get() {
        let (svc, mut rx) = service(false);
        svc.create(new_batch("B1")).unwrap();

        let batch = svc.get("B1").unwrap();
        assert_eq!(batch.status, BatchStatus::Collected);
        assert_eq!(batch.collection_event_ids, Vec::<String>::new());
        assert_eq!(rx.try_recv().unwrap().name(), "BatchCreated");
    }

    #[test]
    fn test_create_validation() {
        let (svc, mut rx) = service(false);
        let mut input = new_batch("B1");
        input.total_quantity = 0.0;
        assert!(matches!(
            svc.create(input),
            Err(ComplianceError::Validation { field: "totalQuantity", .. })
        ));
        let mut input = new_batch("B1");
        input.created_by = String::new();
        assert!(matches!(
            svc.create(input),
            Err(ComplianceError::Validation { field: "createdBy", .. })
        ));
        assert!(!svc.store.exists("B1").unwrap());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_duplicate_create() {
        let (svc, _rx) = service(false);
        svc.create(new_batch("B1")).unwrap();
        assert!(matches!(
            svc.create(new_batch("B1")),
            Err(ComplianceError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn test_assignment_is_one_way() {
        let (svc, _rx) = service(false);
        svc.create(new_batch("B1")).unwrap();

        let assigned = svc.assign_to_processor("B1", "P1", "Ayur Labs", "admin").unwrap();
        assert_eq!(assigned.status, BatchStatus::Assigned);
        assert_eq!(assigned.assigned_processor.as_deref(), Some("P1"));
        assert!(assigned.assigned_date.is_some());

        let err = svc.assign_to_processor("B1", "P2", "Other", "admin").unwrap_err();
        assert!(matches!(
            err,
            ComplianceError::AlreadyAssigned { ref processor, .. } if processor == "P1"
        ));
        assert_eq!(svc.by_processor("P1").unwrap().len(), 1);
        assert!(svc.by_processor("P2").unwrap().is_empty());
    }

    #[test]
    fn test_permissive_status_updates() {
        let (svc, _rx) = service(false);
        svc.create(new_batch("B1")).unwrap();
        svc.update_status("B1", "manufactured").unwrap();
        let batch = svc.update_status("B1", "collected").unwrap();
        assert_eq!(batch.status, BatchStatus::Collected);

        assert!(matches!(
            svc.update_status("B1", "shipped"),
            Err(ComplianceError::InvalidStatus(_))
        ));
    }

    #[test]
    fn test_strict_status_updates() {
        let (svc, mut rx) = service(true);
        svc.create(new_batch("B1")).unwrap();
        assert!(matches!(
            svc.update_status("B1", "manufactured"),
            Err(ComplianceError::InvalidState { .. })
        ));
        svc.assign_to_processor("B1", "P1", "Ayur Labs", "admin").unwrap();
        svc.update_status("B1", "testing").unwrap();
        svc.update_status("B1", "processing").unwrap();
        svc.update_status("B1", "manufactured").unwrap();

        let names: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.name())
            .collect();
        assert_eq!(
            names,
            vec![
                "BatchCreated",
                "BatchAssigned",
                "BatchStatusUpdated",
                "BatchStatusUpdated",
                "BatchStatusUpdated"
            ]
        );
    }

    #[test]
    fn test_pending_unassigned() {
        let (svc, _rx) = service(false);
        svc.create(new_batch("B1")).unwrap();
        svc.create(new_batch("B2")).unwrap();
        svc.create(new_batch("B3")).unwrap();
        svc.assign_to_processor("B2", "P1", "Ayur Labs", "admin").unwrap();
        svc.update_status("B3", "testing").unwrap();

        let pending: Vec<String> = svc
            .pending_unassigned()
            .unwrap()
            .into_iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(pending, vec!["B1"]);
        assert_eq!(svc.by_status(BatchStatus::Testing).unwrap().len(), 1);
    }

    #[test]
    fn test_history() {
        let (svc, _rx) = service(false);
        svc.create(new_batch("B1")).unwrap();
        svc.assign_to_processor("B1", "P1", "Ayur Labs", "admin").unwrap();
        svc.update_status("B1", "processing").unwrap();

        let history = svc.history("B1").unwrap();
        assert_eq!(history.batch.status, BatchStatus::Processing);
        let statuses: Vec<BatchStatus> = history
            .entries()
            .filter_map(|e| e.data.map(|b| b.status))
            .collect();
        assert_eq!(
            statuses,
            vec![BatchStatus::Collected, BatchStatus::Assigned, BatchStatus::Processing]
        );
        assert_eq!(history.event_count(), 3);

        assert!(matches!(svc.history("ghost"), Err(ComplianceError::NotFound { .. })));
    }
}
