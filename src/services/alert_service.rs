//! Alert service - alert lifecycle and statistics
//!
//! Alerts move strictly forward: active → acknowledged → resolved. Resolving
//! an active alert acknowledges it in the same write.

use std::sync::Arc;

use tracing::info;

use crate::error::{require_non_blank, Result};
use crate::ledger::Selector;
use crate::models::{
    timestamp, Alert, AlertStatistics, AlertStatus, AlertType, Document, NewAlert, Severity,
};
use crate::store::EntityStore;

use super::events::{ComplianceEvent, EventBus};

pub struct AlertService {
    store: Arc<EntityStore>,
    events: Arc<EventBus>,
}

impl AlertService {
    pub fn new(store: Arc<EntityStore>, events: Arc<EventBus>) -> Self {
        Self { store, events }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    pub fn get(&self, id: &str) -> Result<Alert> {
        require_non_blank("alertId", id)?;
        self.store.get(id)
    }

    /// All alerts, newest first
    pub fn all(&self) -> Result<Vec<Alert>> {
        self.query(selector())
    }

    pub fn by_type(&self, alert_type: AlertType) -> Result<Vec<Alert>> {
        self.query(selector().eq("alertType", alert_type.as_str()))
    }

    pub fn by_severity(&self, severity: Severity) -> Result<Vec<Alert>> {
        self.query(selector().eq("severity", severity.as_str()))
    }

    /// Alerts raised against an entity, optionally narrowed by entity type
    pub fn by_entity(&self, entity_id: &str, entity_type: Option<&str>) -> Result<Vec<Alert>> {
        require_non_blank("entityId", entity_id)?;
        let mut sel = selector().eq("entityId", entity_id);
        if let Some(entity_type) = entity_type.filter(|t| !t.is_empty()) {
            sel = sel.eq("entityType", entity_type);
        }
        self.query(sel)
    }

    pub fn active(&self) -> Result<Vec<Alert>> {
        self.query(selector().eq("status", AlertStatus::Active.as_str()))
    }

    pub fn critical_active(&self) -> Result<Vec<Alert>> {
        self.query(
            selector()
                .eq("severity", Severity::Critical.as_str())
                .eq("status", AlertStatus::Active.as_str()),
        )
    }

    /// Counts over every stored alert, with every bucket present
    pub fn statistics(&self) -> Result<AlertStatistics> {
        let alerts = self.store.query::<Alert>(&Selector::doc_type(Alert::DOC_TYPE))?;
        Ok(alerts.iter().collect())
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    pub fn create(&self, input: NewAlert) -> Result<Alert> {
        require_non_blank("id", &input.id)?;
        require_non_blank("alertType", &input.alert_type)?;
        require_non_blank("severity", &input.severity)?;
        require_non_blank("message", &input.message)?;
        let alert_type: AlertType = input.alert_type.parse()?;
        let severity: Severity = input.severity.parse()?;

        let alert = Alert::new(input, alert_type, severity, timestamp::now());
        self.store.create(&alert)?;

        info!(
            id = %alert.id,
            alert_type = alert_type.as_str(),
            severity = severity.as_str(),
            entity = %alert.entity_id,
            "Alert created"
        );
        self.events.emit(ComplianceEvent::AlertCreated {
            alert_id: alert.id.clone(),
            alert_type,
            severity,
            entity_id: alert.entity_id.clone(),
            timestamp: alert.timestamp,
        });

        Ok(alert)
    }

    pub fn acknowledge(&self, id: &str, user_id: &str) -> Result<Alert> {
        require_non_blank("alertId", id)?;
        require_non_blank("userId", user_id)?;

        let now = timestamp::now();
        let mut txn = self.store.begin();
        let mut alert: Alert = txn.load(id)?;
        alert.acknowledge(user_id, now)?;
        txn.save(&alert)?;

        info!(id = %id, user = %user_id, "Alert acknowledged");
        self.events.emit(ComplianceEvent::AlertAcknowledged {
            alert_id: alert.id.clone(),
            acknowledged_by: user_id.to_string(),
            timestamp: now,
        });

        Ok(alert)
    }

    pub fn resolve(&self, id: &str, user_id: &str, resolution: &str) -> Result<Alert> {
        require_non_blank("alertId", id)?;
        require_non_blank("userId", user_id)?;
        require_non_blank("resolution", resolution)?;

        let now = timestamp::now();
        let mut txn = self.store.begin();
        let mut alert: Alert = txn.load(id)?;
        alert.resolve(user_id, resolution, now)?;
        txn.save(&alert)?;

        info!(id = %id, user = %user_id, "Alert resolved");
        self.events.emit(ComplianceEvent::AlertResolved {
            alert_id: alert.id.clone(),
            resolved_by: user_id.to_string(),
            resolution: resolution.to_string(),
            timestamp: now,
        });

        Ok(alert)
    }

    fn query(&self, selector: Selector) -> Result<Vec<Alert>> {
        self.store.query(&selector)
    }
}

fn selector() -> Selector {
    Selector::doc_type(Alert::DOC_TYPE).sort_desc("timestamp")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ComplianceError;
    use crate::ledger::MemoryLedger;

    fn service() -> (AlertService, tokio::sync::broadcast::Receiver<ComplianceEvent>) {
        let store = Arc::new(EntityStore::new(Arc::new(MemoryLedger::new())));
        let events = Arc::new(EventBus::new());
        let rx = events.subscribe();
        (AlertService::new(store, events), rx)
    }

    fn new_alert(id: &str, alert_type: &str, severity: &str, entity: &str) -> NewAlert {
        NewAlert {
            id: id.into(),
            alert_type: alert_type.into(),
            severity: severity.into(),
            entity_id: entity.into(),
            entity_type: "HarvestLimit".into(),
            message: "Harvest above threshold".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_validates() {
        let (svc, mut rx) = service();
        let err = svc.create(new_alert("A1", "flood", "low", "E1")).unwrap_err();
        assert!(matches!(err, ComplianceError::Validation { field: "alertType", .. }));

        let mut missing = new_alert("A1", "system", "low", "E1");
        missing.message = String::new();
        assert!(matches!(
            svc.create(missing),
            Err(ComplianceError::Validation { field: "message", .. })
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_lifecycle_emits_one_event_per_call() {
        let (svc, mut rx) = service();
        svc.create(new_alert("A1", "over_harvest", "high", "E1")).unwrap();
        let acked = svc.acknowledge("A1", "officer").unwrap();
        assert_eq!(acked.status, AlertStatus::Acknowledged);
        let resolved = svc.resolve("A1", "auditor", "Quota revised").unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);
        assert_eq!(resolved.acknowledged_by.as_deref(), Some("officer"));

        let names: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.name())
            .collect();
        assert_eq!(names, vec!["AlertCreated", "AlertAcknowledged", "AlertResolved"]);

        assert!(matches!(
            svc.acknowledge("A1", "officer"),
            Err(ComplianceError::InvalidState { .. })
        ));
        assert!(matches!(
            svc.resolve("A1", "auditor", "again"),
            Err(ComplianceError::InvalidState { .. })
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_resolve_requires_text() {
        let (svc, _rx) = service();
        svc.create(new_alert("A1", "system", "low", "E1")).unwrap();
        assert!(matches!(
            svc.resolve("A1", "auditor", "  "),
            Err(ComplianceError::Validation { field: "resolution", .. })
        ));
        assert_eq!(svc.get("A1").unwrap().status, AlertStatus::Active);
    }

    #[test]
    fn test_missing_alert() {
        let (svc, _rx) = service();
        assert!(matches!(
            svc.acknowledge("ghost", "u"),
            Err(ComplianceError::NotFound { kind: "Alert", .. })
        ));
    }

    #[test]
    fn test_filters_newest_first() {
        let (svc, _rx) = service();
        svc.create(new_alert("A1", "over_harvest", "critical", "L1")).unwrap();
        svc.create(new_alert("A2", "system", "low", "L1")).unwrap();
        svc.create(new_alert("A3", "over_harvest", "critical", "L2")).unwrap();
        svc.acknowledge("A3", "officer").unwrap();

        let ids = |alerts: Vec<Alert>| alerts.into_iter().map(|a| a.id).collect::<Vec<_>>();

        let all = svc.all().unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));

        let mut by_type = ids(svc.by_type(AlertType::OverHarvest).unwrap());
        by_type.sort();
        assert_eq!(by_type, vec!["A1", "A3"]);
        assert_eq!(ids(svc.critical_active().unwrap()), vec!["A1"]);
        assert_eq!(svc.by_severity(Severity::Low).unwrap().len(), 1);
        assert_eq!(svc.active().unwrap().len(), 2);
        assert_eq!(svc.by_entity("L1", None).unwrap().len(), 2);
        assert_eq!(svc.by_entity("L1", Some("Batch")).unwrap().len(), 0);
        assert_eq!(svc.by_entity("L2", Some("HarvestLimit")).unwrap().len(), 1);
    }

    #[test]
    fn test_statistics() {
        let (svc, _rx) = service();
        svc.create(new_alert("A1", "over_harvest", "critical", "L1")).unwrap();
        svc.create(new_alert("A2", "quality_failure", "medium", "B1")).unwrap();
        svc.resolve("A2", "lab", "Retested").unwrap();

        let stats = svc.statistics().unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_status.active, 1);
        assert_eq!(stats.by_status.resolved, 1);
        assert_eq!(stats.by_status.acknowledged, 0);
        assert_eq!(stats.by_severity.medium, 1);
        assert_eq!(stats.by_type.quality_failure, 1);
        assert_eq!(stats.by_type.zone_violation, 0);
    }
}
