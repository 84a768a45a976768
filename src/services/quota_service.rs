//! Quota service - harvest limits per species, zone and season
//!
//! A limit's `currentQuantity` is one accumulator shared by every harvester
//! in that combination. [`QuotaService::track`] is a read-modify-write under
//! the ledger's version check: if another `track` committed between this
//! call's read and its write, the write is rejected with
//! [`ComplianceError::Conflict`] and nothing is applied. The caller re-runs
//! `track`, which reads the fresh total.
//!
//! [`QuotaService::check_limit`] is advisory. It reserves nothing, and a
//! concurrent `track` can invalidate its answer before the caller acts on it.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{require_non_blank, ComplianceError, Result};
use crate::ledger::Selector;
use crate::models::{
    limit_key, timestamp, Document, HarvestLimit, LimitStatus, NewHarvestLimit,
};
use crate::store::EntityStore;

use super::events::{ComplianceEvent, EventBus};

/// Result of [`QuotaService::track`]
#[derive(Debug, Clone, PartialEq)]
pub enum TrackOutcome {
    /// No limit is registered for the combination, so it is unlimited
    Untracked,
    /// The accumulator after this call's addition
    Updated(HarvestLimit),
}

pub struct QuotaService {
    store: Arc<EntityStore>,
    events: Arc<EventBus>,
    default_alert_threshold: f64,
}

impl QuotaService {
    pub fn new(store: Arc<EntityStore>, events: Arc<EventBus>, default_alert_threshold: f64) -> Self {
        Self {
            store,
            events,
            default_alert_threshold,
        }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    pub fn get(&self, id: &str) -> Result<HarvestLimit> {
        require_non_blank("limitId", id)?;
        self.store.get(id)
    }

    pub fn all(&self) -> Result<Vec<HarvestLimit>> {
        self.store.query(&Selector::doc_type(HarvestLimit::DOC_TYPE))
    }

    /// The limit for a combination. Unlike `track`, a missing limit is an error here.
    pub fn statistics(&self, species: &str, zone: &str, season: &str) -> Result<HarvestLimit> {
        validate_combination(species, zone, season)?;
        self.store.get(&limit_key(species, zone, season))
    }

    /// Whether `quantity` more would stay within the limit. Pure read; an
    /// unregistered combination is always allowed.
    pub fn check_limit(&self, species: &str, zone: &str, season: &str, quantity: f64) -> Result<bool> {
        validate_combination(species, zone, season)?;
        validate_quantity(quantity)?;

        let key = limit_key(species, zone, season);
        let allowed = match self.store.begin().load_optional::<HarvestLimit>(&key)? {
            Some(limit) => limit.allows(quantity),
            None => true,
        };
        debug!(limit = %key, quantity, allowed, "Harvest limit check");
        Ok(allowed)
    }

    /// Limits at `warning` or `exceeded`
    pub fn alerts(&self) -> Result<Vec<HarvestLimit>> {
        self.store.query(&Selector::doc_type(HarvestLimit::DOC_TYPE).any_of(
            "status",
            [LimitStatus::Warning.as_str(), LimitStatus::Exceeded.as_str()],
        ))
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Register a limit under its derived key. A zero threshold takes the
    /// configured default.
    pub fn create_limit(&self, input: NewHarvestLimit) -> Result<HarvestLimit> {
        input.validate()?;

        let limit = HarvestLimit::new(input, self.default_alert_threshold, timestamp::now());
        self.store.create(&limit)?;

        info!(
            id = %limit.id,
            max = limit.max_quantity,
            unit = %limit.unit,
            threshold = limit.alert_threshold,
            "Harvest limit created"
        );
        self.events.emit(ComplianceEvent::HarvestLimitCreated {
            limit_id: limit.id.clone(),
            species: limit.species.clone(),
            zone: limit.zone.clone(),
            season: limit.season.clone(),
            max_quantity: limit.max_quantity,
            timestamp: limit.created_at,
        });

        Ok(limit)
    }

    /// Add `quantity` to the combination's accumulator.
    ///
    /// Over-limit additions are recorded and reported through the status.
    /// Fails with `Conflict` if the limit changed after it was read.
    pub fn track(&self, species: &str, zone: &str, season: &str, quantity: f64) -> Result<TrackOutcome> {
        validate_combination(species, zone, season)?;
        validate_quantity(quantity)?;

        let key = limit_key(species, zone, season);
        let mut txn = self.store.begin();
        let Some(mut limit) = txn.load_optional::<HarvestLimit>(&key)? else {
            debug!(limit = %key, quantity, "No limit registered, harvest untracked");
            return Ok(TrackOutcome::Untracked);
        };

        let now = timestamp::now();
        let previous = limit.status;
        limit.apply_quantity(quantity, now);
        if let Err(e) = txn.save(&limit) {
            if e.is_retryable() {
                warn!(limit = %key, quantity, "Harvest limit changed concurrently, tracking rejected");
            }
            return Err(e);
        }

        let percentage_used = limit.percentage_used();
        if limit.status != previous {
            info!(
                limit = %key,
                from = previous.as_str(),
                to = limit.status.as_str(),
                percentage_used,
                "Harvest limit status changed"
            );
        } else {
            debug!(limit = %key, current = limit.current_quantity, "Harvest quantity tracked");
        }
        self.events.emit(ComplianceEvent::HarvestQuantityTracked {
            limit_id: key,
            quantity,
            current_quantity: limit.current_quantity,
            percentage_used,
            status: limit.status,
            timestamp: now,
        });

        Ok(TrackOutcome::Updated(limit))
    }

    /// Zero every limit of `season`. Returns how many were reset; a limit
    /// that cannot be reset is logged and skipped.
    pub fn reset_season(&self, season: &str) -> Result<usize> {
        require_non_blank("season", season)?;

        let limits: Vec<HarvestLimit> = self
            .store
            .query(&Selector::doc_type(HarvestLimit::DOC_TYPE).eq("season", season))?;

        let now = timestamp::now();
        let mut reset_count = 0;
        for limit in &limits {
            match self.reset_one(&limit.id, now) {
                Ok(()) => reset_count += 1,
                Err(e) => warn!(limit = %limit.id, error = %e, "Skipping limit reset"),
            }
        }

        info!(season = %season, reset_count, matched = limits.len(), "Seasonal limits reset");
        self.events.emit(ComplianceEvent::SeasonalLimitsReset {
            season: season.to_string(),
            reset_count,
            timestamp: now,
        });

        Ok(reset_count)
    }

    fn reset_one(&self, id: &str, now: chrono::DateTime<chrono::Utc>) -> Result<()> {
        let mut txn = self.store.begin();
        let mut limit: HarvestLimit = txn.load(id)?;
        limit.reset(now);
        txn.save(&limit)
    }
}

fn validate_combination(species: &str, zone: &str, season: &str) -> Result<()> {
    require_non_blank("species", species)?;
    require_non_blank("zone", zone)?;
    require_non_blank("season", season)
}

fn validate_quantity(quantity: f64) -> Result<()> {
    if !(quantity.is_finite() && quantity > 0.0) {
        return Err(ComplianceError::validation(
            "quantity",
            "must be greater than zero",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;

    fn service() -> (QuotaService, tokio::sync::broadcast::Receiver<ComplianceEvent>) {
        let store = Arc::new(EntityStore::new(Arc::new(MemoryLedger::new())));
        let events = Arc::new(EventBus::new());
        let rx = events.subscribe();
        (QuotaService::new(store, events, 80.0), rx)
    }

    fn new_limit(zone: &str, season: &str, max: f64) -> NewHarvestLimit {
        NewHarvestLimit {
            species: "Ashwagandha".into(),
            zone: zone.into(),
            season: season.into(),
            max_quantity: max,
            unit: "kg".into(),
            alert_threshold: 0.0,
            created_by: "regulator".into(),
        }
    }

    fn updated(outcome: TrackOutcome) -> HarvestLimit {
        match outcome {
            TrackOutcome::Updated(limit) => limit,
            TrackOutcome::Untracked => panic!("expected a tracked limit"),
        }
    }

    #[test]
    fn test_track_sequence() {
        let (svc, _rx) = service();
        let created = svc.create_limit(new_limit("Zone A", "2025-Monsoon", 100.0)).unwrap();
        assert_eq!(created.alert_threshold, 80.0);

        let l = updated(svc.track("Ashwagandha", "Zone A", "2025-Monsoon", 50.0).unwrap());
        assert_eq!((l.current_quantity, l.status), (50.0, LimitStatus::Normal));
        let l = updated(svc.track("Ashwagandha", "Zone A", "2025-Monsoon", 35.0).unwrap());
        assert_eq!((l.current_quantity, l.status), (85.0, LimitStatus::Warning));
        let l = updated(svc.track("Ashwagandha", "Zone A", "2025-Monsoon", 20.0).unwrap());
        assert_eq!((l.current_quantity, l.status), (105.0, LimitStatus::Exceeded));

        let stored = svc.statistics("Ashwagandha", "Zone A", "2025-Monsoon").unwrap();
        assert_eq!(stored, l);
        assert_eq!(svc.alerts().unwrap().len(), 1);
    }

    #[test]
    fn test_untracked_combination() {
        let (svc, mut rx) = service();
        let outcome = svc.track("Tulsi", "Zone B", "2025-Spring", 10.0).unwrap();
        assert_eq!(outcome, TrackOutcome::Untracked);
        assert!(rx.try_recv().is_err());
        assert!(svc.check_limit("Tulsi", "Zone B", "2025-Spring", 1e9).unwrap());
        assert!(matches!(
            svc.statistics("Tulsi", "Zone B", "2025-Spring"),
            Err(ComplianceError::NotFound { .. })
        ));
    }

    #[test]
    fn test_check_limit_is_read_only() {
        let (svc, _rx) = service();
        svc.create_limit(new_limit("Zone A", "2025-Monsoon", 100.0)).unwrap();
        svc.track("Ashwagandha", "Zone A", "2025-Monsoon", 60.0).unwrap();

        assert!(svc.check_limit("Ashwagandha", "Zone A", "2025-Monsoon", 40.0).unwrap());
        assert!(!svc.check_limit("Ashwagandha", "Zone A", "2025-Monsoon", 41.0).unwrap());
        let l = svc.statistics("Ashwagandha", "Zone A", "2025-Monsoon").unwrap();
        assert_eq!(l.current_quantity, 60.0);
    }

    #[test]
    fn test_quantity_validation() {
        let (svc, _rx) = service();
        for bad in [0.0, -3.0, f64::NAN] {
            assert!(matches!(
                svc.track("Ashwagandha", "Zone A", "2025-Monsoon", bad),
                Err(ComplianceError::Validation { field: "quantity", .. })
            ));
        }
        assert!(matches!(
            svc.check_limit("Ashwagandha", " ", "2025-Monsoon", 1.0),
            Err(ComplianceError::Validation { field: "zone", .. })
        ));
    }

    #[test]
    fn test_duplicate_limit() {
        let (svc, _rx) = service();
        svc.create_limit(new_limit("Zone A", "2025-Monsoon", 100.0)).unwrap();
        assert!(matches!(
            svc.create_limit(new_limit("Zone A", "2025-Monsoon", 50.0)),
            Err(ComplianceError::AlreadyExists { kind: "HarvestLimit", .. })
        ));
        // Irregular spacing is a different combination
        svc.create_limit(new_limit("Zone  A", "2025-Monsoon", 50.0)).unwrap();
        assert_eq!(svc.all().unwrap().len(), 2);
    }

    #[test]
    fn test_reset_season() {
        let (svc, mut rx) = service();
        for zone in ["Z1", "Z2", "Z3"] {
            svc.create_limit(new_limit(zone, "2025-Monsoon", 100.0)).unwrap();
            svc.track("Ashwagandha", zone, "2025-Monsoon", 90.0).unwrap();
        }
        svc.create_limit(new_limit("Z1", "2025-Winter", 100.0)).unwrap();
        svc.track("Ashwagandha", "Z1", "2025-Winter", 30.0).unwrap();
        while rx.try_recv().is_ok() {}

        assert_eq!(svc.reset_season("2025-Monsoon").unwrap(), 3);
        for zone in ["Z1", "Z2", "Z3"] {
            let l = svc.statistics("Ashwagandha", zone, "2025-Monsoon").unwrap();
            assert_eq!((l.current_quantity, l.status), (0.0, LimitStatus::Normal));
        }
        let winter = svc.statistics("Ashwagandha", "Z1", "2025-Winter").unwrap();
        assert_eq!(winter.current_quantity, 30.0);

        assert_eq!(rx.try_recv().unwrap().name(), "SeasonalLimitsReset");
        assert!(rx.try_recv().is_err());

        // Nothing to reset still reports once
        assert_eq!(svc.reset_season("2030-Spring").unwrap(), 0);
        assert_eq!(rx.try_recv().unwrap().name(), "SeasonalLimitsReset");
    }
}
