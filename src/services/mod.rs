//! Service layer for herbal-compliance
//!
//! Services hold the lifecycle rules for each entity kind. Each one wraps
//! entity store operations with:
//! - Input validation
//! - State machine checks
//! - Event emission for audit/notifications
//!
//! ## Architecture
//!
//! ```text
//! Callers (CLI, embedding application)
//!     ↓
//! Service Layer (lifecycle rules)
//!     ↓
//! Entity Store (store.rs)
//!     ↓
//! Ledger port (MemoryLedger / SledLedger)
//! ```
//!
//! Services never call each other. A harvest acceptance flow that consults
//! both the season window and the quota composes the two calls itself.

pub mod alert_service;
pub mod batch_service;
pub mod events;
pub mod quota_service;
pub mod season_service;

pub use alert_service::AlertService;
pub use batch_service::BatchService;
pub use events::{spawn_logging_listener, ComplianceEvent, EventBus, EventListener, LoggingEventListener};
pub use quota_service::{QuotaService, TrackOutcome};
pub use season_service::SeasonService;

use std::sync::Arc;

use crate::config::Config;
use crate::ledger::Ledger;
use crate::store::EntityStore;

/// Service container
///
/// Holds all services over one shared ledger and event bus.
pub struct Services {
    pub alerts: Arc<AlertService>,
    pub batches: Arc<BatchService>,
    pub seasons: Arc<SeasonService>,
    pub quotas: Arc<QuotaService>,
    pub store: Arc<EntityStore>,
    pub events: Arc<EventBus>,
}

impl Services {
    pub fn new(ledger: Arc<dyn Ledger>, config: &Config) -> Self {
        let store = Arc::new(EntityStore::new(ledger));
        let events = Arc::new(EventBus::with_capacity(config.event_bus_capacity));

        Self {
            alerts: Arc::new(AlertService::new(store.clone(), events.clone())),
            batches: Arc::new(BatchService::new(
                store.clone(),
                events.clone(),
                config.strict_batch_transitions,
            )),
            seasons: Arc::new(SeasonService::new(store.clone(), events.clone())),
            quotas: Arc::new(QuotaService::new(
                store.clone(),
                events.clone(),
                config.default_alert_threshold,
            )),
            store,
            events,
        }
    }
}
