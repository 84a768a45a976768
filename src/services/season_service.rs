//! Season window service - permitted harvest windows per species and region

use std::sync::Arc;

use chrono::{DateTime, Datelike, FixedOffset};
use tracing::{debug, info};

use crate::error::{require_non_blank, ComplianceError, Result};
use crate::ledger::Selector;
use crate::models::{timestamp, Document, SeasonWindow, SeasonWindowInput};
use crate::store::EntityStore;

use super::events::{ComplianceEvent, EventBus};

pub struct SeasonService {
    store: Arc<EntityStore>,
    events: Arc<EventBus>,
}

impl SeasonService {
    pub fn new(store: Arc<EntityStore>, events: Arc<EventBus>) -> Self {
        Self { store, events }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    pub fn get(&self, id: &str) -> Result<SeasonWindow> {
        require_non_blank("windowId", id)?;
        self.store.get(id)
    }

    pub fn all(&self) -> Result<Vec<SeasonWindow>> {
        self.store.query(&Selector::doc_type(SeasonWindow::DOC_TYPE))
    }

    /// All windows for a species, across regions. Inactive windows are
    /// included so they can be found and re-activated.
    pub fn by_species(&self, species: &str) -> Result<Vec<SeasonWindow>> {
        require_non_blank("species", species)?;
        self.store
            .query(&Selector::doc_type(SeasonWindow::DOC_TYPE).eq("species", species))
    }

    /// Whether `harvest_date` (RFC 3339) falls inside any active window for
    /// the species and region. No matching window is a `false`, not an error.
    ///
    /// The month is taken in the date's own offset, as the harvester recorded it.
    pub fn is_within_window(&self, species: &str, harvest_date: &str, region: &str) -> Result<bool> {
        require_non_blank("species", species)?;
        require_non_blank("region", region)?;
        let date = parse_harvest_date(harvest_date)?;
        let month = date.month();

        let windows: Vec<SeasonWindow> = self.store.query(
            &Selector::doc_type(SeasonWindow::DOC_TYPE)
                .eq("species", species)
                .eq("region", region)
                .eq("active", true),
        )?;
        let within = windows.iter().any(|w| w.contains_month(month));

        debug!(
            species = %species,
            region = %region,
            month,
            windows = windows.len(),
            within,
            "Season window check"
        );
        Ok(within)
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// New windows start active regardless of the payload.
    pub fn create(&self, input: SeasonWindowInput) -> Result<SeasonWindow> {
        require_non_blank("id", &input.id)?;
        input.validate()?;

        let window = SeasonWindow::new(input, timestamp::now());
        self.store.create(&window)?;

        info!(
            id = %window.id,
            species = %window.species,
            region = %window.region,
            start = window.start_month,
            end = window.end_month,
            "Season window created"
        );
        self.events.emit(ComplianceEvent::SeasonWindowCreated {
            window_id: window.id.clone(),
            species: window.species.clone(),
            region: window.region.clone(),
            timestamp: window.created_at,
        });

        Ok(window)
    }

    /// Full overwrite of the window's fields. `active` is taken from the
    /// payload as-is, so omitting it deactivates the window.
    ///
    /// `id` and `createdAt` survive the update; every other field comes from
    /// the payload, and `updatedAt` is set to now.
    pub fn update(&self, id: &str, input: SeasonWindowInput) -> Result<SeasonWindow> {
        require_non_blank("windowId", id)?;
        input.validate()?;

        let now = timestamp::now();
        let mut txn = self.store.begin();
        let mut window: SeasonWindow = txn.load(id)?;
        window.overwrite(input, now);
        txn.save(&window)?;

        info!(id = %id, active = window.active, "Season window updated");
        self.events.emit(ComplianceEvent::SeasonWindowUpdated {
            window_id: window.id.clone(),
            active: window.active,
            timestamp: now,
        });

        Ok(window)
    }
}

fn parse_harvest_date(value: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map_err(|e| ComplianceError::validation("harvestDate", format!("invalid date {:?}: {}", value, e)))
}
