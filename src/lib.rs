//! Herbal Compliance - compliance and harvest-quota engine for herbal supply chains
//!
//! Tracks batches of harvested material, compliance alerts, seasonal
//! collection windows and per (species, zone, season) harvest quotas on top of
//! a versioned key-value ledger.
//!
//! ## Architecture
//!
//! - **Ledger port** ([`ledger`]): versioned get/put with conditional writes,
//!   structured rich queries, per-key history
//! - **Entity store** ([`store`]): typed documents, uniqueness, read sets
//! - **Services** ([`services`]): one lifecycle manager per entity kind plus
//!   an event bus
//!
//! ## Concurrency
//!
//! Harvest limits are shared accumulators. Every read-modify-write checks the
//! version it read at commit time; a stale write fails with
//! [`ComplianceError::Conflict`], which callers retry against a fresh read.
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/herbal-compliance/
//! ├── ledger.sled/     # State and history trees
//! └── config.toml      # Configuration
//! ```

pub mod config;
pub mod error;
pub mod ledger;
pub mod models;
pub mod services;
pub mod store;

pub use config::Config;
pub use error::{ComplianceError, Result};
pub use ledger::{ExpectedVersion, Ledger, LedgerError, MemoryLedger, Selector, SledLedger};
pub use models::{
    limit_key, season_key_for, Alert, AlertStatistics, AlertStatus, AlertType, Batch,
    BatchHistory, BatchStatus, HarvestLimit, HistoryEntry, LimitStatus, NewAlert, NewBatch,
    NewHarvestLimit, SeasonWindow, SeasonWindowInput, Severity,
};
pub use services::{
    spawn_logging_listener, AlertService, BatchService, ComplianceEvent, EventBus, QuotaService,
    SeasonService, Services, TrackOutcome,
};
pub use store::EntityStore;
