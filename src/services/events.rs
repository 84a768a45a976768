//! Event system for compliance operations
//!
//! Every successful mutating call emits exactly one [`ComplianceEvent`];
//! failed calls emit nothing. Delivery to subscribers is best-effort over a
//! broadcast channel, so a bus with no subscribers simply drops events.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

use crate::models::{timestamp, AlertType, BatchStatus, LimitStatus, Severity};

/// Compliance events emitted by services
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "eventType", rename_all_fields = "camelCase")]
pub enum ComplianceEvent {
    // Batch events
    BatchCreated {
        batch_id: String,
        species: String,
        total_quantity: f64,
        created_by: String,
        #[serde(with = "timestamp")]
        timestamp: DateTime<Utc>,
    },
    BatchAssigned {
        batch_id: String,
        processor_id: String,
        processor_name: String,
        assigned_by: String,
        #[serde(with = "timestamp")]
        timestamp: DateTime<Utc>,
    },
    BatchStatusUpdated {
        batch_id: String,
        old_status: BatchStatus,
        new_status: BatchStatus,
        #[serde(with = "timestamp")]
        timestamp: DateTime<Utc>,
    },

    // Alert events
    AlertCreated {
        alert_id: String,
        alert_type: AlertType,
        severity: Severity,
        entity_id: String,
        #[serde(with = "timestamp")]
        timestamp: DateTime<Utc>,
    },
    AlertAcknowledged {
        alert_id: String,
        acknowledged_by: String,
        #[serde(with = "timestamp")]
        timestamp: DateTime<Utc>,
    },
    AlertResolved {
        alert_id: String,
        resolved_by: String,
        resolution: String,
        #[serde(with = "timestamp")]
        timestamp: DateTime<Utc>,
    },

    // Season window events
    SeasonWindowCreated {
        window_id: String,
        species: String,
        region: String,
        #[serde(with = "timestamp")]
        timestamp: DateTime<Utc>,
    },
    SeasonWindowUpdated {
        window_id: String,
        active: bool,
        #[serde(with = "timestamp")]
        timestamp: DateTime<Utc>,
    },

    // Quota events
    HarvestLimitCreated {
        limit_id: String,
        species: String,
        zone: String,
        season: String,
        max_quantity: f64,
        #[serde(with = "timestamp")]
        timestamp: DateTime<Utc>,
    },
    HarvestQuantityTracked {
        limit_id: String,
        quantity: f64,
        current_quantity: f64,
        percentage_used: f64,
        status: LimitStatus,
        #[serde(with = "timestamp")]
        timestamp: DateTime<Utc>,
    },
    SeasonalLimitsReset {
        season: String,
        reset_count: usize,
        #[serde(with = "timestamp")]
        timestamp: DateTime<Utc>,
    },
}

impl ComplianceEvent {
    /// Event name, as it appears in the `eventType` field.
    pub fn name(&self) -> &'static str {
        match self {
            ComplianceEvent::BatchCreated { .. } => "BatchCreated",
            ComplianceEvent::BatchAssigned { .. } => "BatchAssigned",
            ComplianceEvent::BatchStatusUpdated { .. } => "BatchStatusUpdated",
            ComplianceEvent::AlertCreated { .. } => "AlertCreated",
            ComplianceEvent::AlertAcknowledged { .. } => "AlertAcknowledged",
            ComplianceEvent::AlertResolved { .. } => "AlertResolved",
            ComplianceEvent::SeasonWindowCreated { .. } => "SeasonWindowCreated",
            ComplianceEvent::SeasonWindowUpdated { .. } => "SeasonWindowUpdated",
            ComplianceEvent::HarvestLimitCreated { .. } => "HarvestLimitCreated",
            ComplianceEvent::HarvestQuantityTracked { .. } => "HarvestQuantityTracked",
            ComplianceEvent::SeasonalLimitsReset { .. } => "SeasonalLimitsReset",
        }
    }

    /// Structured payload for external delivery.
    pub fn payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &ComplianceEvent);
}

/// Event bus for broadcasting compliance events
pub struct EventBus {
    sender: broadcast::Sender<ComplianceEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: ComplianceEvent) {
        trace!(event = event.name(), "Emitting compliance event");
        // No subscribers is not an error
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ComplianceEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Logging event listener for audit trails
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &ComplianceEvent) {
        match event {
            ComplianceEvent::HarvestQuantityTracked {
                limit_id,
                current_quantity,
                status,
                ..
            } if *status != LimitStatus::Normal => {
                info!(
                    limit = %limit_id,
                    current = current_quantity,
                    status = status.as_str(),
                    "Harvest limit above threshold"
                );
            }
            ComplianceEvent::AlertCreated {
                alert_id, severity, ..
            } if *severity == Severity::Critical => {
                info!(alert = %alert_id, "Critical alert raised");
            }
            ComplianceEvent::SeasonalLimitsReset {
                season,
                reset_count,
                ..
            } => {
                info!(season = %season, count = reset_count, "Seasonal limits reset");
            }
            _ => {
                debug!(event = event.name(), payload = %event.payload(), "Compliance event");
            }
        }
    }
}

/// Spawn a background task that logs all events
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    let listener = LoggingEventListener;

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => listener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}
