//! HarvestLimit: per (species, zone, season) quota accumulator

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use super::{timestamp, Document};
use crate::error::{require_non_blank, ComplianceError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitStatus {
    Normal,
    Warning,
    Exceeded,
}

impl LimitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitStatus::Normal => "normal",
            LimitStatus::Warning => "warning",
            LimitStatus::Exceeded => "exceeded",
        }
    }

    /// Status for a usage percentage: `exceeded` at 100% or more, `warning`
    /// at or above the threshold, `normal` otherwise.
    pub fn from_usage(percentage_used: f64, alert_threshold: f64) -> Self {
        if percentage_used >= 100.0 {
            LimitStatus::Exceeded
        } else if percentage_used >= alert_threshold {
            LimitStatus::Warning
        } else {
            LimitStatus::Normal
        }
    }
}

/// Ledger key for a limit: `limit_{species}_{zone}_{season}`, each whitespace
/// character replaced by `_`. Runs of whitespace are not collapsed, so
/// `"Zone A"` and `"Zone  A"` are different limits.
pub fn limit_key(species: &str, zone: &str, season: &str) -> String {
    format!(
        "limit_{}_{}_{}",
        normalize(species),
        normalize(zone),
        normalize(season)
    )
}

fn normalize(part: &str) -> String {
    part.chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

/// Season period key for a date, e.g. `2025-Monsoon`.
///
/// Winter spans the year boundary and is keyed by the calendar year of the
/// date itself, so January 2026 is `2026-Winter`.
pub fn season_key_for(date: DateTime<Utc>) -> String {
    let season = match date.month() {
        3..=5 => "Spring",
        6..=9 => "Monsoon",
        10 | 11 => "Post-Monsoon",
        _ => "Winter",
    };
    format!("{}-{}", date.year(), season)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewHarvestLimit {
    pub species: String,
    pub zone: String,
    pub season: String,
    pub max_quantity: f64,
    pub unit: String,
    /// Percentage; 0 means unset
    pub alert_threshold: f64,
    pub created_by: String,
}

impl NewHarvestLimit {
    pub fn validate(&self) -> Result<()> {
        require_non_blank("species", &self.species)?;
        require_non_blank("zone", &self.zone)?;
        require_non_blank("season", &self.season)?;
        require_non_blank("unit", &self.unit)?;
        if !(self.max_quantity.is_finite() && self.max_quantity > 0.0) {
            return Err(ComplianceError::validation(
                "maxQuantity",
                "must be greater than zero",
            ));
        }
        if !self.alert_threshold.is_finite() || self.alert_threshold < 0.0 {
            return Err(ComplianceError::validation(
                "alertThreshold",
                "must be a non-negative percentage",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestLimit {
    pub id: String,
    pub species: String,
    pub zone: String,
    pub season: String,
    pub max_quantity: f64,
    pub current_quantity: f64,
    pub unit: String,
    pub alert_threshold: f64,
    /// As of the last write
    pub status: LimitStatus,
    #[serde(default)]
    pub created_by: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl HarvestLimit {
    pub(crate) fn new(input: NewHarvestLimit, default_threshold: f64, now: DateTime<Utc>) -> Self {
        let alert_threshold = if input.alert_threshold == 0.0 {
            default_threshold
        } else {
            input.alert_threshold
        };
        Self {
            id: limit_key(&input.species, &input.zone, &input.season),
            species: input.species,
            zone: input.zone,
            season: input.season,
            max_quantity: input.max_quantity,
            current_quantity: 0.0,
            unit: input.unit,
            alert_threshold,
            status: LimitStatus::Normal,
            created_by: input.created_by,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn percentage_used(&self) -> f64 {
        self.current_quantity / self.max_quantity * 100.0
    }

    /// Whether adding `quantity` stays within the maximum.
    pub fn allows(&self, quantity: f64) -> bool {
        self.current_quantity + quantity <= self.max_quantity
    }

    /// Add to the accumulator and rederive status. Over-limit additions are
    /// recorded, not rejected.
    pub(crate) fn apply_quantity(&mut self, quantity: f64, now: DateTime<Utc>) {
        self.current_quantity += quantity;
        self.status = LimitStatus::from_usage(self.percentage_used(), self.alert_threshold);
        self.updated_at = now;
    }

    pub(crate) fn reset(&mut self, now: DateTime<Utc>) {
        self.current_quantity = 0.0;
        self.status = LimitStatus::Normal;
        self.updated_at = now;
    }
}

impl Document for HarvestLimit {
    const DOC_TYPE: &'static str = "HarvestLimit";

    fn id(&self) -> &str {
        &self.id
    }
}
