//! Alert: compliance and system alerts with an active → acknowledged → resolved lifecycle

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{timestamp, Document};
use crate::error::ComplianceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    OverHarvest,
    QualityFailure,
    ZoneViolation,
    SeasonViolation,
    Compliance,
    System,
}

impl AlertType {
    pub const ALL: [AlertType; 6] = [
        AlertType::OverHarvest,
        AlertType::QualityFailure,
        AlertType::ZoneViolation,
        AlertType::SeasonViolation,
        AlertType::Compliance,
        AlertType::System,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::OverHarvest => "over_harvest",
            AlertType::QualityFailure => "quality_failure",
            AlertType::ZoneViolation => "zone_violation",
            AlertType::SeasonViolation => "season_violation",
            AlertType::Compliance => "compliance",
            AlertType::System => "system",
        }
    }
}

impl FromStr for AlertType {
    type Err = ComplianceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AlertType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ComplianceError::validation("alertType", format!("invalid alert type: {}", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl FromStr for Severity {
    type Err = ComplianceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .into_iter()
            .find(|sev| sev.as_str() == s)
            .ok_or_else(|| ComplianceError::validation("severity", format!("invalid severity: {}", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    pub const ALL: [AlertStatus; 3] = [
        AlertStatus::Active,
        AlertStatus::Acknowledged,
        AlertStatus::Resolved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
        }
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Submission for a new alert. Type and severity arrive as text and are validated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewAlert {
    pub id: String,
    pub alert_type: String,
    pub severity: String,
    pub entity_id: String,
    pub entity_type: String,
    pub species: Option<String>,
    pub zone: Option<String>,
    pub message: String,
    pub details: String,
    /// Defaults to `system`
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub alert_type: AlertType,
    pub severity: Severity,
    /// Subject of the alert. Lookup only; the subject's lifecycle does not touch the alert.
    #[serde(default)]
    pub entity_id: String,
    #[serde(default)]
    pub entity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub species: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    pub message: String,
    #[serde(default)]
    pub details: String,
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    pub status: AlertStatus,
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_by: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "timestamp::option"
    )]
    pub acknowledged_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "timestamp::option"
    )]
    pub resolved_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
}

impl Alert {
    pub(crate) fn new(
        input: NewAlert,
        alert_type: AlertType,
        severity: Severity,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: input.id,
            alert_type,
            severity,
            entity_id: input.entity_id,
            entity_type: input.entity_type,
            species: input.species,
            zone: input.zone,
            message: input.message,
            details: input.details,
            timestamp: now,
            status: AlertStatus::Active,
            created_by: input
                .created_by
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| "system".to_string()),
            acknowledged_by: None,
            acknowledged_date: None,
            resolved_by: None,
            resolved_date: None,
            resolution: None,
        }
    }

    /// active → acknowledged
    pub(crate) fn acknowledge(&mut self, user_id: &str, now: DateTime<Utc>) -> Result<(), ComplianceError> {
        if self.status != AlertStatus::Active {
            return Err(ComplianceError::InvalidState {
                id: self.id.clone(),
                status: self.status.to_string(),
                action: "acknowledge alert",
            });
        }
        self.status = AlertStatus::Acknowledged;
        self.acknowledged_by = Some(user_id.to_string());
        self.acknowledged_date = Some(now);
        Ok(())
    }

    /// active | acknowledged → resolved. An unacknowledged alert is acknowledged
    /// by the resolver at the resolution time.
    pub(crate) fn resolve(
        &mut self,
        user_id: &str,
        resolution: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ComplianceError> {
        if self.status == AlertStatus::Resolved {
            return Err(ComplianceError::InvalidState {
                id: self.id.clone(),
                status: self.status.to_string(),
                action: "resolve alert",
            });
        }
        self.status = AlertStatus::Resolved;
        self.resolved_by = Some(user_id.to_string());
        self.resolved_date = Some(now);
        self.resolution = Some(resolution.to_string());
        if self.acknowledged_by.is_none() {
            self.acknowledged_by = Some(user_id.to_string());
            self.acknowledged_date = Some(now);
        }
        Ok(())
    }
}

impl Document for Alert {
    const DOC_TYPE: &'static str = "Alert";

    fn id(&self) -> &str {
        &self.id
    }
}

/// Per-bucket counters. Every enumerated value has a field, so empty buckets read as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub active: usize,
    pub acknowledged: usize,
    pub resolved: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeverityCounts {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub critical: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct TypeCounts {
    pub over_harvest: usize,
    pub quality_failure: usize,
    pub zone_violation: usize,
    pub season_violation: usize,
    pub compliance: usize,
    pub system: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertStatistics {
    pub total: usize,
    pub by_status: StatusCounts,
    pub by_severity: SeverityCounts,
    pub by_type: TypeCounts,
}

impl AlertStatistics {
    pub fn record(&mut self, alert: &Alert) {
        self.total += 1;

        match alert.status {
            AlertStatus::Active => self.by_status.active += 1,
            AlertStatus::Acknowledged => self.by_status.acknowledged += 1,
            AlertStatus::Resolved => self.by_status.resolved += 1,
        }

        match alert.severity {
            Severity::Low => self.by_severity.low += 1,
            Severity::Medium => self.by_severity.medium += 1,
            Severity::High => self.by_severity.high += 1,
            Severity::Critical => self.by_severity.critical += 1,
        }

        let by_type = &mut self.by_type;
        match alert.alert_type {
            AlertType::OverHarvest => by_type.over_harvest += 1,
            AlertType::QualityFailure => by_type.quality_failure += 1,
            AlertType::ZoneViolation => by_type.zone_violation += 1,
            AlertType::SeasonViolation => by_type.season_violation += 1,
            AlertType::Compliance => by_type.compliance += 1,
            AlertType::System => by_type.system += 1,
        }
    }
}

impl<'a> FromIterator<&'a Alert> for AlertStatistics {
    fn from_iter<I: IntoIterator<Item = &'a Alert>>(iter: I) -> Self {
        let mut stats = AlertStatistics::default();
        for alert in iter {
            stats.record(alert);
        }
        stats
    }
}
