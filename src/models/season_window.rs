//! SeasonWindow: recurring annual permitted-harvest interval

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{timestamp, Document};
use crate::error::{require_non_blank, ComplianceError, Result};

/// Create/update payload. Omitted fields take their defaults, so an update
/// that leaves out `active` deactivates the window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeasonWindowInput {
    pub id: String,
    pub species: String,
    pub region: String,
    pub start_month: u32,
    pub end_month: u32,
    pub active: bool,
    pub created_by: String,
}

impl SeasonWindowInput {
    pub fn validate(&self) -> Result<()> {
        require_non_blank("species", &self.species)?;
        require_non_blank("region", &self.region)?;
        validate_month("startMonth", self.start_month)?;
        validate_month("endMonth", self.end_month)
    }
}

fn validate_month(field: &'static str, month: u32) -> Result<()> {
    if !(1..=12).contains(&month) {
        return Err(ComplianceError::validation(
            field,
            format!("must be between 1 and 12, got {}", month),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonWindow {
    pub id: String,
    pub species: String,
    pub region: String,
    pub start_month: u32,
    pub end_month: u32,
    pub active: bool,
    #[serde(default)]
    pub created_by: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl SeasonWindow {
    /// New windows are always active.
    pub(crate) fn new(input: SeasonWindowInput, now: DateTime<Utc>) -> Self {
        Self {
            id: input.id,
            species: input.species,
            region: input.region,
            start_month: input.start_month,
            end_month: input.end_month,
            active: true,
            created_by: input.created_by,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace every payload field. `id` and `created_at` are kept.
    pub(crate) fn overwrite(&mut self, input: SeasonWindowInput, now: DateTime<Utc>) {
        self.species = input.species;
        self.region = input.region;
        self.start_month = input.start_month;
        self.end_month = input.end_month;
        self.active = input.active;
        self.created_by = input.created_by;
        self.updated_at = now;
    }

    /// Month membership. A window with `start_month > end_month` crosses the
    /// year boundary: 11→2 covers Nov, Dec, Jan and Feb.
    pub fn contains_month(&self, month: u32) -> bool {
        if self.start_month <= self.end_month {
            self.start_month <= month && month <= self.end_month
        } else {
            month >= self.start_month || month <= self.end_month
        }
    }
}

impl Document for SeasonWindow {
    const DOC_TYPE: &'static str = "SeasonWindow";

    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(start: u32, end: u32) -> SeasonWindow {
        SeasonWindow::new(
            SeasonWindowInput {
                id: "SW-1".into(),
                species: "Brahmi".into(),
                region: "Kerala".into(),
                start_month: start,
                end_month: end,
                ..Default::default()
            },
            timestamp::now(),
        )
    }

    #[test]
    fn test_simple_range() {
        let w = window(4, 9);
        assert!(w.contains_month(4));
        assert!(w.contains_month(6));
        assert!(w.contains_month(9));
        assert!(!w.contains_month(3));
        assert!(!w.contains_month(10));
    }

    #[test]
    fn test_wrap_around_range() {
        let w = window(11, 2);
        for month in [11, 12, 1, 2] {
            assert!(w.contains_month(month), "month {}", month);
        }
        for month in 3..=10 {
            assert!(!w.contains_month(month), "month {}", month);
        }
    }

    #[test]
    fn test_single_month() {
        let w = window(7, 7);
        assert!(w.contains_month(7));
        assert!(!w.contains_month(8));
    }

    #[test]
    fn test_create_forces_active() {
        assert!(window(1, 3).active);
    }

    #[test]
    fn test_overwrite_resets_omitted_active() {
        let mut w = window(1, 3);
        let created = w.created_at;
        let later = created + chrono::Duration::seconds(5);
        w.overwrite(
            SeasonWindowInput {
                species: "Brahmi".into(),
                region: "Kerala".into(),
                start_month: 2,
                end_month: 4,
                ..Default::default()
            },
            later,
        );
        assert!(!w.active);
        assert_eq!(w.id, "SW-1");
        assert_eq!(w.created_at, created);
        assert_eq!(w.updated_at, later);
        assert_eq!((w.start_month, w.end_month), (2, 4));
    }

    #[test]
    fn test_validate_month_bounds() {
        let mut input = SeasonWindowInput {
            species: "Brahmi".into(),
            region: "Kerala".into(),
            start_month: 0,
            end_month: 5,
            ..Default::default()
        };
        assert!(matches!(
            input.validate(),
            Err(ComplianceError::Validation { field: "startMonth", .. })
        ));
        input.start_month = 1;
        input.end_month = 13;
        assert!(matches!(
            input.validate(),
            Err(ComplianceError::Validation { field: "endMonth", .. })
        ));
        input.end_month = 12;
        assert!(input.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_region() {
        let input = SeasonWindowInput {
            species: "Brahmi".into(),
            region: " ".into(),
            start_month: 1,
            end_month: 2,
            ..Default::default()
        };
        assert!(matches!(
            input.validate(),
            Err(ComplianceError::Validation { field: "region", .. })
        ));
    }
}
