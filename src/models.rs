use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RecordError;

pub const MIN_SCORE: u8 = 1;
pub const MAX_SCORE: u8 = 10;

pub fn is_valid_score(score: u8) -> bool {
    (MIN_SCORE..=MAX_SCORE).contains(&score)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl CheckStatus {
    pub const ALL: [CheckStatus; 4] = [
        CheckStatus::Open,
        CheckStatus::InProgress,
        CheckStatus::Resolved,
        CheckStatus::Closed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CheckStatus::Open => "open",
            CheckStatus::InProgress => "in_progress",
            CheckStatus::Resolved => "resolved",
            CheckStatus::Closed => "closed",
        }
    }

    /// Open and in-progress checks still need attention.
    pub fn is_unresolved(self) -> bool {
        matches!(self, CheckStatus::Open | CheckStatus::InProgress)
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckStatus {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "open" => Ok(CheckStatus::Open),
            "in_progress" => Ok(CheckStatus::InProgress),
            "resolved" => Ok(CheckStatus::Resolved),
            "closed" => Ok(CheckStatus::Closed),
            other => Err(RecordError::UnknownStatus(other.to_string())),
        }
    }
}

/// Optional per-dimension scores, each in [1, 10] when present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailScores {
    pub taste: Option<u8>,
    pub appearance: Option<u8>,
    pub temperature: Option<u8>,
    pub prep_time: Option<u8>,
    pub portion_size: Option<u8>,
}

impl DetailScores {
    pub fn values(&self) -> [Option<u8>; 5] {
        [
            self.taste,
            self.appearance,
            self.temperature,
            self.prep_time,
            self.portion_size,
        ]
    }

    /// Mean of the dimensions that were scored, `None` when none were.
    pub fn average(&self) -> Option<f64> {
        let present: Vec<u8> = self.values().into_iter().flatten().collect();
        if present.is_empty() {
            return None;
        }
        let total: u32 = present.iter().map(|&s| u32::from(s)).sum();
        Some(f64::from(total) / present.len() as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityCheck {
    pub id: Uuid,
    pub branch_id: Uuid,
    pub branch_name: String,
    pub chef_name: String,
    pub dish_name: String,
    pub overall_score: u8,
    pub details: DetailScores,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub status: CheckStatus,
}

impl QualityCheck {
    pub fn is_low_score(&self, threshold: f64) -> bool {
        f64::from(self.overall_score) < threshold
    }

    pub fn created_on(&self) -> NaiveDate {
        self.created_at.date_naive()
    }
}

/// Unvalidated submission, as it arrives from a form, CSV row or table row.
#[derive(Debug, Clone, Default)]
pub struct NewQualityCheck {
    pub id: Option<Uuid>,
    pub branch_id: Uuid,
    pub branch_name: String,
    pub chef_name: String,
    pub dish_name: String,
    pub overall_score: i64,
    pub taste: Option<i64>,
    pub appearance: Option<i64>,
    pub temperature: Option<i64>,
    pub prep_time: Option<i64>,
    pub portion_size: Option<i64>,
    pub notes: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub status: Option<String>,
}

impl NewQualityCheck {
    /// Trim, range-check and freeze into a [`QualityCheck`].
    ///
    /// A missing id gets a fresh v4 UUID, a missing timestamp becomes `now`
    /// and a missing status becomes `open`.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError`] for blank names, out-of-range scores or an
    /// unrecognized status string.
    pub fn validate(self, now: DateTime<Utc>) -> Result<QualityCheck, RecordError> {
        let branch_name = required_text("branch_name", &self.branch_name)?;
        let chef_name = required_text("chef_name", &self.chef_name)?;
        let dish_name = required_text("dish_name", &self.dish_name)?;

        let overall_score = score("overall", self.overall_score)?;
        let details = DetailScores {
            taste: optional_score("taste", self.taste)?,
            appearance: optional_score("appearance", self.appearance)?,
            temperature: optional_score("temperature", self.temperature)?,
            prep_time: optional_score("prep_time", self.prep_time)?,
            portion_size: optional_score("portion_size", self.portion_size)?,
        };

        let status = match self.status.as_deref() {
            Some(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ => CheckStatus::Open,
        };

        let notes = self
            .notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        Ok(QualityCheck {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            branch_id: self.branch_id,
            branch_name,
            chef_name,
            dish_name,
            overall_score,
            details,
            notes,
            created_at: self.created_at.unwrap_or(now),
            status,
        })
    }
}

fn required_text(field: &'static str, value: &str) -> Result<String, RecordError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(RecordError::EmptyField(field));
    }
    Ok(trimmed.to_string())
}

fn score(field: &'static str, value: i64) -> Result<u8, RecordError> {
    u8::try_from(value)
        .ok()
        .filter(|s| is_valid_score(*s))
        .ok_or(RecordError::ScoreOutOfRange { field, value })
}

fn optional_score(field: &'static str, value: Option<i64>) -> Result<Option<u8>, RecordError> {
    value.map(|v| score(field, v)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission() -> NewQualityCheck {
        NewQualityCheck {
            branch_id: Uuid::new_v4(),
            branch_name: " Haifa ".to_string(),
            chef_name: "Li".to_string(),
            dish_name: "Pad Thai".to_string(),
            overall_score: 8,
            ..NewQualityCheck::default()
        }
    }

    #[test]
    fn validate_trims_and_defaults() {
        let now = Utc::now();
        let check = submission().validate(now).unwrap();
        assert_eq!(check.branch_name, "Haifa");
        assert_eq!(check.status, CheckStatus::Open);
        assert_eq!(check.created_at, now);
        assert!(check.notes.is_none());
    }

    #[test]
    fn validate_rejects_blank_chef() {
        let mut raw = submission();
        raw.chef_name = "   ".to_string();
        assert_eq!(
            raw.validate(Utc::now()).unwrap_err(),
            RecordError::EmptyField("chef_name")
        );
    }

    #[test]
    fn validate_rejects_out_of_range_scores() {
        let mut raw = submission();
        raw.overall_score = 11;
        assert!(matches!(
            raw.validate(Utc::now()),
            Err(RecordError::ScoreOutOfRange { field: "overall", value: 11 })
        ));

        let mut raw = submission();
        raw.taste = Some(0);
        assert!(matches!(
            raw.validate(Utc::now()),
            Err(RecordError::ScoreOutOfRange { field: "taste", .. })
        ));
    }

    #[test]
    fn validate_parses_status() {
        let mut raw = submission();
        raw.status = Some("in_progress".to_string());
        assert_eq!(
            raw.validate(Utc::now()).unwrap().status,
            CheckStatus::InProgress
        );

        let mut raw = submission();
        raw.status = Some("archived".to_string());
        assert_eq!(
            raw.validate(Utc::now()).unwrap_err(),
            RecordError::UnknownStatus("archived".to_string())
        );
    }

    #[test]
    fn detail_average_ignores_missing_dimensions() {
        let details = DetailScores {
            taste: Some(8),
            temperature: Some(5),
            ..DetailScores::default()
        };
        assert_eq!(details.average(), Some(6.5));
        assert_eq!(DetailScores::default().average(), None);
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in CheckStatus::ALL {
            assert_eq!(status.as_str().parse::<CheckStatus>().unwrap(), status);
        }
    }
}
