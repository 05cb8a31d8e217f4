use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{is_valid_score, CheckStatus, QualityCheck, MAX_SCORE, MIN_SCORE};
use crate::settings::{validate_window_days, AlertThreshold};

/// Record predicates. Unset fields impose no constraint; set fields are ANDed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordFilter {
    pub branch_id: Option<Uuid>,
    pub branch_name: Option<String>,
    /// Case-insensitive substring of the chef name.
    pub chef_name_contains: Option<String>,
    pub dish_name: Option<String>,
    pub status: Option<CheckStatus>,
    pub score_min: Option<u8>,
    pub score_max: Option<u8>,
    /// Inclusive lower bound on `created_at`.
    pub date_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub date_to: Option<DateTime<Utc>>,
    pub low_scores_only: bool,
}

impl RecordFilter {
    pub fn score_bounds(&self) -> (u8, u8) {
        (
            self.score_min.unwrap_or(MIN_SCORE),
            self.score_max.unwrap_or(MAX_SCORE),
        )
    }

    /// # Errors
    ///
    /// Returns [`EngineError::InvertedScoreRange`] when `score_min > score_max`.
    pub fn validate(&self) -> Result<(), EngineError> {
        let (min, max) = self.score_bounds();
        if min > max {
            return Err(EngineError::InvertedScoreRange { min, max });
        }
        Ok(())
    }

    pub fn within(mut self, window: &AggregationWindow) -> Self {
        self.date_from = Some(window.start);
        self.date_to = Some(window.end);
        self
    }

    fn matches(&self, check: &QualityCheck, threshold: AlertThreshold, chef_needle: Option<&str>) -> bool {
        let (min, max) = self.score_bounds();

        if let Some(id) = self.branch_id {
            if check.branch_id != id {
                return false;
            }
        }
        if let Some(name) = &self.branch_name {
            if &check.branch_name != name {
                return false;
            }
        }
        if let Some(needle) = chef_needle {
            if !check.chef_name.to_lowercase().contains(needle) {
                return false;
            }
        }
        if let Some(dish) = &self.dish_name {
            if &check.dish_name != dish {
                return false;
            }
        }
        if let Some(status) = self.status {
            if check.status != status {
                return false;
            }
        }
        if check.overall_score < min || check.overall_score > max {
            return false;
        }
        if let Some(from) = self.date_from {
            if check.created_at < from {
                return false;
            }
        }
        if let Some(to) = self.date_to {
            if check.created_at >= to {
                return false;
            }
        }
        if self.low_scores_only && !check.is_low_score(threshold.value()) {
            return false;
        }
        true
    }
}

/// Keep the records that satisfy every predicate in `filter`, in input order.
///
/// # Errors
///
/// Returns [`EngineError::InvertedScoreRange`] before looking at any record
/// when the score bounds are inverted.
pub fn filter_records(
    records: &[QualityCheck],
    filter: &RecordFilter,
    threshold: AlertThreshold,
) -> Result<Vec<QualityCheck>, EngineError> {
    filter.validate()?;

    let chef_needle = filter.chef_name_contains.as_ref().map(|s| s.to_lowercase());

    Ok(records
        .iter()
        .filter(|check| {
            debug_assert!(is_valid_score(check.overall_score));
            filter.matches(check, threshold, chef_needle.as_deref())
        })
        .cloned()
        .collect())
}

/// Half-open time range `[start, end)` that an aggregate covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregationWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl AggregationWindow {
    /// The `days` immediately before `as_of`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidWindow`] for `days` outside
    /// `1..=MAX_WINDOW_DAYS`.
    pub fn trailing(as_of: DateTime<Utc>, days: i64) -> Result<Self, EngineError> {
        validate_window_days(days)?;
        Ok(Self {
            start: as_of - Duration::days(days),
            end: as_of,
        })
    }

    /// The window of equal length ending where this one starts.
    pub fn previous(&self) -> Self {
        let length = self.end - self.start;
        Self {
            start: self.start - length,
            end: self.start,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }

    pub fn select(&self, records: &[QualityCheck]) -> Vec<QualityCheck> {
        records
            .iter()
            .filter(|c| self.contains(c.created_at))
            .cloned()
            .collect()
    }
}
