use serde::{Deserialize, Serialize};

use crate::aggregate::percentage;
use crate::models::{is_valid_score, QualityCheck, MAX_SCORE, MIN_SCORE};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBucket {
    pub score: u8,
    pub count: usize,
    pub percentage: f64,
}

/// Count of each exact overall score, ascending. Scores nobody received are
/// omitted rather than reported as zero.
pub fn score_distribution(records: &[QualityCheck]) -> Vec<ScoreBucket> {
    let mut counts = [0usize; MAX_SCORE as usize + 1];
    for check in records {
        debug_assert!(is_valid_score(check.overall_score));
        if let Some(slot) = counts.get_mut(usize::from(check.overall_score)) {
            *slot += 1;
        }
    }

    (MIN_SCORE..=MAX_SCORE)
        .filter_map(|score| {
            let count = counts[usize::from(score)];
            (count > 0).then(|| ScoreBucket {
                score,
                count,
                percentage: percentage(count, records.len()),
            })
        })
        .collect()
}
