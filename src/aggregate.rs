//! Grouping and summary statistics over `overall_score`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::models::{is_valid_score, CheckStatus, QualityCheck};
use crate::settings::AlertThreshold;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    pub count: usize,
    pub mean: f64,
    pub min: u8,
    pub max: u8,
    /// Sample standard deviation (n - 1); 0 for a single record.
    pub stddev: f64,
}

/// Integer running totals, so the result does not depend on record order.
#[derive(Debug, Clone, Copy)]
struct Accumulator {
    count: u64,
    sum: u64,
    sum_sq: u64,
    min: u8,
    max: u8,
}

impl Accumulator {
    fn new(score: u8) -> Self {
        let s = u64::from(score);
        Self {
            count: 1,
            sum: s,
            sum_sq: s * s,
            min: score,
            max: score,
        }
    }

    fn push(&mut self, score: u8) {
        let s = u64::from(score);
        self.count += 1;
        self.sum += s;
        self.sum_sq += s * s;
        self.min = self.min.min(score);
        self.max = self.max.max(score);
    }

    fn finish(self) -> GroupStats {
        let n = self.count as f64;
        let stddev = if self.count < 2 {
            0.0
        } else {
            // n * sum(x^2) - (sum x)^2 is exact and never negative in integers.
            let numerator = self.count * self.sum_sq - self.sum * self.sum;
            let denominator = self.count * (self.count - 1);
            (numerator as f64 / denominator as f64).sqrt()
        };
        GroupStats {
            count: self.count as usize,
            mean: self.sum as f64 / n,
            min: self.min,
            max: self.max,
            stddev,
        }
    }
}

/// Group records by `key_fn` and summarize each group's overall score.
///
/// Records for which `key_fn` returns `None` are outside the key's domain
/// and are skipped. Only non-empty groups appear in the result.
pub fn aggregate_by_key<K, F>(records: &[QualityCheck], key_fn: F) -> BTreeMap<K, GroupStats>
where
    K: Ord,
    F: Fn(&QualityCheck) -> Option<K>,
{
    let mut groups: BTreeMap<K, Accumulator> = BTreeMap::new();

    for check in records {
        debug_assert!(is_valid_score(check.overall_score));
        let Some(key) = key_fn(check) else {
            continue;
        };
        groups
            .entry(key)
            .and_modify(|acc| acc.push(check.overall_score))
            .or_insert_with(|| Accumulator::new(check.overall_score));
    }

    groups
        .into_iter()
        .map(|(key, acc)| (key, acc.finish()))
        .collect()
}

/// The three stock groupings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    Branch,
    Chef,
    Dish,
}

impl GroupKey {
    pub fn key_of(self, check: &QualityCheck) -> String {
        match self {
            GroupKey::Branch => check.branch_name.clone(),
            GroupKey::Chef => check.chef_name.clone(),
            GroupKey::Dish => check.dish_name.clone(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GroupKey::Branch => "branch",
            GroupKey::Chef => "chef",
            GroupKey::Dish => "dish",
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupKey {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "branch" => Ok(GroupKey::Branch),
            "chef" => Ok(GroupKey::Chef),
            "dish" => Ok(GroupKey::Dish),
            other => Err(EngineError::UnknownGroupKey(other.to_string())),
        }
    }
}

pub fn aggregate_by(records: &[QualityCheck], key: GroupKey) -> BTreeMap<String, GroupStats> {
    aggregate_by_key(records, |check| Some(key.key_of(check)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankOrder {
    /// Highest mean first.
    Best,
    /// Lowest mean first.
    Worst,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedGroup<K> {
    /// 1-based position after sorting.
    pub rank: usize,
    pub key: K,
    pub stats: GroupStats,
}

/// Order groups by mean, then by larger sample, then by key.
///
/// Groups with fewer than `min_samples` records are dropped before ranking.
pub fn rank_groups<K>(
    stats: &BTreeMap<K, GroupStats>,
    order: RankOrder,
    min_samples: usize,
    limit: usize,
) -> Vec<RankedGroup<K>>
where
    K: Ord + Clone,
{
    let mut eligible: Vec<(&K, &GroupStats)> = stats
        .iter()
        .filter(|(_, s)| s.count >= min_samples)
        .collect();

    eligible.sort_by(|(ka, a), (kb, b)| {
        let by_mean = match order {
            RankOrder::Best => b.mean.total_cmp(&a.mean),
            RankOrder::Worst => a.mean.total_cmp(&b.mean),
        };
        by_mean
            .then_with(|| b.count.cmp(&a.count))
            .then_with(|| ka.cmp(kb))
    });

    eligible
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(i, (key, stats))| RankedGroup {
            rank: i + 1,
            key: key.clone(),
            stats: *stats,
        })
        .collect()
}

/// Per-group stats plus low-score share, as shown in branch comparisons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupQuality {
    pub stats: GroupStats,
    pub low_score_count: usize,
    pub low_score_percentage: f64,
    pub last_check_at: DateTime<Utc>,
}

pub fn group_quality<K, F>(
    records: &[QualityCheck],
    key_fn: F,
    threshold: AlertThreshold,
) -> BTreeMap<K, GroupQuality>
where
    K: Ord,
    F: Fn(&QualityCheck) -> Option<K>,
{
    let mut extras: BTreeMap<K, (usize, DateTime<Utc>)> = BTreeMap::new();
    for check in records {
        let Some(key) = key_fn(check) else {
            continue;
        };
        let low = usize::from(check.is_low_score(threshold.value()));
        extras
            .entry(key)
            .and_modify(|(count, last)| {
                *count += low;
                *last = (*last).max(check.created_at);
            })
            .or_insert((low, check.created_at));
    }

    aggregate_by_key(records, &key_fn)
        .into_iter()
        .filter_map(|(key, stats)| {
            let (low_score_count, last_check_at) = extras.get(&key).copied()?;
            Some((
                key,
                GroupQuality {
                    stats,
                    low_score_count,
                    low_score_percentage: percentage(low_score_count, stats.count),
                    last_check_at,
                },
            ))
        })
        .collect()
}

/// Mean of each detail dimension over the records that scored it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailAverages {
    pub taste: Option<f64>,
    pub appearance: Option<f64>,
    pub temperature: Option<f64>,
    pub prep_time: Option<f64>,
    pub portion_size: Option<f64>,
}

/// Whole-window KPIs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSummary {
    pub total_checks: usize,
    /// Absent when the window has no records.
    pub average_score: Option<f64>,
    pub low_score_count: usize,
    pub low_score_percentage: f64,
    /// Every status is present, zero-filled.
    pub status_breakdown: BTreeMap<CheckStatus, usize>,
    pub detail_averages: DetailAverages,
}

pub fn summarize(records: &[QualityCheck], threshold: AlertThreshold) -> PeriodSummary {
    let mut status_breakdown: BTreeMap<CheckStatus, usize> =
        CheckStatus::ALL.iter().map(|s| (*s, 0)).collect();
    let mut sum: u64 = 0;
    let mut low_score_count = 0usize;
    let mut details = [(0u64, 0u64); 5];

    for check in records {
        debug_assert!(is_valid_score(check.overall_score));
        sum += u64::from(check.overall_score);
        if check.is_low_score(threshold.value()) {
            low_score_count += 1;
        }
        *status_breakdown.entry(check.status).or_insert(0) += 1;
        for (slot, value) in details.iter_mut().zip(check.details.values()) {
            if let Some(v) = value {
                slot.0 += u64::from(v);
                slot.1 += 1;
            }
        }
    }

    let total_checks = records.len();
    let average_score = mean(sum, total_checks as u64);
    let [taste, appearance, temperature, prep_time, portion_size] =
        details.map(|(total, n)| mean(total, n));

    PeriodSummary {
        total_checks,
        average_score,
        low_score_count,
        low_score_percentage: percentage(low_score_count, total_checks),
        status_breakdown,
        detail_averages: DetailAverages {
            taste,
            appearance,
            temperature,
            prep_time,
            portion_size,
        },
    }
}

fn mean(total: u64, n: u64) -> Option<f64> {
    (n > 0).then(|| total as f64 / n as f64)
}

/// `part / whole * 100`, or 0 for an empty whole.
pub(crate) fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DetailScores;
    use crate::test_support::{check, sample_records, with_status};

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn empty_input_yields_empty_map() {
        let stats = aggregate_by(&[], GroupKey::Branch);
        assert!(stats.is_empty());
    }

    #[test]
    fn branch_stats_match_hand_computation() {
        let stats = aggregate_by(&sample_records(), GroupKey::Branch);
        let haifa = stats["Haifa"];
        assert_eq!(haifa.count, 3);
        assert!(approx(haifa.mean, 17.0 / 3.0));
        assert_eq!((haifa.min, haifa.max), (3, 9));
        // scores 9, 3, 5: sample variance = 28/3
        assert!(approx(haifa.stddev, (28.0_f64 / 3.0).sqrt()));

        let savyon = stats["Savyon"];
        assert_eq!(savyon.count, 1);
        assert_eq!(savyon.stddev, 0.0);
    }

    #[test]
    fn counts_sum_to_record_total() {
        let records = sample_records();
        for key in [GroupKey::Branch, GroupKey::Chef, GroupKey::Dish] {
            let total: usize = aggregate_by(&records, key).values().map(|s| s.count).sum();
            assert_eq!(total, records.len(), "grouping by {key}");
        }
    }

    #[test]
    fn key_fn_domain_excludes_records() {
        let records = sample_records();
        let stats = aggregate_by_key(&records, |c| {
            (c.dish_name == "Pad Thai").then(|| c.branch_name.clone())
        });
        let total: usize = stats.values().map(|s| s.count).sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn generic_keys_work_with_non_string_types() {
        let stats = aggregate_by_key(&sample_records(), |c| Some(c.status));
        assert_eq!(stats[&CheckStatus::Open].count, 3);
        assert_eq!(stats[&CheckStatus::Closed].count, 1);
    }

    #[test]
    fn group_key_parses_known_names_only() {
        assert_eq!("Chef".parse::<GroupKey>().unwrap(), GroupKey::Chef);
        assert_eq!(
            "station".parse::<GroupKey>().unwrap_err(),
            EngineError::UnknownGroupKey("station".to_string())
        );
    }

    #[test]
    fn ranking_breaks_ties_by_count_then_key() {
        let records = vec![
            check("B", "x", "d", 8, 1),
            check("B", "x", "d", 8, 1),
            check("A", "x", "d", 8, 1),
            check("A", "x", "d", 8, 1),
            check("C", "x", "d", 8, 1),
            check("C", "x", "d", 8, 1),
            check("C", "x", "d", 8, 1),
            check("D", "x", "d", 9, 1),
        ];
        let stats = aggregate_by(&records, GroupKey::Branch);
        let ranked = rank_groups(&stats, RankOrder::Best, 1, 10);
        let keys: Vec<&str> = ranked.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["D", "C", "A", "B"]);
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[3].rank, 4);

        let worst = rank_groups(&stats, RankOrder::Worst, 1, 2);
        let keys: Vec<&str> = worst.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["C", "A"]);
    }

    #[test]
    fn ranking_respects_min_samples() {
        let stats = aggregate_by(&sample_records(), GroupKey::Branch);
        let ranked = rank_groups(&stats, RankOrder::Best, 2, 5);
        let keys: Vec<&str> = ranked.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["Herzliya", "Haifa"]);
    }

    #[test]
    fn group_quality_counts_low_scores() {
        let quality = group_quality(
            &sample_records(),
            |c| Some(c.branch_name.clone()),
            AlertThreshold::default(),
        );
        let haifa = &quality["Haifa"];
        assert_eq!(haifa.low_score_count, 2);
        assert!(approx(haifa.low_score_percentage, 200.0 / 3.0));
        assert_eq!(quality["Herzliya"].low_score_count, 0);
        assert_eq!(quality["Herzliya"].low_score_percentage, 0.0);
    }

    #[test]
    fn summarize_empty_is_well_formed() {
        let summary = summarize(&[], AlertThreshold::default());
        assert_eq!(summary.total_checks, 0);
        assert_eq!(summary.average_score, None);
        assert_eq!(summary.low_score_percentage, 0.0);
        assert_eq!(summary.status_breakdown.len(), 4);
        assert!(summary.status_breakdown.values().all(|&n| n == 0));
        assert_eq!(summary.detail_averages, DetailAverages::default());
    }

    #[test]
    fn summarize_counts_statuses_and_details() {
        let mut scored = check("A", "x", "d", 4, 1);
        scored.details = DetailScores {
            taste: Some(6),
            ..DetailScores::default()
        };
        let records = vec![
            scored,
            with_status(check("A", "x", "d", 8, 1), CheckStatus::Resolved),
        ];
        let summary = summarize(&records, AlertThreshold::default());
        assert_eq!(summary.total_checks, 2);
        assert_eq!(summary.average_score, Some(6.0));
        assert_eq!(summary.low_score_count, 1);
        assert_eq!(summary.low_score_percentage, 50.0);
        assert_eq!(summary.status_breakdown[&CheckStatus::Open], 1);
        assert_eq!(summary.status_breakdown[&CheckStatus::Resolved], 1);
        assert_eq!(summary.detail_averages.taste, Some(6.0));
        assert_eq!(summary.detail_averages.appearance, None);
    }

    #[test]
    fn repeated_calls_are_identical() {
        let records = sample_records();
        let first = aggregate_by(&records, GroupKey::Dish);
        let second = aggregate_by(&records, GroupKey::Dish);
        for (a, b) in first.values().zip(second.values()) {
            assert_eq!(a.mean.to_bits(), b.mean.to_bits());
            assert_eq!(a.stddev.to_bits(), b.stddev.to_bits());
        }
        assert_eq!(first, second);
    }
}
