use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregate::{
    aggregate_by, group_quality, rank_groups, summarize, GroupKey, GroupQuality, PeriodSummary,
    RankOrder, RankedGroup,
};
use crate::alerts::{find_low_score_alerts, AlertQuery, LowScoreAlert, Severity};
use crate::distribution::{score_distribution, ScoreBucket};
use crate::error::EngineError;
use crate::filter::AggregationWindow;
use crate::models::QualityCheck;
use crate::settings::EngineSettings;
use crate::trend::{compute_trend, daily_series, SummaryTrend, TrendMetric, TrendPoint};

const RANKED_LIMIT: usize = 5;

/// Everything a dashboard page shows for one comparison window.
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub window: AggregationWindow,
    pub previous_window: AggregationWindow,
    pub summary: PeriodSummary,
    pub trend: SummaryTrend,
    pub top_branches: Vec<RankedGroup<String>>,
    pub bottom_branches: Vec<RankedGroup<String>>,
    pub worst_dishes: Vec<RankedGroup<String>>,
    pub branch_quality: BTreeMap<String, GroupQuality>,
    pub alerts: Vec<LowScoreAlert>,
    pub distribution: Vec<ScoreBucket>,
    pub daily: Vec<TrendPoint>,
}

/// Run every engine operation a dashboard needs over `records`.
///
/// `records` may span any range; each section selects its own window.
///
/// # Errors
///
/// Propagates [`EngineError`] for inconsistent settings.
pub fn build_dashboard(
    records: &[QualityCheck],
    settings: &EngineSettings,
    as_of: DateTime<Utc>,
) -> Result<Dashboard, EngineError> {
    settings.validate()?;
    let threshold = settings.alert_threshold;

    let window = AggregationWindow::trailing(as_of, settings.trend_window_days)?;
    let previous_window = window.previous();
    let current = window.select(records);
    let previous = previous_window.select(records);

    let summary = summarize(&current, threshold);
    let trend = compute_trend(
        &summary,
        &summarize(&previous, threshold),
        settings.trend_dead_band,
    )?;

    let branches = aggregate_by(&current, GroupKey::Branch);
    let dishes = aggregate_by(&current, GroupKey::Dish);
    let min_samples = settings.min_group_samples;

    Ok(Dashboard {
        window,
        previous_window,
        trend,
        top_branches: rank_groups(&branches, RankOrder::Best, min_samples, RANKED_LIMIT),
        bottom_branches: rank_groups(&branches, RankOrder::Worst, min_samples, RANKED_LIMIT),
        worst_dishes: rank_groups(&dishes, RankOrder::Worst, min_samples, RANKED_LIMIT),
        branch_quality: group_quality(&current, |c| Some(c.branch_name.clone()), threshold),
        alerts: find_low_score_alerts(records, &AlertQuery::from_settings(settings, as_of))?,
        distribution: score_distribution(&current),
        daily: daily_series(records, &window),
        summary,
    })
}

pub fn build_report(scope: Option<&str>, dashboard: &Dashboard) -> String {
    let mut output = String::new();
    let scope_label = scope.unwrap_or("all branches");
    let summary = &dashboard.summary;

    let _ = writeln!(output, "# Kitchen Quality Report");
    let _ = writeln!(
        output,
        "Generated for {} (checks from {} to {})",
        scope_label,
        dashboard.window.start.format("%Y-%m-%d %H:%M"),
        dashboard.window.end.format("%Y-%m-%d %H:%M")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overview");

    if summary.total_checks == 0 {
        let _ = writeln!(output, "No checks recorded for this window.");
    } else {
        let _ = writeln!(
            output,
            "- Checks: {} ({})",
            summary.total_checks,
            describe(&dashboard.trend.total_checks, 0)
        );
        if let Some(avg) = summary.average_score {
            let _ = writeln!(
                output,
                "- Average score: {:.2} ({})",
                avg,
                describe(&dashboard.trend.average_score, 2)
            );
        }
        let _ = writeln!(
            output,
            "- Low scores: {} ({:.1}%)",
            summary.low_score_count, summary.low_score_percentage
        );
        let statuses: Vec<String> = summary
            .status_breakdown
            .iter()
            .map(|(status, count)| format!("{status} {count}"))
            .collect();
        let _ = writeln!(output, "- Status: {}", statuses.join(", "));
    }

    write_ranked(&mut output, "Top Branches", &dashboard.top_branches);
    write_ranked(&mut output, "Bottom Branches", &dashboard.bottom_branches);
    write_ranked(&mut output, "Dishes Needing Attention", &dashboard.worst_dishes);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Open Alerts");

    if dashboard.alerts.is_empty() {
        let _ = writeln!(output, "No open low-score alerts.");
    } else {
        for alert in &dashboard.alerts {
            let check = &alert.check;
            let _ = writeln!(
                output,
                "- [{}] {} at {}: {} scored {}/10 on {}{}",
                alert.severity,
                check.chef_name,
                check.branch_name,
                check.dish_name,
                check.overall_score,
                check.created_at.format("%Y-%m-%d"),
                check
                    .notes
                    .as_deref()
                    .map(|n| format!(" ({n})"))
                    .unwrap_or_default()
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Score Distribution");

    if dashboard.distribution.is_empty() {
        let _ = writeln!(output, "No checks recorded for this window.");
    } else {
        for bucket in &dashboard.distribution {
            let _ = writeln!(
                output,
                "- {:>2}: {} ({:.1}%)",
                bucket.score, bucket.count, bucket.percentage
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Daily Averages");

    if dashboard.daily.is_empty() {
        let _ = writeln!(output, "No checks recorded for this window.");
    } else {
        for point in &dashboard.daily {
            let _ = writeln!(
                output,
                "- {}: {:.2} across {} checks",
                point.date.format("%d/%m"),
                point.average,
                point.count
            );
        }
    }

    output
}

fn write_ranked(output: &mut String, title: &str, groups: &[RankedGroup<String>]) {
    let _ = writeln!(output);
    let _ = writeln!(output, "## {title}");

    if groups.is_empty() {
        let _ = writeln!(output, "Not enough checks to rank.");
        return;
    }
    for group in groups {
        let _ = writeln!(
            output,
            "{}. {} avg {:.2} across {} checks (min {}, max {}, sd {:.2})",
            group.rank,
            group.key,
            group.stats.mean,
            group.stats.count,
            group.stats.min,
            group.stats.max,
            group.stats.stddev
        );
    }
}

fn describe(metric: &TrendMetric, decimals: usize) -> String {
    format!(
        "{} {:+.*} vs previous period, {:+.1}%",
        metric.direction.as_str(),
        decimals,
        metric.delta,
        metric.percentage
    )
}

/// Structured input handed to the narrative-summary service. Only numbers
/// and identifiers go in; the service owns all wording.
#[derive(Debug, Clone, Serialize)]
pub struct NarrativeInput {
    pub scope: String,
    pub window: AggregationWindow,
    pub summary: PeriodSummary,
    pub trend: SummaryTrend,
    pub top_branches: Vec<RankedGroup<String>>,
    pub bottom_branches: Vec<RankedGroup<String>>,
    pub worst_dishes: Vec<RankedGroup<String>>,
    pub alerts: Vec<AlertDigest>,
    pub distribution: Vec<ScoreBucket>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertDigest {
    pub severity: Severity,
    pub branch: String,
    pub chef: String,
    pub dish: String,
    pub score: u8,
    pub created_at: DateTime<Utc>,
    pub notes: Option<String>,
}

pub fn build_narrative_input(scope: Option<&str>, dashboard: &Dashboard) -> NarrativeInput {
    NarrativeInput {
        scope: scope.unwrap_or("all branches").to_string(),
        window: dashboard.window,
        summary: dashboard.summary.clone(),
        trend: dashboard.trend,
        top_branches: dashboard.top_branches.clone(),
        bottom_branches: dashboard.bottom_branches.clone(),
        worst_dishes: dashboard.worst_dishes.clone(),
        alerts: dashboard
            .alerts
            .iter()
            .map(|a| AlertDigest {
                severity: a.severity,
                branch: a.check.branch_name.clone(),
                chef: a.check.chef_name.clone(),
                dish: a.check.dish_name.clone(),
                score: a.check.overall_score,
                created_at: a.check.created_at,
                notes: a.check.notes.clone(),
            })
            .collect(),
        distribution: dashboard.distribution.clone(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::test_support::{as_of, check, sample_records};
    use crate::trend::TrendDirection;

    #[test]
    fn dashboard_compares_against_previous_week() {
        let mut records = sample_records();
        records.push(check("Haifa", "Li", "Pad Thai", 4, 24 * 8));
        records.push(check("Haifa", "Li", "Pad Thai", 4, 24 * 9));

        let dashboard = build_dashboard(&records, &EngineSettings::default(), as_of()).unwrap();
        // The 200h-old Savyon check lands in the previous week with the two added ones.
        assert_eq!(dashboard.summary.total_checks, 5);
        assert!((dashboard.trend.average_score.previous - 14.0 / 3.0).abs() < 1e-9);
        assert_eq!(dashboard.trend.average_score.direction, TrendDirection::Up);
        assert_eq!(dashboard.top_branches[0].key, "Herzliya");
        assert_eq!(dashboard.alerts.len(), 1);
        assert_eq!(dashboard.alerts[0].check.overall_score, 3);
    }

    #[test]
    fn empty_dashboard_renders_placeholders() {
        let dashboard = build_dashboard(&[], &EngineSettings::default(), as_of()).unwrap();
        let report = build_report(None, &dashboard);
        assert!(report.contains("all branches"));
        assert!(report.contains("No checks recorded for this window."));
        assert!(report.contains("Not enough checks to rank."));
        assert!(report.contains("No open low-score alerts."));
    }

    #[test]
    fn report_lists_alerts_with_severity() {
        let dashboard =
            build_dashboard(&sample_records(), &EngineSettings::default(), as_of()).unwrap();
        let report = build_report(Some("Haifa"), &dashboard);
        assert!(report.contains("Generated for Haifa"));
        assert!(report.contains("[critical] Zhang at Haifa: Gyoza scored 3/10"));
        assert!(report.contains("## Score Distribution"));
    }

    #[test]
    fn narrative_input_serializes_to_json() {
        let dashboard =
            build_dashboard(&sample_records(), &EngineSettings::default(), as_of()).unwrap();
        let input = build_narrative_input(None, &dashboard);
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["scope"], "all branches");
        assert_eq!(json["alerts"][0]["severity"], "critical");
        assert_eq!(json["summary"]["status_breakdown"]["open"], 3);
        assert!(json["trend"]["average_score"]["direction"].is_string());
    }

    #[test]
    fn daily_points_stay_inside_window() {
        let records = vec![
            check("A", "x", "d", 8, 1),
            check("A", "x", "d", 8, 24 * 10),
        ];
        let dashboard = build_dashboard(&records, &EngineSettings::default(), as_of()).unwrap();
        assert_eq!(dashboard.daily.len(), 1);
        assert_eq!(dashboard.daily[0].date, (as_of() - Duration::hours(1)).date_naive());
    }

    #[test]
    fn alerts_share_the_summary_window() {
        let records = vec![check("A", "x", "d", 2, -24), check("A", "x", "d", 2, 2)];
        let dashboard = build_dashboard(&records, &EngineSettings::default(), as_of()).unwrap();
        assert_eq!(dashboard.summary.total_checks, 1);
        assert_eq!(dashboard.alerts.len(), 1);
        assert!(dashboard.window.contains(dashboard.alerts[0].check.created_at));
    }
}
