use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{debug, warn};

use crate::analytics::metrics::{
    evaluate, pair_metrics, rr_distribution, top_pairs, PairMetrics, PortfolioMetrics,
    RrDistribution, DEFAULT_RR_BINS, UNKNOWN_PAIR,
};
use crate::analytics::outcome::{
    infer_outcomes, outcome_coverage, outcome_stats, OutcomeCoverage, OutcomeStats,
};
use crate::analytics::winrate::{
    period_winrates, rolling_winrate, winrate_summary, winrate_trend, Period, PeriodWinrate,
    RollingPoint, TimeRange, WinrateSummary, WinrateTrend,
};
use crate::db::models::{signal, signal_update};

/// Knobs for one report run.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportOptions {
    pub timezone: Tz,
    pub time_range: TimeRange,
    pub period: Period,
    pub min_pair_signals: usize,
    pub top_pairs: usize,
    pub rolling_window: usize,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            time_range: TimeRange::All,
            period: Period::Daily,
            min_pair_signals: 3,
            top_pairs: 15,
            rolling_window: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingSummary {
    pub total_signals: usize,
    pub total_updates: usize,
    pub unique_pairs: usize,
    pub signals_with_outcomes: usize,
    pub open_signals: usize,
    pub first_signal_at: Option<DateTime<Utc>>,
    pub last_signal_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub timezone: String,
    pub time_range: TimeRange,
    pub period: Period,
    pub processing: ProcessingSummary,
    pub outcome_stats: OutcomeStats,
    pub coverage: OutcomeCoverage,
    pub portfolio: PortfolioMetrics,
    pub top_pairs: Vec<PairMetrics>,
    pub rr_distribution: Option<RrDistribution>,
    pub winrate_summary: Option<WinrateSummary>,
    pub period_winrates: Vec<PeriodWinrate>,
    pub winrate_trend: WinrateTrend,
    pub rolling_winrate: Vec<RollingPoint>,
}

impl Report {
    pub fn build(
        signals: &[signal::Model],
        updates: &[signal_update::Model],
        options: &ReportOptions,
        now: DateTime<Utc>,
    ) -> Self {
        let outcomes = infer_outcomes(updates);
        let coverage = outcome_coverage(&outcomes, signals);
        for warning in &coverage.warnings {
            warn!("{}", warning);
        }

        let rows = evaluate(signals, &outcomes);
        let undated = rows.iter().filter(|r| r.created_at.is_none()).count();
        if undated > 0 {
            debug!("{} signals have unparseable created_at", undated);
        }

        let pairs: BTreeSet<&str> = rows
            .iter()
            .map(|r| r.pair.as_str())
            .filter(|p| *p != UNKNOWN_PAIR)
            .collect();
        let portfolio = PortfolioMetrics::from_performance(&rows);

        let processing = ProcessingSummary {
            total_signals: signals.len(),
            total_updates: updates.len(),
            unique_pairs: pairs.len(),
            signals_with_outcomes: portfolio.closed_trades,
            open_signals: portfolio.open_signals,
            first_signal_at: rows.iter().filter_map(|r| r.created_at).min(),
            last_signal_at: rows.iter().filter_map(|r| r.created_at).max(),
        };

        let tz = options.timezone;
        let range = options.time_range;
        let periods = period_winrates(&rows, options.period, range, now, tz);
        let trend = winrate_trend(&periods);

        Report {
            generated_at: now,
            timezone: tz.name().to_string(),
            time_range: range,
            period: options.period,
            processing,
            outcome_stats: outcome_stats(&outcomes),
            coverage,
            top_pairs: top_pairs(pair_metrics(&rows, options.min_pair_signals), options.top_pairs),
            rr_distribution: rr_distribution(&rows, &DEFAULT_RR_BINS),
            winrate_summary: winrate_summary(&rows, range, now, tz),
            rolling_winrate: rolling_winrate(&rows, options.rolling_window, range, now, tz),
            period_winrates: periods,
            winrate_trend: trend,
            portfolio,
        }
    }

    pub fn latest_rolling_winrate(&self) -> Option<f64> {
        self.rolling_winrate.last().map(|p| p.rolling_winrate)
    }
}
