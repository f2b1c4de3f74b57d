use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analytics::outcome::{Outcome, SignalOutcome};
use crate::db::models::signal;
use crate::utils::parse_timestamp;

pub const UNKNOWN_PAIR: &str = "UNKNOWN";

/// Planned risk/reward of one signal, from its entry, targets and stops.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RiskReward {
    pub stop_used: Option<f64>,
    pub highest_target: Option<f64>,
    pub risk_distance: Option<f64>,
    pub rr_targets: [Option<f64>; 4],
    pub rr_planned: Option<f64>,
}

impl RiskReward {
    pub fn from_signal(signal: &signal::Model) -> Self {
        let stop_used = signal.stop1.or(signal.stop2);
        let targets = signal.targets();
        let highest_target = targets.iter().rev().flatten().next().copied();
        let risk_distance = stop_used.map(|stop| (signal.entry - stop).abs());

        let ratio = |target: Option<f64>| -> Option<f64> {
            match (target, risk_distance) {
                (Some(target), Some(risk)) if risk > 0.0 => Some((target - signal.entry).abs() / risk),
                _ => None,
            }
        };

        Self {
            stop_used,
            highest_target,
            risk_distance,
            rr_targets: targets.map(ratio),
            rr_planned: ratio(highest_target),
        }
    }

    /// RR actually achieved: the hit target's ratio, or -1 when stopped out.
    pub fn realized(&self, outcome: Option<Outcome>) -> Option<f64> {
        match outcome? {
            Outcome::StopLoss => Some(-1.0),
            Outcome::TakeProfit(level) => {
                let index = usize::from(level).checked_sub(1)?;
                self.rr_targets.get(index).copied().flatten()
            }
        }
    }
}

/// A signal joined with its inferred outcome and risk/reward.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalPerformance {
    pub signal_id: String,
    pub pair: String,
    pub created_at: Option<DateTime<Utc>>,
    pub outcome: Option<Outcome>,
    pub risk_reward: RiskReward,
    pub rr_realized: Option<f64>,
}

impl SignalPerformance {
    pub fn is_closed(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn is_winner(&self) -> bool {
        self.outcome.map_or(false, |o| o.is_win())
    }

    pub fn is_loser(&self) -> bool {
        self.outcome == Some(Outcome::StopLoss)
    }
}

pub fn evaluate(
    signals: &[signal::Model],
    outcomes: &BTreeMap<String, SignalOutcome>,
) -> Vec<SignalPerformance> {
    signals
        .iter()
        .map(|signal| {
            let outcome = outcomes.get(&signal.signal_id).map(|o| o.outcome);
            let risk_reward = RiskReward::from_signal(signal);
            let rr_realized = risk_reward.realized(outcome);
            let pair = signal.pair.trim().to_uppercase();

            SignalPerformance {
                signal_id: signal.signal_id.clone(),
                pair: if pair.is_empty() { UNKNOWN_PAIR.to_string() } else { pair },
                created_at: parse_timestamp(&signal.created_at),
                outcome,
                risk_reward,
                rr_realized,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PortfolioMetrics {
    pub total_signals: usize,
    pub closed_trades: usize,
    pub open_signals: usize,
    pub tp_hits: usize,
    pub sl_hits: usize,
    pub win_rate: f64,
    pub avg_rr_planned: Option<f64>,
    pub median_rr_planned: Option<f64>,
    pub min_rr_planned: Option<f64>,
    pub max_rr_planned: Option<f64>,
    pub avg_rr_realized: Option<f64>,
    pub total_realized_rr: Option<f64>,
}

impl PortfolioMetrics {
    pub fn from_performance<'a, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = &'a SignalPerformance>,
    {
        let mut metrics = PortfolioMetrics::default();
        let mut planned = Vec::new();
        let mut realized = Vec::new();

        for row in rows {
            metrics.total_signals += 1;
            if row.is_closed() {
                metrics.closed_trades += 1;
            }
            if row.is_winner() {
                metrics.tp_hits += 1;
            }
            if row.is_loser() {
                metrics.sl_hits += 1;
            }
            planned.extend(row.risk_reward.rr_planned);
            realized.extend(row.rr_realized);
        }

        metrics.open_signals = metrics.total_signals - metrics.closed_trades;
        if metrics.closed_trades > 0 {
            metrics.win_rate = metrics.tp_hits as f64 / metrics.closed_trades as f64 * 100.0;
        }

        metrics.avg_rr_planned = mean(&planned);
        metrics.median_rr_planned = median(&planned);
        metrics.min_rr_planned = planned.iter().copied().reduce(f64::min);
        metrics.max_rr_planned = planned.iter().copied().reduce(f64::max);
        metrics.avg_rr_realized = mean(&realized);
        metrics.total_realized_rr = (!realized.is_empty()).then(|| realized.iter().sum());

        metrics
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairMetrics {
    pub pair: String,
    #[serde(flatten)]
    pub metrics: PortfolioMetrics,
    pub score: f64,
}

/// Ranking score: win rate 40 %, activity 30 %, planned RR 30 %.
pub fn pair_score(metrics: &PortfolioMetrics) -> f64 {
    let win_rate = metrics.win_rate * 0.4;
    let volume = (metrics.total_signals as f64 / 10.0).min(100.0) * 0.3;
    let rr = (metrics.avg_rr_planned.unwrap_or(0.0) * 20.0).min(100.0) * 0.3;
    win_rate + volume + rr
}

/// Per-pair metrics for pairs with at least `min_signals` signals, best win rate first.
pub fn pair_metrics(rows: &[SignalPerformance], min_signals: usize) -> Vec<PairMetrics> {
    let mut by_pair: HashMap<&str, Vec<&SignalPerformance>> = HashMap::new();
    for row in rows.iter().filter(|r| r.pair != UNKNOWN_PAIR) {
        by_pair.entry(row.pair.as_str()).or_default().push(row);
    }

    let mut pairs: Vec<PairMetrics> = by_pair
        .into_iter()
        .filter(|(_, group)| group.len() >= min_signals)
        .map(|(pair, group)| {
            let metrics = PortfolioMetrics::from_performance(group);
            PairMetrics {
                pair: pair.to_string(),
                score: pair_score(&metrics),
                metrics,
            }
        })
        .collect();

    pairs.sort_by(|a, b| {
        b.metrics
            .win_rate
            .total_cmp(&a.metrics.win_rate)
            .then(b.metrics.total_signals.cmp(&a.metrics.total_signals))
            .then(a.pair.cmp(&b.pair))
    });
    pairs
}

/// The `limit` best pairs by score.
pub fn top_pairs(mut pairs: Vec<PairMetrics>, limit: usize) -> Vec<PairMetrics> {
    pairs.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.pair.cmp(&b.pair)));
    pairs.truncate(limit);
    pairs
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RrDistribution {
    pub buckets: Vec<(String, usize)>,
    pub total_signals: usize,
    pub avg_rr: f64,
    pub median_rr: f64,
}

pub const DEFAULT_RR_BINS: [f64; 7] = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, f64::INFINITY];

/// Histogram of planned RR over left-closed bins; the last bucket is labelled `a+`.
pub fn rr_distribution(rows: &[SignalPerformance], bins: &[f64]) -> Option<RrDistribution> {
    let planned: Vec<f64> = rows.iter().filter_map(|r| r.risk_reward.rr_planned).collect();
    if planned.is_empty() || bins.len() < 2 {
        return None;
    }

    let buckets = bins
        .windows(2)
        .enumerate()
        .map(|(i, edge)| {
            let label = if i == bins.len() - 2 {
                format!("{}+", edge[0])
            } else {
                format!("{}-{}", edge[0], edge[1])
            };
            let count = planned.iter().filter(|&&rr| rr >= edge[0] && rr < edge[1]).count();
            (label, count)
        })
        .collect();

    Some(RrDistribution {
        buckets,
        total_signals: planned.len(),
        avg_rr: mean(&planned)?,
        median_rr: median(&planned)?,
    })
}

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

pub(crate) fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}
