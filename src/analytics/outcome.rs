//! Final outcome of each signal, inferred from the free-text `update_type` of its updates.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Serialize, Serializer};

use crate::db::models::{signal, signal_update};

/// Where a trade ended: stopped out, or the highest take-profit level reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Outcome {
    StopLoss,
    TakeProfit(u8),
}

impl Outcome {
    /// sl = 0, tp1..tp4 = 1..4.
    pub fn rank(&self) -> u8 {
        match self {
            Outcome::StopLoss => 0,
            Outcome::TakeProfit(level) => *level,
        }
    }

    pub fn is_win(&self) -> bool {
        matches!(self, Outcome::TakeProfit(_))
    }

    pub fn label(&self) -> String {
        match self {
            Outcome::StopLoss => "sl".to_string(),
            Outcome::TakeProfit(level) => format!("tp{}", level),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl Serialize for Outcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label())
    }
}

/// Classification of one raw `update_type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateClass {
    Outcome(Outcome),
    /// Anything else (status changes, comments), normalised to lower case.
    Other(String),
}

const TP_PATTERNS: [(&[&str], u8); 4] = [
    (&["tp4", "target 4", "target4", "t4"], 4),
    (&["tp3", "target 3", "target3", "t3"], 3),
    (&["tp2", "target 2", "target2", "t2"], 2),
    (&["tp1", "target 1", "target1", "t1"], 1),
];

const SL_PATTERNS: [&str; 4] = ["sl", "stop", "stop loss", "stoploss"];

const HIT_PATTERNS: [(&[&str], u8); 4] = [
    (&["4", "tp4", "target 4"], 4),
    (&["3", "tp3", "target 3"], 3),
    (&["2", "tp2", "target 2"], 2),
    (&["1", "tp1", "target 1"], 1),
];

/// Ordered substring rules: explicit targets first (highest level wins), then stop-loss,
/// then "hit"/"reached" phrases carrying a level digit.
pub fn classify_update_type(raw: &str) -> Option<UpdateClass> {
    let s = raw.trim().to_lowercase();
    if s.is_empty() {
        return None;
    }

    let contains_any = |patterns: &[&str]| patterns.iter().any(|p| s.contains(p));

    for (patterns, level) in TP_PATTERNS {
        if contains_any(patterns) {
            return Some(UpdateClass::Outcome(Outcome::TakeProfit(level)));
        }
    }

    if contains_any(&SL_PATTERNS) {
        return Some(UpdateClass::Outcome(Outcome::StopLoss));
    }

    if s.contains("hit") || s.contains("reached") {
        for (patterns, level) in HIT_PATTERNS {
            if contains_any(patterns) {
                return Some(UpdateClass::Outcome(Outcome::TakeProfit(level)));
            }
        }
    }

    Some(UpdateClass::Other(s))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalOutcome {
    pub outcome: Outcome,
    pub tp_level: u8,
}

/// Highest-ranked outcome per signal. Signals with no classified update are absent (open).
pub fn infer_outcomes(updates: &[signal_update::Model]) -> BTreeMap<String, SignalOutcome> {
    let mut outcomes: BTreeMap<String, SignalOutcome> = BTreeMap::new();

    for update in updates {
        let outcome = match classify_update_type(&update.update_type) {
            Some(UpdateClass::Outcome(outcome)) => outcome,
            _ => continue,
        };

        outcomes
            .entry(update.signal_id.clone())
            .and_modify(|current| {
                if outcome.rank() > current.outcome.rank() {
                    *current = SignalOutcome {
                        outcome,
                        tp_level: outcome.rank(),
                    };
                }
            })
            .or_insert(SignalOutcome {
                outcome,
                tp_level: outcome.rank(),
            });
    }

    outcomes
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OutcomeStats {
    pub total_outcomes: usize,
    pub tp_hits: usize,
    pub sl_hits: usize,
    pub distribution: BTreeMap<String, usize>,
    pub win_rate: f64,
}

pub fn outcome_stats(outcomes: &BTreeMap<String, SignalOutcome>) -> OutcomeStats {
    let mut stats = OutcomeStats {
        total_outcomes: outcomes.len(),
        ..Default::default()
    };

    for outcome in outcomes.values() {
        *stats.distribution.entry(outcome.outcome.label()).or_default() += 1;
        if outcome.outcome.is_win() {
            stats.tp_hits += 1;
        } else {
            stats.sl_hits += 1;
        }
    }

    let closed = stats.tp_hits + stats.sl_hits;
    if closed > 0 {
        stats.win_rate = stats.tp_hits as f64 / closed as f64 * 100.0;
    }

    stats
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OutcomeCoverage {
    pub coverage: f64,
    pub orphaned: usize,
    pub warnings: Vec<String>,
}

const LOW_COVERAGE: f64 = 50.0;

/// Share of signals with an inferred outcome, plus outcomes pointing at unknown signals.
pub fn outcome_coverage(
    outcomes: &BTreeMap<String, SignalOutcome>,
    signals: &[signal::Model],
) -> OutcomeCoverage {
    let mut coverage = OutcomeCoverage::default();

    if outcomes.is_empty() {
        coverage.warnings.push("No outcomes inferred".to_string());
        return coverage;
    }

    let known: HashSet<&str> = signals.iter().map(|s| s.signal_id.as_str()).collect();
    let covered = outcomes.keys().filter(|id| known.contains(id.as_str())).count();
    coverage.orphaned = outcomes.len() - covered;

    if !signals.is_empty() {
        coverage.coverage = covered as f64 / signals.len() as f64 * 100.0;
        if coverage.coverage < LOW_COVERAGE {
            coverage
                .warnings
                .push(format!("Low outcome coverage: {:.1}%", coverage.coverage));
        }
    }

    if coverage.orphaned > 0 {
        coverage.warnings.push(format!(
            "{} outcomes reference signals that are not stored",
            coverage.orphaned
        ));
    }

    coverage
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(signal_id: &str, message_id: i64, update_type: &str) -> signal_update::Model {
        signal_update::Model {
            signal_id: signal_id.to_string(),
            channel_id: 7,
            update_message_id: message_id,
            message_link: String::new(),
            update_type: update_type.to_string(),
            price: None,
            update_at: "2024-05-01T00:00:00Z".to_string(),
            raw_text: String::new(),
            reply_to_msg_id: None,
            linked_msg_id: None,
        }
    }

    fn tp(level: u8) -> Option<UpdateClass> {
        Some(UpdateClass::Outcome(Outcome::TakeProfit(level)))
    }

    #[test]
    fn classifies_target_spellings() {
        assert_eq!(classify_update_type("target1_hit"), tp(1));
        assert_eq!(classify_update_type("TP3"), tp(3));
        assert_eq!(classify_update_type("Target 4 done"), tp(4));
        assert_eq!(classify_update_type("t2"), tp(2));
    }

    #[test]
    fn classifies_stop_loss() {
        let sl = Some(UpdateClass::Outcome(Outcome::StopLoss));
        assert_eq!(classify_update_type("sl"), sl);
        assert_eq!(classify_update_type("stop_hit"), sl);
        assert_eq!(classify_update_type("Stoploss triggered"), sl);
    }

    #[test]
    fn classifies_hit_and_reached_phrases() {
        assert_eq!(classify_update_type("hit 2"), tp(2));
        assert_eq!(classify_update_type("reached 3"), tp(3));
    }

    #[test]
    fn keeps_other_updates_normalised() {
        assert_eq!(
            classify_update_type("  Status_Change "),
            Some(UpdateClass::Other("status_change".into()))
        );
        assert_eq!(classify_update_type("   "), None);
    }

    #[test]
    fn highest_rank_wins_per_signal() {
        let updates = vec![
            update("S1", 1, "target1_hit"),
            update("S1", 2, "target3_hit"),
            update("S1", 3, "target2_hit"),
            update("S2", 4, "stop_hit"),
            update("S3", 5, "status_change"),
        ];

        let outcomes = infer_outcomes(&updates);
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes["S1"].outcome, Outcome::TakeProfit(3));
        assert_eq!(outcomes["S1"].tp_level, 3);
        assert_eq!(outcomes["S2"].outcome, Outcome::StopLoss);
        assert!(!outcomes.contains_key("S3"));
    }

    #[test]
    fn take_profit_outranks_later_stop() {
        let outcomes = infer_outcomes(&[update("S1", 1, "tp1"), update("S1", 2, "sl")]);
        assert_eq!(outcomes["S1"].outcome, Outcome::TakeProfit(1));
    }

    #[test]
    fn stats_count_wins_and_losses() {
        let outcomes = infer_outcomes(&[
            update("S1", 1, "tp1"),
            update("S2", 2, "tp2"),
            update("S3", 3, "tp2"),
            update("S4", 4, "sl"),
        ]);

        let stats = outcome_stats(&outcomes);
        assert_eq!(stats.total_outcomes, 4);
        assert_eq!(stats.tp_hits, 3);
        assert_eq!(stats.sl_hits, 1);
        assert_eq!(stats.distribution["tp2"], 2);
        assert!((stats.win_rate - 75.0).abs() < 1e-9);
    }

    #[test]
    fn outcome_serializes_as_label() {
        assert_eq!(serde_json::to_string(&Outcome::TakeProfit(2)).unwrap(), "\"tp2\"");
        assert_eq!(serde_json::to_string(&Outcome::StopLoss).unwrap(), "\"sl\"");
    }

    #[test]
    fn coverage_warns_on_empty() {
        let coverage = outcome_coverage(&BTreeMap::new(), &[]);
        assert_eq!(coverage.warnings, vec!["No outcomes inferred".to_string()]);
    }
}
