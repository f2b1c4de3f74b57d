use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::analytics::metrics::{mean, SignalPerformance};
use crate::analytics::outcome::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Daily,
    /// Weeks start on Monday.
    Weekly,
    Monthly,
}

impl Period {
    pub fn label(&self) -> &'static str {
        match self {
            Period::Daily => "Daily",
            Period::Weekly => "Weekly",
            Period::Monthly => "Monthly",
        }
    }

    fn bucket_start(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Period::Daily => date,
            Period::Weekly => date - Duration::days(i64::from(date.weekday().num_days_from_monday())),
            Period::Monthly => date.with_day(1).unwrap_or(date),
        }
    }

    fn bucket_label(&self, start: NaiveDate) -> String {
        match self {
            Period::Daily => start.format("%Y-%m-%d").to_string(),
            Period::Weekly => format!(
                "{}/{}",
                start.format("%Y-%m-%d"),
                (start + Duration::days(6)).format("%Y-%m-%d")
            ),
            Period::Monthly => start.format("%Y-%m").to_string(),
        }
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "d" | "daily" => Ok(Period::Daily),
            "w" | "weekly" => Ok(Period::Weekly),
            "m" | "monthly" => Ok(Period::Monthly),
            other => Err(format!("unknown period '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeRange {
    All,
    YearToDate,
    MonthToDate,
    Last30Days,
    Last7Days,
    /// Inclusive calendar dates in the report timezone.
    Custom {
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    },
}

impl TimeRange {
    pub fn label(&self) -> &'static str {
        match self {
            TimeRange::All => "All Time",
            TimeRange::YearToDate => "Year to Date",
            TimeRange::MonthToDate => "Month to Date",
            TimeRange::Last30Days => "Last 30 Days",
            TimeRange::Last7Days => "Last 7 Days",
            TimeRange::Custom { .. } => "Custom Range",
        }
    }

    /// Whether a creation time falls inside the range. Undated rows only count for `All`.
    pub fn contains(&self, created_at: Option<DateTime<Utc>>, now: DateTime<Utc>, tz: Tz) -> bool {
        let ts = match (self, created_at) {
            (TimeRange::All, _) => return true,
            (_, None) => return false,
            (_, Some(ts)) => ts,
        };

        let date = ts.with_timezone(&tz).date_naive();
        let today = now.with_timezone(&tz).date_naive();

        match self {
            TimeRange::All => true,
            TimeRange::YearToDate => date.year() == today.year() && date <= today,
            TimeRange::MonthToDate => {
                date.year() == today.year() && date.month() == today.month() && date <= today
            }
            TimeRange::Last30Days => ts >= now - Duration::days(30) && ts <= now,
            TimeRange::Last7Days => ts >= now - Duration::days(7) && ts <= now,
            TimeRange::Custom { from, to } => {
                from.map_or(true, |from| date >= from) && to.map_or(true, |to| date <= to)
            }
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TimeRange {
    type Err = String;

    /// `all`, `ytd`, `mtd`, `30d`, `7d`, or `FROM..TO` with either date optional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "all" => return Ok(TimeRange::All),
            "ytd" => return Ok(TimeRange::YearToDate),
            "mtd" => return Ok(TimeRange::MonthToDate),
            "30d" => return Ok(TimeRange::Last30Days),
            "7d" => return Ok(TimeRange::Last7Days),
            _ => {}
        }

        let (from, to) = s
            .split_once("..")
            .ok_or_else(|| format!("unknown time range '{}'", s))?;
        let parse = |raw: &str| -> Result<Option<NaiveDate>, String> {
            if raw.is_empty() {
                return Ok(None);
            }
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(Some)
                .map_err(|e| format!("bad date '{}': {}", raw, e))
        };

        Ok(TimeRange::Custom {
            from: parse(from.trim())?,
            to: parse(to.trim())?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodWinrate {
    pub period_start: NaiveDate,
    pub label: String,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub winrate: f64,
}

fn closed_in_range<'a>(
    rows: &'a [SignalPerformance],
    range: TimeRange,
    now: DateTime<Utc>,
    tz: Tz,
) -> impl Iterator<Item = &'a SignalPerformance> + 'a {
    rows.iter()
        .filter(|r| r.is_closed())
        .filter(move |r| range.contains(r.created_at, now, tz))
}

/// Win rate of closed trades per day, week or month of creation.
pub fn period_winrates(
    rows: &[SignalPerformance],
    period: Period,
    range: TimeRange,
    now: DateTime<Utc>,
    tz: Tz,
) -> Vec<PeriodWinrate> {
    let mut buckets: BTreeMap<NaiveDate, (usize, usize)> = BTreeMap::new();

    for row in closed_in_range(rows, range, now, tz) {
        let Some(created_at) = row.created_at else {
            continue;
        };
        let start = period.bucket_start(created_at.with_timezone(&tz).date_naive());
        let bucket = buckets.entry(start).or_default();
        bucket.0 += 1;
        if row.is_winner() {
            bucket.1 += 1;
        }
    }

    buckets
        .into_iter()
        .map(|(start, (total, wins))| PeriodWinrate {
            period_start: start,
            label: period.bucket_label(start),
            total_trades: total,
            winning_trades: wins,
            winrate: round_to(wins as f64 / total as f64 * 100.0, 2),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    StronglyImproving,
    Improving,
    Stable,
    Declining,
    StronglyDeclining,
    InsufficientData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WinrateTrend {
    pub trend: Trend,
    pub slope: f64,
    pub current_winrate: Option<f64>,
    pub recent_avg_winrate: Option<f64>,
    pub overall_avg_winrate: Option<f64>,
    pub trend_strength: f64,
}

const RECENT_PERIODS: usize = 5;

/// Least-squares slope of the per-period win rates, in percentage points per period.
pub fn winrate_trend(periods: &[PeriodWinrate]) -> WinrateTrend {
    let ys: Vec<f64> = periods.iter().map(|p| p.winrate).filter(|y| y.is_finite()).collect();

    if ys.len() < 2 {
        return WinrateTrend {
            trend: Trend::InsufficientData,
            slope: 0.0,
            current_winrate: None,
            recent_avg_winrate: None,
            overall_avg_winrate: None,
            trend_strength: 0.0,
        };
    }

    let n = ys.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = ys.iter().sum::<f64>() / n;
    let (num, den) = ys.iter().enumerate().fold((0.0, 0.0), |(num, den), (x, y)| {
        let dx = x as f64 - x_mean;
        (num + dx * (y - y_mean), den + dx * dx)
    });
    let slope = num / den;

    let trend = if slope > 2.0 {
        Trend::StronglyImproving
    } else if slope > 0.5 {
        Trend::Improving
    } else if slope < -2.0 {
        Trend::StronglyDeclining
    } else if slope < -0.5 {
        Trend::Declining
    } else {
        Trend::Stable
    };

    let recent = &ys[ys.len().saturating_sub(RECENT_PERIODS)..];

    WinrateTrend {
        trend,
        slope: round_to(slope, 3),
        current_winrate: ys.last().copied(),
        recent_avg_winrate: mean(recent).map(|v| round_to(v, 2)),
        overall_avg_winrate: Some(round_to(y_mean, 2)),
        trend_strength: slope.abs(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WinrateSummary {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub overall_winrate: f64,
    pub tp1_count: usize,
    pub tp2_count: usize,
    pub tp3_count: usize,
    pub tp4_count: usize,
    pub sl_count: usize,
    pub time_range: TimeRange,
}

/// Totals over closed trades in range; `None` when there are none.
pub fn winrate_summary(
    rows: &[SignalPerformance],
    range: TimeRange,
    now: DateTime<Utc>,
    tz: Tz,
) -> Option<WinrateSummary> {
    let mut summary = WinrateSummary {
        total_trades: 0,
        winning_trades: 0,
        losing_trades: 0,
        overall_winrate: 0.0,
        tp1_count: 0,
        tp2_count: 0,
        tp3_count: 0,
        tp4_count: 0,
        sl_count: 0,
        time_range: range,
    };

    for row in closed_in_range(rows, range, now, tz) {
        summary.total_trades += 1;
        match row.outcome {
            Some(Outcome::TakeProfit(level)) => {
                summary.winning_trades += 1;
                match level {
                    1 => summary.tp1_count += 1,
                    2 => summary.tp2_count += 1,
                    3 => summary.tp3_count += 1,
                    4 => summary.tp4_count += 1,
                    _ => {}
                }
            }
            Some(Outcome::StopLoss) => summary.sl_count += 1,
            None => {}
        }
    }

    if summary.total_trades == 0 {
        return None;
    }

    summary.losing_trades = summary.total_trades - summary.winning_trades;
    summary.overall_winrate = round_to(
        summary.winning_trades as f64 / summary.total_trades as f64 * 100.0,
        2,
    );
    Some(summary)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollingPoint {
    pub signal_id: String,
    pub created_at: DateTime<Utc>,
    pub is_winner: bool,
    pub rolling_winrate: f64,
}

/// Trailing win rate over the last `window` closed trades (shorter at the start).
pub fn rolling_winrate(
    rows: &[SignalPerformance],
    window: usize,
    range: TimeRange,
    now: DateTime<Utc>,
    tz: Tz,
) -> Vec<RollingPoint> {
    let window = window.max(1);
    let mut closed: Vec<(DateTime<Utc>, &SignalPerformance)> = closed_in_range(rows, range, now, tz)
        .filter_map(|r| r.created_at.map(|ts| (ts, r)))
        .collect();
    closed.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.signal_id.cmp(&b.1.signal_id)));

    let wins: Vec<bool> = closed.iter().map(|(_, r)| r.is_winner()).collect();

    closed
        .iter()
        .enumerate()
        .map(|(i, (ts, row))| {
            let start = (i + 1).saturating_sub(window);
            let slice = &wins[start..=i];
            let won = slice.iter().filter(|w| **w).count();
            RollingPoint {
                signal_id: row.signal_id.clone(),
                created_at: *ts,
                is_winner: wins[i],
                rolling_winrate: won as f64 / slice.len() as f64 * 100.0,
            }
        })
        .collect()
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::metrics::RiskReward;
    use chrono::TimeZone;

    fn row(id: &str, created_at: Option<DateTime<Utc>>, outcome: Option<Outcome>) -> SignalPerformance {
        SignalPerformance {
            signal_id: id.to_string(),
            pair: "BTCUSDT".to_string(),
            created_at,
            outcome,
            risk_reward: RiskReward::default(),
            rr_realized: None,
        }
    }

    fn at(y: i32, m: u32, d: u32) -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap())
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 15, 12, 0, 0).unwrap()
    }

    const TP1: Option<Outcome> = Some(Outcome::TakeProfit(1));
    const TP3: Option<Outcome> = Some(Outcome::TakeProfit(3));
    const SL: Option<Outcome> = Some(Outcome::StopLoss);

    #[test]
    fn parses_ranges_and_periods() {
        assert_eq!("YTD".parse(), Ok(TimeRange::YearToDate));
        assert_eq!("7d".parse(), Ok(TimeRange::Last7Days));
        assert_eq!(
            "2024-01-01..".parse(),
            Ok(TimeRange::Custom {
                from: NaiveDate::from_ymd_opt(2024, 1, 1),
                to: None
            })
        );
        assert!("fortnight".parse::<TimeRange>().is_err());
        assert_eq!("W".parse(), Ok(Period::Weekly));
        assert!("Q".parse::<Period>().is_err());
    }

    #[test]
    fn ranges_filter_relative_to_now() {
        let tz = Tz::UTC;
        assert!(TimeRange::YearToDate.contains(at(2024, 1, 2), now(), tz));
        assert!(!TimeRange::YearToDate.contains(at(2023, 12, 31), now(), tz));
        assert!(TimeRange::MonthToDate.contains(at(2024, 5, 1), now(), tz));
        assert!(!TimeRange::MonthToDate.contains(at(2024, 4, 30), now(), tz));
        assert!(TimeRange::Last7Days.contains(at(2024, 5, 9), now(), tz));
        assert!(!TimeRange::Last7Days.contains(at(2024, 5, 7), now(), tz));
        assert!(TimeRange::All.contains(None, now(), tz));
        assert!(!TimeRange::Last30Days.contains(None, now(), tz));
    }

    #[test]
    fn custom_range_includes_whole_last_day() {
        let range: TimeRange = "2024-05-01..2024-05-10".parse().unwrap();
        let late = Some(Utc.with_ymd_and_hms(2024, 5, 10, 23, 59, 0).unwrap());
        assert!(range.contains(late, now(), Tz::UTC));
        assert!(!range.contains(at(2024, 5, 11), now(), Tz::UTC));
    }

    #[test]
    fn timezone_moves_day_boundaries() {
        // 2024-04-30 20:00 UTC is already May 1st in Jakarta.
        let ts = Some(Utc.with_ymd_and_hms(2024, 4, 30, 20, 0, 0).unwrap());
        assert!(!TimeRange::MonthToDate.contains(ts, now(), Tz::UTC));
        assert!(TimeRange::MonthToDate.contains(ts, now(), chrono_tz::Asia::Jakarta));
    }

    #[test]
    fn daily_buckets_skip_open_trades() {
        let rows = vec![
            row("a", at(2024, 5, 1), TP1),
            row("b", at(2024, 5, 1), SL),
            row("c", at(2024, 5, 1), None),
            row("d", at(2024, 5, 2), TP3),
        ];

        let daily = period_winrates(&rows, Period::Daily, TimeRange::All, now(), Tz::UTC);
        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0].label, "2024-05-01");
        assert_eq!((daily[0].total_trades, daily[0].winning_trades), (2, 1));
        assert_eq!(daily[0].winrate, 50.0);
        assert_eq!(daily[1].winrate, 100.0);
    }

    #[test]
    fn weekly_and_monthly_buckets() {
        // 2024-05-05 is a Sunday, 2024-05-06 a Monday.
        let rows = vec![
            row("a", at(2024, 5, 5), TP1),
            row("b", at(2024, 5, 6), SL),
            row("c", at(2024, 6, 1), TP1),
        ];

        let weekly = period_winrates(&rows, Period::Weekly, TimeRange::All, now(), Tz::UTC);
        assert_eq!(weekly.len(), 3);
        assert_eq!(weekly[0].label, "2024-04-29/2024-05-05");
        assert_eq!(weekly[1].period_start, NaiveDate::from_ymd_opt(2024, 5, 6).unwrap());

        let monthly = period_winrates(&rows, Period::Monthly, TimeRange::All, now(), Tz::UTC);
        assert_eq!(monthly.len(), 2);
        assert_eq!(monthly[0].label, "2024-05");
        assert_eq!(monthly[0].winrate, 50.0);
    }

    fn periods(winrates: &[f64]) -> Vec<PeriodWinrate> {
        winrates
            .iter()
            .enumerate()
            .map(|(i, w)| PeriodWinrate {
                period_start: NaiveDate::from_ymd_opt(2024, 1, 1 + i as u32).unwrap(),
                label: String::new(),
                total_trades: 1,
                winning_trades: 0,
                winrate: *w,
            })
            .collect()
    }

    #[test]
    fn trend_classifies_slope() {
        let trend = winrate_trend(&periods(&[40.0, 50.0, 60.0]));
        assert_eq!(trend.trend, Trend::StronglyImproving);
        assert_eq!(trend.slope, 10.0);
        assert_eq!(trend.current_winrate, Some(60.0));
        assert_eq!(trend.overall_avg_winrate, Some(50.0));

        assert_eq!(winrate_trend(&periods(&[50.0, 49.0])).trend, Trend::Declining);
        assert_eq!(winrate_trend(&periods(&[50.0, 50.2])).trend, Trend::Stable);
        assert_eq!(winrate_trend(&periods(&[50.0])).trend, Trend::InsufficientData);
    }

    #[test]
    fn trend_recent_average_uses_last_five() {
        let trend = winrate_trend(&periods(&[0.0, 10.0, 10.0, 10.0, 10.0, 10.0]));
        assert_eq!(trend.recent_avg_winrate, Some(10.0));
    }

    #[test]
    fn summary_breaks_down_levels() {
        let rows = vec![
            row("a", at(2024, 5, 1), TP1),
            row("b", at(2024, 5, 2), TP3),
            row("c", at(2024, 5, 3), SL),
            row("d", at(2024, 5, 4), None),
            row("e", at(2023, 5, 4), SL),
        ];

        let summary = winrate_summary(&rows, TimeRange::YearToDate, now(), Tz::UTC).unwrap();
        assert_eq!(summary.total_trades, 3);
        assert_eq!(summary.winning_trades, 2);
        assert_eq!(summary.losing_trades, 1);
        assert_eq!(summary.overall_winrate, 66.67);
        assert_eq!((summary.tp1_count, summary.tp3_count, summary.sl_count), (1, 1, 1));

        assert!(winrate_summary(&rows[3..4], TimeRange::All, now(), Tz::UTC).is_none());
    }

    #[test]
    fn rolling_window_trails() {
        let rows = vec![
            row("c", at(2024, 5, 3), SL),
            row("a", at(2024, 5, 1), TP1),
            row("b", at(2024, 5, 2), TP1),
        ];

        let points = rolling_winrate(&rows, 2, TimeRange::All, now(), Tz::UTC);
        let rates: Vec<f64> = points.iter().map(|p| p.rolling_winrate).collect();
        assert_eq!(rates, vec![100.0, 100.0, 50.0]);
        assert_eq!(points[2].signal_id, "c");
        assert!(!points[2].is_winner);
    }
}
