use chrono::Utc;
use tracing::info;

use crate::analytics::Report;
use crate::config::Config;
use crate::db::{SignalRepository, SignalStore};
use crate::error::Result;
use crate::utils::format_timestamp;

pub async fn run(config: Config) -> Result<()> {
    info!("📡 Signal store started");
    info!("================================");

    let store = SignalStore::new(&config.database.url)
        .await?
        .with_referential_mode(config.database.referential);

    if config.database.create_schema {
        store.ensure_schema().await?;
    }

    let signals = store.list_signals().await?;
    let updates = store.list_updates().await?;
    info!("Loaded {} signals and {} updates", signals.len(), updates.len());

    let report = Report::build(&signals, &updates, &config.report, Utc::now());

    info!(
        "Outcomes: {} tp / {} sl, win rate {:.2}%",
        report.outcome_stats.tp_hits, report.outcome_stats.sl_hits, report.outcome_stats.win_rate
    );
    if let Some(summary) = &report.winrate_summary {
        info!(
            "{}: {} trades, win rate {:.2}%",
            summary.time_range, summary.total_trades, summary.overall_winrate
        );
    }
    info!(
        "{} trend: {:?} (slope {:.3})",
        report.period.label(),
        report.winrate_trend.trend,
        report.winrate_trend.slope
    );
    if let Some(best) = report.top_pairs.first() {
        info!("Top pair: {} (score {:.2})", best.pair, best.score);
    }
    if let Some(rolling) = report.latest_rolling_winrate() {
        info!("Rolling win rate: {:.2}%", rolling);
    }

    info!("Report generated at {}", format_timestamp(report.generated_at));
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
