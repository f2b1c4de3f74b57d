use std::str::FromStr;

use chrono_tz::Tz;

use crate::analytics::report::ReportOptions;
use crate::analytics::winrate::{Period, TimeRange};
use crate::db::ReferentialMode;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub report: ReportOptions,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub referential: ReferentialMode,
    pub create_schema: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let url = std::env::var("DATABASE_URL")
            .map_err(|_| Error::Config("DATABASE_URL not set".into()))?;

        let database = DatabaseConfig {
            url,
            referential: env_or("SIGNAL_STORE_REFERENTIAL", ReferentialMode::Permissive)?,
            create_schema: env_or("SIGNAL_STORE_CREATE_SCHEMA", true)?,
        };

        let defaults = ReportOptions::default();
        let report = ReportOptions {
            timezone: env_or::<Tz>("REPORT_TIMEZONE", defaults.timezone)?,
            time_range: env_or::<TimeRange>("REPORT_TIME_RANGE", defaults.time_range)?,
            period: env_or::<Period>("REPORT_PERIOD", defaults.period)?,
            min_pair_signals: env_or("REPORT_MIN_PAIR_SIGNALS", defaults.min_pair_signals)?,
            top_pairs: env_or("REPORT_TOP_PAIRS", defaults.top_pairs)?,
            rolling_window: env_or("REPORT_ROLLING_WINDOW", defaults.rolling_window)?,
        };

        if report.rolling_window == 0 {
            return Err(Error::Config("REPORT_ROLLING_WINDOW must be positive".into()));
        }

        Ok(Config { database, report })
    }
}

/// Reads `key` from the environment, falling back to `default` when unset or empty.
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid {}={}: {}", key, raw, e))),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_or_uses_default_when_unset() {
        let value: usize = env_or("SIGNAL_STORE_TEST_UNSET_KEY", 7).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn env_or_rejects_garbage() {
        std::env::set_var("SIGNAL_STORE_TEST_BAD_NUMBER", "seven");
        let result: Result<usize> = env_or("SIGNAL_STORE_TEST_BAD_NUMBER", 7);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn env_or_parses_referential_mode() {
        std::env::set_var("SIGNAL_STORE_TEST_REFERENTIAL", "Enforced");
        let mode = env_or("SIGNAL_STORE_TEST_REFERENTIAL", ReferentialMode::Permissive).unwrap();
        assert_eq!(mode, ReferentialMode::Enforced);
    }
}
