//! Orchestrator settings

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::warn;

pub const ENV_FETCH_TIMEOUT_SECS: &str = "BACKTEST_FETCH_TIMEOUT_SECS";
pub const ENV_RETRY_BACKOFF_MS: &str = "BACKTEST_RETRY_BACKOFF_MS";
pub const ENV_MIN_CAPITAL: &str = "BACKTEST_MIN_CAPITAL";

/// Settings for [`crate::BacktestService`]
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Upper bound on a single price-source call
    pub fetch_timeout: Duration,
    /// Pause before the one retry of a failed fetch
    pub retry_backoff: Duration,
    /// Smallest accepted initial capital
    pub min_capital: Decimal,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(10),
            retry_backoff: Duration::from_millis(500),
            min_capital: dec!(1000),
        }
    }
}

impl ServiceConfig {
    /// Defaults overridden by `BACKTEST_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ServiceConfig::from_env`] with an arbitrary key lookup.
    /// Unparseable values are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(secs) = parse_var::<u64>(&lookup, ENV_FETCH_TIMEOUT_SECS) {
            config.fetch_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_RETRY_BACKOFF_MS) {
            config.retry_backoff = Duration::from_millis(ms);
        }
        if let Some(min) = parse_var::<Decimal>(&lookup, ENV_MIN_CAPITAL) {
            config.min_capital = min;
        }
        config
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparseable setting");
            None
        }
    }
}
