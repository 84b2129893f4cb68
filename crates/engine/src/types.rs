//! Types for the backtesting engine

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::BacktestError;

/// A single daily candlestick (OHLCV)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bar open, seconds since epoch (UTC)
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
}

impl Candle {
    /// UTC calendar date of the bar. Undatable timestamps are dropped by the
    /// Yahoo parser and rejected by the engine before this is called.
    pub fn date(&self) -> NaiveDate {
        DateTime::from_timestamp(self.timestamp, 0)
            .map(|dt| dt.date_naive())
            .unwrap_or_default()
    }

    pub fn close_f64(&self) -> f64 {
        self.close.to_f64().unwrap_or(0.0)
    }
}

/// Trading strategy definition.
///
/// Wire form is adjacently tagged: `{"type": "rsi", "parameters": {"period": 14, ...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "parameters", rename_all = "snake_case")]
pub enum StrategyConfig {
    BuyAndHold,
    MovingAverageCrossover {
        short_period: usize,
        long_period: usize,
    },
    #[serde(rename = "rsi")]
    RsiStrategy {
        period: usize,
        oversold: f64,
        overbought: f64,
    },
}

impl StrategyConfig {
    /// Check parameter consistency. Periods longer than the series are allowed
    /// (they simply never produce a signal).
    pub fn validate(&self) -> Result<(), BacktestError> {
        match *self {
            StrategyConfig::BuyAndHold => Ok(()),
            StrategyConfig::MovingAverageCrossover {
                short_period,
                long_period,
            } => {
                if short_period <= 1 {
                    return Err(BacktestError::Validation(format!(
                        "short_period must be greater than 1 (got {short_period})"
                    )));
                }
                if long_period <= short_period {
                    return Err(BacktestError::Validation(format!(
                        "long_period ({long_period}) must be greater than short_period ({short_period})"
                    )));
                }
                Ok(())
            }
            StrategyConfig::RsiStrategy {
                period,
                oversold,
                overbought,
            } => {
                if period <= 1 {
                    return Err(BacktestError::Validation(format!(
                        "RSI period must be greater than 1 (got {period})"
                    )));
                }
                for (label, value) in [("oversold", oversold), ("overbought", overbought)] {
                    if !(0.0..=100.0).contains(&value) {
                        return Err(BacktestError::Validation(format!(
                            "{label} threshold must be between 0 and 100 (got {value})"
                        )));
                    }
                }
                if oversold >= overbought {
                    return Err(BacktestError::Validation(format!(
                        "oversold ({oversold}) must be below overbought ({overbought})"
                    )));
                }
                Ok(())
            }
        }
    }

    pub fn name(&self) -> String {
        match self {
            StrategyConfig::BuyAndHold => "Buy and Hold".to_string(),
            StrategyConfig::MovingAverageCrossover {
                short_period,
                long_period,
            } => format!("MA Crossover ({short_period}/{long_period})"),
            StrategyConfig::RsiStrategy {
                period,
                oversold,
                overbought,
            } => format!("RSI ({period}, {oversold}/{overbought})"),
        }
    }
}

impl std::fmt::Display for StrategyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Side of a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// A single fill executed during a backtest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub date: NaiveDate,
    pub side: TradeSide,
    pub price: Decimal,
    pub quantity: u64,
    pub reason: String,
}

/// A point on the equity curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub portfolio_value: Decimal,
}

/// Result of a backtest run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub final_value: Decimal,
    pub total_return: Decimal,
    pub total_return_percent: Decimal,
    pub max_drawdown_percent: Decimal,
    pub sharpe_ratio: Decimal,
    pub trades: Vec<TradeRecord>,
    pub equity_curve: Vec<EquityPoint>,
}

/// Request to create a backtest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRequest {
    pub name: String,
    pub symbol: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub strategy: StrategyConfig,
    pub initial_capital: Decimal,
}

/// Response returned when a backtest is created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backtest_id: Option<String>,
}

/// A saved backtest: inputs plus results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRecord {
    pub id: Option<i64>,
    pub user_id: String,
    pub name: String,
    pub symbol: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: Decimal,
    pub strategy: StrategyConfig,
    pub results: BacktestResult,
    pub created_at: DateTime<Utc>,
}

/// Listing entry for a saved backtest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestSummary {
    pub id: i64,
    pub name: String,
    pub symbol: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: Decimal,
    pub final_value: Decimal,
    pub total_return: Decimal,
    pub total_return_percent: Decimal,
    pub created_at: DateTime<Utc>,
}
