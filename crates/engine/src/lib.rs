//! Backtest Lab Engine — strategy backtesting over daily candles
//!
//! Provides:
//! - SMA and RSI indicators
//! - Buy-and-hold, moving-average crossover and RSI strategies
//! - All-in / all-out simulation with forced liquidation at period end
//! - Return, drawdown and simplified Sharpe metrics
//! - Backtest service (validation, fetch with timeout and retry, persistence)
//! - Yahoo Finance client for daily candles

pub mod api;
pub mod backtest;
pub mod config;
pub mod engine;
pub mod error;
pub mod indicators;
pub mod metrics;
pub mod simulation;
pub mod store;
pub mod strategy;
pub mod types;

// Re-exports for convenience
pub use api::{PriceSource, YahooClient};
pub use backtest::{fetch_range, validate_request, BacktestService, CompletedBacktest};
pub use config::ServiceConfig;
pub use engine::{BacktestEngine, MAX_INITIAL_CAPITAL};
pub use error::BacktestError;
pub use store::{BacktestStore, SqliteBacktestStore};
pub use strategy::{Signal, StrategyEvaluator, StrategySignal};
pub use types::*;
