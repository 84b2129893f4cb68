//! Backtest engine: evaluator, simulation and metrics for one candle series

use chrono::DateTime;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::info;

use crate::error::BacktestError;
use crate::metrics::{sharpe_ratio, total_return};
use crate::simulation::simulate;
use crate::strategy::StrategyEvaluator;
use crate::types::*;

/// Largest starting capital accepted; keeps share counts and portfolio values
/// well inside `u64` and `Decimal` range
pub const MAX_INITIAL_CAPITAL: Decimal = dec!(1000000000000);

/// Stateless backtest engine; identical input always yields an identical result
pub struct BacktestEngine;

impl BacktestEngine {
    /// Run `strategy` over `candles` (oldest first) starting from `initial_capital`
    pub fn run(
        strategy: &StrategyConfig,
        candles: &[Candle],
        initial_capital: Decimal,
    ) -> Result<BacktestResult, BacktestError> {
        if candles.len() < 2 {
            return Err(BacktestError::Validation(format!(
                "at least 2 candles are required (got {})",
                candles.len()
            )));
        }
        if initial_capital <= Decimal::ZERO {
            return Err(BacktestError::Validation(format!(
                "initial capital must be positive (got {initial_capital})"
            )));
        }
        if initial_capital > MAX_INITIAL_CAPITAL {
            return Err(BacktestError::Validation(format!(
                "initial capital must not exceed {MAX_INITIAL_CAPITAL} (got {initial_capital})"
            )));
        }
        if let Some(bad) = candles
            .iter()
            .find(|c| DateTime::from_timestamp(c.timestamp, 0).is_none())
        {
            return Err(BacktestError::Validation(format!(
                "candle timestamp {} is out of range",
                bad.timestamp
            )));
        }

        info!(
            strategy = %strategy,
            bars = candles.len(),
            capital = %initial_capital,
            "Starting backtest"
        );

        let closes: Vec<f64> = candles.iter().map(Candle::close_f64).collect();
        let evaluator = StrategyEvaluator::new(strategy, &closes);
        let sim = simulate(candles, &evaluator, initial_capital)?;

        let (total_return, total_return_percent) = total_return(sim.final_cash, initial_capital);
        let sharpe_ratio = sharpe_ratio(&sim.equity_curve);

        info!(
            trades = sim.trades.len(),
            final_value = %sim.final_cash,
            total_return_percent = %total_return_percent,
            max_drawdown_percent = %sim.max_drawdown_percent,
            sharpe = %sharpe_ratio,
            "Backtest complete"
        );

        Ok(BacktestResult {
            final_value: sim.final_cash,
            total_return,
            total_return_percent,
            max_drawdown_percent: sim.max_drawdown_percent,
            sharpe_ratio,
            trades: sim.trades,
            equity_curve: sim.equity_curve,
        })
    }
}
