//! Performance metrics over a completed simulation

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::types::EquityPoint;

/// Absolute and percentage return on the starting capital
pub fn total_return(final_value: Decimal, initial_capital: Decimal) -> (Decimal, Decimal) {
    let total = final_value - initial_capital;
    let percent = if initial_capital > Decimal::ZERO {
        total / initial_capital * dec!(100)
    } else {
        Decimal::ZERO
    };
    (total, percent)
}

/// Simplified Sharpe ratio: mean / population stddev of per-bar % returns.
///
/// Not annualized and no risk-free rate. Only meaningful for comparing
/// strategies run through this engine, and kept in this form so stored results
/// stay comparable.
pub fn sharpe_ratio(equity_curve: &[EquityPoint]) -> Decimal {
    let values: Vec<f64> = equity_curve
        .iter()
        .map(|p| p.portfolio_value.to_f64().unwrap_or(0.0))
        .collect();

    let returns: Vec<f64> = values
        .windows(2)
        .map(|w| {
            if w[0] == 0.0 {
                0.0
            } else {
                (w[1] - w[0]) / w[0] * 100.0
            }
        })
        .collect();

    if returns.is_empty() {
        return Decimal::ZERO;
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    if std_dev == 0.0 {
        return Decimal::ZERO;
    }

    Decimal::from_f64(mean / std_dev)
        .map(|s| s.round_dp(4))
        .unwrap_or(Decimal::ZERO)
}
