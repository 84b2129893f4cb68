//! Single-asset, single-position simulation loop
//!
//! All-in / all-out: a buy spends as much cash as buys whole shares, a sell
//! closes the entire position. Equity curve and max drawdown are tracked in the
//! same pass over the bars.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::error::BacktestError;
use crate::strategy::{Signal, StrategyEvaluator};
use crate::types::{Candle, EquityPoint, TradeRecord, TradeSide};

pub const END_OF_PERIOD_REASON: &str = "End of backtest period";

/// Outcome of one simulation run, before summary metrics
#[derive(Debug, Clone, PartialEq)]
pub struct Simulation {
    /// Cash after the forced liquidation on the final bar
    pub final_cash: Decimal,
    pub trades: Vec<TradeRecord>,
    /// One point per bar after the first
    pub equity_curve: Vec<EquityPoint>,
    pub max_drawdown_percent: Decimal,
}

/// Run the evaluator's signals over `candles`.
///
/// Signals that cannot be acted on (buy while long, sell while flat, a buy that
/// cannot afford one share) are skipped, never reported as errors. An `Err` is
/// always [`BacktestError::Internal`]: the evaluator was built over another
/// series, or the book stopped balancing.
pub fn simulate(
    candles: &[Candle],
    evaluator: &StrategyEvaluator,
    initial_capital: Decimal,
) -> Result<Simulation, BacktestError> {
    if evaluator.len() != candles.len() {
        return Err(BacktestError::Internal(format!(
            "evaluator covers {} bars, simulation has {}",
            evaluator.len(),
            candles.len()
        )));
    }

    let hundred = dec!(100);

    let mut cash = initial_capital;
    let mut shares_held: u64 = 0;
    let mut peak = initial_capital;
    let mut max_drawdown_percent = Decimal::ZERO;

    let mut trades: Vec<TradeRecord> = Vec::new();
    let mut equity_curve: Vec<EquityPoint> = Vec::with_capacity(candles.len().saturating_sub(1));

    for (i, candle) in candles.iter().enumerate().skip(1) {
        let close = candle.close;
        let signal = evaluator.evaluate(i);

        match signal.signal {
            Signal::Buy if shares_held == 0 => {
                let quantity = affordable_shares(cash, close);

                if quantity > 0 {
                    cash -= position_value(quantity, close)?;
                    shares_held = quantity;

                    debug!(
                        date = %candle.date(),
                        price = %close,
                        quantity,
                        reason = %signal.reason,
                        "Bought"
                    );

                    trades.push(TradeRecord {
                        date: candle.date(),
                        side: TradeSide::Buy,
                        price: close,
                        quantity,
                        reason: signal.reason,
                    });
                } else {
                    debug!(date = %candle.date(), price = %close, cash = %cash, "Buy skipped, cannot afford one share");
                }
            }
            Signal::Sell if shares_held > 0 => {
                cash = checked_add(cash, position_value(shares_held, close)?)?;

                debug!(
                    date = %candle.date(),
                    price = %close,
                    quantity = shares_held,
                    reason = %signal.reason,
                    "Sold"
                );

                trades.push(TradeRecord {
                    date: candle.date(),
                    side: TradeSide::Sell,
                    price: close,
                    quantity: shares_held,
                    reason: signal.reason,
                });
                shares_held = 0;
            }
            _ => {}
        }

        if cash < Decimal::ZERO {
            return Err(BacktestError::Internal(format!(
                "cash went negative on {}: {cash}",
                candle.date()
            )));
        }

        let current = checked_add(cash, position_value(shares_held, close)?)?;
        equity_curve.push(EquityPoint {
            date: candle.date(),
            portfolio_value: current,
        });

        if current > peak {
            peak = current;
        }
        if peak > Decimal::ZERO {
            let drawdown = (peak - current) / peak * hundred;
            if drawdown > max_drawdown_percent {
                max_drawdown_percent = drawdown;
            }
        }
    }

    // Close any remaining position at the last bar
    if shares_held > 0 {
        if let Some(last) = candles.last() {
            cash = checked_add(cash, position_value(shares_held, last.close)?)?;

            debug!(
                date = %last.date(),
                price = %last.close,
                quantity = shares_held,
                "Liquidated open position"
            );

            trades.push(TradeRecord {
                date: last.date(),
                side: TradeSide::Sell,
                price: last.close,
                quantity: shares_held,
                reason: END_OF_PERIOD_REASON.to_string(),
            });
        }
    }

    Ok(Simulation {
        final_cash: cash,
        trades,
        equity_curve,
        max_drawdown_percent,
    })
}

/// Whole shares `cash` buys at `price`, saturating at `u64::MAX`
fn affordable_shares(cash: Decimal, price: Decimal) -> u64 {
    if price <= Decimal::ZERO || cash <= Decimal::ZERO {
        return 0;
    }
    cash.checked_div(price)
        .and_then(|q| q.floor().to_u64())
        .unwrap_or(u64::MAX)
}

fn position_value(quantity: u64, price: Decimal) -> Result<Decimal, BacktestError> {
    price
        .checked_mul(Decimal::from(quantity))
        .ok_or_else(|| BacktestError::Internal(format!("position of {quantity} at {price} overflowed")))
}

fn checked_add(a: Decimal, b: Decimal) -> Result<Decimal, BacktestError> {
    a.checked_add(b)
        .ok_or_else(|| BacktestError::Internal(format!("portfolio value overflowed adding {b}")))
}
