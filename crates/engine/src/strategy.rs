//! Strategy evaluator: turns indicator transitions into buy/sell/hold signals
//!
//! Indicators are computed once for the whole series when the evaluator is
//! built; `evaluate(i)` then compares bar `i` against bar `i - 1`. The
//! evaluator has no notion of cash or position, so a signal is only a request
//! that the simulation may ignore.

use serde::{Deserialize, Serialize};

use crate::indicators::{rsi, simple_moving_average};
use crate::types::StrategyConfig;

/// Trading signal emitted for a bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

/// A signal together with the human-readable trigger
#[derive(Debug, Clone, PartialEq)]
pub struct StrategySignal {
    pub signal: Signal,
    pub reason: String,
}

impl StrategySignal {
    pub fn hold() -> Self {
        Self {
            signal: Signal::Hold,
            reason: String::new(),
        }
    }

    pub fn buy(reason: impl Into<String>) -> Self {
        Self {
            signal: Signal::Buy,
            reason: reason.into(),
        }
    }

    pub fn sell(reason: impl Into<String>) -> Self {
        Self {
            signal: Signal::Sell,
            reason: reason.into(),
        }
    }
}

enum Rule {
    BuyAndHold,
    MovingAverageCrossover {
        long_period: usize,
        short_ma: Vec<f64>,
        long_ma: Vec<f64>,
    },
    Rsi {
        period: usize,
        oversold: f64,
        overbought: f64,
        values: Vec<f64>,
    },
}

/// Per-bar signal source for one strategy over one close series
pub struct StrategyEvaluator {
    rule: Rule,
    len: usize,
}

impl StrategyEvaluator {
    pub fn new(config: &StrategyConfig, closes: &[f64]) -> Self {
        let rule = match *config {
            StrategyConfig::BuyAndHold => Rule::BuyAndHold,
            StrategyConfig::MovingAverageCrossover {
                short_period,
                long_period,
            } => Rule::MovingAverageCrossover {
                long_period,
                short_ma: simple_moving_average(closes, short_period),
                long_ma: simple_moving_average(closes, long_period),
            },
            StrategyConfig::RsiStrategy {
                period,
                oversold,
                overbought,
            } => Rule::Rsi {
                period,
                oversold,
                overbought,
                values: rsi(closes, period),
            },
        };

        Self {
            rule,
            len: closes.len(),
        }
    }

    /// Signal for bar `i`. Bar 0 has no previous bar and always holds.
    pub fn evaluate(&self, i: usize) -> StrategySignal {
        if i == 0 || i >= self.len {
            return StrategySignal::hold();
        }

        match &self.rule {
            Rule::BuyAndHold => {
                if i == 1 {
                    StrategySignal::buy("Buy and hold entry")
                } else {
                    StrategySignal::hold()
                }
            }
            Rule::MovingAverageCrossover {
                long_period,
                short_ma,
                long_ma,
            } => {
                // Both bars of the transition need a defined long MA (from bar long_period - 1)
                if i < *long_period {
                    return StrategySignal::hold();
                }
                let (prev_short, prev_long) = (short_ma[i - 1], long_ma[i - 1]);
                let (short, long) = (short_ma[i], long_ma[i]);

                if prev_short <= prev_long && short > long {
                    StrategySignal::buy(format!(
                        "Short MA ({short:.2}) crossed above long MA ({long:.2})"
                    ))
                } else if prev_short >= prev_long && short < long {
                    StrategySignal::sell(format!(
                        "Short MA ({short:.2}) crossed below long MA ({long:.2})"
                    ))
                } else {
                    StrategySignal::hold()
                }
            }
            Rule::Rsi {
                period,
                oversold,
                overbought,
                values,
            } => {
                if i < *period {
                    return StrategySignal::hold();
                }
                let (prev, current) = (values[i - 1], values[i]);

                if prev >= *oversold && current < *oversold {
                    StrategySignal::buy(format!(
                        "RSI ({current:.2}) crossed below oversold threshold ({oversold})"
                    ))
                } else if prev <= *overbought && current > *overbought {
                    StrategySignal::sell(format!(
                        "RSI ({current:.2}) crossed above overbought threshold ({overbought})"
                    ))
                } else {
                    StrategySignal::hold()
                }
            }
        }
    }

    /// Number of bars the evaluator was built over
    pub(crate) fn len(&self) -> usize {
        self.len
    }
}
