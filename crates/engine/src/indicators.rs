//! Indicator library: pure functions over a close-price series
//!
//! Every function returns a series of the same length as its input. Bars where
//! the indicator is not yet defined carry a sentinel value instead of NaN:
//! `0.0` for moving averages and the neutral `50.0` for RSI. Callers must gate
//! on the warm-up length rather than on the value itself.

use ta::indicators::SimpleMovingAverage;
use ta::Next;

/// Sentinel for moving-average bars inside the warm-up window
pub const SMA_UNDEFINED: f64 = 0.0;

/// Neutral RSI reported before `period` price changes are available
pub const RSI_NEUTRAL: f64 = 50.0;

// ============================================================================
// Simple Moving Average
// ============================================================================

/// Simple moving average over `period` bars.
///
/// `out[i]` is the mean of `prices[i + 1 - period ..= i]` for `i >= period - 1`,
/// and [`SMA_UNDEFINED`] before that. `ta` averages the partial window while
/// warming up; those bars are overwritten with the sentinel.
pub fn simple_moving_average(prices: &[f64], period: usize) -> Vec<f64> {
    let Ok(mut sma) = SimpleMovingAverage::new(period) else {
        return vec![SMA_UNDEFINED; prices.len()];
    };

    prices
        .iter()
        .enumerate()
        .map(|(i, &price)| {
            let value = sma.next(price);
            if i + 1 < period {
                SMA_UNDEFINED
            } else {
                value
            }
        })
        .collect()
}

// ============================================================================
// Relative Strength Index
// ============================================================================

/// RSI from the plain mean gain / mean loss of the trailing `period` changes.
///
/// Change `j` is `prices[j + 1] - prices[j]`; the value at `i` uses changes
/// `i - period ..= i - 1`. No Wilder smoothing is applied. A window without
/// losses reads 100.
pub fn rsi(prices: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![RSI_NEUTRAL; prices.len()];
    if period == 0 || prices.len() <= period {
        return out;
    }

    let changes: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();

    for (i, value) in out.iter_mut().enumerate().skip(period) {
        let window = &changes[i - period..i];
        let gains: f64 = window.iter().filter(|c| **c > 0.0).sum();
        let losses: f64 = window.iter().filter(|c| **c < 0.0).map(|c| -c).sum();

        let mean_gain = gains / period as f64;
        let mean_loss = losses / period as f64;

        *value = if mean_loss == 0.0 {
            100.0
        } else {
            let rs = mean_gain / mean_loss;
            100.0 - 100.0 / (1.0 + rs)
        };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma_warmup_and_values() {
        let sma = simple_moving_average(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert_eq!(sma, vec![0.0, 0.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_sma_period_one_is_identity() {
        let prices = [3.5, 1.25, 8.0];
        assert_eq!(simple_moving_average(&prices, 1), prices.to_vec());
    }

    #[test]
    fn test_sma_period_longer_than_series() {
        let sma = simple_moving_average(&[1.0, 2.0, 3.0], 5);
        assert_eq!(sma, vec![SMA_UNDEFINED; 3]);
        assert!(simple_moving_average(&[], 3).is_empty());
        assert_eq!(simple_moving_average(&[1.0, 2.0], 0), vec![0.0, 0.0]);
    }

    #[test]
    fn test_sma_flat_series_is_constant() {
        let prices = vec![100.1; 30];
        let sma = simple_moving_average(&prices, 5);
        assert!(sma[..4].iter().all(|v| *v == SMA_UNDEFINED));
        for i in 4..30 {
            assert!((sma[i] - 100.1).abs() < 1e-9, "bar {i} drifted: {}", sma[i]);
        }
    }

    #[test]
    fn test_sma_matches_window_mean_after_warmup() {
        let prices = [12.5, 13.25, 11.0, 14.75, 15.5, 13.0, 16.25, 17.0];
        let sma = simple_moving_average(&prices, 3);
        for i in 2..prices.len() {
            let mean = prices[i - 2..=i].iter().sum::<f64>() / 3.0;
            assert!((sma[i] - mean).abs() < 1e-9, "bar {i}: {} vs {mean}", sma[i]);
        }
    }

    #[test]
    fn test_rsi_oversold_bounce_series() {
        let prices = [50.0, 48.0, 46.0, 44.0, 42.0, 44.0, 46.0, 48.0, 50.0, 52.0];
        let values = rsi(&prices, 4);
        assert_eq!(
            values,
            vec![50.0, 50.0, 50.0, 50.0, 0.0, 25.0, 50.0, 75.0, 100.0, 100.0]
        );
    }

    #[test]
    fn test_rsi_all_gains_is_100() {
        let prices: Vec<f64> = (0..10).map(|i| 10.0 + i as f64).collect();
        let values = rsi(&prices, 3);
        assert!(values[..3].iter().all(|v| *v == RSI_NEUTRAL));
        assert!(values[3..].iter().all(|v| *v == 100.0));
    }

    #[test]
    fn test_rsi_flat_series_has_no_losses() {
        let values = rsi(&[20.0; 6], 2);
        assert_eq!(values, vec![50.0, 50.0, 100.0, 100.0, 100.0, 100.0]);
    }

    #[test]
    fn test_rsi_short_series_stays_neutral() {
        assert_eq!(rsi(&[1.0, 2.0, 3.0], 3), vec![RSI_NEUTRAL; 3]);
        assert_eq!(rsi(&[1.0, 2.0], 0), vec![RSI_NEUTRAL; 2]);
    }

    #[test]
    fn test_indicators_are_deterministic() {
        let prices: Vec<f64> = (0..50)
            .map(|i| 100.0 + ((i * 7) % 11) as f64 * 0.37)
            .collect();
        assert_eq!(rsi(&prices, 14), rsi(&prices, 14));
        assert_eq!(
            simple_moving_average(&prices, 9),
            simple_moving_average(&prices, 9)
        );
    }
}
