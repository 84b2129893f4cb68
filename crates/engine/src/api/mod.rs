//! Historical price sources

use async_trait::async_trait;

use crate::error::BacktestError;
use crate::types::Candle;

pub mod yahoo;

pub use yahoo::YahooClient;

/// Source of daily candles
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Candles for `symbol` with `from <= timestamp <= to` (unix seconds),
    /// oldest first. An empty vec means the source had no bars for the range;
    /// transport or auth failures are [`BacktestError::DataSource`].
    async fn fetch_candles(
        &self,
        symbol: &str,
        from: i64,
        to: i64,
    ) -> Result<Vec<Candle>, BacktestError>;
}
