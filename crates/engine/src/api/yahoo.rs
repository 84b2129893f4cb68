//! Yahoo Finance client for daily candles (v8 chart API, no authentication)

use anyhow::Result;
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::{Client, StatusCode};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, info};

use super::PriceSource;
use crate::error::BacktestError;
use crate::types::Candle;

pub const DEFAULT_BASE_URL: &str = "https://query2.finance.yahoo.com";

/// Yahoo quotes are floats; keep enough precision for equities and FX
const PRICE_DECIMALS: u32 = 4;

/// Yahoo Finance market data client
#[derive(Clone)]
pub struct YahooClient {
    client: Client,
    base_url: String,
}

// ---------------------------------------------------------------------------
// Deserialization structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

impl Default for YahooClient {
    fn default() -> Self {
        Self::new()
    }
}

impl YahooClient {
    /// Create a client against the public Yahoo endpoint
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Create a client against another host serving the same chart API
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (compatible; backtest-lab)")
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch daily candles between two unix timestamps (seconds)
    pub async fn get_daily_candles(&self, symbol: &str, from: i64, to: i64) -> Result<Vec<Candle>> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, symbol);

        debug!(symbol, from, to, "Fetching daily candles from Yahoo");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("period1", from.to_string()),
                ("period2", to.to_string()),
                ("interval", "1d".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let candles = candles_from_body(status, &body)?
            .into_iter()
            .filter(|c| c.timestamp >= from && c.timestamp <= to)
            .collect::<Vec<_>>();

        info!(symbol, count = candles.len(), "Fetched daily candles");
        Ok(candles)
    }
}

#[async_trait]
impl PriceSource for YahooClient {
    async fn fetch_candles(
        &self,
        symbol: &str,
        from: i64,
        to: i64,
    ) -> Result<Vec<Candle>, BacktestError> {
        self.get_daily_candles(symbol, from, to)
            .await
            .map_err(|e| BacktestError::DataSource(e.to_string()))
    }
}

/// Decode a chart reply of any status.
///
/// Yahoo reports empty ranges and unknown symbols as 400/404 with a chart
/// error in the body, so the body is read before the status decides.
fn candles_from_body(status: StatusCode, body: &str) -> Result<Vec<Candle>> {
    match serde_json::from_str::<ChartResponse>(body) {
        Ok(response) => parse_chart(response),
        Err(_) if !status.is_success() => {
            anyhow::bail!("Yahoo API error {}: {}", status, body)
        }
        Err(e) => Err(e.into()),
    }
}

/// Chart errors that only mean "nothing to return for this range"
fn is_no_data(err: &ChartError) -> bool {
    let description = err.description.to_ascii_lowercase();
    err.code.eq_ignore_ascii_case("Not Found")
        || description.contains("no data found")
        || description.contains("data doesn't exist")
        || description.contains("delisted")
}

/// Turn a chart response into candles, oldest first.
///
/// Bars missing any of open/high/low/close (holidays, halted sessions) are
/// dropped, as are bars whose timestamp has no calendar date. A result
/// without timestamps means no bars in the range.
fn parse_chart(response: ChartResponse) -> Result<Vec<Candle>> {
    let Some(data) = response.chart.result.and_then(|r| r.into_iter().next()) else {
        match response.chart.error {
            Some(err) if is_no_data(&err) => {
                debug!(code = %err.code, description = %err.description, "Yahoo has no bars for range");
            }
            Some(err) => anyhow::bail!("Yahoo chart error {}: {}", err.code, err.description),
            None => {}
        }
        return Ok(Vec::new());
    };

    let Some(timestamps) = data.timestamp else {
        return Ok(Vec::new());
    };
    let Some(quote) = data.indicators.quote.into_iter().next() else {
        return Ok(Vec::new());
    };

    let mut candles: Vec<Candle> = timestamps
        .iter()
        .enumerate()
        .filter_map(|(i, &timestamp)| {
            DateTime::from_timestamp(timestamp, 0)?;
            Some(Candle {
                timestamp,
                open: price_at(&quote.open, i)?,
                high: price_at(&quote.high, i)?,
                low: price_at(&quote.low, i)?,
                close: price_at(&quote.close, i)?,
                volume: quote.volume.get(i).copied().flatten().unwrap_or(0),
            })
        })
        .collect();

    candles.sort_by_key(|c| c.timestamp);
    Ok(candles)
}

fn price_at(series: &[Option<f64>], i: usize) -> Option<Decimal> {
    let value = series.get(i).copied().flatten()?;
    Decimal::from_f64(value).map(|d| d.round_dp(PRICE_DECIMALS))
}
