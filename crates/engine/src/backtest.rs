//! Backtest orchestration: validate, fetch, simulate, persist
//!
//! [`BacktestService`] is the single entry point used by the HTTP server and
//! the CLI. It holds no mutable state, so one instance can be shared behind an
//! `Arc` and serve concurrent runs.

use chrono::{NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::api::PriceSource;
use crate::config::ServiceConfig;
use crate::engine::{BacktestEngine, MAX_INITIAL_CAPITAL};
use crate::error::BacktestError;
use crate::store::BacktestStore;
use crate::types::*;

const SECONDS_PER_DAY: i64 = 86_400;

/// A run that was simulated and saved
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedBacktest {
    pub id: i64,
    pub result: BacktestResult,
}

pub struct BacktestService<P, S> {
    source: P,
    store: S,
    config: ServiceConfig,
}

impl<P: PriceSource, S: BacktestStore> BacktestService<P, S> {
    pub fn new(source: P, store: S, config: ServiceConfig) -> Self {
        Self {
            source,
            store,
            config,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Validate, fetch candles, simulate and persist one backtest
    pub async fn run_backtest(
        &self,
        user_id: &str,
        request: &BacktestRequest,
    ) -> Result<CompletedBacktest, BacktestError> {
        let today = Utc::now().date_naive();
        validate_request(request, today, self.config.min_capital)?;

        let symbol = request.symbol.trim();
        let (from, to) = fetch_range(request.start_date, request.end_date);

        info!(
            user_id,
            symbol,
            start = %request.start_date,
            end = %request.end_date,
            strategy = %request.strategy,
            "Running backtest"
        );

        let candles = self.fetch_with_retry(symbol, from, to).await?;
        if candles.is_empty() {
            info!(symbol, "No candles for requested period");
            return Err(BacktestError::NoData);
        }

        let result = BacktestEngine::run(&request.strategy, &candles, request.initial_capital)?;

        let record = BacktestRecord {
            id: None,
            user_id: user_id.to_string(),
            name: request.name.trim().to_string(),
            symbol: symbol.to_string(),
            start_date: request.start_date,
            end_date: request.end_date,
            initial_capital: request.initial_capital,
            strategy: request.strategy.clone(),
            results: result.clone(),
            created_at: Utc::now(),
        };
        let id = self.store.save_backtest(&record).await?;

        info!(
            id,
            symbol,
            trades = result.trades.len(),
            total_return_percent = %result.total_return_percent,
            "Backtest saved"
        );

        Ok(CompletedBacktest { id, result })
    }

    /// [`BacktestService::run_backtest`] mapped to the wire response
    pub async fn create_backtest(&self, user_id: &str, request: &BacktestRequest) -> BacktestResponse {
        match self.run_backtest(user_id, request).await {
            Ok(done) => BacktestResponse {
                success: true,
                message: format!(
                    "Backtest completed: {} trades, {}% return",
                    done.result.trades.len(),
                    done.result.total_return_percent.round_dp(2)
                ),
                backtest_id: Some(done.id.to_string()),
            },
            Err(e) => {
                match &e {
                    BacktestError::Validation(_) | BacktestError::NoData => {
                        info!(user_id, error = %e, "Backtest rejected")
                    }
                    _ => error!(user_id, error = %e, "Backtest failed"),
                }
                BacktestResponse {
                    success: false,
                    message: e.user_message(),
                    backtest_id: None,
                }
            }
        }
    }

    /// Saved backtest owned by `user_id`
    pub async fn get_backtest(&self, user_id: &str, id: i64) -> Result<BacktestRecord, BacktestError> {
        match self.store.get_backtest(id).await? {
            Some(record) if record.user_id == user_id => Ok(record),
            _ => Err(BacktestError::NotFound(id)),
        }
    }

    pub async fn list_backtests(&self, user_id: &str) -> Result<Vec<BacktestSummary>, BacktestError> {
        self.store.list_backtests(user_id).await
    }

    pub async fn delete_backtest(&self, user_id: &str, id: i64) -> Result<(), BacktestError> {
        if self.store.delete_backtest(user_id, id).await? {
            info!(user_id, id, "Backtest deleted");
            Ok(())
        } else {
            Err(BacktestError::NotFound(id))
        }
    }

    /// One bounded attempt, plus one retry after a backoff on transient failure
    async fn fetch_with_retry(
        &self,
        symbol: &str,
        from: i64,
        to: i64,
    ) -> Result<Vec<Candle>, BacktestError> {
        match self.fetch_once(symbol, from, to).await {
            Err(e) if e.is_retryable() => {
                warn!(
                    symbol,
                    error = %e,
                    backoff_ms = self.config.retry_backoff.as_millis() as u64,
                    "Price fetch failed, retrying once"
                );
                tokio::time::sleep(self.config.retry_backoff).await;
                self.fetch_once(symbol, from, to).await
            }
            other => other,
        }
    }

    async fn fetch_once(&self, symbol: &str, from: i64, to: i64) -> Result<Vec<Candle>, BacktestError> {
        let timeout = self.config.fetch_timeout;
        match tokio::time::timeout(timeout, self.source.fetch_candles(symbol, from, to)).await {
            Ok(result) => result,
            Err(_) => Err(BacktestError::Timeout(timeout)),
        }
    }
}

/// Reject malformed requests before any data is fetched
pub fn validate_request(
    request: &BacktestRequest,
    today: NaiveDate,
    min_capital: Decimal,
) -> Result<(), BacktestError> {
    if request.name.trim().is_empty() {
        return Err(BacktestError::Validation("name must not be empty".to_string()));
    }
    if request.symbol.trim().is_empty() {
        return Err(BacktestError::Validation("symbol must not be empty".to_string()));
    }
    if request.start_date >= request.end_date {
        return Err(BacktestError::Validation(format!(
            "start_date ({}) must be before end_date ({})",
            request.start_date, request.end_date
        )));
    }
    if request.start_date > today {
        return Err(BacktestError::Validation(format!(
            "start_date ({}) must not be in the future",
            request.start_date
        )));
    }
    if request.initial_capital < min_capital {
        return Err(BacktestError::Validation(format!(
            "initial_capital must be at least {min_capital} (got {})",
            request.initial_capital
        )));
    }
    if request.initial_capital > MAX_INITIAL_CAPITAL {
        return Err(BacktestError::Validation(format!(
            "initial_capital must not exceed {MAX_INITIAL_CAPITAL} (got {})",
            request.initial_capital
        )));
    }
    request.strategy.validate()
}

/// Unix-second bounds covering `start 00:00:00` through `end 23:59:59` UTC
pub fn fetch_range(start: NaiveDate, end: NaiveDate) -> (i64, i64) {
    let from = start.and_time(NaiveTime::MIN).and_utc().timestamp();
    let to = end.and_time(NaiveTime::MIN).and_utc().timestamp() + SECONDS_PER_DAY - 1;
    (from, to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    // ------------------------------------------------------------------------
    // Fakes
    // ------------------------------------------------------------------------

    #[derive(Default)]
    struct FakeSource {
        candles: Vec<Candle>,
        /// Calls that fail with a data-source error before succeeding
        failures: usize,
        /// Calls that hang past the fetch timeout before succeeding
        stalls: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PriceSource for FakeSource {
        async fn fetch_candles(&self, _symbol: &str, _from: i64, _to: i64) -> Result<Vec<Candle>, BacktestError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.stalls {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            if call < self.failures {
                return Err(BacktestError::DataSource("503 Service Unavailable".to_string()));
            }
            Ok(self.candles.clone())
        }
    }

    #[derive(Default)]
    struct FakeStore {
        records: Mutex<Vec<BacktestRecord>>,
        saves: AtomicUsize,
    }

    #[async_trait]
    impl BacktestStore for FakeStore {
        async fn save_backtest(&self, record: &BacktestRecord) -> Result<i64, BacktestError> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            let mut records = self.records.lock().unwrap();
            let id = records.len() as i64 + 1;
            records.push(BacktestRecord {
                id: Some(id),
                ..record.clone()
            });
            Ok(id)
        }

        async fn list_backtests(&self, user_id: &str) -> Result<Vec<BacktestSummary>, BacktestError> {
            let records = self.records.lock().unwrap();
            Ok(records
                .iter()
                .filter(|r| r.user_id == user_id)
                .map(|r| BacktestSummary {
                    id: r.id.unwrap_or_default(),
                    name: r.name.clone(),
                    symbol: r.symbol.clone(),
                    start_date: r.start_date,
                    end_date: r.end_date,
                    initial_capital: r.initial_capital,
                    final_value: r.results.final_value,
                    total_return: r.results.total_return,
                    total_return_percent: r.results.total_return_percent,
                    created_at: r.created_at,
                })
                .collect())
        }

        async fn get_backtest(&self, id: i64) -> Result<Option<BacktestRecord>, BacktestError> {
            let records = self.records.lock().unwrap();
            Ok(records.iter().find(|r| r.id == Some(id)).cloned())
        }

        async fn delete_backtest(&self, user_id: &str, id: i64) -> Result<bool, BacktestError> {
            let mut records = self.records.lock().unwrap();
            let before = records.len();
            records.retain(|r| !(r.id == Some(id) && r.user_id == user_id));
            Ok(records.len() < before)
        }
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn test_config() -> ServiceConfig {
        ServiceConfig {
            fetch_timeout: Duration::from_millis(50),
            retry_backoff: Duration::from_millis(1),
            min_capital: dec!(1000),
        }
    }

    fn service(source: FakeSource) -> BacktestService<FakeSource, FakeStore> {
        BacktestService::new(source, FakeStore::default(), test_config())
    }

    fn rsi_candles() -> Vec<Candle> {
        [50, 48, 46, 44, 42, 44, 46, 48, 50, 52]
            .iter()
            .enumerate()
            .map(|(i, &p)| Candle {
                timestamp: 1_709_251_200 + (i as i64) * SECONDS_PER_DAY, // from 2024-03-01
                open: Decimal::from(p),
                high: Decimal::from(p),
                low: Decimal::from(p),
                close: Decimal::from(p),
                volume: 500,
            })
            .collect()
    }

    fn request() -> BacktestRequest {
        BacktestRequest {
            name: "RSI bounce".to_string(),
            symbol: "AAPL".to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
            strategy: StrategyConfig::RsiStrategy {
                period: 4,
                oversold: 30.0,
                overbought: 70.0,
            },
            initial_capital: dec!(10000),
        }
    }

    // ------------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------------

    #[test]
    fn test_validate_request() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert!(validate_request(&request(), today, dec!(1000)).is_ok());

        let mut inverted = request();
        inverted.end_date = inverted.start_date;
        assert!(matches!(
            validate_request(&inverted, today, dec!(1000)),
            Err(BacktestError::Validation(_))
        ));

        let mut future = request();
        future.start_date = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        future.end_date = NaiveDate::from_ymd_opt(2024, 8, 1).unwrap();
        assert!(validate_request(&future, today, dec!(1000)).is_err());

        let mut poor = request();
        poor.initial_capital = dec!(999.99);
        assert!(validate_request(&poor, today, dec!(1000)).is_err());

        let mut oversized = request();
        oversized.initial_capital = Decimal::from_i128_with_scale(100_000_000_000_000_000_000, 0);
        assert!(matches!(
            validate_request(&oversized, today, dec!(1000)),
            Err(BacktestError::Validation(_))
        ));
        oversized.initial_capital = MAX_INITIAL_CAPITAL;
        assert!(validate_request(&oversized, today, dec!(1000)).is_ok());

        let mut blank = request();
        blank.symbol = "  ".to_string();
        assert!(validate_request(&blank, today, dec!(1000)).is_err());

        let mut unnamed = request();
        unnamed.name = String::new();
        assert!(validate_request(&unnamed, today, dec!(1000)).is_err());

        let mut bad_strategy = request();
        bad_strategy.strategy = StrategyConfig::MovingAverageCrossover {
            short_period: 20,
            long_period: 5,
        };
        assert!(validate_request(&bad_strategy, today, dec!(1000)).is_err());
    }

    #[test]
    fn test_fetch_range_covers_whole_days() {
        let (from, to) = fetch_range(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        );
        assert_eq!(from, 1_704_067_200);
        assert_eq!(to, 1_704_067_200 + 2 * SECONDS_PER_DAY - 1);
    }

    // ------------------------------------------------------------------------
    // Orchestration
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_run_saves_result() {
        let svc = service(FakeSource {
            candles: rsi_candles(),
            ..Default::default()
        });

        let done = svc.run_backtest("alice", &request()).await.unwrap();
        assert_eq!(done.result.final_value, dec!(11428));
        assert_eq!(done.result.trades.len(), 2);

        let saved = svc.get_backtest("alice", done.id).await.unwrap();
        assert_eq!(saved.results, done.result);
        assert_eq!(saved.symbol, "AAPL");
        assert_eq!(svc.store.saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_candles_is_no_data_and_not_saved() {
        let svc = service(FakeSource::default());

        let err = svc.run_backtest("alice", &request()).await.unwrap_err();
        assert!(matches!(err, BacktestError::NoData));
        assert_eq!(svc.source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(svc.store.saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_request_never_fetches() {
        let svc = service(FakeSource {
            candles: rsi_candles(),
            ..Default::default()
        });
        let mut req = request();
        req.initial_capital = dec!(10);

        let err = svc.run_backtest("alice", &req).await.unwrap_err();
        assert!(matches!(err, BacktestError::Validation(_)));
        assert_eq!(svc.source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_data_source_failure_retried_once() {
        let svc = service(FakeSource {
            candles: rsi_candles(),
            failures: 1,
            ..Default::default()
        });

        assert!(svc.run_backtest("alice", &request()).await.is_ok());
        assert_eq!(svc.source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_timeout_retried_once() {
        let svc = service(FakeSource {
            candles: rsi_candles(),
            stalls: 1,
            ..Default::default()
        });

        assert!(svc.run_backtest("alice", &request()).await.is_ok());
        assert_eq!(svc.source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_second_failure_is_surfaced() {
        let svc = service(FakeSource {
            candles: rsi_candles(),
            failures: 2,
            ..Default::default()
        });

        let err = svc.run_backtest("alice", &request()).await.unwrap_err();
        assert!(matches!(err, BacktestError::DataSource(_)));
        assert_eq!(svc.source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(svc.store.saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_create_backtest_response() {
        let svc = service(FakeSource {
            candles: rsi_candles(),
            ..Default::default()
        });
        let ok = svc.create_backtest("alice", &request()).await;
        assert!(ok.success);
        assert_eq!(ok.backtest_id.as_deref(), Some("1"));

        let svc = service(FakeSource::default());
        let empty = svc.create_backtest("alice", &request()).await;
        assert!(!empty.success);
        assert_eq!(empty.message, crate::error::NO_DATA_MESSAGE);
        assert!(empty.backtest_id.is_none());

        let svc = service(FakeSource {
            failures: 2,
            ..Default::default()
        });
        let failed = svc.create_backtest("alice", &request()).await;
        assert!(!failed.success);
        assert!(!failed.message.contains("503"));
    }

    #[tokio::test]
    async fn test_records_are_scoped_to_owner() {
        let svc = service(FakeSource {
            candles: rsi_candles(),
            ..Default::default()
        });
        let id = svc.run_backtest("alice", &request()).await.unwrap().id;

        assert!(matches!(
            svc.get_backtest("bob", id).await,
            Err(BacktestError::NotFound(_))
        ));
        assert!(svc.list_backtests("bob").await.unwrap().is_empty());
        assert!(matches!(
            svc.delete_backtest("bob", id).await,
            Err(BacktestError::NotFound(_))
        ));

        assert_eq!(svc.list_backtests("alice").await.unwrap().len(), 1);
        svc.delete_backtest("alice", id).await.unwrap();
        assert!(svc.get_backtest("alice", id).await.is_err());
    }
}
