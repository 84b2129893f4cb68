//! Backtest persistence port and its SQLite implementation

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use persistence::repository::{BacktestRepository, BacktestRow, BacktestSummaryRow};
use persistence::SqlitePool;
use rust_decimal::Decimal;
use tracing::debug;

use crate::error::BacktestError;
use crate::types::{BacktestRecord, BacktestSummary};

/// Storage for completed backtests
#[async_trait]
pub trait BacktestStore: Send + Sync {
    /// Persist a record and return the assigned id
    async fn save_backtest(&self, record: &BacktestRecord) -> Result<i64, BacktestError>;

    /// Summaries for one user, newest first
    async fn list_backtests(&self, user_id: &str) -> Result<Vec<BacktestSummary>, BacktestError>;

    async fn get_backtest(&self, id: i64) -> Result<Option<BacktestRecord>, BacktestError>;

    /// Returns false when no record with that id belongs to `user_id`
    async fn delete_backtest(&self, user_id: &str, id: i64) -> Result<bool, BacktestError>;
}

/// [`BacktestStore`] backed by the `backtests` SQLite table
#[derive(Clone)]
pub struct SqliteBacktestStore {
    pool: SqlitePool,
}

impl SqliteBacktestStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn from_database(db: &persistence::Database) -> Self {
        Self::new(db.pool_clone())
    }
}

#[async_trait]
impl BacktestStore for SqliteBacktestStore {
    async fn save_backtest(&self, record: &BacktestRecord) -> Result<i64, BacktestError> {
        let row = to_row(record)?;
        let id = BacktestRepository::new(&self.pool).save(&row).await?;
        debug!(id, user_id = %record.user_id, "Saved backtest");
        Ok(id)
    }

    async fn list_backtests(&self, user_id: &str) -> Result<Vec<BacktestSummary>, BacktestError> {
        BacktestRepository::new(&self.pool)
            .list_by_user(user_id)
            .await?
            .into_iter()
            .map(from_summary_row)
            .collect()
    }

    async fn get_backtest(&self, id: i64) -> Result<Option<BacktestRecord>, BacktestError> {
        BacktestRepository::new(&self.pool)
            .get(id)
            .await?
            .map(from_row)
            .transpose()
    }

    async fn delete_backtest(&self, user_id: &str, id: i64) -> Result<bool, BacktestError> {
        Ok(BacktestRepository::new(&self.pool).delete(user_id, id).await?)
    }
}

// ============================================================================
// Row conversion
// ============================================================================

fn to_row(record: &BacktestRecord) -> Result<BacktestRow, BacktestError> {
    let results = &record.results;
    Ok(BacktestRow {
        id: record.id,
        user_id: record.user_id.clone(),
        name: record.name.clone(),
        symbol: record.symbol.clone(),
        start_date: record.start_date.to_string(),
        end_date: record.end_date.to_string(),
        initial_capital: record.initial_capital.to_string(),
        strategy_config: serde_json::to_string(&record.strategy)?,
        final_value: results.final_value.to_string(),
        total_return: results.total_return.to_string(),
        total_return_percent: results.total_return_percent.to_string(),
        max_drawdown_percent: results.max_drawdown_percent.to_string(),
        sharpe_ratio: results.sharpe_ratio.to_string(),
        trade_count: results.trades.len() as i64,
        results_json: serde_json::to_string(results)?,
        created_at: Some(record.created_at.timestamp()),
    })
}

fn from_row(row: BacktestRow) -> Result<BacktestRecord, BacktestError> {
    Ok(BacktestRecord {
        id: row.id,
        initial_capital: decimal(&row.initial_capital)?,
        start_date: date(&row.start_date)?,
        end_date: date(&row.end_date)?,
        strategy: serde_json::from_str(&row.strategy_config)?,
        results: serde_json::from_str(&row.results_json)?,
        created_at: timestamp(row.created_at),
        user_id: row.user_id,
        name: row.name,
        symbol: row.symbol,
    })
}

fn from_summary_row(row: BacktestSummaryRow) -> Result<BacktestSummary, BacktestError> {
    Ok(BacktestSummary {
        id: row.id,
        start_date: date(&row.start_date)?,
        end_date: date(&row.end_date)?,
        initial_capital: decimal(&row.initial_capital)?,
        final_value: decimal(&row.final_value)?,
        total_return: decimal(&row.total_return)?,
        total_return_percent: decimal(&row.total_return_percent)?,
        created_at: timestamp(row.created_at),
        name: row.name,
        symbol: row.symbol,
    })
}

fn decimal(raw: &str) -> Result<Decimal, BacktestError> {
    Decimal::from_str(raw)
        .map_err(|e| BacktestError::Storage(format!("bad decimal column {raw:?}: {e}")))
}

fn date(raw: &str) -> Result<NaiveDate, BacktestError> {
    NaiveDate::from_str(raw).map_err(|e| BacktestError::Storage(format!("bad date column {raw:?}: {e}")))
}

fn timestamp(secs: Option<i64>) -> DateTime<Utc> {
    secs.and_then(|s| DateTime::from_timestamp(s, 0))
        .unwrap_or_default()
}
