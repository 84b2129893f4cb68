//! Backtest repository: saved backtest runs keyed by user and id

use crate::DbResult;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// A persisted backtest run.
///
/// Amounts are decimal strings, `strategy_config` and `results_json` are JSON
/// documents owned by the engine crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct BacktestRow {
    pub id: Option<i64>,
    pub user_id: String,
    pub name: String,
    pub symbol: String,
    pub start_date: String,
    pub end_date: String,
    pub initial_capital: String,
    pub strategy_config: String,
    pub final_value: String,
    pub total_return: String,
    pub total_return_percent: String,
    pub max_drawdown_percent: String,
    pub sharpe_ratio: String,
    pub trade_count: i64,
    pub results_json: String,
    pub created_at: Option<i64>,
}

/// Listing projection (no result document)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct BacktestSummaryRow {
    pub id: i64,
    pub name: String,
    pub symbol: String,
    pub start_date: String,
    pub end_date: String,
    pub initial_capital: String,
    pub final_value: String,
    pub total_return: String,
    pub total_return_percent: String,
    pub created_at: Option<i64>,
}

/// Repository for saved backtests
pub struct BacktestRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> BacktestRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a backtest run and return its id. `created_at` falls back to now.
    pub async fn save(&self, row: &BacktestRow) -> DbResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO backtests (
                user_id, name, symbol, start_date, end_date,
                initial_capital, strategy_config,
                final_value, total_return, total_return_percent,
                max_drawdown_percent, sharpe_ratio, trade_count,
                results_json, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, COALESCE(?, strftime('%s', 'now')))
            "#,
        )
        .bind(&row.user_id)
        .bind(&row.name)
        .bind(&row.symbol)
        .bind(&row.start_date)
        .bind(&row.end_date)
        .bind(&row.initial_capital)
        .bind(&row.strategy_config)
        .bind(&row.final_value)
        .bind(&row.total_return)
        .bind(&row.total_return_percent)
        .bind(&row.max_drawdown_percent)
        .bind(&row.sharpe_ratio)
        .bind(row.trade_count)
        .bind(&row.results_json)
        .bind(row.created_at)
        .execute(self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Get a backtest by id
    pub async fn get(&self, id: i64) -> DbResult<Option<BacktestRow>> {
        let row = sqlx::query_as::<_, BacktestRow>(
            r#"
            SELECT id, user_id, name, symbol, start_date, end_date,
                   initial_capital, strategy_config,
                   final_value, total_return, total_return_percent,
                   max_drawdown_percent, sharpe_ratio, trade_count,
                   results_json, created_at
            FROM backtests
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row)
    }

    /// List a user's backtests, newest first
    pub async fn list_by_user(&self, user_id: &str) -> DbResult<Vec<BacktestSummaryRow>> {
        let rows = sqlx::query_as::<_, BacktestSummaryRow>(
            r#"
            SELECT id, name, symbol, start_date, end_date, initial_capital,
                   final_value, total_return, total_return_percent, created_at
            FROM backtests
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows)
    }

    /// Delete a backtest owned by `user_id`. Returns false when nothing matched.
    pub async fn delete(&self, user_id: &str, id: i64) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM backtests WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn sample_row(user_id: &str, name: &str, created_at: i64) -> BacktestRow {
        BacktestRow {
            id: None,
            user_id: user_id.to_string(),
            name: name.to_string(),
            symbol: "AAPL".to_string(),
            start_date: "2023-01-01".to_string(),
            end_date: "2023-12-31".to_string(),
            initial_capital: "10000".to_string(),
            strategy_config: r#"{"type":"buy_and_hold"}"#.to_string(),
            final_value: "11250.50".to_string(),
            total_return: "1250.50".to_string(),
            total_return_percent: "12.505".to_string(),
            max_drawdown_percent: "4.2".to_string(),
            sharpe_ratio: "0.12".to_string(),
            trade_count: 2,
            results_json: "{}".to_string(),
            created_at: Some(created_at),
        }
    }

    #[tokio::test]
    async fn test_save_and_get_round_trip() {
        let db = Database::in_memory().await.unwrap();
        let repo = BacktestRepository::new(db.pool());

        let row = sample_row("alice", "Buy and hold AAPL", 1_700_000_000);
        let id = repo.save(&row).await.unwrap();
        assert!(id > 0);

        let loaded = repo.get(id).await.unwrap().expect("row should exist");
        assert_eq!(loaded.id, Some(id));
        assert_eq!(
            BacktestRow {
                id: Some(id),
                ..row
            },
            loaded
        );
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let db = Database::in_memory().await.unwrap();
        let repo = BacktestRepository::new(db.pool());
        assert!(repo.get(42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_created_at_defaults_to_now() {
        let db = Database::in_memory().await.unwrap();
        let repo = BacktestRepository::new(db.pool());

        let mut row = sample_row("alice", "no timestamp", 0);
        row.created_at = None;
        let id = repo.save(&row).await.unwrap();

        let loaded = repo.get(id).await.unwrap().unwrap();
        assert!(loaded.created_at.unwrap_or(0) > 1_600_000_000);
    }

    #[tokio::test]
    async fn test_list_is_scoped_to_user_and_newest_first() {
        let db = Database::in_memory().await.unwrap();
        let repo = BacktestRepository::new(db.pool());

        repo.save(&sample_row("alice", "older", 1_700_000_000)).await.unwrap();
        repo.save(&sample_row("alice", "newer", 1_700_086_400)).await.unwrap();
        repo.save(&sample_row("bob", "other user", 1_700_000_500)).await.unwrap();

        let alice = repo.list_by_user("alice").await.unwrap();
        assert_eq!(alice.len(), 2);
        assert_eq!(alice[0].name, "newer");
        assert_eq!(alice[1].name, "older");
        assert_eq!(alice[0].final_value, "11250.50");

        assert_eq!(repo.list_by_user("bob").await.unwrap().len(), 1);
        assert!(repo.list_by_user("carol").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_requires_owner() {
        let db = Database::in_memory().await.unwrap();
        let repo = BacktestRepository::new(db.pool());

        let id = repo.save(&sample_row("alice", "mine", 1_700_000_000)).await.unwrap();

        assert!(!repo.delete("bob", id).await.unwrap());
        assert!(repo.get(id).await.unwrap().is_some());

        assert!(repo.delete("alice", id).await.unwrap());
        assert!(repo.get(id).await.unwrap().is_none());
        assert!(!repo.delete("alice", id).await.unwrap());
    }
}
