//! Database schema definitions

/// SQL to create all tables
/// NOTE: All prices/amounts stored as TEXT to preserve rust_decimal::Decimal precision
pub const CREATE_TABLES: &str = r#"
-- Saved backtest runs: request inputs, headline metrics and the full result document
CREATE TABLE IF NOT EXISTS backtests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL,
    symbol TEXT NOT NULL,
    start_date TEXT NOT NULL,
    end_date TEXT NOT NULL,
    initial_capital TEXT NOT NULL,
    strategy_config TEXT NOT NULL,
    final_value TEXT NOT NULL DEFAULT '0',
    total_return TEXT NOT NULL DEFAULT '0',
    total_return_percent TEXT NOT NULL DEFAULT '0',
    results_json TEXT NOT NULL,
    created_at INTEGER DEFAULT (strftime('%s', 'now'))
);

-- ========== INDEXES ==========

CREATE INDEX IF NOT EXISTS idx_backtests_user ON backtests(user_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_backtests_symbol ON backtests(symbol)
"#;

/// Column additions applied after table creation (duplicate columns are tolerated)
pub const MIGRATIONS: &[&str] = &[
    "ALTER TABLE backtests ADD COLUMN max_drawdown_percent TEXT NOT NULL DEFAULT '0'",
    "ALTER TABLE backtests ADD COLUMN sharpe_ratio TEXT NOT NULL DEFAULT '0'",
    "ALTER TABLE backtests ADD COLUMN trade_count INTEGER NOT NULL DEFAULT 0",
];
