//! Error taxonomy for backtest runs

use std::time::Duration;

use thiserror::Error;

pub const NO_DATA_MESSAGE: &str = "no historical data available for the selected period";

#[derive(Error, Debug)]
pub enum BacktestError {
    /// Malformed input; surfaced verbatim, never retried
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{}", NO_DATA_MESSAGE)]
    NoData,

    /// Transport or auth failure talking to the price source
    #[error("Data source error: {0}")]
    DataSource(String),

    #[error("Data source timed out after {0:?}")]
    Timeout(Duration),

    #[error("Backtest {0} not found")]
    NotFound(i64),

    #[error("Storage error: {0}")]
    Storage(String),

    /// Broken invariant; a bug rather than an expected condition
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BacktestError {
    /// Only data-source failures are worth a second attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, BacktestError::DataSource(_) | BacktestError::Timeout(_))
    }

    /// Message safe to show to an end user
    pub fn user_message(&self) -> String {
        match self {
            BacktestError::Validation(msg) => msg.clone(),
            BacktestError::NoData => NO_DATA_MESSAGE.to_string(),
            BacktestError::NotFound(_) => self.to_string(),
            BacktestError::DataSource(_) | BacktestError::Timeout(_) => {
                "Failed to fetch historical data, please try again later".to_string()
            }
            BacktestError::Storage(_) | BacktestError::Internal(_) => {
                "Internal error while running backtest".to_string()
            }
        }
    }
}

impl From<persistence::DbError> for BacktestError {
    fn from(e: persistence::DbError) -> Self {
        BacktestError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for BacktestError {
    fn from(e: serde_json::Error) -> Self {
        BacktestError::Storage(format!("JSON encoding: {e}"))
    }
}
