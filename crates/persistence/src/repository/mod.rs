//! Repository implementations for database operations

pub mod backtests;

pub use backtests::*;
