// Core modules
pub mod accounting;
pub mod backfill;
pub mod clock;
pub mod config;
pub mod error;
pub mod exchange;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod notify;
pub mod persistence;
pub mod shutdown;
pub mod strategy;
pub mod trading;

// Re-export commonly used types
pub use error::{Error, Result};
pub use models::*;
pub use trading::{RunReport, TradingLoop};
