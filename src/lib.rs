//! prtrack - Personal record tracking for personal-training clients
//!
//! Detects new max-weight and max-volume records as sets are logged,
//! and rebuilds a client's records from their full workout history.

pub mod db;
pub mod exercises;
pub mod records;
pub mod units;

pub use db::Database;
pub use records::{PrEngine, RecordStore};
