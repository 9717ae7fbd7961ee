//! Price and forecast stores.
//!
//! The orchestrator borrows one [`PriceStore`] and one [`ForecastStore`] for
//! the length of an invocation. Implementations must tolerate concurrent
//! calls from worker threads.

pub mod csv_source;
pub mod jsonl;
pub mod memory;

pub use csv_source::CsvPriceFile;
pub use jsonl::JsonlStore;
pub use memory::MemoryStore;

use std::fmt;
use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

use pricecast_core::domain::PriceRow;

use crate::schema::{DailyPriceRow, HourlyPriceRow, LongForecastRow, MetricsRow, ShortForecastRow};

/// Destination tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    PricesHourly,
    PricesDaily,
    ForecastShort,
    ForecastLong,
    EvalMetrics,
}

impl Table {
    pub const ALL: [Table; 5] = [
        Table::PricesHourly,
        Table::PricesDaily,
        Table::ForecastShort,
        Table::ForecastLong,
        Table::EvalMetrics,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::PricesHourly => "prices_hourly",
            Table::PricesDaily => "prices_daily",
            Table::ForecastShort => "forecast_short",
            Table::ForecastLong => "forecast_long",
            Table::EvalMetrics => "eval_metrics",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed row in {source_name} at line {line}: {message}")]
    Malformed {
        source_name: String,
        line: usize,
        message: String,
    },

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl StoreError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

/// An append that did not land.
#[derive(Debug, Error)]
#[error("append to {table} failed: {source}")]
pub struct WriteError {
    pub table: Table,
    #[source]
    pub source: StoreError,
}

/// Read side: historical prices per ticker.
pub trait PriceStore: Send + Sync {
    /// Hourly rows for `ticker` with `ts >= since`, ordered by timestamp.
    fn hourly_rows(&self, ticker: &str, since: DateTime<Utc>) -> Result<Vec<PriceRow>, StoreError>;

    /// Daily rows for `ticker` with `ts >= since`, ordered by timestamp.
    fn daily_rows(&self, ticker: &str, since: DateTime<Utc>) -> Result<Vec<PriceRow>, StoreError>;
}

/// Write side: append-only destination tables.
pub trait ForecastStore: Send + Sync {
    fn append_short(&self, rows: &[ShortForecastRow]) -> Result<(), WriteError>;

    fn append_long(&self, rows: &[LongForecastRow]) -> Result<(), WriteError>;

    fn append_metrics(&self, rows: &[MetricsRow]) -> Result<(), WriteError>;

    fn append_hourly_prices(&self, rows: &[HourlyPriceRow]) -> Result<(), WriteError>;

    fn append_daily_prices(&self, rows: &[DailyPriceRow]) -> Result<(), WriteError>;
}
