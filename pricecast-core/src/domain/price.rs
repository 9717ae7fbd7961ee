//! PriceRow: the fundamental market data unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV row for a single ticker at a single instant.
///
/// `adj_close` is the forecast target throughout the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
    pub ts: DateTime<Utc>,
    pub ticker: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adj_close: f64,
    pub volume: u64,
}

impl PriceRow {
    /// A row counts as an observation only if its close fields are usable.
    pub fn is_observation(&self) -> bool {
        self.close.is_finite() && self.adj_close.is_finite()
    }

    /// Flat bar carrying this row's close forward to `ts` with zero volume.
    pub fn carried_to(&self, ts: DateTime<Utc>) -> PriceRow {
        PriceRow {
            ts,
            ticker: self.ticker.clone(),
            open: self.close,
            high: self.close,
            low: self.close,
            close: self.close,
            adj_close: self.adj_close,
            volume: 0,
        }
    }
}
