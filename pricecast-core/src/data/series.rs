//! NormalizedSeries: a price series on a contiguous fixed-step grid.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{Grain, PriceRow};

/// Errors raised while shaping a price series.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("no usable price rows for '{ticker}'")]
    EmptySeries { ticker: String },

    #[error("insufficient data for '{ticker}': {len} points < minimum {min}")]
    InsufficientData {
        ticker: String,
        len: usize,
        min: usize,
    },

    #[error("expected a {expected} series, got {actual}")]
    GrainMismatch { expected: Grain, actual: Grain },
}

/// Price rows on a fixed grid.
///
/// Invariant: timestamps are strictly increasing and consecutive rows are
/// exactly one `grain.step()` apart. The only constructors are
/// [`crate::data::normalize`] and [`NormalizedSeries::split_at`], both of
/// which preserve it.
#[derive(Debug, Clone)]
pub struct NormalizedSeries {
    ticker: String,
    grain: Grain,
    rows: Vec<PriceRow>,
    filled_slots: usize,
}

impl NormalizedSeries {
    pub(crate) fn from_grid(
        ticker: String,
        grain: Grain,
        rows: Vec<PriceRow>,
        filled_slots: usize,
    ) -> Self {
        debug_assert!(rows
            .windows(2)
            .all(|w| w[1].ts - w[0].ts == grain.step()));
        Self {
            ticker,
            grain,
            rows,
            filled_slots,
        }
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn grain(&self) -> Grain {
        self.grain
    }

    pub fn rows(&self) -> &[PriceRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of grid slots that were forward-filled rather than observed.
    pub fn filled_slots(&self) -> usize {
        self.filled_slots
    }

    pub fn first_ts(&self) -> Option<DateTime<Utc>> {
        self.rows.first().map(|r| r.ts)
    }

    pub fn last_ts(&self) -> Option<DateTime<Utc>> {
        self.rows.last().map(|r| r.ts)
    }

    /// Forecast target values (`adj_close`), in grid order.
    pub fn values(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.adj_close).collect()
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.rows.iter().map(|r| r.ts).collect()
    }

    /// Split into `[0, mid)` and `[mid, len)`. `mid` is clamped to `len`.
    pub fn split_at(&self, mid: usize) -> (NormalizedSeries, NormalizedSeries) {
        let mid = mid.min(self.rows.len());
        let (head, tail) = self.rows.split_at(mid);
        let part = |rows: &[PriceRow]| NormalizedSeries {
            ticker: self.ticker.clone(),
            grain: self.grain,
            rows: rows.to_vec(),
            filled_slots: 0,
        };
        (part(head), part(tail))
    }
}
