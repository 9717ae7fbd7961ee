//! Hourly to daily roll-up.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use super::series::{NormalizedSeries, SeriesError};
use crate::domain::{Grain, PriceRow};

/// Roll an hourly series up to one row per UTC calendar day.
///
/// Filled slots take part like any other row; their zero volume leaves the
/// sum unchanged. Use [`rollup_daily`] on deduplicated rows to keep gaps out
/// of the daily bars.
pub fn aggregate_daily(series: &NormalizedSeries) -> Result<Vec<PriceRow>, SeriesError> {
    if series.grain() != Grain::Hourly {
        return Err(SeriesError::GrainMismatch {
            expected: Grain::Hourly,
            actual: series.grain(),
        });
    }
    Ok(rollup_daily(series.rows()))
}

/// One row per UTC calendar day present in `rows`, stamped at midnight UTC.
///
/// Per day: first open, max high, min low, last close and adj_close, summed
/// volume. `rows` must be in timestamp order. Days without rows produce
/// nothing.
pub fn rollup_daily(rows: &[PriceRow]) -> Vec<PriceRow> {
    let mut days: BTreeMap<NaiveDate, PriceRow> = BTreeMap::new();
    for row in rows {
        let day = row.ts.date_naive();
        days.entry(day)
            .and_modify(|acc| {
                acc.high = acc.high.max(row.high);
                acc.low = acc.low.min(row.low);
                acc.close = row.close;
                acc.adj_close = row.adj_close;
                acc.volume = acc.volume.saturating_add(row.volume);
            })
            .or_insert_with(|| PriceRow {
                ts: Grain::Daily.floor(row.ts),
                ..row.clone()
            });
    }
    days.into_values().collect()
}
