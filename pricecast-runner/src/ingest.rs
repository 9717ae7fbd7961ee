//! Backfill: load raw hourly prices into the hourly and daily tables.
//!
//! Raw rows are deduplicated onto the hourly grid and written with audit
//! fields. The same rows are then rolled up to daily bars, without gap
//! filling, and written without audit fields.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use pricecast_core::data::{dedup, rollup_daily, SeriesError};
use pricecast_core::domain::{Grain, PriceRow};

use crate::schema::{to_daily_price_rows, to_hourly_price_rows};
use crate::store::{ForecastStore, WriteError};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Series(#[from] SeriesError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Row counts written by one backfill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub ticker: String,
    pub raw_rows: usize,
    pub hourly_rows: usize,
    pub daily_rows: usize,
}

pub fn backfill(
    ticker: &str,
    rows: &[PriceRow],
    store: &dyn ForecastStore,
    src: &str,
    load_ts: DateTime<Utc>,
) -> Result<IngestReport, IngestError> {
    let hourly = dedup(rows, Grain::Hourly);
    if hourly.is_empty() {
        return Err(SeriesError::EmptySeries {
            ticker: ticker.to_string(),
        }
        .into());
    }
    store.append_hourly_prices(&to_hourly_price_rows(&hourly, src, load_ts))?;

    // dedup output is slot-ordered
    let daily = rollup_daily(&hourly);
    store.append_daily_prices(&to_daily_price_rows(&daily))?;

    info!(
        ticker,
        raw = rows.len(),
        hourly = hourly.len(),
        daily = daily.len(),
        "backfill complete"
    );
    Ok(IngestReport {
        ticker: ticker.to_string(),
        raw_rows: rows.len(),
        hourly_rows: hourly.len(),
        daily_rows: daily.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Table};
    use chrono::{Duration, TimeZone};

    fn raw(hours: i64) -> Vec<PriceRow> {
        let start = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        (0..hours)
            .map(|i| PriceRow {
                ts: start + Duration::hours(i),
                ticker: "X".into(),
                open: 10.0,
                high: 11.0,
                low: 9.0,
                close: 10.0 + i as f64 * 0.01,
                adj_close: 10.0 + i as f64 * 0.01,
                volume: 5,
            })
            .collect()
    }

    #[test]
    fn writes_audited_hourly_and_plain_daily_rows() {
        let store = MemoryStore::new();
        let mut rows = raw(48);
        rows.push(rows[3].clone());
        let load_ts = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();

        let report = backfill("X", &rows, &store, "yahoo", load_ts).unwrap();
        assert_eq!(report.raw_rows, 49);
        assert_eq!(report.hourly_rows, 48);
        assert_eq!(report.daily_rows, 2);

        let hourly = store.hourly_price_rows();
        assert_eq!(hourly.len(), 48);
        assert!(hourly.iter().all(|r| r.src == "yahoo" && r.load_ts == load_ts));

        let daily = store.daily_price_rows();
        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0].volume, 24 * 5);
    }

    #[test]
    fn weekend_gap_adds_no_daily_bars() {
        let session = |day: u32, base: f64| {
            (4..10).enumerate().map(move |(i, hour)| {
                let p = base + i as f64;
                PriceRow {
                    ts: Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap(),
                    ticker: "X".into(),
                    open: p,
                    high: p + 1.0,
                    low: p - 1.0,
                    close: p,
                    adj_close: p,
                    volume: 10,
                }
            })
        };
        // Friday 1 March and Monday 4 March
        let rows: Vec<PriceRow> = session(1, 100.0).chain(session(4, 200.0)).collect();
        let store = MemoryStore::new();

        let report = backfill("X", &rows, &store, "yahoo", Utc::now()).unwrap();
        assert_eq!(report.daily_rows, 2);

        let daily = store.daily_price_rows();
        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0].close, 105.0);
        assert_eq!(daily[1].ts, Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap());
        assert_eq!(daily[1].open, 200.0);
        assert_eq!(daily[1].low, 199.0);
        assert_eq!(daily[1].volume, 60);
    }

    #[test]
    fn empty_input_is_rejected() {
        let store = MemoryStore::new();
        let err = backfill("X", &[], &store, "yahoo", Utc::now()).unwrap_err();
        assert!(matches!(err, IngestError::Series(SeriesError::EmptySeries { .. })));
    }

    #[test]
    fn write_failure_surfaces_table() {
        let store = MemoryStore::new();
        store.break_table(Table::PricesDaily);
        let err = backfill("X", &raw(5), &store, "yahoo", Utc::now()).unwrap_err();
        match err {
            IngestError::Write(w) => assert_eq!(w.table, Table::PricesDaily),
            other => panic!("unexpected error: {other}"),
        }
    }
}
