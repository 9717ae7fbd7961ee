//! Series normalization: dedupe onto a grid, then reindex and forward-fill.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::series::{NormalizedSeries, SeriesError};
use crate::domain::{Grain, PriceRow};

/// Floor every observation onto the grid and keep one row per slot.
///
/// Rows are ordered by their original timestamp (input order breaks ties) and
/// the last row landing in a slot wins. Rows without a finite close are not
/// observations and are dropped. No gap filling happens here.
pub fn dedup(rows: &[PriceRow], grain: Grain) -> Vec<PriceRow> {
    let mut observed: Vec<&PriceRow> = rows.iter().filter(|r| r.is_observation()).collect();
    // stable: equal timestamps keep input order
    observed.sort_by_key(|r| r.ts);

    let mut by_slot: BTreeMap<DateTime<Utc>, PriceRow> = BTreeMap::new();
    for row in observed {
        let slot = grain.floor(row.ts);
        let mut row = row.clone();
        row.ts = slot;
        by_slot.insert(slot, row);
    }
    by_slot.into_values().collect()
}

/// Normalize raw rows for one ticker onto a contiguous grid.
///
/// The grid runs from the first to the last observed slot; missing slots are
/// filled with a flat bar at the previous close and zero volume. Nothing is
/// filled before the first observation.
pub fn normalize(
    ticker: &str,
    rows: &[PriceRow],
    grain: Grain,
    min_len: usize,
) -> Result<NormalizedSeries, SeriesError> {
    let observed = dedup(rows, grain);
    let (Some(first), Some(last)) = (observed.first(), observed.last()) else {
        return Err(SeriesError::EmptySeries {
            ticker: ticker.to_string(),
        });
    };

    let step = grain.step();
    let mut slot = first.ts;
    let last_ts = last.ts;

    let mut grid: Vec<PriceRow> = Vec::with_capacity(observed.len());
    let mut filled = 0usize;
    let mut cursor = 0usize;

    while slot <= last_ts {
        if observed.get(cursor).is_some_and(|r| r.ts == slot) {
            grid.push(observed[cursor].clone());
            cursor += 1;
        } else if let Some(prev) = grid.last() {
            let carried = prev.carried_to(slot);
            grid.push(carried);
            filled += 1;
        }
        slot += step;
    }

    if grid.len() < min_len {
        return Err(SeriesError::InsufficientData {
            ticker: ticker.to_string(),
            len: grid.len(),
            min: min_len,
        });
    }

    Ok(NormalizedSeries::from_grid(
        ticker.to_string(),
        grain,
        grid,
        filled,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn row(ts: DateTime<Utc>, adj_close: f64) -> PriceRow {
        PriceRow {
            ts,
            ticker: "X".into(),
            open: adj_close,
            high: adj_close + 1.0,
            low: adj_close - 1.0,
            close: adj_close,
            adj_close,
            volume: 100,
        }
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, h, m, 0).unwrap()
    }

    #[test]
    fn duplicate_slots_keep_latest_observation() {
        let rows = vec![row(at(10, 30), 2.0), row(at(10, 0), 1.0), row(at(11, 0), 3.0)];
        let deduped = dedup(&rows, Grain::Hourly);

        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].ts, at(10, 0));
        assert_eq!(deduped[0].adj_close, 2.0);
        assert_eq!(deduped[1].adj_close, 3.0);
    }

    #[test]
    fn identical_timestamps_keep_last_in_input_order() {
        let rows = vec![row(at(9, 0), 1.0), row(at(9, 0), 7.0)];
        let deduped = dedup(&rows, Grain::Hourly);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].adj_close, 7.0);
    }

    #[test]
    fn gaps_are_forward_filled() {
        let rows = vec![row(at(9, 0), 1.0), row(at(12, 0), 4.0)];
        let series = normalize("X", &rows, Grain::Hourly, 1).unwrap();

        assert_eq!(series.len(), 4);
        assert_eq!(series.filled_slots(), 2);
        assert_eq!(series.values(), vec![1.0, 1.0, 1.0, 4.0]);
        assert_eq!(series.rows()[1].volume, 0);
        for pair in series.rows().windows(2) {
            assert_eq!(pair[1].ts - pair[0].ts, Duration::hours(1));
        }
    }

    #[test]
    fn leading_unusable_rows_are_not_filled() {
        let mut bad = row(at(7, 0), 1.0);
        bad.adj_close = f64::NAN;
        let rows = vec![bad, row(at(9, 0), 5.0), row(at(10, 0), 6.0)];
        let series = normalize("X", &rows, Grain::Hourly, 1).unwrap();

        assert_eq!(series.first_ts(), Some(at(9, 0)));
        assert_eq!(series.len(), 2);
    }

    #[test]
    fn empty_input_is_empty_series_error() {
        let err = normalize("X", &[], Grain::Hourly, 1).unwrap_err();
        assert!(matches!(err, SeriesError::EmptySeries { .. }));
    }

    #[test]
    fn short_series_is_insufficient() {
        let rows = vec![row(at(9, 0), 1.0), row(at(10, 0), 2.0)];
        let err = normalize("X", &rows, Grain::Hourly, 10).unwrap_err();
        assert_eq!(
            err,
            SeriesError::InsufficientData {
                ticker: "X".into(),
                len: 2,
                min: 10
            }
        );
    }
}
