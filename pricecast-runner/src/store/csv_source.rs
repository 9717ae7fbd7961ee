//! Raw price rows from a CSV export.
//!
//! Expected header: `ts,open,high,low,close[,adj_close][,volume][,ticker]`.
//! `adj_close` defaults to `close`, `volume` to 0. Timestamps may be RFC 3339,
//! `YYYY-MM-DD HH:MM:SS[+HH:MM]` or a bare date; naive values are UTC.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;

use pricecast_core::domain::PriceRow;

use super::StoreError;

#[derive(Debug, Deserialize)]
struct CsvRecord {
    ts: String,
    #[serde(default)]
    ticker: Option<String>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    adj_close: Option<f64>,
    #[serde(default)]
    volume: Option<f64>,
}

fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(ts.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc())
}

pub struct CsvPriceFile {
    path: PathBuf,
}

impl CsvPriceFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all rows. A `ticker` column, when present, must match `ticker`;
    /// other rows are skipped. Without the column every row is `ticker`'s.
    pub fn read_rows(&self, ticker: &str) -> Result<Vec<PriceRow>, StoreError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)?;

        let mut rows = Vec::new();
        for (idx, record) in reader.deserialize::<CsvRecord>().enumerate() {
            // header is line 1
            let line = idx + 2;
            let record = record?;
            if record.ticker.as_deref().is_some_and(|t| t != ticker) {
                continue;
            }
            let ts = parse_ts(&record.ts).ok_or_else(|| StoreError::Malformed {
                source_name: self.path.display().to_string(),
                line,
                message: format!("unrecognized timestamp '{}'", record.ts),
            })?;
            rows.push(PriceRow {
                ts,
                ticker: ticker.to_string(),
                open: record.open,
                high: record.high,
                low: record.low,
                close: record.close,
                adj_close: record.adj_close.unwrap_or(record.close),
                volume: record.volume.map_or(0, |v| v.max(0.0).round() as u64),
            });
        }
        Ok(rows)
    }
}
