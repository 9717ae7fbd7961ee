//! JSONL store: one append-only file per table in a directory.
//!
//! Each line is an independent JSON object, so a partial write damages at
//! most one row. Reads skip lines that do not parse.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use pricecast_core::domain::PriceRow;

use super::{ForecastStore, PriceStore, StoreError, Table, WriteError};
use crate::schema::{DailyPriceRow, HourlyPriceRow, LongForecastRow, MetricsRow, ShortForecastRow};

pub struct JsonlStore {
    dir: PathBuf,
    locks: HashMap<Table, Mutex<()>>,
}

impl JsonlStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        let locks = Table::ALL.iter().map(|t| (*t, Mutex::new(()))).collect();
        Ok(Self { dir, locks })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn table_path(&self, table: Table) -> PathBuf {
        self.dir.join(format!("{}.jsonl", table.name()))
    }

    fn lock(&self, table: Table) -> Option<MutexGuard<'_, ()>> {
        self.locks
            .get(&table)
            .map(|m| m.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    fn append<T: Serialize>(&self, table: Table, rows: &[T]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut buf = String::new();
        for row in rows {
            buf.push_str(&serde_json::to_string(row)?);
            buf.push('\n');
        }

        let path = self.table_path(table);
        let io_err = |source| StoreError::Io {
            path: path.clone(),
            source,
        };

        let _guard = self.lock(table);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;
        file.write_all(buf.as_bytes()).map_err(io_err)?;
        file.flush().map_err(io_err)?;

        debug!(table = %table, rows = rows.len(), "appended");
        Ok(())
    }

    /// Read every parseable row of a table. A missing file is an empty table.
    pub fn read_table<T: DeserializeOwned>(&self, table: Table) -> Result<Vec<T>, StoreError> {
        let path = self.table_path(table);
        let _guard = self.lock(table);
        let file = match fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        let mut rows = Vec::new();
        let mut skipped = 0usize;
        for line in io::BufReader::new(file).lines() {
            let line = line.map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(&line) {
                Ok(row) => rows.push(row),
                Err(_) => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(table = %table, skipped, "skipped malformed lines");
        }
        Ok(rows)
    }

    fn window<R: Into<PriceRow>>(rows: Vec<R>, ticker: &str, since: DateTime<Utc>) -> Vec<PriceRow> {
        let mut out: Vec<PriceRow> = rows
            .into_iter()
            .map(Into::into)
            .filter(|r: &PriceRow| r.ticker == ticker && r.ts >= since)
            .collect();
        out.sort_by_key(|r| r.ts);
        out
    }
}

impl PriceStore for JsonlStore {
    fn hourly_rows(&self, ticker: &str, since: DateTime<Utc>) -> Result<Vec<PriceRow>, StoreError> {
        let rows: Vec<HourlyPriceRow> = self.read_table(Table::PricesHourly)?;
        Ok(Self::window(rows, ticker, since))
    }

    fn daily_rows(&self, ticker: &str, since: DateTime<Utc>) -> Result<Vec<PriceRow>, StoreError> {
        let rows: Vec<DailyPriceRow> = self.read_table(Table::PricesDaily)?;
        Ok(Self::window(rows, ticker, since))
    }
}

impl ForecastStore for JsonlStore {
    fn append_short(&self, rows: &[ShortForecastRow]) -> Result<(), WriteError> {
        self.append(Table::ForecastShort, rows)
            .map_err(|source| WriteError { table: Table::ForecastShort, source })
    }

    fn append_long(&self, rows: &[LongForecastRow]) -> Result<(), WriteError> {
        self.append(Table::ForecastLong, rows)
            .map_err(|source| WriteError { table: Table::ForecastLong, source })
    }

    fn append_metrics(&self, rows: &[MetricsRow]) -> Result<(), WriteError> {
        self.append(Table::EvalMetrics, rows)
            .map_err(|source| WriteError { table: Table::EvalMetrics, source })
    }

    fn append_hourly_prices(&self, rows: &[HourlyPriceRow]) -> Result<(), WriteError> {
        self.append(Table::PricesHourly, rows)
            .map_err(|source| WriteError { table: Table::PricesHourly, source })
    }

    fn append_daily_prices(&self, rows: &[DailyPriceRow]) -> Result<(), WriteError> {
        self.append(Table::PricesDaily, rows)
            .map_err(|source| WriteError { table: Table::PricesDaily, source })
    }
}
