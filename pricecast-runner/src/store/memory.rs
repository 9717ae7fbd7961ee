//! In-process store for tests and dry runs.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use pricecast_core::domain::PriceRow;

use super::{ForecastStore, PriceStore, StoreError, Table, WriteError};
use crate::schema::{DailyPriceRow, HourlyPriceRow, LongForecastRow, MetricsRow, ShortForecastRow};

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Keeps every table in memory. Read and write failures can be injected
/// per ticker and per table. Appended price rows are served back by the
/// [`PriceStore`] reads, as in the file-backed store.
#[derive(Default)]
pub struct MemoryStore {
    hourly: Mutex<Vec<PriceRow>>,
    daily: Mutex<Vec<PriceRow>>,
    short: Mutex<Vec<ShortForecastRow>>,
    long: Mutex<Vec<LongForecastRow>>,
    metrics: Mutex<Vec<MetricsRow>>,
    hourly_prices: Mutex<Vec<HourlyPriceRow>>,
    daily_prices: Mutex<Vec<DailyPriceRow>>,
    /// Remaining transient read failures per ticker.
    transient_reads: Mutex<HashMap<String, u32>>,
    broken_tickers: Mutex<HashSet<String>>,
    broken_tables: Mutex<HashSet<Table>>,
    reads: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_hourly(&self, rows: impl IntoIterator<Item = PriceRow>) {
        guard(&self.hourly).extend(rows);
    }

    pub fn insert_daily(&self, rows: impl IntoIterator<Item = PriceRow>) {
        guard(&self.daily).extend(rows);
    }

    /// The next `n` reads for `ticker` fail with a transient error.
    pub fn fail_next_reads(&self, ticker: &str, n: u32) {
        guard(&self.transient_reads).insert(ticker.to_string(), n);
    }

    /// Every read for `ticker` fails with a permanent error.
    pub fn break_ticker(&self, ticker: &str) {
        guard(&self.broken_tickers).insert(ticker.to_string());
    }

    /// Every append to `table` fails.
    pub fn break_table(&self, table: Table) {
        guard(&self.broken_tables).insert(table);
    }

    /// Number of read calls served or failed so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn short_rows(&self) -> Vec<ShortForecastRow> {
        guard(&self.short).clone()
    }

    pub fn long_rows(&self) -> Vec<LongForecastRow> {
        guard(&self.long).clone()
    }

    pub fn metrics_rows(&self) -> Vec<MetricsRow> {
        guard(&self.metrics).clone()
    }

    pub fn hourly_price_rows(&self) -> Vec<HourlyPriceRow> {
        guard(&self.hourly_prices).clone()
    }

    pub fn daily_price_rows(&self) -> Vec<DailyPriceRow> {
        guard(&self.daily_prices).clone()
    }

    fn check_read(&self, ticker: &str) -> Result<(), StoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        if guard(&self.broken_tickers).contains(ticker) {
            return Err(StoreError::Malformed {
                source_name: "memory".into(),
                line: 0,
                message: format!("ticker '{ticker}' is unreadable"),
            });
        }
        let mut transient = guard(&self.transient_reads);
        if let Some(left) = transient.get_mut(ticker) {
            if *left > 0 {
                *left -= 1;
                return Err(StoreError::Unavailable(format!("injected failure for '{ticker}'")));
            }
        }
        Ok(())
    }

    fn window(rows: &[PriceRow], ticker: &str, since: DateTime<Utc>) -> Vec<PriceRow> {
        let mut out: Vec<PriceRow> = rows
            .iter()
            .filter(|r| r.ticker == ticker && r.ts >= since)
            .cloned()
            .collect();
        out.sort_by_key(|r| r.ts);
        out
    }

    fn append<T: Clone>(&self, table: Table, target: &Mutex<Vec<T>>, rows: &[T]) -> Result<(), WriteError> {
        if guard(&self.broken_tables).contains(&table) {
            return Err(WriteError {
                table,
                source: StoreError::Unavailable("injected write failure".into()),
            });
        }
        guard(target).extend_from_slice(rows);
        Ok(())
    }
}

impl PriceStore for MemoryStore {
    fn hourly_rows(&self, ticker: &str, since: DateTime<Utc>) -> Result<Vec<PriceRow>, StoreError> {
        self.check_read(ticker)?;
        Ok(Self::window(&guard(&self.hourly), ticker, since))
    }

    fn daily_rows(&self, ticker: &str, since: DateTime<Utc>) -> Result<Vec<PriceRow>, StoreError> {
        self.check_read(ticker)?;
        Ok(Self::window(&guard(&self.daily), ticker, since))
    }
}

impl ForecastStore for MemoryStore {
    fn append_short(&self, rows: &[ShortForecastRow]) -> Result<(), WriteError> {
        self.append(Table::ForecastShort, &self.short, rows)
    }

    fn append_long(&self, rows: &[LongForecastRow]) -> Result<(), WriteError> {
        self.append(Table::ForecastLong, &self.long, rows)
    }

    fn append_metrics(&self, rows: &[MetricsRow]) -> Result<(), WriteError> {
        self.append(Table::EvalMetrics, &self.metrics, rows)
    }

    fn append_hourly_prices(&self, rows: &[HourlyPriceRow]) -> Result<(), WriteError> {
        self.append(Table::PricesHourly, &self.hourly_prices, rows)?;
        self.insert_hourly(rows.iter().cloned().map(PriceRow::from));
        Ok(())
    }

    fn append_daily_prices(&self, rows: &[DailyPriceRow]) -> Result<(), WriteError> {
        self.append(Table::PricesDaily, &self.daily_prices, rows)?;
        self.insert_daily(rows.iter().cloned().map(PriceRow::from));
        Ok(())
    }
}
