//! Backfill a CSV export into a JSONL store, then forecast from it.

use std::io::Write;

use chrono::{Duration, TimeZone, Utc};

use pricecast_runner::schema::{DailyPriceRow, HourlyPriceRow, ShortForecastRow};
use pricecast_runner::{
    backfill, CsvPriceFile, ForecastRequest, JsonlStore, Pipeline, PipelineConfig, Table,
};

fn write_csv(hours: usize) -> tempfile::NamedTempFile {
    let start = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "ts,open,high,low,close,adj_close,volume").unwrap();
    for i in 0..hours {
        let ts = start + Duration::hours(i as i64);
        let p = 200.0 + 0.02 * i as f64 + 1.5 * ((i % 24) as f64 / 24.0 * std::f64::consts::TAU).sin()
            + ((i * 37) % 11) as f64 * 0.03;
        writeln!(
            file,
            "{},{p:.4},{:.4},{:.4},{p:.4},{p:.4},{}",
            ts.to_rfc3339(),
            p + 0.4,
            p - 0.4,
            100 + i % 7
        )
        .unwrap();
    }
    // a late duplicate for the first hour
    writeln!(file, "{},1,1,1,199,199,1", start.to_rfc3339()).unwrap();
    file
}

#[test]
fn backfill_writes_hourly_and_daily_tables() {
    let csv = write_csv(72);
    let dir = tempfile::tempdir().unwrap();
    let store = JsonlStore::open(dir.path()).unwrap();
    let rows = CsvPriceFile::new(csv.path()).read_rows("ABC").unwrap();
    assert_eq!(rows.len(), 73);

    let load_ts = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
    let report = backfill("ABC", &rows, &store, "csv", load_ts).unwrap();
    assert_eq!(report.hourly_rows, 72);
    assert_eq!(report.daily_rows, 3);

    let hourly: Vec<HourlyPriceRow> = store.read_table(Table::PricesHourly).unwrap();
    assert_eq!(hourly.len(), 72);
    assert_eq!(hourly[0].close, 199.0);
    assert!(hourly.iter().all(|r| r.src == "csv" && r.load_ts == load_ts));

    let daily: Vec<DailyPriceRow> = store.read_table(Table::PricesDaily).unwrap();
    assert_eq!(daily.len(), 3);
    let raw = std::fs::read_to_string(store.table_path(Table::PricesDaily)).unwrap();
    assert!(!raw.contains("load_ts"));
    assert!(!raw.contains("\"src\""));
}

#[test]
fn pipeline_reads_backfilled_prices_from_jsonl() {
    let hours = 24 * 31;
    let csv = write_csv(hours);
    let dir = tempfile::tempdir().unwrap();
    let store = JsonlStore::open(dir.path()).unwrap();
    let rows = CsvPriceFile::new(csv.path()).read_rows("ABC").unwrap();
    backfill("ABC", &rows, &store, "csv", Utc::now()).unwrap();

    let mut config = PipelineConfig::default();
    config.short.window_days = 31;
    let run_ts = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap() + Duration::hours(hours as i64);
    let request = ForecastRequest {
        tickers: vec!["ABC".into()],
        ..ForecastRequest::default()
    };
    let summary = Pipeline::new(&store, &store, config)
        .unwrap()
        .run_at(&request, run_ts);
    assert!(summary.units[0].is_ok(), "{:?}", summary.units[0]);

    let short: Vec<ShortForecastRow> = store.read_table(Table::ForecastShort).unwrap();
    assert_eq!(short.len(), 24);
    assert!(short.iter().all(|r| r.ticker == "ABC" && r.horizon == "24h"));
}
