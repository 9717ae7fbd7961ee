//! pricecast CLI: forecast runs, price backfill and a health check.
//!
//! Commands:
//! - `run`: forecast every requested ticker on both horizons and score backtests
//! - `backfill`: load a CSV of hourly prices into the price tables
//! - `health`: print `ok`
//!
//! Logs go to stderr (`RUST_LOG`, default `info`); results go to stdout as JSON.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use pricecast_runner::schema::DEFAULT_SOURCE;
use pricecast_runner::{backfill, CsvPriceFile, ForecastRequest, JsonlStore, Pipeline, PipelineConfig};

#[derive(Parser)]
#[command(
    name = "pricecast",
    about = "pricecast: dual-horizon price forecasts with backtest scoring"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run short and long forecasts for the requested tickers.
    Run {
        /// Path to a TOML pipeline config. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Path to a JSON request body.
        #[arg(long)]
        request: Option<PathBuf>,

        /// Tickers to forecast (overrides the request body).
        #[arg(long, num_args = 1..)]
        tickers: Vec<String>,

        /// Short horizon in hours.
        #[arg(long)]
        short_horizon_hours: Option<usize>,

        /// Long horizon in days.
        #[arg(long)]
        long_horizon_days: Option<usize>,

        /// Model label written to forecast rows.
        #[arg(long)]
        model: Option<String>,

        /// Directory holding the JSONL tables.
        #[arg(long, default_value = "data")]
        store_dir: PathBuf,
    },
    /// Load raw hourly prices from CSV into the hourly and daily tables.
    Backfill {
        /// CSV file with ts, open, high, low, close[, adj_close][, volume] columns.
        #[arg(long)]
        input: PathBuf,

        /// Ticker the rows belong to.
        #[arg(long)]
        ticker: String,

        /// Directory holding the JSONL tables.
        #[arg(long, default_value = "data")]
        store_dir: PathBuf,

        /// Source tag for the audit columns.
        #[arg(long, default_value = DEFAULT_SOURCE)]
        src: String,
    },
    /// Liveness check.
    Health,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            request,
            tickers,
            short_horizon_hours,
            long_horizon_days,
            model,
            store_dir,
        } => {
            let mut request = load_request(request.as_deref())?;
            if !tickers.is_empty() {
                request.tickers = tickers;
            }
            if let Some(h) = short_horizon_hours {
                request.short_horizon_hours = h;
            }
            if let Some(d) = long_horizon_days {
                request.long_horizon_days = d;
            }
            if let Some(m) = model {
                request.model = m;
            }
            run_forecast(config.as_deref(), &request, &store_dir)
        }
        Commands::Backfill {
            input,
            ticker,
            store_dir,
            src,
        } => run_backfill(&input, &ticker, &store_dir, &src),
        Commands::Health => {
            println!("ok");
            Ok(())
        }
    }
}

fn load_request(path: Option<&Path>) -> Result<ForecastRequest> {
    let Some(path) = path else {
        return Ok(ForecastRequest::default());
    };
    let body = fs::read_to_string(path)
        .with_context(|| format!("failed to read request {}", path.display()))?;
    ForecastRequest::from_json(&body)
        .with_context(|| format!("invalid request body in {}", path.display()))
}

fn run_forecast(config_path: Option<&Path>, request: &ForecastRequest, store_dir: &Path) -> Result<()> {
    let config = match config_path {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    let store = JsonlStore::open(store_dir)?;
    let pipeline = Pipeline::new(&store, &store, config)?;

    let summary = pipeline.run(request);

    let out = json!({
        "status": "ok",
        "run_ts": summary.run_ts,
        "units_ok": summary.ok_count(),
        "units_failed": summary.failed_count(),
        "units": &summary.units,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn run_backfill(input: &Path, ticker: &str, store_dir: &Path, src: &str) -> Result<()> {
    let rows = CsvPriceFile::new(input)
        .read_rows(ticker)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let store = JsonlStore::open(store_dir)?;

    let report = backfill(ticker, &rows, &store, src, Utc::now())?;

    let out = json!({ "status": "ok", "backfill": report });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
