//! Destination row types and the mapping into them.
//!
//! Each destination table has its own row type so a store method can only
//! accept rows meant for it. Mapping is one function per destination.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use pricecast_core::domain::{ForecastPoint, ForecastResult, Horizon, PriceRow};
use pricecast_core::metrics::EvalMetrics;

/// Source tag written on audited hourly price rows.
pub const DEFAULT_SOURCE: &str = "yahoo";

/// One hourly forecast point (`forecast_short`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortForecastRow {
    pub ticker: String,
    /// UTC calendar date of the forecast instant.
    pub ds: NaiveDate,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
    pub horizon: String,
    pub model: String,
    pub run_ts: DateTime<Utc>,
}

/// One daily forecast point (`forecast_long`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongForecastRow {
    pub ticker: String,
    pub ds: NaiveDate,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
    pub horizon: String,
    pub model: String,
    pub run_ts: DateTime<Utc>,
}

/// Backtest scores (`eval_metrics`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRow {
    pub model: String,
    /// Evaluation label, e.g. `90d` or `7d (limited data)`.
    pub horizon: String,
    pub rmse: f64,
    pub mae: f64,
    pub mape: f64,
    pub mean_price: f64,
    pub benchmark_5pct_mean: f64,
    pub rmse_vs_5pct_mean_pass: bool,
    pub ts: DateTime<Utc>,
}

/// Audited hourly price row (`prices_hourly`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyPriceRow {
    pub ts: DateTime<Utc>,
    pub ticker: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adj_close: f64,
    pub volume: u64,
    pub src: String,
    pub load_ts: DateTime<Utc>,
}

/// Daily price row (`prices_daily`). Carries no audit fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPriceRow {
    pub ts: DateTime<Utc>,
    pub ticker: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adj_close: f64,
    pub volume: u64,
}

impl From<HourlyPriceRow> for PriceRow {
    fn from(r: HourlyPriceRow) -> Self {
        PriceRow {
            ts: r.ts,
            ticker: r.ticker,
            open: r.open,
            high: r.high,
            low: r.low,
            close: r.close,
            adj_close: r.adj_close,
            volume: r.volume,
        }
    }
}

impl From<DailyPriceRow> for PriceRow {
    fn from(r: DailyPriceRow) -> Self {
        PriceRow {
            ts: r.ts,
            ticker: r.ticker,
            open: r.open,
            high: r.high,
            low: r.low,
            close: r.close,
            adj_close: r.adj_close,
            volume: r.volume,
        }
    }
}

// ─── Mapping ────────────────────────────────────────────────────────

fn forecast_fields(p: &ForecastPoint) -> (NaiveDate, f64, f64, f64) {
    (p.ts.date_naive(), p.yhat, p.yhat_lower, p.yhat_upper)
}

pub fn to_short_rows(result: &ForecastResult) -> Vec<ShortForecastRow> {
    debug_assert_eq!(result.horizon, Horizon::Short);
    result
        .points
        .iter()
        .map(|p| {
            let (ds, yhat, yhat_lower, yhat_upper) = forecast_fields(p);
            ShortForecastRow {
                ticker: result.ticker.clone(),
                ds,
                yhat,
                yhat_lower,
                yhat_upper,
                horizon: result.horizon_label.clone(),
                model: result.model.clone(),
                run_ts: result.run_ts,
            }
        })
        .collect()
}

pub fn to_long_rows(result: &ForecastResult) -> Vec<LongForecastRow> {
    debug_assert_eq!(result.horizon, Horizon::Long);
    result
        .points
        .iter()
        .map(|p| {
            let (ds, yhat, yhat_lower, yhat_upper) = forecast_fields(p);
            LongForecastRow {
                ticker: result.ticker.clone(),
                ds,
                yhat,
                yhat_lower,
                yhat_upper,
                horizon: result.horizon_label.clone(),
                model: result.model.clone(),
                run_ts: result.run_ts,
            }
        })
        .collect()
}

pub fn to_metrics_row(
    model: &str,
    eval_label: &str,
    metrics: &EvalMetrics,
    ts: DateTime<Utc>,
) -> MetricsRow {
    MetricsRow {
        model: model.to_string(),
        horizon: eval_label.to_string(),
        rmse: metrics.rmse,
        mae: metrics.mae,
        mape: metrics.mape,
        mean_price: metrics.mean_price,
        benchmark_5pct_mean: metrics.benchmark_5pct_mean,
        rmse_vs_5pct_mean_pass: metrics.pass,
        ts,
    }
}

pub fn to_hourly_price_rows(rows: &[PriceRow], src: &str, load_ts: DateTime<Utc>) -> Vec<HourlyPriceRow> {
    rows.iter()
        .map(|r| HourlyPriceRow {
            ts: r.ts,
            ticker: r.ticker.clone(),
            open: r.open,
            high: r.high,
            low: r.low,
            close: r.close,
            adj_close: r.adj_close,
            volume: r.volume,
            src: src.to_string(),
            load_ts,
        })
        .collect()
}

pub fn to_daily_price_rows(rows: &[PriceRow]) -> Vec<DailyPriceRow> {
    rows.iter()
        .map(|r| DailyPriceRow {
            ts: r.ts,
            ticker: r.ticker.clone(),
            open: r.open,
            high: r.high,
            low: r.low,
            close: r.close,
            adj_close: r.adj_close,
            volume: r.volume,
        })
        .collect()
}
