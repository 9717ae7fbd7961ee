//! Pipeline orchestrator: one forecast-and-backtest unit per (ticker, horizon).
//!
//! Each unit reads a fresh window of prices, normalizes it, scores a backtest
//! fit on the held-out tail, refits on the full series and appends the
//! production forecast. A failing unit is logged and recorded in the
//! [`RunSummary`]; it never stops the others.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use pricecast_core::cancel::CancelToken;
use pricecast_core::data::{dedup, normalize, rollup_daily, NormalizedSeries, SeriesError};
use pricecast_core::domain::{ForecastResult, Grain, Horizon};
use pricecast_core::metrics::{evaluate, MetricsError};
use pricecast_core::models::ModelError;
use pricecast_core::split::{split, SplitError};

use crate::config::{DailySource, PipelineConfig};
use crate::request::ForecastRequest;
use crate::retry::read_with_retry;
use crate::schema::{to_long_rows, to_metrics_row, to_short_rows};
use crate::store::{ForecastStore, PriceStore, StoreError, WriteError};

// ─── Errors ──────────────────────────────────────────────────────────

/// Fatal setup errors. Per-unit failures are [`UnitError`]s instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Why a unit was skipped.
#[derive(Debug, Error)]
pub enum UnitError {
    #[error("price read failed: {0}")]
    Read(#[from] StoreError),

    #[error(transparent)]
    Series(#[from] SeriesError),

    #[error(transparent)]
    Split(#[from] SplitError),

    #[error(transparent)]
    Model(ModelError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("unit cancelled")]
    Cancelled,
}

impl From<ModelError> for UnitError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::Cancelled => UnitError::Cancelled,
            other => UnitError::Model(other),
        }
    }
}

impl UnitError {
    /// Short machine-readable tag for summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            UnitError::Read(_) => "read",
            UnitError::Series(SeriesError::EmptySeries { .. }) => "empty_series",
            UnitError::Series(SeriesError::InsufficientData { .. })
            | UnitError::Split(SplitError::InsufficientData { .. }) => "insufficient_data",
            UnitError::Series(SeriesError::GrainMismatch { .. }) => "grain_mismatch",
            UnitError::Model(_) => "model_fit",
            UnitError::Metrics(_) => "metrics",
            UnitError::Write(_) => "write",
            UnitError::Cancelled => "cancelled",
        }
    }
}

// ─── Reports ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnitStatus {
    Ok {
        forecast_rows: usize,
        /// Backtest label, absent when scoring was skipped.
        eval_label: Option<String>,
        /// Set when the metrics row could not be written.
        #[serde(skip_serializing_if = "Option::is_none")]
        metrics_error: Option<String>,
    },
    Failed {
        kind: String,
        error: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    pub ticker: String,
    pub horizon: Horizon,
    #[serde(flatten)]
    pub status: UnitStatus,
    pub elapsed_ms: u64,
}

impl UnitReport {
    pub fn is_ok(&self) -> bool {
        matches!(self.status, UnitStatus::Ok { .. })
    }
}

/// Outcome of one invocation, in unit order.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_ts: DateTime<Utc>,
    pub units: Vec<UnitReport>,
}

impl RunSummary {
    pub fn ok_count(&self) -> usize {
        self.units.iter().filter(|u| u.is_ok()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.units.len() - self.ok_count()
    }
}

/// What a successful unit produced.
struct UnitOutput {
    forecast_rows: usize,
    eval_label: Option<String>,
    metrics_error: Option<String>,
}

// ─── Seeds ───────────────────────────────────────────────────────────

/// Deterministic per-unit seed, independent of the order units run in.
pub fn unit_seed(master_seed: u64, ticker: &str, horizon: Horizon) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&master_seed.to_le_bytes());
    hasher.update(ticker.as_bytes());
    hasher.update(horizon.to_string().as_bytes());
    let hash = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

// ─── Pipeline ────────────────────────────────────────────────────────

/// Borrows its stores for the length of an invocation.
pub struct Pipeline<'a> {
    prices: &'a dyn PriceStore,
    sink: &'a dyn ForecastStore,
    config: PipelineConfig,
    pool: Option<rayon::ThreadPool>,
    cancel_flag: Option<Arc<AtomicBool>>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        prices: &'a dyn PriceStore,
        sink: &'a dyn ForecastStore,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        // one worker runs the plain sequential loop
        let pool = if config.worker_threads > 1 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(config.worker_threads)
                    .build()?,
            )
        } else {
            None
        };
        Ok(Self {
            prices,
            sink,
            config,
            pool,
            cancel_flag: None,
        })
    }

    /// Raising `flag` cancels every unit still running.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = Some(flag);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&self, request: &ForecastRequest) -> RunSummary {
        self.run_at(request, Utc::now())
    }

    /// Run every unit with `run_ts` as the invocation timestamp.
    pub fn run_at(&self, request: &ForecastRequest, run_ts: DateTime<Utc>) -> RunSummary {
        let tickers = request.resolved_tickers(&self.config.default_ticker);
        let units: Vec<(String, Horizon)> = tickers
            .into_iter()
            .flat_map(|t| [(t.clone(), Horizon::Short), (t, Horizon::Long)])
            .collect();

        info!(units = units.len(), %run_ts, "starting forecast run");

        let units = if let Some(ref pool) = self.pool {
            pool.install(|| {
                units
                    .par_iter()
                    .map(|(ticker, horizon)| self.run_unit(ticker, *horizon, request, run_ts))
                    .collect()
            })
        } else {
            units
                .iter()
                .map(|(ticker, horizon)| self.run_unit(ticker, *horizon, request, run_ts))
                .collect()
        };

        let summary = RunSummary { run_ts, units };
        info!(
            ok = summary.ok_count(),
            failed = summary.failed_count(),
            "forecast run finished"
        );
        summary
    }

    fn run_unit(
        &self,
        ticker: &str,
        horizon: Horizon,
        request: &ForecastRequest,
        run_ts: DateTime<Utc>,
    ) -> UnitReport {
        let started = Instant::now();
        let status = match self.forecast_unit(ticker, horizon, request, run_ts) {
            Ok(out) => {
                info!(
                    ticker,
                    horizon = %horizon,
                    rows = out.forecast_rows,
                    eval = out.eval_label.as_deref().unwrap_or("-"),
                    "unit complete"
                );
                UnitStatus::Ok {
                    forecast_rows: out.forecast_rows,
                    eval_label: out.eval_label,
                    metrics_error: out.metrics_error,
                }
            }
            Err(e) => {
                warn!(ticker, horizon = %horizon, kind = e.kind(), error = %e, "unit skipped");
                UnitStatus::Failed {
                    kind: e.kind().to_string(),
                    error: e.to_string(),
                }
            }
        };
        UnitReport {
            ticker: ticker.to_string(),
            horizon,
            status,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    fn cancel_token(&self) -> CancelToken {
        let mut token = CancelToken::never();
        if let Some(flag) = &self.cancel_flag {
            token = token.with_flag(flag.clone());
        }
        if let Some(timeout) = self.config.unit_timeout() {
            token = token.with_timeout(timeout);
        }
        token
    }

    /// Read and shape the unit's history onto its grain.
    fn load_series(
        &self,
        ticker: &str,
        horizon: Horizon,
        run_ts: DateTime<Utc>,
    ) -> Result<NormalizedSeries, UnitError> {
        let section = self.config.horizon(horizon);
        let since = run_ts - Duration::days(section.window_days);
        let min_len = section.split.min_len;
        let retries = self.config.read_retries;
        let delay = self.config.retry_base_delay();

        match (horizon, self.config.daily_source) {
            (Horizon::Short, _) => {
                let rows = read_with_retry(retries, delay, || self.prices.hourly_rows(ticker, since))?;
                Ok(normalize(ticker, &rows, Grain::Hourly, min_len)?)
            }
            (Horizon::Long, DailySource::AggregateHourly) => {
                let rows = read_with_retry(retries, delay, || self.prices.hourly_rows(ticker, since))?;
                // roll up observed hours only, then fill on the daily grid
                let daily = rollup_daily(&dedup(&rows, Grain::Hourly));
                Ok(normalize(ticker, &daily, Grain::Daily, min_len)?)
            }
            (Horizon::Long, DailySource::DailyTable) => {
                let rows = read_with_retry(retries, delay, || self.prices.daily_rows(ticker, since))?;
                Ok(normalize(ticker, &rows, Grain::Daily, min_len)?)
            }
        }
    }

    fn forecast_unit(
        &self,
        ticker: &str,
        horizon: Horizon,
        request: &ForecastRequest,
        run_ts: DateTime<Utc>,
    ) -> Result<UnitOutput, UnitError> {
        let cancel = self.cancel_token();
        let section = self.config.horizon(horizon);
        let confidence = self.config.confidence;
        let steps = match horizon {
            Horizon::Short => request.short_horizon_hours,
            Horizon::Long => request.long_horizon_days,
        };

        let series = self.load_series(ticker, horizon, run_ts)?;
        debug!(
            ticker,
            horizon = %horizon,
            len = series.len(),
            filled = series.filled_slots(),
            "series normalized"
        );
        if cancel.is_cancelled() {
            return Err(UnitError::Cancelled);
        }

        let forecaster = section.model.build(unit_seed(self.config.seed, ticker, horizon));

        // Backtest: fit on train, score the held-out tail
        let backtest = split(&series, steps, &section.split)?;
        let fitted = forecaster.fit(&backtest.train, &cancel)?;
        let held_out = fitted.forecast(backtest.test.len(), confidence)?;
        let mut metrics_error = None;
        let eval_label = match evaluate(&backtest.test, &held_out) {
            Ok(metrics) => {
                debug!(
                    ticker,
                    horizon = %horizon,
                    rmse = metrics.rmse,
                    pass = metrics.pass,
                    "backtest scored"
                );
                let row = to_metrics_row(&section.metrics_model_name, &backtest.eval_label, &metrics, run_ts);
                // the production forecast still goes out
                match self.sink.append_metrics(&[row]) {
                    Ok(()) => Some(backtest.eval_label),
                    Err(e) => {
                        warn!(ticker, horizon = %horizon, error = %e, "metrics write failed");
                        metrics_error = Some(e.to_string());
                        None
                    }
                }
            }
            Err(MetricsError::Alignment) => {
                warn!(ticker, horizon = %horizon, "no overlap between test and forecast, metrics skipped");
                None
            }
            Err(e) => return Err(e.into()),
        };

        // Production: refit on everything
        let fitted = forecaster.fit(&series, &cancel)?;
        let result = ForecastResult {
            ticker: ticker.to_string(),
            horizon,
            horizon_label: horizon.grain().horizon_label(steps),
            model: request.model.clone(),
            run_ts,
            points: fitted.forecast(steps, confidence)?,
        };

        let forecast_rows = match horizon {
            Horizon::Short => {
                let rows = to_short_rows(&result);
                self.sink.append_short(&rows)?;
                rows.len()
            }
            Horizon::Long => {
                let rows = to_long_rows(&result);
                self.sink.append_long(&rows)?;
                rows.len()
            }
        };

        Ok(UnitOutput {
            forecast_rows,
            eval_label,
            metrics_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_seeds_are_deterministic_and_distinct() {
        let a = unit_seed(42, "X", Horizon::Short);
        assert_eq!(a, unit_seed(42, "X", Horizon::Short));
        assert_ne!(a, unit_seed(42, "X", Horizon::Long));
        assert_ne!(a, unit_seed(42, "Y", Horizon::Short));
        assert_ne!(a, unit_seed(43, "X", Horizon::Short));
    }

    #[test]
    fn model_cancellation_maps_to_cancelled_unit() {
        let e: UnitError = ModelError::Cancelled.into();
        assert_eq!(e.kind(), "cancelled");
        let e: UnitError = ModelError::Fit("singular".into()).into();
        assert_eq!(e.kind(), "model_fit");
    }

    #[test]
    fn summary_counts_outcomes() {
        let report = |status| UnitReport {
            ticker: "X".into(),
            horizon: Horizon::Short,
            status,
            elapsed_ms: 0,
        };
        let summary = RunSummary {
            run_ts: Utc::now(),
            units: vec![
                report(UnitStatus::Ok {
                    forecast_rows: 24,
                    eval_label: Some("24h".into()),
                    metrics_error: None,
                }),
                report(UnitStatus::Failed {
                    kind: "empty_series".into(),
                    error: "no usable price rows for 'X'".into(),
                }),
            ],
        };
        assert_eq!(summary.ok_count(), 1);
        assert_eq!(summary.failed_count(), 1);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["units"][0]["status"], "ok");
        assert!(json["units"][0].get("metrics_error").is_none());
        assert_eq!(json["units"][1]["kind"], "empty_series");
    }
}
