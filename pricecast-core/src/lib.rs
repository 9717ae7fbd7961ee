//! pricecast core: price series shaping, backtest splitting, forecasting
//! models and scoring.
//!
//! This crate is pure computation. It knows nothing about stores, requests
//! or thread pools:
//! - Domain types (price rows, grains, horizons, forecast points)
//! - Normalization onto a fixed grid and hourly to daily roll-up
//! - Volume-dependent backtest splitting
//! - Two forecasting model families behind one trait
//! - Error metrics and the pass/fail gate

pub mod cancel;
pub mod data;
pub mod domain;
pub mod metrics;
pub mod models;
pub mod split;

pub use cancel::CancelToken;
pub use data::{aggregate_daily, dedup, normalize, rollup_daily, NormalizedSeries, SeriesError};
pub use domain::{ForecastPoint, ForecastResult, Grain, Horizon, PriceRow};
pub use metrics::{compute_metrics, evaluate, EvalMetrics, MetricsError};
pub use models::{FittedModel, Forecaster, ModelError, ModelSpec};
pub use split::{split, Split, SplitError, SplitPolicy};
