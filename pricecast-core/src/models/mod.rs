//! Forecasting models behind a common fit/forecast interface.
//!
//! Two families are provided:
//! - [`Sarima`]: seasonal ARIMA fitted by conditional sum of squares
//! - [`TrendSeason`]: piecewise-linear trend with changepoints plus Fourier
//!   seasonalities, fitted by penalized least squares

pub mod optimizer;
pub mod sarima;
pub mod trend_season;

pub use sarima::{Sarima, SarimaParams};
pub use trend_season::{SeasonalityMode, TrendSeason, TrendSeasonParams};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use thiserror::Error;

use crate::cancel::CancelToken;
use crate::data::NormalizedSeries;
use crate::domain::{ForecastPoint, Grain};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("model fit failed: {0}")]
    Fit(String),

    #[error("model fit cancelled")]
    Cancelled,

    #[error("invalid model parameters: {0}")]
    InvalidParams(String),
}

/// A model family with fixed parameters, ready to be fitted.
pub trait Forecaster: Send + Sync {
    /// Human-readable name (e.g., "sarima").
    fn name(&self) -> &str;

    /// Fit on a normalized series. The result forecasts from the series' last
    /// timestamp onward.
    fn fit(
        &self,
        series: &NormalizedSeries,
        cancel: &CancelToken,
    ) -> Result<Box<dyn FittedModel>, ModelError>;
}

/// Opaque fitted state, owned by the step that produced it.
pub trait FittedModel: Send {
    /// Produce `steps` points at `last_ts + i * step` for `i = 1..=steps`,
    /// with intervals at `confidence`.
    fn forecast(&self, steps: usize, confidence: f64) -> Result<Vec<ForecastPoint>, ModelError>;
}

/// Model configuration (serializable enum).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelSpec {
    Sarima(SarimaParams),
    TrendSeason(TrendSeasonParams),
}

impl ModelSpec {
    /// Build a forecaster. `seed` drives any sampling the model does.
    pub fn build(&self, seed: u64) -> Box<dyn Forecaster> {
        match self {
            ModelSpec::Sarima(params) => Box::new(Sarima::new(params.clone())),
            ModelSpec::TrendSeason(params) => Box::new(TrendSeason::new(params.clone(), seed)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModelSpec::Sarima(_) => "sarima",
            ModelSpec::TrendSeason(_) => "trend_season",
        }
    }
}

/// Grid points following `last_ts`. Fails if the last point does not fit
/// in the timestamp range.
pub(crate) fn future_grid(
    last_ts: DateTime<Utc>,
    grain: Grain,
    steps: usize,
) -> Result<Vec<DateTime<Utc>>, ModelError> {
    let step = grain.step();
    i32::try_from(steps)
        .ok()
        .and_then(|n| step.checked_mul(n))
        .and_then(|span| last_ts.checked_add_signed(span))
        .ok_or_else(|| ModelError::InvalidParams(format!("horizon of {steps} steps is out of range")))?;
    // every offset is bounded by the last one
    Ok((1..=steps as i32).map(|i| last_ts + step * i).collect())
}

/// Two-sided standard normal quantile for a central interval.
pub(crate) fn z_score(confidence: f64) -> Result<f64, ModelError> {
    if !(confidence > 0.0 && confidence < 1.0) {
        return Err(ModelError::InvalidParams(format!(
            "confidence must be in (0, 1), got {confidence}"
        )));
    }
    let normal = Normal::new(0.0, 1.0).map_err(|e| ModelError::InvalidParams(e.to_string()))?;
    Ok(normal.inverse_cdf(1.0 - (1.0 - confidence) / 2.0))
}
