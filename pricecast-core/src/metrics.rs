//! Forecast scoring against held-out actuals.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::NormalizedSeries;
use crate::domain::ForecastPoint;

/// Floor on |y| in the MAPE denominator.
const MAPE_EPSILON: f64 = 1e-8;

/// Share of the mean price that RMSE must stay within to pass.
pub const BENCHMARK_SHARE: f64 = 0.05;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricsError {
    #[error("length mismatch: {actual} actuals vs {predicted} predictions")]
    LengthMismatch { actual: usize, predicted: usize },

    #[error("cannot score an empty sequence")]
    Empty,

    #[error("no forecast point lines up with a held-out timestamp")]
    Alignment,
}

/// Error metrics for one backtest, with the pass/fail gate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalMetrics {
    pub mae: f64,
    pub rmse: f64,
    /// Percent, not a fraction.
    pub mape: f64,
    pub mean_price: f64,
    pub benchmark_5pct_mean: f64,
    /// `rmse <= benchmark_5pct_mean`
    pub pass: bool,
}

pub fn compute_metrics(y_true: &[f64], y_pred: &[f64]) -> Result<EvalMetrics, MetricsError> {
    if y_true.len() != y_pred.len() {
        return Err(MetricsError::LengthMismatch {
            actual: y_true.len(),
            predicted: y_pred.len(),
        });
    }
    if y_true.is_empty() {
        return Err(MetricsError::Empty);
    }

    let n = y_true.len() as f64;
    let mut abs_sum = 0.0;
    let mut sq_sum = 0.0;
    let mut pct_sum = 0.0;
    for (y, yhat) in y_true.iter().zip(y_pred) {
        let err = y - yhat;
        abs_sum += err.abs();
        sq_sum += err * err;
        pct_sum += err.abs() / y.abs().max(MAPE_EPSILON);
    }

    let rmse = (sq_sum / n).sqrt();
    let mean_price = y_true.iter().sum::<f64>() / n;
    let benchmark_5pct_mean = mean_price * BENCHMARK_SHARE;

    Ok(EvalMetrics {
        mae: abs_sum / n,
        rmse,
        mape: pct_sum / n * 100.0,
        mean_price,
        benchmark_5pct_mean,
        pass: rmse <= benchmark_5pct_mean,
    })
}

/// Score a backtest forecast against the held-out segment.
///
/// Pairs are formed by exact timestamp match; unmatched points on either side
/// are ignored.
pub fn evaluate(
    test: &NormalizedSeries,
    forecast: &[ForecastPoint],
) -> Result<EvalMetrics, MetricsError> {
    let predicted: HashMap<_, _> = forecast.iter().map(|p| (p.ts, p.yhat)).collect();
    let (actual, pred): (Vec<f64>, Vec<f64>) = test
        .rows()
        .iter()
        .filter_map(|row| predicted.get(&row.ts).map(|yhat| (row.adj_close, *yhat)))
        .unzip();

    if actual.is_empty() {
        return Err(MetricsError::Alignment);
    }
    compute_metrics(&actual, &pred)
}
