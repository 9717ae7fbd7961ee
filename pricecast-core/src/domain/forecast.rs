//! Forecast output types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::grain::Grain;

/// Which forecasting path produced a result.
///
/// The short path works on the hourly grid, the long path on the daily grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Horizon {
    Short,
    Long,
}

impl Horizon {
    pub fn grain(self) -> Grain {
        match self {
            Horizon::Short => Grain::Hourly,
            Horizon::Long => Grain::Daily,
        }
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Horizon::Short => write!(f, "short"),
            Horizon::Long => write!(f, "long"),
        }
    }
}

/// One future grid point: point estimate plus interval bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub ts: DateTime<Utc>,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
}

/// A production forecast tagged with the unit that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastResult {
    pub ticker: String,
    pub horizon: Horizon,
    /// Nominal horizon label, e.g. `24h` or `90d`.
    pub horizon_label: String,
    /// Model label written to the destination rows.
    pub model: String,
    pub run_ts: DateTime<Utc>,
    pub points: Vec<ForecastPoint>,
}

impl ForecastResult {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
