//! Time grain: the fixed step of a normalized price grid.

use chrono::{DateTime, Duration, DurationRound, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Step of a price grid. All instants are UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grain {
    Hourly,
    Daily,
}

impl Grain {
    /// Distance between two consecutive grid points.
    pub fn step(self) -> Duration {
        match self {
            Grain::Hourly => Duration::hours(1),
            Grain::Daily => Duration::days(1),
        }
    }

    /// Floor an instant onto this grain's grid.
    pub fn floor(self, ts: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            // Whole-hour truncation cannot overflow for valid chrono instants.
            Grain::Hourly => ts.duration_trunc(Duration::hours(1)).unwrap_or(ts),
            Grain::Daily => ts.date_naive().and_time(NaiveTime::MIN).and_utc(),
        }
    }

    /// Unit suffix used in horizon labels (`24h`, `90d`).
    pub fn unit(self) -> &'static str {
        match self {
            Grain::Hourly => "h",
            Grain::Daily => "d",
        }
    }

    /// Label for a horizon of `steps` grid points on this grain.
    pub fn horizon_label(self, steps: usize) -> String {
        format!("{steps}{}", self.unit())
    }
}

impl fmt::Display for Grain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grain::Hourly => write!(f, "hourly"),
            Grain::Daily => write!(f, "daily"),
        }
    }
}
