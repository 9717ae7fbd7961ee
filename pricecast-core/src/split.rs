//! Backtest splitting: hold out the most recent segment for scoring.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::NormalizedSeries;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SplitError {
    #[error("insufficient data to split: {len} points (need {needed})")]
    InsufficientData { len: usize, needed: usize },
}

/// Thresholds that decide how much history is held out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitPolicy {
    /// Absolute floor on series length.
    pub min_len: usize,
    /// Series longer than this hold out the full horizon. `None` means the
    /// horizon itself is the threshold.
    pub volume_threshold: Option<usize>,
    /// Test size used when the series is at or below the threshold.
    pub fallback_test_size: usize,
    /// Reject series that are not strictly longer than the horizon.
    pub require_exceeds_horizon: bool,
}

impl Default for SplitPolicy {
    fn default() -> Self {
        Self::long_term()
    }
}

impl SplitPolicy {
    pub fn long_term() -> Self {
        Self {
            min_len: 10,
            volume_threshold: Some(120),
            fallback_test_size: 7,
            require_exceeds_horizon: false,
        }
    }

    pub fn short_term() -> Self {
        Self {
            min_len: 10,
            volume_threshold: None,
            fallback_test_size: 7,
            require_exceeds_horizon: true,
        }
    }

    /// Decide `(test_size, limited)` for a series of length `n`.
    pub fn test_size(&self, n: usize, horizon: usize) -> Result<(usize, bool), SplitError> {
        let floor = self.min_len.max(2);
        if n < floor {
            return Err(SplitError::InsufficientData { len: n, needed: floor });
        }
        if self.require_exceeds_horizon && n <= horizon {
            return Err(SplitError::InsufficientData {
                len: n,
                needed: horizon + 1,
            });
        }

        // a horizon at or past the series length falls back too
        let threshold = self.volume_threshold.unwrap_or(horizon);
        let (k, limited) = if n > threshold && horizon > 0 && horizon < n {
            (horizon, false)
        } else {
            (self.fallback_test_size.max(1), true)
        };

        // keep at least one training point
        let max_test = n - 1;
        if k > max_test {
            Ok((max_test, true))
        } else {
            Ok((k, limited))
        }
    }
}

/// Train prefix and test suffix of one series.
#[derive(Debug, Clone)]
pub struct Split {
    pub train: NormalizedSeries,
    pub test: NormalizedSeries,
    /// `"90d"` for a full hold-out, `"7d (limited data)"` otherwise.
    pub eval_label: String,
}

pub fn split(
    series: &NormalizedSeries,
    horizon: usize,
    policy: &SplitPolicy,
) -> Result<Split, SplitError> {
    let n = series.len();
    let (k, limited) = policy.test_size(n, horizon)?;
    let (train, test) = series.split_at(n - k);

    let mut eval_label = series.grain().horizon_label(k);
    if limited {
        eval_label.push_str(" (limited data)");
    }

    Ok(Split {
        train,
        test,
        eval_label,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::normalize;
    use crate::domain::{Grain, PriceRow};
    use chrono::{Duration, TimeZone, Utc};

    fn daily_series(n: usize) -> NormalizedSeries {
        let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let rows: Vec<PriceRow> = (0..n)
            .map(|i| {
                let p = 100.0 + i as f64;
                PriceRow {
                    ts: start + Duration::days(i as i64),
                    ticker: "X".into(),
                    open: p,
                    high: p,
                    low: p,
                    close: p,
                    adj_close: p,
                    volume: 1,
                }
            })
            .collect();
        normalize("X", &rows, Grain::Daily, 1).unwrap()
    }

    #[test]
    fn large_series_holds_out_full_horizon() {
        let s = split(&daily_series(150), 90, &SplitPolicy::long_term()).unwrap();
        assert_eq!(s.test.len(), 90);
        assert_eq!(s.train.len(), 60);
        assert_eq!(s.eval_label, "90d");
        assert_eq!(s.test.first_ts().unwrap() - s.train.last_ts().unwrap(), Duration::days(1));
    }

    #[test]
    fn small_series_falls_back_to_limited_test() {
        let s = split(&daily_series(50), 90, &SplitPolicy::long_term()).unwrap();
        assert_eq!(s.test.len(), 7);
        assert_eq!(s.train.len(), 43);
        assert_eq!(s.eval_label, "7d (limited data)");
    }

    #[test]
    fn tiny_series_is_rejected() {
        let err = split(&daily_series(5), 90, &SplitPolicy::long_term()).unwrap_err();
        assert_eq!(err, SplitError::InsufficientData { len: 5, needed: 10 });
    }

    #[test]
    fn short_policy_requires_more_than_horizon() {
        let policy = SplitPolicy::short_term();
        assert!(policy.test_size(24, 24).is_err());
        assert_eq!(policy.test_size(25, 24).unwrap(), (24, false));
    }

    #[test]
    fn horizon_longer_than_history_uses_fallback() {
        let s = split(&daily_series(150), 180, &SplitPolicy::long_term()).unwrap();
        assert_eq!(s.test.len(), 7);
        assert_eq!(s.train.len(), 143);
        assert_eq!(s.eval_label, "7d (limited data)");
        assert_eq!(
            SplitPolicy::long_term().test_size(150, 150).unwrap(),
            (7, true)
        );
    }

    #[test]
    fn fallback_never_empties_train() {
        let policy = SplitPolicy {
            min_len: 2,
            fallback_test_size: 7,
            ..SplitPolicy::long_term()
        };
        assert_eq!(policy.test_size(5, 90).unwrap(), (4, true));
    }
}
