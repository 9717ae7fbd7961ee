//! Piecewise-linear trend with changepoints plus Fourier seasonalities.
//!
//! Time is rescaled to `[0, 1]` over the history and values are divided by
//! their maximum magnitude before fitting. Coefficients come from ridge
//! regression where each penalty is `sigma^2 / prior_scale^2`; `sigma^2` is
//! re-estimated from the residuals a few times. Intervals are simulated from
//! random future trend changes plus observation noise.

use chrono::{DateTime, Utc};
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp, Normal};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{future_grid, FittedModel, Forecaster, ModelError};
use crate::cancel::CancelToken;
use crate::data::NormalizedSeries;
use crate::domain::{ForecastPoint, Grain};

const SECONDS_PER_DAY: f64 = 86_400.0;
const TREND_PRIOR_SCALE: f64 = 5.0;
const SIGMA_ITERATIONS: usize = 3;
const MIN_SIGMA2: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeasonalityMode {
    Additive,
    Multiplicative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendSeasonParams {
    /// Prior scale of changepoint slope adjustments. Smaller is stiffer.
    pub changepoint_prior_scale: f64,
    pub seasonality_mode: SeasonalityMode,
    pub seasonality_prior_scale: f64,
    /// Upper bound on changepoints.
    pub n_changepoints: usize,
    /// Fraction of history in which changepoints may sit.
    pub changepoint_range: f64,
    /// Simulated paths per interval. Zero collapses intervals to the point.
    pub interval_samples: usize,
}

impl Default for TrendSeasonParams {
    fn default() -> Self {
        Self {
            changepoint_prior_scale: 0.015,
            seasonality_mode: SeasonalityMode::Multiplicative,
            seasonality_prior_scale: 10.0,
            n_changepoints: 25,
            changepoint_range: 0.8,
            interval_samples: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Seasonality {
    period_days: f64,
    order: usize,
}

/// Daily cycle for hourly data; weekly (and yearly, given two years) for daily.
fn seasonalities(grain: Grain, span_days: f64) -> Vec<Seasonality> {
    match grain {
        Grain::Hourly => vec![Seasonality {
            period_days: 1.0,
            order: 4,
        }],
        Grain::Daily => {
            let mut out = vec![Seasonality {
                period_days: 7.0,
                order: 3,
            }];
            if span_days >= 730.0 {
                out.push(Seasonality {
                    period_days: 365.25,
                    order: 10,
                });
            }
            out
        }
    }
}

fn fourier_row(ts: DateTime<Utc>, seasons: &[Seasonality], out: &mut Vec<f64>) {
    let days = ts.timestamp() as f64 / SECONDS_PER_DAY;
    for season in seasons {
        for k in 1..=season.order {
            let x = std::f64::consts::TAU * k as f64 * days / season.period_days;
            out.push(x.sin());
            out.push(x.cos());
        }
    }
}

fn trend_row(t: f64, changepoints: &[f64], out: &mut Vec<f64>) {
    out.push(1.0);
    out.push(t);
    out.extend(changepoints.iter().map(|s| (t - s).max(0.0)));
}

fn ridge(x: &DMatrix<f64>, y: &DVector<f64>, penalty: &DVector<f64>) -> Result<DVector<f64>, ModelError> {
    let xt = x.transpose();
    let gram = &xt * x + DMatrix::from_diagonal(penalty);
    let rhs = xt * y;
    gram.cholesky()
        .map(|c| c.solve(&rhs))
        .ok_or_else(|| ModelError::Fit("singular regression".into()))
}

/// Ridge fit with the residual variance re-estimated between passes.
fn fit_penalized(
    x: &DMatrix<f64>,
    y: &DVector<f64>,
    prior_vars: &[f64],
    cancel: &CancelToken,
) -> Result<(DVector<f64>, f64), ModelError> {
    let n = y.len() as f64;
    let mean = y.mean();
    let mut sigma2 = (y.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).max(MIN_SIGMA2);
    let mut beta = DVector::zeros(x.ncols());

    for _ in 0..SIGMA_ITERATIONS {
        if cancel.is_cancelled() {
            return Err(ModelError::Cancelled);
        }
        let penalty = DVector::from_iterator(prior_vars.len(), prior_vars.iter().map(|v| sigma2 / v));
        beta = ridge(x, y, &penalty)?;
        let resid = y - x * &beta;
        sigma2 = (resid.norm_squared() / n).max(MIN_SIGMA2);
    }
    Ok((beta, sigma2))
}

pub struct TrendSeason {
    params: TrendSeasonParams,
    seed: u64,
}

impl TrendSeason {
    pub fn new(params: TrendSeasonParams, seed: u64) -> Self {
        Self { params, seed }
    }

    fn validate(&self) -> Result<(), ModelError> {
        let p = &self.params;
        if !(p.changepoint_prior_scale > 0.0) || !(p.seasonality_prior_scale > 0.0) {
            return Err(ModelError::InvalidParams("prior scales must be positive".into()));
        }
        if !(0.0..=1.0).contains(&p.changepoint_range) {
            return Err(ModelError::InvalidParams(format!(
                "changepoint_range must be in [0, 1], got {}",
                p.changepoint_range
            )));
        }
        Ok(())
    }
}

/// Changepoint positions in scaled time, evenly spread over the first
/// `range` share of history and excluding the first point.
fn changepoints(t: &[f64], max_count: usize, range: f64) -> Vec<f64> {
    let hist = (t.len() as f64 * range).floor() as usize;
    let count = max_count.min(hist.saturating_sub(1));
    (1..=count)
        .map(|j| t[(j * (hist - 1) + count / 2) / count])
        .collect()
}

impl Forecaster for TrendSeason {
    fn name(&self) -> &str {
        "trend_season"
    }

    fn fit(
        &self,
        series: &NormalizedSeries,
        cancel: &CancelToken,
    ) -> Result<Box<dyn FittedModel>, ModelError> {
        self.validate()?;
        let n = series.len();
        if n < 3 {
            return Err(ModelError::Fit(format!("too few observations: {n} < 3")));
        }

        let ts = series.timestamps();
        let t0 = ts[0];
        let last_ts = ts[n - 1];
        let span_secs = (last_ts - t0).num_seconds() as f64;
        let t: Vec<f64> = ts.iter().map(|x| (*x - t0).num_seconds() as f64 / span_secs).collect();

        let values = series.values();
        let y_scale = values.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        let y_scale = if y_scale > 0.0 { y_scale } else { 1.0 };
        let y = DVector::from_iterator(n, values.iter().map(|v| v / y_scale));

        let cps = changepoints(&t, self.params.n_changepoints, self.params.changepoint_range);
        let seasons = seasonalities(series.grain(), span_secs / SECONDS_PER_DAY);

        let n_trend = 2 + cps.len();
        let n_season = seasons.iter().map(|s| 2 * s.order).sum::<usize>();

        let mut trend_prior = vec![TREND_PRIOR_SCALE.powi(2); 2];
        trend_prior.extend(std::iter::repeat(self.params.changepoint_prior_scale.powi(2)).take(cps.len()));
        let season_prior = vec![self.params.seasonality_prior_scale.powi(2); n_season];

        let mut trend_x = Vec::with_capacity(n * n_trend);
        let mut season_x = Vec::with_capacity(n * n_season);
        for (ti, tsi) in t.iter().zip(&ts) {
            trend_row(*ti, &cps, &mut trend_x);
            fourier_row(*tsi, &seasons, &mut season_x);
        }
        let trend_x = DMatrix::from_row_slice(n, n_trend, &trend_x);
        let season_x = DMatrix::from_row_slice(n, n_season, &season_x);

        // multiplicative seasonality is regressed against a trend-only baseline
        let season_x = match self.params.seasonality_mode {
            SeasonalityMode::Additive => season_x,
            SeasonalityMode::Multiplicative => {
                let (base_coef, _) = fit_penalized(&trend_x, &y, &trend_prior, cancel)?;
                let baseline = &trend_x * base_coef;
                let mut scaled = season_x;
                for (mut row, g) in scaled.row_iter_mut().zip(baseline.iter()) {
                    row *= *g;
                }
                scaled
            }
        };

        let mut design = DMatrix::zeros(n, n_trend + n_season);
        design.columns_mut(0, n_trend).copy_from(&trend_x);
        design.columns_mut(n_trend, n_season).copy_from(&season_x);
        let mut prior = trend_prior;
        prior.extend(season_prior);

        let (beta, sigma2) = fit_penalized(&design, &y, &prior, cancel)?;
        if beta.iter().any(|b| !b.is_finite()) {
            return Err(ModelError::Fit("non-finite coefficients".into()));
        }

        let trend_coef: Vec<f64> = beta.rows(0, n_trend).iter().copied().collect();
        let season_coef: Vec<f64> = beta.rows(n_trend, n_season).iter().copied().collect();
        let deltas = &trend_coef[2..];
        let change_scale = if deltas.is_empty() {
            0.0
        } else {
            deltas.iter().map(|d| d.abs()).sum::<f64>() / deltas.len() as f64
        };

        debug!(
            ticker = series.ticker(),
            changepoints = cps.len(),
            seasonal_terms = n_season,
            sigma = sigma2.sqrt() * y_scale,
            "trend_season fitted"
        );

        Ok(Box::new(FittedTrendSeason {
            t0,
            last_ts,
            grain: series.grain(),
            span_secs,
            y_scale,
            changepoints: cps.clone(),
            trend_coef,
            season_coef,
            seasons,
            mode: self.params.seasonality_mode,
            sigma: sigma2.sqrt(),
            change_rate: cps.len() as f64 / n as f64,
            change_scale,
            samples: self.params.interval_samples,
            seed: self.seed,
        }))
    }
}

struct FittedTrendSeason {
    t0: DateTime<Utc>,
    last_ts: DateTime<Utc>,
    grain: Grain,
    span_secs: f64,
    y_scale: f64,
    changepoints: Vec<f64>,
    trend_coef: Vec<f64>,
    season_coef: Vec<f64>,
    seasons: Vec<Seasonality>,
    mode: SeasonalityMode,
    /// Residual standard deviation, scaled units.
    sigma: f64,
    /// Probability of a trend change per future grid step.
    change_rate: f64,
    /// Mean absolute historical slope change.
    change_scale: f64,
    samples: usize,
    seed: u64,
}

impl FittedTrendSeason {
    fn scaled_time(&self, ts: DateTime<Utc>) -> f64 {
        (ts - self.t0).num_seconds() as f64 / self.span_secs
    }

    fn trend(&self, t: f64) -> f64 {
        let mut row = Vec::with_capacity(self.trend_coef.len());
        trend_row(t, &self.changepoints, &mut row);
        row.iter().zip(&self.trend_coef).map(|(x, b)| x * b).sum()
    }

    fn seasonal(&self, ts: DateTime<Utc>) -> f64 {
        let mut row = Vec::with_capacity(self.season_coef.len());
        fourier_row(ts, &self.seasons, &mut row);
        row.iter().zip(&self.season_coef).map(|(x, b)| x * b).sum()
    }

    fn combine(&self, trend: f64, seasonal: f64) -> f64 {
        match self.mode {
            SeasonalityMode::Additive => trend + seasonal,
            SeasonalityMode::Multiplicative => trend * (1.0 + seasonal),
        }
    }

    /// Per-step sorted samples of simulated future values, scaled units.
    fn simulate(&self, times: &[f64], trend: &[f64], seasonal: &[f64]) -> Result<Vec<Vec<f64>>, ModelError> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let noise = Normal::new(0.0, self.sigma).map_err(|e| ModelError::Fit(e.to_string()))?;
        let jump = if self.change_scale > 0.0 && self.change_rate > 0.0 {
            Some(Exp::new(1.0 / self.change_scale).map_err(|e| ModelError::Fit(e.to_string()))?)
        } else {
            None
        };

        let mut draws = vec![Vec::with_capacity(self.samples); times.len()];
        for _ in 0..self.samples {
            let mut slope_shift = 0.0;
            let mut level_shift = 0.0;
            let mut prev_t = 1.0;
            for (h, &t) in times.iter().enumerate() {
                level_shift += slope_shift * (t - prev_t);
                prev_t = t;
                if let Some(jump) = &jump {
                    if rng.gen_bool(self.change_rate.min(1.0)) {
                        // Laplace as a signed exponential
                        let magnitude = jump.sample(&mut rng);
                        slope_shift += if rng.gen_bool(0.5) { magnitude } else { -magnitude };
                    }
                }
                let value = self.combine(trend[h] + level_shift, seasonal[h]) + noise.sample(&mut rng);
                draws[h].push(value);
            }
        }
        for column in &mut draws {
            column.sort_by(f64::total_cmp);
        }
        Ok(draws)
    }
}

/// Linear-interpolated quantile of sorted samples.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

impl FittedModel for FittedTrendSeason {
    fn forecast(&self, steps: usize, confidence: f64) -> Result<Vec<ForecastPoint>, ModelError> {
        if !(confidence > 0.0 && confidence < 1.0) {
            return Err(ModelError::InvalidParams(format!(
                "confidence must be in (0, 1), got {confidence}"
            )));
        }

        let grid = future_grid(self.last_ts, self.grain, steps)?;
        let times: Vec<f64> = grid.iter().map(|ts| self.scaled_time(*ts)).collect();
        let trend: Vec<f64> = times.iter().map(|t| self.trend(*t)).collect();
        let seasonal: Vec<f64> = grid.iter().map(|ts| self.seasonal(*ts)).collect();

        let draws = if self.samples > 0 {
            Some(self.simulate(&times, &trend, &seasonal)?)
        } else {
            None
        };
        let tail = (1.0 - confidence) / 2.0;

        let points = grid
            .into_iter()
            .enumerate()
            .map(|(h, ts)| {
                let yhat = self.combine(trend[h], seasonal[h]);
                let (lower, upper) = match &draws {
                    Some(d) => (quantile(&d[h], tail), quantile(&d[h], 1.0 - tail)),
                    None => (yhat, yhat),
                };
                ForecastPoint {
                    ts,
                    yhat: yhat * self.y_scale,
                    yhat_lower: lower * self.y_scale,
                    yhat_upper: upper * self.y_scale,
                }
            })
            .collect();
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::normalize;
    use crate::domain::PriceRow;
    use chrono::{Duration, TimeZone};

    fn series(grain: Grain, values: &[f64]) -> NormalizedSeries {
        let start = Utc.with_ymd_and_hms(2022, 1, 3, 0, 0, 0).unwrap();
        let rows: Vec<PriceRow> = values
            .iter()
            .enumerate()
            .map(|(i, &v)| PriceRow {
                ts: start + grain.step() * i as i32,
                ticker: "X".into(),
                open: v,
                high: v,
                low: v,
                close: v,
                adj_close: v,
                volume: 1,
            })
            .collect();
        normalize("X", &rows, grain, 1).unwrap()
    }

    fn weekly(ts: DateTime<Utc>) -> f64 {
        let days = ts.timestamp() as f64 / SECONDS_PER_DAY;
        (std::f64::consts::TAU * days / 7.0).sin()
    }

    #[test]
    fn changepoints_cover_first_eighty_percent() {
        let t: Vec<f64> = (0..100).map(|i| i as f64 / 99.0).collect();
        let cps = changepoints(&t, 25, 0.8);
        assert_eq!(cps.len(), 25);
        assert!(cps[0] > 0.0);
        assert!(*cps.last().unwrap() <= t[79]);
        assert!(cps.windows(2).all(|w| w[0] < w[1]));

        assert!(changepoints(&t[..2], 25, 0.8).is_empty());
    }

    #[test]
    fn seasonality_selection_by_grain_and_span() {
        assert_eq!(seasonalities(Grain::Hourly, 30.0)[0].period_days, 1.0);
        assert_eq!(seasonalities(Grain::Daily, 365.0).len(), 1);
        assert_eq!(seasonalities(Grain::Daily, 730.0).len(), 2);
    }

    #[test]
    fn extrapolates_linear_trend() {
        let values: Vec<f64> = (0..200).map(|i| 100.0 + 0.5 * i as f64).collect();
        let params = TrendSeasonParams {
            seasonality_mode: SeasonalityMode::Additive,
            ..TrendSeasonParams::default()
        };
        let s = series(Grain::Daily, &values);
        let fitted = TrendSeason::new(params, 7).fit(&s, &CancelToken::never()).unwrap();
        let points = fitted.forecast(10, 0.8).unwrap();

        assert_eq!(points.len(), 10);
        assert_eq!(points[0].ts, s.last_ts().unwrap() + Duration::days(1));
        for (h, p) in points.iter().enumerate() {
            let truth = 100.0 + 0.5 * (200 + h) as f64;
            assert!((p.yhat - truth).abs() < 1.0, "h={h} yhat={} truth={truth}", p.yhat);
        }
    }

    #[test]
    fn multiplicative_weekly_cycle_is_recovered() {
        let start = Utc.with_ymd_and_hms(2022, 1, 3, 0, 0, 0).unwrap();
        let truth = |i: usize| {
            let ts = start + Duration::days(i as i64);
            (100.0 + 0.1 * i as f64) * (1.0 + 0.05 * weekly(ts))
        };
        let values: Vec<f64> = (0..365).map(truth).collect();
        let s = series(Grain::Daily, &values);
        let fitted = TrendSeason::new(TrendSeasonParams::default(), 7)
            .fit(&s, &CancelToken::never())
            .unwrap();
        let points = fitted.forecast(14, 0.8).unwrap();

        for (h, p) in points.iter().enumerate() {
            let expected = truth(365 + h);
            assert!(
                (p.yhat - expected).abs() / expected < 0.02,
                "h={h} yhat={} expected={expected}",
                p.yhat
            );
        }
    }

    #[test]
    fn intervals_are_seeded_and_bracket_the_point() {
        let values: Vec<f64> = (0..24 * 30)
            .map(|i| {
                let phase = (i % 24) as f64 / 24.0 * std::f64::consts::TAU;
                200.0 + 0.01 * i as f64 + 3.0 * phase.cos() + ((i * 37) % 11) as f64 * 0.05
            })
            .collect();
        let s = series(Grain::Hourly, &values);
        let model = TrendSeason::new(TrendSeasonParams::default(), 42);

        let a = model.fit(&s, &CancelToken::never()).unwrap().forecast(24, 0.8).unwrap();
        let b = model.fit(&s, &CancelToken::never()).unwrap().forecast(24, 0.8).unwrap();
        assert_eq!(a, b);

        for p in &a {
            assert!(p.yhat_lower < p.yhat_upper);
            assert!(p.yhat_lower <= p.yhat && p.yhat <= p.yhat_upper);
        }
    }

    #[test]
    fn quantile_interpolates() {
        let sorted = [0.0, 1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&sorted, 0.5), 2.0);
        assert!((quantile(&sorted, 0.1) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn too_few_points_is_fit_error() {
        let s = series(Grain::Daily, &[1.0, 2.0]);
        let err = TrendSeason::new(TrendSeasonParams::default(), 1)
            .fit(&s, &CancelToken::never())
            .err()
            .unwrap();
        assert!(matches!(err, ModelError::Fit(_)));
    }
}
