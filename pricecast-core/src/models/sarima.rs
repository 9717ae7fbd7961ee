//! Seasonal ARIMA fitted by conditional sum of squares.
//!
//! The model is `phi(B) Phi(B^s) (1-B)^d (1-B^s)^D (y_t - mu) = theta(B) Theta(B^s) e_t`,
//! with `mu` estimated only when no differencing is applied. Stationarity
//! and invertibility are not enforced; coefficients are only box-bounded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::optimizer::NelderMead;
use super::{future_grid, z_score, FittedModel, Forecaster, ModelError};
use crate::cancel::CancelToken;
use crate::data::NormalizedSeries;
use crate::domain::{ForecastPoint, Grain};

const COEF_BOUND: f64 = 0.999;

/// `order = [p, d, q]`, `seasonal_order = [P, D, Q, s]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SarimaParams {
    pub order: [usize; 3],
    pub seasonal_order: [usize; 4],
    pub max_iter: usize,
}

impl Default for SarimaParams {
    fn default() -> Self {
        Self::short_term()
    }
}

impl SarimaParams {
    /// (1,1,1)(1,0,1,24), the hourly default.
    pub fn short_term() -> Self {
        Self {
            order: [1, 1, 1],
            seasonal_order: [1, 0, 1, 24],
            max_iter: 500,
        }
    }

    /// (1,1,1)(0,1,1,s).
    pub fn seasonal_difference(season: usize) -> Self {
        Self {
            order: [1, 1, 1],
            seasonal_order: [0, 1, 1, season],
            max_iter: 500,
        }
    }

    fn season(&self) -> usize {
        self.seasonal_order[3]
    }

    fn validate(&self) -> Result<(), ModelError> {
        let [sp, sd, sq, s] = self.seasonal_order;
        if s <= 1 && (sp > 0 || sd > 0 || sq > 0) {
            return Err(ModelError::InvalidParams(format!(
                "seasonal terms need a season length > 1, got {s}"
            )));
        }
        Ok(())
    }

    fn has_mean(&self) -> bool {
        self.order[1] == 0 && self.seasonal_order[1] == 0
    }

    fn n_coefs(&self) -> usize {
        self.order[0] + self.order[2] + self.seasonal_order[0] + self.seasonal_order[2]
    }
}

/// Multiply two lag polynomials given as coefficient vectors, lag 0 first.
fn poly_mul(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

/// `1 + sign * sum(c_i B^(i*stride))`.
fn lag_poly(coefs: &[f64], stride: usize, sign: f64) -> Vec<f64> {
    let mut p = vec![0.0; coefs.len() * stride + 1];
    p[0] = 1.0;
    for (i, c) in coefs.iter().enumerate() {
        p[(i + 1) * stride] = sign * c;
    }
    p
}

/// `(1-B)^d (1-B^s)^D` as a polynomial.
fn difference_poly(d: usize, seasonal_d: usize, s: usize) -> Vec<f64> {
    let mut p = vec![1.0];
    for _ in 0..d {
        p = poly_mul(&p, &[1.0, -1.0]);
    }
    for _ in 0..seasonal_d {
        p = poly_mul(&p, &lag_poly(&[1.0], s, -1.0));
    }
    p
}

/// Apply a lag polynomial to a series, dropping the first `len - 1` points.
fn apply_poly(poly: &[f64], y: &[f64]) -> Vec<f64> {
    let lag = poly.len() - 1;
    if y.len() <= lag {
        return Vec::new();
    }
    (lag..y.len())
        .map(|t| poly.iter().enumerate().map(|(k, c)| c * y[t - k]).sum())
        .collect()
}

/// AR and MA lag coefficients in recursion form:
/// `w_t = sum(ar[k] w_{t-k}) + e_t + sum(ma[k] e_{t-k})`, index 0 unused.
struct Polys {
    ar: Vec<f64>,
    ma: Vec<f64>,
    mean: f64,
}

impl SarimaParams {
    fn unpack(&self, theta: &[f64]) -> Polys {
        let [p, _, q] = self.order;
        let [sp, _, sq, s] = self.seasonal_order;
        let (phi, rest) = theta.split_at(p);
        let (seasonal_phi, rest) = rest.split_at(sp);
        let (ma, rest) = rest.split_at(q);
        let (seasonal_ma, rest) = rest.split_at(sq);
        let mean = rest.first().copied().unwrap_or(0.0);

        let ar_poly = poly_mul(&lag_poly(phi, 1, -1.0), &lag_poly(seasonal_phi, s.max(1), -1.0));
        let ma_poly = poly_mul(&lag_poly(ma, 1, 1.0), &lag_poly(seasonal_ma, s.max(1), 1.0));

        Polys {
            ar: ar_poly.iter().map(|c| -c).collect(),
            ma: ma_poly,
            mean,
        }
    }
}

/// Residuals of the ARMA recursion over `w`, zero before `start`.
fn residuals(w: &[f64], polys: &Polys, start: usize) -> Vec<f64> {
    let mut e = vec![0.0; w.len()];
    for t in start..w.len() {
        let mut pred = 0.0;
        for k in 1..polys.ar.len().min(t + 1) {
            pred += polys.ar[k] * (w[t - k] - polys.mean);
        }
        for k in 1..polys.ma.len().min(t + 1) {
            pred += polys.ma[k] * e[t - k];
        }
        e[t] = w[t] - polys.mean - pred;
    }
    e
}

#[derive(Debug, Clone)]
pub struct Sarima {
    params: SarimaParams,
}

impl Sarima {
    pub fn new(params: SarimaParams) -> Self {
        Self { params }
    }
}

impl Forecaster for Sarima {
    fn name(&self) -> &str {
        "sarima"
    }

    fn fit(
        &self,
        series: &NormalizedSeries,
        cancel: &CancelToken,
    ) -> Result<Box<dyn FittedModel>, ModelError> {
        let params = &self.params;
        params.validate()?;

        let last_ts = series
            .last_ts()
            .ok_or_else(|| ModelError::Fit("empty series".into()))?;
        let y = series.values();

        let diff = difference_poly(params.order[1], params.seasonal_order[1], params.season());
        let w = apply_poly(&diff, &y);

        let ar_order = params.order[0] + params.seasonal_order[0] * params.season();
        let n_params = params.n_coefs() + usize::from(params.has_mean());
        let n_eff = w.len().saturating_sub(ar_order);
        if n_eff < n_params + 2 {
            return Err(ModelError::Fit(format!(
                "too few observations: {} usable after differencing and AR lags, need {}",
                n_eff,
                n_params + 2
            )));
        }

        let w_mean = w.iter().sum::<f64>() / w.len() as f64;
        let mut x0 = vec![0.1; params.n_coefs()];
        let mut bounds = vec![(-COEF_BOUND, COEF_BOUND); params.n_coefs()];
        if params.has_mean() {
            x0.push(w_mean);
            bounds.push((f64::NEG_INFINITY, f64::INFINITY));
        }

        let objective = |theta: &[f64]| {
            let polys = params.unpack(theta);
            let e = residuals(&w, &polys, ar_order);
            let css: f64 = e[ar_order..].iter().map(|r| r * r).sum();
            0.5 * n_eff as f64 * (css / n_eff as f64).max(f64::MIN_POSITIVE).ln()
        };

        let min = NelderMead::new(params.max_iter).minimize(objective, &x0, &bounds, cancel)?;
        if min.value == f64::MAX {
            return Err(ModelError::Fit("objective is not finite".into()));
        }

        let polys = params.unpack(&min.x);
        let e = residuals(&w, &polys, ar_order);
        let sigma2 = e[ar_order..].iter().map(|r| r * r).sum::<f64>() / n_eff as f64;

        debug!(
            ticker = series.ticker(),
            iterations = min.iterations,
            converged = min.converged,
            sigma2,
            "sarima fitted"
        );

        // residuals on the original index; the differenced prefix has none
        let offset = y.len() - w.len();
        let mut shocks = vec![0.0; offset];
        shocks.extend_from_slice(&e);

        // fold differencing into the AR side for forecasting on the original scale
        let ar_poly: Vec<f64> = polys
            .ar
            .iter()
            .enumerate()
            .map(|(k, c)| if k == 0 { 1.0 } else { -c })
            .collect();
        let integrated = poly_mul(&ar_poly, &diff);

        Ok(Box::new(FittedSarima {
            last_ts,
            grain: series.grain(),
            history: y,
            shocks,
            ar: integrated.iter().map(|c| -c).collect(),
            ma: polys.ma,
            mean: polys.mean,
            sigma2,
        }))
    }
}

struct FittedSarima {
    last_ts: DateTime<Utc>,
    grain: Grain,
    history: Vec<f64>,
    shocks: Vec<f64>,
    /// Integrated AR coefficients, recursion form, index 0 unused.
    ar: Vec<f64>,
    ma: Vec<f64>,
    mean: f64,
    sigma2: f64,
}

impl FittedSarima {
    fn psi_weights(&self, steps: usize) -> Vec<f64> {
        let mut psi = vec![0.0; steps];
        if steps == 0 {
            return psi;
        }
        psi[0] = 1.0;
        for j in 1..steps {
            let mut v = self.ma.get(j).copied().unwrap_or(0.0);
            for k in 1..self.ar.len().min(j + 1) {
                v += self.ar[k] * psi[j - k];
            }
            psi[j] = v;
        }
        psi
    }
}

impl FittedModel for FittedSarima {
    fn forecast(&self, steps: usize, confidence: f64) -> Result<Vec<ForecastPoint>, ModelError> {
        let z = z_score(confidence)?;
        let grid = future_grid(self.last_ts, self.grain, steps)?;

        let n = self.history.len();
        let mut x: Vec<f64> = self.history.iter().map(|v| v - self.mean).collect();
        let mut e = self.shocks.clone();
        x.reserve(steps);
        e.resize(n + steps, 0.0);

        for t in n..n + steps {
            let mut pred = 0.0;
            for k in 1..self.ar.len().min(t + 1) {
                pred += self.ar[k] * x[t - k];
            }
            for k in 1..self.ma.len().min(t + 1) {
                pred += self.ma[k] * e[t - k];
            }
            x.push(pred);
        }

        let psi = self.psi_weights(steps);
        let mut cumulative = 0.0;
        let points = grid
            .into_iter()
            .enumerate()
            .map(|(h, ts)| {
                cumulative += psi[h] * psi[h];
                let half_width = z * (self.sigma2 * cumulative).sqrt();
                let yhat = x[n + h] + self.mean;
                ForecastPoint {
                    ts,
                    yhat,
                    yhat_lower: yhat - half_width,
                    yhat_upper: yhat + half_width,
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
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn hourly_series(values: &[f64]) -> NormalizedSeries {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let rows: Vec<PriceRow> = values
            .iter()
            .enumerate()
            .map(|(i, &v)| PriceRow {
                ts: start + Duration::hours(i as i64),
                ticker: "X".into(),
                open: v,
                high: v,
                low: v,
                close: v,
                adj_close: v,
                volume: 1,
            })
            .collect();
        normalize("X", &rows, Grain::Hourly, 1).unwrap()
    }

    /// Seeded uniform noise in [-0.5, 0.5).
    fn noise(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n).map(|_| rng.gen_range(-0.5..0.5)).collect()
    }

    #[test]
    fn polynomial_helpers() {
        assert_eq!(poly_mul(&[1.0, -1.0], &[1.0, 1.0]), vec![1.0, 0.0, -1.0]);
        assert_eq!(difference_poly(1, 0, 0), vec![1.0, -1.0]);
        let seasonal = difference_poly(0, 1, 3);
        assert_eq!(seasonal, vec![1.0, 0.0, 0.0, -1.0]);
        assert_eq!(apply_poly(&[1.0, -1.0], &[1.0, 3.0, 6.0]), vec![2.0, 3.0]);
    }

    #[test]
    fn recovers_ar1_coefficient() {
        let eps = noise(400, 1);
        let mut y = vec![0.0];
        for i in 1..400 {
            y.push(0.6 * y[i - 1] + eps[i]);
        }
        let params = SarimaParams {
            order: [1, 0, 0],
            seasonal_order: [0, 0, 0, 0],
            max_iter: 500,
        };
        let w = y.clone();
        let objective_at = |phi: f64| {
            let polys = params.unpack(&[phi, 0.0]);
            residuals(&w, &polys, 1)[1..].iter().map(|r| r * r).sum::<f64>()
        };
        assert!(objective_at(0.6) < objective_at(0.0));

        let series = hourly_series(&y.iter().map(|v| v + 100.0).collect::<Vec<_>>());
        let fitted = Sarima::new(params).fit(&series, &CancelToken::never()).unwrap();
        let points = fitted.forecast(1, 0.8).unwrap();

        // one-step forecast is mu + phi * (y_last - mu)
        let last = y[y.len() - 1];
        let expected = 100.0 + 0.6 * last;
        assert!((points[0].yhat - expected).abs() < 0.15, "yhat = {}", points[0].yhat);
    }

    #[test]
    fn random_walk_forecast_is_flat_with_widening_interval() {
        let eps = noise(300, 2);
        let mut y = vec![50.0];
        for i in 1..300 {
            y.push(y[i - 1] + eps[i]);
        }
        let params = SarimaParams {
            order: [0, 1, 0],
            seasonal_order: [0, 0, 0, 0],
            max_iter: 100,
        };
        let series = hourly_series(&y);
        let fitted = Sarima::new(params).fit(&series, &CancelToken::never()).unwrap();
        let points = fitted.forecast(5, 0.8).unwrap();

        let last = *y.last().unwrap();
        for p in &points {
            assert!((p.yhat - last).abs() < 1e-9);
            assert!(p.yhat_lower < p.yhat && p.yhat < p.yhat_upper);
        }
        let width = |p: &ForecastPoint| p.yhat_upper - p.yhat_lower;
        assert!(width(&points[4]) > width(&points[0]));
        // sqrt(5) growth for a random walk
        assert!((width(&points[4]) / width(&points[0]) - 5f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn seasonal_model_tracks_daily_cycle() {
        let eps = noise(24 * 20, 3);
        let y: Vec<f64> = (0..24 * 20)
            .map(|i| {
                let phase = (i % 24) as f64 / 24.0 * std::f64::consts::TAU;
                100.0 + 5.0 * phase.sin() + 0.1 * eps[i]
            })
            .collect();
        let series = hourly_series(&y);
        let fitted = Sarima::new(SarimaParams::seasonal_difference(24))
            .fit(&series, &CancelToken::never())
            .unwrap();
        let points = fitted.forecast(24, 0.8).unwrap();

        assert_eq!(points.len(), 24);
        assert_eq!(points[0].ts, series.last_ts().unwrap() + Duration::hours(1));
        for (h, p) in points.iter().enumerate() {
            let phase = ((y.len() + h) % 24) as f64 / 24.0 * std::f64::consts::TAU;
            let truth = 100.0 + 5.0 * phase.sin();
            assert!((p.yhat - truth).abs() < 1.0, "h={h} yhat={} truth={truth}", p.yhat);
        }
    }

    #[test]
    fn too_short_series_is_a_fit_error() {
        let series = hourly_series(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let err = Sarima::new(SarimaParams::short_term())
            .fit(&series, &CancelToken::never())
            .err()
            .unwrap();
        assert!(matches!(err, ModelError::Fit(_)));
    }
}
