//! Bounded Nelder-Mead simplex minimizer.

use super::ModelError;
use crate::cancel::CancelToken;

/// Simplex settings. Coefficients used are the standard ones: reflection 1,
/// expansion 2, contraction 0.5, shrink 0.5.
#[derive(Debug, Clone)]
pub struct NelderMead {
    pub max_iter: usize,
    /// Converged once the spread of objective values across the simplex
    /// falls below this.
    pub tolerance: f64,
    /// Initial simplex edge, relative to `max(|x_i|, 1)`.
    pub initial_step: f64,
}

impl Default for NelderMead {
    fn default() -> Self {
        Self {
            max_iter: 500,
            tolerance: 1e-8,
            initial_step: 0.1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Minimum {
    pub x: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

impl NelderMead {
    pub fn new(max_iter: usize) -> Self {
        Self {
            max_iter,
            ..Self::default()
        }
    }

    /// Minimize `objective` starting from `x0`, keeping every coordinate
    /// inside its `(lower, upper)` box. Non-finite objective values are
    /// treated as worse than any finite one.
    ///
    /// Checks `cancel` once per iteration.
    pub fn minimize<F>(
        &self,
        mut objective: F,
        x0: &[f64],
        bounds: &[(f64, f64)],
        cancel: &CancelToken,
    ) -> Result<Minimum, ModelError>
    where
        F: FnMut(&[f64]) -> f64,
    {
        if bounds.len() != x0.len() {
            return Err(ModelError::InvalidParams(format!(
                "{} bounds for {} parameters",
                bounds.len(),
                x0.len()
            )));
        }

        let mut eval = |x: &[f64]| {
            let v = objective(x);
            if v.is_finite() {
                v
            } else {
                f64::MAX
            }
        };
        let clamp = |x: &mut [f64]| {
            for (xi, &(lo, hi)) in x.iter_mut().zip(bounds) {
                *xi = xi.clamp(lo, hi);
            }
        };

        let dim = x0.len();
        let mut start = x0.to_vec();
        clamp(&mut start);
        if dim == 0 {
            let value = eval(&start);
            return Ok(Minimum {
                x: start,
                value,
                iterations: 0,
                converged: true,
            });
        }

        let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(dim + 1);
        simplex.push(start.clone());
        for i in 0..dim {
            let mut vertex = start.clone();
            let step = self.initial_step * start[i].abs().max(1.0);
            vertex[i] += step;
            clamp(&mut vertex);
            if vertex[i] == start[i] {
                // pinned at the upper bound
                vertex[i] -= step;
                clamp(&mut vertex);
            }
            simplex.push(vertex);
        }
        let mut values: Vec<f64> = simplex.iter().map(|v| eval(v)).collect();

        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.max_iter {
            if cancel.is_cancelled() {
                return Err(ModelError::Cancelled);
            }
            iterations += 1;

            let mut order: Vec<usize> = (0..=dim).collect();
            order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
            simplex = order.iter().map(|&i| simplex[i].clone()).collect();
            values = order.iter().map(|&i| values[i]).collect();

            let best = values[0];
            let worst = values[dim];
            if (worst - best).abs() <= self.tolerance {
                converged = true;
                break;
            }

            let mut centroid = vec![0.0; dim];
            for vertex in &simplex[..dim] {
                for (c, v) in centroid.iter_mut().zip(vertex) {
                    *c += v / dim as f64;
                }
            }
            let towards = |from: &[f64], coef: f64| -> Vec<f64> {
                let mut p: Vec<f64> = centroid
                    .iter()
                    .zip(from)
                    .map(|(c, f)| c + coef * (f - c))
                    .collect();
                clamp(&mut p);
                p
            };

            // reflection
            let reflected = towards(&simplex[dim], -1.0);
            let f_reflected = eval(&reflected);

            if f_reflected < best {
                let expanded = towards(&simplex[dim], -2.0);
                let f_expanded = eval(&expanded);
                if f_expanded < f_reflected {
                    simplex[dim] = expanded;
                    values[dim] = f_expanded;
                } else {
                    simplex[dim] = reflected;
                    values[dim] = f_reflected;
                }
                continue;
            }

            if f_reflected < values[dim - 1] {
                simplex[dim] = reflected;
                values[dim] = f_reflected;
                continue;
            }

            // contraction, outside when the reflection improved on the worst
            let (contracted, bar) = if f_reflected < worst {
                (towards(&reflected, 0.5), f_reflected)
            } else {
                (towards(&simplex[dim], 0.5), worst)
            };
            let f_contracted = eval(&contracted);
            if f_contracted < bar {
                simplex[dim] = contracted;
                values[dim] = f_contracted;
                continue;
            }

            // shrink towards the best vertex
            let anchor = simplex[0].clone();
            for i in 1..=dim {
                for (x, a) in simplex[i].iter_mut().zip(&anchor) {
                    *x = a + 0.5 * (*x - a);
                }
                clamp(&mut simplex[i]);
                values[i] = eval(&simplex[i]);
            }
        }

        let (best_idx, _) = values
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .unwrap_or((0, &f64::MAX));

        Ok(Minimum {
            x: simplex[best_idx].clone(),
            value: values[best_idx],
            iterations,
            converged,
        })
    }
}
