//! Model evaluation for `y(m) = A · α^m + B`.
//!
//! The fitter relies on two primitive operations:
//! - predict `y(m)` given `[A, α, B]` (residuals)
//! - fill a Jacobian row `∂y/∂[A, α, B]` at `m`
//!
//! `DecayProblem` ties them to one observed curve for the solver.

use nalgebra::{DMatrix, DVector};

use crate::math::ResidualModel;

/// Parameter order: `[A, α, B]`.
pub const PARAM_COUNT: usize = 3;

/// Predict `y(m)` from `[A, α, B]`.
pub fn predict(m: f64, params: &[f64]) -> f64 {
    params[0] * params[1].powf(m) + params[2]
}

/// Fill `out` with `[α^m, A·m·α^(m-1), 1]`.
///
/// # Panics
/// Panics if `params` or `out` are shorter than `PARAM_COUNT`.
pub fn fill_jacobian_row(m: f64, params: &[f64], out: &mut [f64]) {
    let (a, alpha) = (params[0], params[1]);
    out[0] = alpha.powf(m);
    out[1] = if m == 0.0 { 0.0 } else { a * m * alpha.powf(m - 1.0) };
    out[2] = 1.0;
}

/// One survival curve posed as a least-squares problem.
///
/// Residuals are `(y(m_i) - y_i) / σ_i` when `sigma` is given, else plain
/// differences.
#[derive(Debug, Clone)]
pub struct DecayProblem<'a> {
    pub lengths: &'a [u32],
    pub y: &'a [f64],
    pub sigma: Option<&'a [f64]>,
}

impl DecayProblem<'_> {
    fn scale(&self, i: usize) -> f64 {
        self.sigma.map_or(1.0, |s| 1.0 / s[i])
    }
}

impl ResidualModel for DecayProblem<'_> {
    fn num_params(&self) -> usize {
        PARAM_COUNT
    }

    fn residuals(&self, params: &DVector<f64>) -> DVector<f64> {
        let p = params.as_slice();
        DVector::from_iterator(
            self.y.len(),
            self.lengths
                .iter()
                .zip(self.y)
                .enumerate()
                .map(|(i, (&m, &y))| (predict(m as f64, p) - y) * self.scale(i)),
        )
    }

    fn jacobian(&self, params: &DVector<f64>) -> DMatrix<f64> {
        let p = params.as_slice();
        let mut j = DMatrix::<f64>::zeros(self.y.len(), PARAM_COUNT);
        let mut row = [0.0; PARAM_COUNT];
        for (i, &m) in self.lengths.iter().enumerate() {
            fill_jacobian_row(m as f64, p, &mut row);
            let w = self.scale(i);
            for (c, v) in row.iter().enumerate() {
                j[(i, c)] = v * w;
            }
        }
        j
    }
}
