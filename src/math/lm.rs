//! Bounded Levenberg-Marquardt.
//!
//! Minimizes `½ Σ r_i(θ)²` subject to box bounds on `θ`. Steps are projected
//! back into the box; a step that does not lower the cost is retried with
//! heavier damping. Damping is scaled by `diag(JᵀJ)` (Marquardt scaling) so
//! parameters of very different magnitude are treated evenly.
//!
//! Termination (first one wins):
//! - projected gradient `‖Jᵀr‖∞ ≤ gtol`
//! - projected step `‖Δθ‖ ≤ xtol (xtol + ‖θ‖)`
//! - relative cost reduction `≤ ftol`

use nalgebra::{DMatrix, DVector};

use crate::error::FitFailure;
use crate::math::solve_least_squares;

const MIN_DAMPING: f64 = 1e-15;
const MAX_DAMPING_STEPS: usize = 60;

/// A nonlinear least-squares problem.
pub trait ResidualModel {
    fn num_params(&self) -> usize;

    fn residuals(&self, params: &DVector<f64>) -> DVector<f64>;

    /// `J[i][j] = ∂r_i/∂θ_j`.
    fn jacobian(&self, params: &DVector<f64>) -> DMatrix<f64>;
}

/// Inclusive box bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    pub lower: DVector<f64>,
    pub upper: DVector<f64>,
}

impl Bounds {
    pub fn new(lower: &[f64], upper: &[f64]) -> Self {
        Self {
            lower: DVector::from_row_slice(lower),
            upper: DVector::from_row_slice(upper),
        }
    }

    pub fn project(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(
            x.len(),
            x.iter()
                .enumerate()
                .map(|(i, v)| v.clamp(self.lower[i], self.upper[i])),
        )
    }

    /// Gradient with components pointing out of an active bound removed.
    fn projected_gradient(&self, x: &DVector<f64>, g: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(
            g.len(),
            g.iter().enumerate().map(|(i, &gi)| {
                let at_lower = x[i] <= self.lower[i] && gi > 0.0;
                let at_upper = x[i] >= self.upper[i] && gi < 0.0;
                if at_lower || at_upper { 0.0 } else { gi }
            }),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LmSettings {
    pub max_iterations: usize,
    pub ftol: f64,
    pub xtol: f64,
    pub gtol: f64,
    pub initial_damping: f64,
}

impl Default for LmSettings {
    fn default() -> Self {
        Self {
            max_iterations: 400,
            ftol: 1e-12,
            xtol: 1e-12,
            gtol: 1e-12,
            initial_damping: 1e-3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LmSolution {
    pub params: DVector<f64>,
    pub residuals: DVector<f64>,
    /// Jacobian at `params`.
    pub jacobian: DMatrix<f64>,
    /// `Σ r_i²` at `params`.
    pub chi_sq: f64,
    pub iterations: usize,
}

/// Minimize the model's squared residuals starting from `x0`.
pub fn levenberg_marquardt<M: ResidualModel + ?Sized>(
    model: &M,
    x0: &DVector<f64>,
    bounds: &Bounds,
    settings: &LmSettings,
) -> Result<LmSolution, FitFailure> {
    let p = model.num_params();
    let mut x = bounds.project(x0);
    let mut r = model.residuals(&x);
    if !all_finite(r.iter()) {
        return Err(FitFailure::NonFinite);
    }
    let mut cost = 0.5 * r.norm_squared();
    let mut lambda = settings.initial_damping;

    for iteration in 1..=settings.max_iterations {
        let j = model.jacobian(&x);
        if !all_finite(j.iter()) {
            return Err(FitFailure::NonFinite);
        }

        let g = j.transpose() * &r;
        if bounds.projected_gradient(&x, &g).amax() <= settings.gtol {
            return Ok(finish(x, r, j, iteration));
        }

        // Marquardt scaling: squared column norms, floored so a dead column
        // still receives some damping.
        let mut scale: Vec<f64> = (0..p).map(|c| j.column(c).norm_squared()).collect();
        let max_scale = scale.iter().copied().fold(0.0_f64, f64::max);
        if max_scale <= 0.0 {
            return Err(FitFailure::SingularJacobian);
        }
        for s in &mut scale {
            *s = s.max(max_scale * 1e-12);
        }

        let mut accepted = false;
        for _ in 0..MAX_DAMPING_STEPS {
            let step = damped_step(&j, &r, &scale, lambda).ok_or(FitFailure::SingularJacobian)?;
            let candidate = bounds.project(&(&x + &step));
            let dx = &candidate - &x;
            if dx.norm() <= settings.xtol * (settings.xtol + x.norm()) {
                return Ok(finish(x, r, j, iteration));
            }

            let r_new = model.residuals(&candidate);
            if !all_finite(r_new.iter()) {
                lambda *= 10.0;
                continue;
            }
            let cost_new = 0.5 * r_new.norm_squared();
            if cost_new < cost {
                let converged = cost - cost_new <= settings.ftol * cost;
                x = candidate;
                r = r_new;
                cost = cost_new;
                lambda = (lambda * 0.1).max(MIN_DAMPING);
                if converged {
                    let j = model.jacobian(&x);
                    if !all_finite(j.iter()) {
                        return Err(FitFailure::NonFinite);
                    }
                    return Ok(finish(x, r, j, iteration));
                }
                accepted = true;
                break;
            }
            lambda *= 10.0;
        }

        if !accepted {
            return Err(FitFailure::NoProgress);
        }
    }

    Err(FitFailure::MaxIterations(settings.max_iterations))
}

/// Solve `[J; sqrt(λ D)] δ = [-r; 0]` in the least-squares sense.
fn damped_step(j: &DMatrix<f64>, r: &DVector<f64>, scale: &[f64], lambda: f64) -> Option<DVector<f64>> {
    let (n, p) = j.shape();
    let mut a = DMatrix::<f64>::zeros(n + p, p);
    let mut b = DVector::<f64>::zeros(n + p);
    for row in 0..n {
        for col in 0..p {
            a[(row, col)] = j[(row, col)];
        }
        b[row] = -r[row];
    }
    for (col, s) in scale.iter().enumerate() {
        a[(n + col, col)] = (lambda * s).sqrt();
    }
    solve_least_squares(&a, &b)
}

fn finish(params: DVector<f64>, residuals: DVector<f64>, jacobian: DMatrix<f64>, iterations: usize) -> LmSolution {
    let chi_sq = residuals.norm_squared();
    LmSolution {
        params,
        residuals,
        jacobian,
        chi_sq,
        iterations,
    }
}

fn all_finite<'a>(mut values: impl Iterator<Item = &'a f64>) -> bool {
    values.all(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// y = a·exp(-b·t), residuals = model - data.
    struct ExpDecay {
        t: Vec<f64>,
        y: Vec<f64>,
    }

    impl ResidualModel for ExpDecay {
        fn num_params(&self) -> usize {
            2
        }

        fn residuals(&self, p: &DVector<f64>) -> DVector<f64> {
            DVector::from_iterator(
                self.t.len(),
                self.t
                    .iter()
                    .zip(&self.y)
                    .map(|(&t, &y)| p[0] * (-p[1] * t).exp() - y),
            )
        }

        fn jacobian(&self, p: &DVector<f64>) -> DMatrix<f64> {
            let mut j = DMatrix::zeros(self.t.len(), 2);
            for (i, &t) in self.t.iter().enumerate() {
                let e = (-p[1] * t).exp();
                j[(i, 0)] = e;
                j[(i, 1)] = -p[0] * t * e;
            }
            j
        }
    }

    fn synthetic(a: f64, b: f64) -> ExpDecay {
        let t: Vec<f64> = (0..12).map(|i| i as f64 * 0.5).collect();
        let y = t.iter().map(|&t| a * (-b * t).exp()).collect();
        ExpDecay { t, y }
    }

    #[test]
    fn recovers_exact_parameters() {
        let model = synthetic(2.0, 0.7);
        let bounds = Bounds::new(&[0.0, 0.0], &[10.0, 10.0]);
        let x0 = DVector::from_row_slice(&[1.0, 0.2]);
        let sol = levenberg_marquardt(&model, &x0, &bounds, &LmSettings::default()).unwrap();
        assert!((sol.params[0] - 2.0).abs() < 1e-8, "a = {}", sol.params[0]);
        assert!((sol.params[1] - 0.7).abs() < 1e-8, "b = {}", sol.params[1]);
        assert!(sol.chi_sq < 1e-12);
    }

    #[test]
    fn respects_bounds() {
        let model = synthetic(2.0, 0.7);
        let bounds = Bounds::new(&[0.0, 0.0], &[1.5, 10.0]);
        let x0 = DVector::from_row_slice(&[1.0, 0.2]);
        let sol = levenberg_marquardt(&model, &x0, &bounds, &LmSettings::default()).unwrap();
        assert!(sol.params[0] <= 1.5);
        assert!((sol.params[0] - 1.5).abs() < 1e-9);
    }

    #[test]
    fn reports_iteration_limit() {
        let model = synthetic(2.0, 0.7);
        let bounds = Bounds::new(&[0.0, 0.0], &[10.0, 10.0]);
        let x0 = DVector::from_row_slice(&[0.1, 5.0]);
        let settings = LmSettings {
            max_iterations: 1,
            ..LmSettings::default()
        };
        let err = levenberg_marquardt(&model, &x0, &bounds, &settings).unwrap_err();
        assert_eq!(err, FitFailure::MaxIterations(1));
    }

    #[test]
    fn projection_clamps_each_component() {
        let bounds = Bounds::new(&[0.0, -1.0], &[1.0, 1.0]);
        let x = bounds.project(&DVector::from_row_slice(&[1.5, -3.0]));
        assert_eq!(x.as_slice(), &[1.0, -1.0]);
    }
}
