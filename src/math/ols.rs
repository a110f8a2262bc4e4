//! Linear least squares and parameter covariance.
//!
//! Each Levenberg-Marquardt step solves a small damped problem
//!
//! ```text
//! minimize ||J δ + r||² + λ Σ d_i δ_i²
//! ```
//!
//! which we express as an ordinary least-squares problem on the stacked
//! matrix `[J; sqrt(λ D)]` and solve by SVD. The parameter dimension is 3, so
//! SVD cost is negligible next to residual evaluation.
//!
//! Covariances come from the same decomposition of the final Jacobian:
//! `pinv(JᵀJ) = V S⁻² Vᵀ`, dropping singular values below
//! `eps · max(n, p) · s_max`.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-14, 1e-12, 1e-10] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Unscaled parameter covariance `pinv(JᵀJ)` plus conditioning diagnostics.
#[derive(Debug, Clone)]
pub struct Covariance {
    pub matrix: DMatrix<f64>,
    /// Number of singular values kept.
    pub rank: usize,
    /// `s_max / s_min` over the kept singular values.
    pub condition: f64,
}

/// Pseudo-inverse of `JᵀJ` from the SVD of `J`.
///
/// Returns `None` when `J` is identically zero or not finite.
pub fn covariance_from_jacobian(jacobian: &DMatrix<f64>) -> Option<Covariance> {
    if jacobian.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let (n, p) = jacobian.shape();
    let svd = jacobian.clone().svd(false, true);
    let v_t = svd.v_t.as_ref()?;

    let s_max = svd.singular_values.iter().copied().fold(0.0_f64, f64::max);
    if s_max <= 0.0 {
        return None;
    }
    let threshold = f64::EPSILON * n.max(p) as f64 * s_max;

    let mut matrix = DMatrix::<f64>::zeros(p, p);
    let mut rank = 0;
    let mut s_min = s_max;
    for (k, &s) in svd.singular_values.iter().enumerate() {
        if s <= threshold {
            continue;
        }
        rank += 1;
        s_min = s_min.min(s);
        let inv = 1.0 / (s * s);
        for a in 0..p {
            for b in 0..p {
                matrix[(a, b)] += v_t[(k, a)] * v_t[(k, b)] * inv;
            }
        }
    }

    Some(Covariance {
        matrix,
        rank,
        condition: s_max / s_min,
    })
}
