//! Closed-form error rates and their propagated uncertainties.
//!
//! `d` is the group's Hilbert-space dimension. Every error rate here is a
//! depolarising-parameter conversion `(d-1)/d · (1 - x)` of some combination
//! of fitted decay parameters.

use crate::fit::options::ErrorPropagation;

/// `(d-1)/d`.
pub fn depolarizing_scale(dimension: u64) -> f64 {
    let d = dimension as f64;
    (d - 1.0) / d
}

/// Error per Clifford from the decay parameter.
pub fn epc(alpha: f64, dimension: u64) -> f64 {
    depolarizing_scale(dimension) * (1.0 - alpha)
}

pub fn epc_err(alpha: f64, alpha_err: f64, dimension: u64, mode: ErrorPropagation) -> f64 {
    let scale = depolarizing_scale(dimension);
    match mode {
        ErrorPropagation::Delta => scale * alpha_err,
        ErrorPropagation::Relative => scale * alpha_err / alpha,
    }
}

/// Interleaved gate error `(d-1)/d · (1 - α_c/α)`.
pub fn interleaved_epc(alpha: f64, alpha_c: f64, dimension: u64) -> f64 {
    depolarizing_scale(dimension) * (1.0 - alpha_c / alpha)
}

/// Delta-method error of `α_c/α` with independent errors.
pub fn interleaved_epc_err(alpha: f64, alpha_err: f64, alpha_c: f64, alpha_c_err: f64, dimension: u64) -> f64 {
    let d_alpha_c = alpha_c_err / alpha;
    let d_alpha = alpha_c * alpha_err / (alpha * alpha);
    depolarizing_scale(dimension) * d_alpha_c.hypot(d_alpha)
}

/// Half-width of the systematic interval around the interleaved estimate:
/// the smaller of the two bounds of Magesan et al. (2012), Eq. 5.
pub fn systematic_bound(alpha: f64, alpha_c: f64, dimension: u64) -> f64 {
    let d = dimension as f64;
    let e1 = depolarizing_scale(dimension) * ((alpha - alpha_c / alpha).abs() + (1.0 - alpha));
    let e2 = 2.0 * (d * d - 1.0) * (1.0 - alpha) / (alpha * d * d)
        + 4.0 * (1.0 - alpha).sqrt() * (d * d - 1.0).sqrt() / alpha;
    e1.min(e2)
}

/// Purity-corrected error per Clifford from the purity decay `u`.
pub fn purity_epc(u: f64, dimension: u64) -> f64 {
    depolarizing_scale(dimension) * (1.0 - u.sqrt())
}

pub fn purity_epc_err(u: f64, u_err: f64, dimension: u64, mode: ErrorPropagation) -> f64 {
    let half = depolarizing_scale(dimension) / 2.0;
    match mode {
        ErrorPropagation::Delta => half * u_err / u.sqrt(),
        ErrorPropagation::Relative => half * u_err / u,
    }
}

/// Joint CNOT-dihedral decay `(α_Z + d·α_X)/(d + 1)`.
pub fn dihedral_alpha(alpha_z: f64, alpha_x: f64, dimension: u64) -> f64 {
    let d = dimension as f64;
    (alpha_z + d * alpha_x) / (d + 1.0)
}

pub fn dihedral_alpha_err(
    alpha_z: f64,
    alpha_z_err: f64,
    alpha_x: f64,
    alpha_x_err: f64,
    dimension: u64,
    mode: ErrorPropagation,
) -> f64 {
    let d = dimension as f64;
    let (z, x) = match mode {
        ErrorPropagation::Delta => (alpha_z_err, alpha_x_err),
        ErrorPropagation::Relative => (alpha_z_err / alpha_z, alpha_x_err / alpha_x),
    };
    (z / (d + 1.0)).hypot(d * x / (d + 1.0))
}
