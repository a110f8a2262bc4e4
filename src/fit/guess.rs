//! Initial guess for `[A, α, B]`.
//!
//! `B` starts at the fully depolarised survival `1/d`. `α` comes from the
//! ratio of the first two offset-corrected points and `A` from the first point;
//! both fall back to fixed values when the data do not support the ratio.

use crate::domain::SurvivalCurve;

const FALLBACK_ALPHA: f64 = 0.99;
const FALLBACK_AMPLITUDE: f64 = 0.95;

pub fn initial_guess(curve: &SurvivalCurve, dimension: u64) -> [f64; 3] {
    let b0 = 1.0 / dimension as f64;
    let (m0, m1) = (curve.lengths[0] as f64, curve.lengths[1] as f64);
    let (y0, y1) = (curve.mean[0], curve.mean[1]);

    let ratio = ((y1 - b0) / (y0 - b0)).powf(1.0 / (m1 - m0));
    let alpha0 = if ratio.is_finite() && ratio > 0.0 && ratio < 1.0 {
        ratio
    } else {
        FALLBACK_ALPHA
    };

    let a0 = if y0 > b0 {
        (y0 - b0) / alpha0.powf(m0)
    } else {
        FALLBACK_AMPLITUDE
    };

    [a0, alpha0, b0]
}
