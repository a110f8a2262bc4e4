//! CNOT-dihedral RB: one decay shared by two complementary sequence families.
//!
//! Z-type and X-type sequences decay with `α_Z` and `α_X`; the joint
//! depolarising parameter weights them `1 : d`.

use serde::{Deserialize, Serialize};

use crate::domain::{LengthAxes, QubitPattern, RawOutcomeRecord, SurvivalCurve};
use crate::error::RbError;
use crate::fit::fitter::{DecayCurveFitter, DecayFit};
use crate::fit::options::{ErrorPropagation, FitOptions};
use crate::fit::propagate;
use crate::fit::standard::RbFitter;
use crate::report::YData;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DihedralFit {
    pub alpha: f64,
    pub alpha_err: f64,
    pub epg_est: f64,
    pub epg_est_err: f64,
}

impl DihedralFit {
    pub fn combine(z: &DecayFit, x: &DecayFit, dimension: u64, mode: ErrorPropagation) -> Self {
        let alpha = propagate::dihedral_alpha(z.alpha(), x.alpha(), dimension);
        let alpha_err =
            propagate::dihedral_alpha_err(z.alpha(), z.alpha_err(), x.alpha(), x.alpha_err(), dimension, mode);
        Self {
            alpha,
            alpha_err,
            epg_est: propagate::epc(alpha, dimension),
            epg_est_err: propagate::epc_err(alpha, alpha_err, dimension, mode),
        }
    }
}

pub fn join_dihedral(
    z: &[Result<DecayFit, RbError>],
    x: &[Result<DecayFit, RbError>],
    pattern: &QubitPattern,
    mode: ErrorPropagation,
) -> Vec<Result<DihedralFit, RbError>> {
    z.iter()
        .zip(x)
        .enumerate()
        .map(|(g, pair)| match pair {
            (Ok(z), Ok(x)) => Ok(DihedralFit::combine(z, x, pattern.dimension(g), mode)),
            (Err(e), _) | (_, Err(e)) => Err(e.clone()),
        })
        .collect()
}

/// Fit both families' curves and combine them per group.
pub fn fit_dihedral(
    fitter: &DecayCurveFitter,
    z_curves: &[SurvivalCurve],
    x_curves: &[SurvivalCurve],
    pattern: &QubitPattern,
) -> Result<Vec<Result<DihedralFit, RbError>>, RbError> {
    if z_curves.len() != pattern.len() || x_curves.len() != pattern.len() {
        return Err(RbError::shape(format!(
            "{} Z-type and {} X-type curves for {} groups",
            z_curves.len(),
            x_curves.len(),
            pattern.len()
        )));
    }
    let (z, x) = if fitter.options().parallel {
        rayon::join(|| fitter.fit_all(z_curves, pattern), || fitter.fit_all(x_curves, pattern))
    } else {
        (fitter.fit_all(z_curves, pattern), fitter.fit_all(x_curves, pattern))
    };
    Ok(join_dihedral(&z?, &x?, pattern, fitter.propagation()))
}

/// CNOT-dihedral RB over one pattern.
#[derive(Debug, Clone)]
pub struct DihedralRbFitter {
    z: RbFitter,
    x: RbFitter,
    joint: Vec<Result<DihedralFit, RbError>>,
}

impl DihedralRbFitter {
    pub fn new(pattern: QubitPattern, lengths: LengthAxes, options: FitOptions) -> Result<Self, RbError> {
        Ok(Self {
            z: RbFitter::new(pattern.clone(), lengths.clone(), options.clone())?,
            x: RbFitter::new(pattern, lengths, options)?,
            joint: Vec::new(),
        })
    }

    pub fn from_records(
        z_records: &[RawOutcomeRecord],
        x_records: &[RawOutcomeRecord],
        pattern: QubitPattern,
        lengths: LengthAxes,
        options: FitOptions,
    ) -> Result<Self, RbError> {
        let mut fitter = Self::new(pattern, lengths, options)?;
        fitter.add_data(z_records, x_records)?;
        Ok(fitter)
    }

    /// Merge more seeds of either family and refit; all or nothing.
    pub fn add_data(&mut self, z_records: &[RawOutcomeRecord], x_records: &[RawOutcomeRecord]) -> Result<(), RbError> {
        let mut z = self.z.clone();
        let mut x = self.x.clone();
        z.add_data(z_records)?;
        x.add_data(x_records)?;
        self.joint = join_dihedral(z.fits(), x.fits(), z.pattern(), z.fitter().propagation());
        self.z = z;
        self.x = x;
        Ok(())
    }

    pub fn pattern(&self) -> &QubitPattern {
        self.z.pattern()
    }

    pub fn z_type(&self) -> &RbFitter {
        &self.z
    }

    pub fn x_type(&self) -> &RbFitter {
        &self.x
    }

    /// `[Z-type, X-type]` survival data.
    pub fn ydata(&self) -> [Vec<YData>; 2] {
        [self.z.ydata(), self.x.ydata()]
    }

    pub fn fit_cnotdihedral(&self) -> &[Result<DihedralFit, RbError>] {
        &self.joint
    }
}
