//! Interleaved RB: a target gate's error from the ratio of two decays.
//!
//! Reference sequences give `α`; the same sequences with the target gate
//! interleaved give `α_c`. Both curves are fitted independently and combined
//! per group.

use serde::{Deserialize, Serialize};

use crate::domain::{LengthAxes, QubitPattern, RawOutcomeRecord, SurvivalCurve};
use crate::error::RbError;
use crate::fit::fitter::{DecayCurveFitter, DecayFit};
use crate::fit::options::FitOptions;
use crate::fit::propagate;
use crate::fit::standard::RbFitter;
use crate::report::YData;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterleavedFit {
    pub alpha: f64,
    pub alpha_err: f64,
    pub alpha_c: f64,
    pub alpha_c_err: f64,
    pub epc_est: f64,
    pub epc_est_err: f64,
    pub systematic_err: f64,
    #[serde(rename = "systematic_err_L")]
    pub systematic_err_l: f64,
    #[serde(rename = "systematic_err_R")]
    pub systematic_err_r: f64,
}

impl InterleavedFit {
    /// Combine a reference and an interleaved decay of the same group.
    ///
    /// A negative `epc_est` is reported as is.
    pub fn combine(reference: &DecayFit, interleaved: &DecayFit, dimension: u64) -> Self {
        let (alpha, alpha_err) = (reference.alpha(), reference.alpha_err());
        let (alpha_c, alpha_c_err) = (interleaved.alpha(), interleaved.alpha_err());
        let epc_est = propagate::interleaved_epc(alpha, alpha_c, dimension);
        let systematic_err = propagate::systematic_bound(alpha, alpha_c, dimension);
        Self {
            alpha,
            alpha_err,
            alpha_c,
            alpha_c_err,
            epc_est,
            epc_est_err: propagate::interleaved_epc_err(alpha, alpha_err, alpha_c, alpha_c_err, dimension),
            systematic_err,
            systematic_err_l: epc_est - systematic_err,
            systematic_err_r: epc_est + systematic_err,
        }
    }
}

/// Per-group joint results; a group inherits the first failure of its two fits.
pub fn join_interleaved(
    reference: &[Result<DecayFit, RbError>],
    interleaved: &[Result<DecayFit, RbError>],
    pattern: &QubitPattern,
) -> Vec<Result<InterleavedFit, RbError>> {
    reference
        .iter()
        .zip(interleaved)
        .enumerate()
        .map(|(g, (r, i))| match (r, i) {
            (Ok(r), Ok(i)) => Ok(InterleavedFit::combine(r, i, pattern.dimension(g))),
            (Err(e), _) | (_, Err(e)) => Err(e.clone()),
        })
        .collect()
}

/// Fit both curve families and combine them per group.
pub fn fit_interleaved(
    fitter: &DecayCurveFitter,
    reference: &[SurvivalCurve],
    interleaved: &[SurvivalCurve],
    pattern: &QubitPattern,
) -> Result<Vec<Result<InterleavedFit, RbError>>, RbError> {
    if reference.len() != pattern.len() || interleaved.len() != pattern.len() {
        return Err(RbError::shape(format!(
            "{} reference and {} interleaved curves for {} groups",
            reference.len(),
            interleaved.len(),
            pattern.len()
        )));
    }
    let (ref_fits, int_fits) = if fitter.options().parallel {
        rayon::join(
            || fitter.fit_all(reference, pattern),
            || fitter.fit_all(interleaved, pattern),
        )
    } else {
        (fitter.fit_all(reference, pattern), fitter.fit_all(interleaved, pattern))
    };
    Ok(join_interleaved(&ref_fits?, &int_fits?, pattern))
}

/// Interleaved RB over one pattern: two standard fitters and their joint fit.
#[derive(Debug, Clone)]
pub struct InterleavedRbFitter {
    reference: RbFitter,
    interleaved: RbFitter,
    joint: Vec<Result<InterleavedFit, RbError>>,
}

impl InterleavedRbFitter {
    pub fn new(pattern: QubitPattern, lengths: LengthAxes, options: FitOptions) -> Result<Self, RbError> {
        Ok(Self {
            reference: RbFitter::new(pattern.clone(), lengths.clone(), options.clone())?,
            interleaved: RbFitter::new(pattern, lengths, options)?,
            joint: Vec::new(),
        })
    }

    pub fn from_records(
        reference: &[RawOutcomeRecord],
        interleaved: &[RawOutcomeRecord],
        pattern: QubitPattern,
        lengths: LengthAxes,
        options: FitOptions,
    ) -> Result<Self, RbError> {
        let mut fitter = Self::new(pattern, lengths, options)?;
        fitter.add_data(reference, interleaved)?;
        Ok(fitter)
    }

    /// Merge more seeds of either family and refit; all or nothing.
    pub fn add_data(
        &mut self,
        reference: &[RawOutcomeRecord],
        interleaved: &[RawOutcomeRecord],
    ) -> Result<(), RbError> {
        let mut next_reference = self.reference.clone();
        let mut next_interleaved = self.interleaved.clone();
        next_reference.add_data(reference)?;
        next_interleaved.add_data(interleaved)?;
        self.joint = join_interleaved(
            next_reference.fits(),
            next_interleaved.fits(),
            next_reference.pattern(),
        );
        self.reference = next_reference;
        self.interleaved = next_interleaved;
        Ok(())
    }

    pub fn pattern(&self) -> &QubitPattern {
        self.reference.pattern()
    }

    pub fn reference(&self) -> &RbFitter {
        &self.reference
    }

    pub fn interleaved(&self) -> &RbFitter {
        &self.interleaved
    }

    /// `[reference, interleaved]` survival data.
    pub fn ydata(&self) -> [Vec<YData>; 2] {
        [self.reference.ydata(), self.interleaved.ydata()]
    }

    pub fn fit_int(&self) -> &[Result<InterleavedFit, RbError>] {
        &self.joint
    }
}
