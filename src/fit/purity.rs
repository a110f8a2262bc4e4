//! Purity RB: unitarity-corrected error from the decay of `Tr(ρ²)`.
//!
//! Purities reconstructed from the `3^n` measurement bases are aggregated
//! across seeds like survival probabilities and fitted with the same decay
//! model. The fitted decay `u` bounds the incoherent part of the error:
//! `pepc = (d-1)/d · (1 - √u)`.

use serde::{Deserialize, Serialize};

use crate::data::PurityAggregator;
use crate::domain::{LengthAxes, QubitPattern, RawOutcomeRecord, SurvivalCurve};
use crate::error::RbError;
use crate::fit::fitter::{DecayCurveFitter, DecayFit};
use crate::fit::options::{ErrorPropagation, FitOptions};
use crate::fit::propagate;
use crate::report::{YData, ydata};

/// Decay fit of the purity curve plus the purity-corrected EPC.
///
/// `params[1]` is the purity decay `u`; `epc` is computed from it as for a
/// survival curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurityFit {
    #[serde(flatten)]
    pub decay: DecayFit,
    pub pepc: f64,
    pub pepc_err: f64,
}

impl PurityFit {
    pub fn from_decay(decay: DecayFit, dimension: u64, mode: ErrorPropagation) -> Self {
        let (u, u_err) = (decay.alpha(), decay.alpha_err());
        Self {
            pepc: propagate::purity_epc(u, dimension),
            pepc_err: propagate::purity_epc_err(u, u_err, dimension, mode),
            decay,
        }
    }
}

/// Fit purity curves group by group, within `FitOptions::purity_bounds`.
pub fn fit_purity_curves(
    fitter: &DecayCurveFitter,
    curves: &[SurvivalCurve],
    pattern: &QubitPattern,
) -> Result<Vec<Result<PurityFit, RbError>>, RbError> {
    let mode = fitter.propagation();
    let fits = fitter
        .with_bounds(fitter.options().purity_bounds)
        .fit_all(curves, pattern)?
        .into_iter()
        .enumerate()
        .map(|(g, fit)| fit.map(|decay| PurityFit::from_decay(decay, pattern.dimension(g), mode)))
        .collect();
    Ok(fits)
}

/// Purity RB over one pattern.
#[derive(Debug, Clone)]
pub struct PurityRbFitter {
    aggregator: PurityAggregator,
    fitter: DecayCurveFitter,
    curves: Vec<SurvivalCurve>,
    fits: Vec<Result<PurityFit, RbError>>,
}

impl PurityRbFitter {
    /// `n_purity` must equal `3^n` for the common group size `n`.
    pub fn new(
        pattern: QubitPattern,
        lengths: LengthAxes,
        n_purity: usize,
        options: FitOptions,
    ) -> Result<Self, RbError> {
        Ok(Self {
            aggregator: PurityAggregator::new(pattern, lengths, n_purity)?,
            fitter: DecayCurveFitter::new(options)?,
            curves: Vec::new(),
            fits: Vec::new(),
        })
    }

    pub fn from_records(
        records: &[RawOutcomeRecord],
        n_purity: usize,
        pattern: QubitPattern,
        lengths: LengthAxes,
        options: FitOptions,
    ) -> Result<Self, RbError> {
        let mut fitter = Self::new(pattern, lengths, n_purity, options)?;
        fitter.add_data(records)?;
        Ok(fitter)
    }

    /// Merge more purity records and refit; all or nothing.
    pub fn add_data(&mut self, records: &[RawOutcomeRecord]) -> Result<(), RbError> {
        let mut aggregator = self.aggregator.clone();
        aggregator.merge(records)?;
        let curves = aggregator.curves()?;
        self.fits = fit_purity_curves(&self.fitter, &curves, aggregator.pattern())?;
        self.curves = curves;
        self.aggregator = aggregator;
        Ok(())
    }

    pub fn pattern(&self) -> &QubitPattern {
        self.aggregator.pattern()
    }

    pub fn n_purity(&self) -> usize {
        self.aggregator.n_purity()
    }

    /// Purity curves, one per group.
    pub fn curves(&self) -> &[SurvivalCurve] {
        &self.curves
    }

    pub fn ydata(&self) -> Vec<YData> {
        ydata(&self.curves)
    }

    pub fn fits(&self) -> &[Result<PurityFit, RbError>] {
        &self.fits
    }
}
