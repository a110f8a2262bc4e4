//! Standard RB: one survival curve and one decay fit per group.

use crate::data::SurvivalAggregator;
use crate::domain::{LengthAxes, QubitPattern, RawOutcomeRecord, SurvivalCurve};
use crate::error::RbError;
use crate::fit::fitter::{DecayCurveFitter, DecayFit};
use crate::fit::options::FitOptions;
use crate::report::{YData, ydata};

/// Aggregates standard RB records and keeps every group's fit current.
#[derive(Debug, Clone)]
pub struct RbFitter {
    aggregator: SurvivalAggregator,
    fitter: DecayCurveFitter,
    curves: Vec<SurvivalCurve>,
    fits: Vec<Result<DecayFit, RbError>>,
}

impl RbFitter {
    /// An empty fitter; curves and fits appear with the first `add_data`.
    pub fn new(pattern: QubitPattern, lengths: LengthAxes, options: FitOptions) -> Result<Self, RbError> {
        Ok(Self {
            aggregator: SurvivalAggregator::new(pattern, lengths)?,
            fitter: DecayCurveFitter::new(options)?,
            curves: Vec::new(),
            fits: Vec::new(),
        })
    }

    pub fn from_records(
        records: &[RawOutcomeRecord],
        pattern: QubitPattern,
        lengths: LengthAxes,
        options: FitOptions,
    ) -> Result<Self, RbError> {
        let mut fitter = Self::new(pattern, lengths, options)?;
        fitter.add_data(records)?;
        Ok(fitter)
    }

    /// Merge more seeds and refit every group.
    ///
    /// On error the fitter keeps its previous data, curves and fits.
    pub fn add_data(&mut self, records: &[RawOutcomeRecord]) -> Result<(), RbError> {
        let mut aggregator = self.aggregator.clone();
        aggregator.merge(records)?;
        let curves = aggregator.curves()?;
        self.fits = self.fitter.fit_all(&curves, aggregator.pattern())?;
        self.curves = curves;
        self.aggregator = aggregator;
        Ok(())
    }

    /// Replace the fit options and refit the current curves.
    pub fn set_options(&mut self, options: FitOptions) -> Result<(), RbError> {
        let fitter = DecayCurveFitter::new(options)?;
        if !self.curves.is_empty() {
            self.fits = fitter.fit_all(&self.curves, self.aggregator.pattern())?;
        }
        self.fitter = fitter;
        Ok(())
    }

    pub fn pattern(&self) -> &QubitPattern {
        self.aggregator.pattern()
    }

    pub fn lengths(&self) -> &LengthAxes {
        self.aggregator.lengths()
    }

    pub fn seed_count(&self) -> usize {
        self.aggregator.seed_count()
    }

    pub fn curves(&self) -> &[SurvivalCurve] {
        &self.curves
    }

    pub fn ydata(&self) -> Vec<YData> {
        ydata(&self.curves)
    }

    /// Per-group fits, in pattern order.
    pub fn fits(&self) -> &[Result<DecayFit, RbError>] {
        &self.fits
    }

    pub fn fitter(&self) -> &DecayCurveFitter {
        &self.fitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DecayParams, SyntheticRb};

    fn layout() -> (QubitPattern, LengthAxes) {
        let pattern = QubitPattern::new(vec![vec![0, 1], vec![2]]).unwrap();
        let axes = LengthAxes::new(
            vec![
                (0..10).map(|i| 1 + 20 * i).collect(),
                (0..10).map(|i| 2 + 40 * i).collect(),
            ],
            &pattern,
        )
        .unwrap();
        (pattern, axes)
    }

    fn params() -> Vec<DecayParams> {
        vec![
            DecayParams { a: 0.72, alpha: 0.98, b: 0.26 },
            DecayParams { a: 0.48, alpha: 0.99, b: 0.5 },
        ]
    }

    fn assert_close(actual: f64, expected: f64, rel: f64, what: &str) {
        assert!(
            (actual - expected).abs() <= rel * expected.abs(),
            "{what}: {actual} vs {expected}"
        );
    }

    /// Seed-averaged survival of a 1024-shot, two-group experiment.
    fn reference_curves() -> (QubitPattern, Vec<SurvivalCurve>) {
        let pattern = QubitPattern::new(vec![vec![0, 1], vec![2]]).unwrap();
        let curves = vec![
            SurvivalCurve {
                lengths: (0..10).map(|i| 1 + 20 * i).collect(),
                mean: vec![
                    0.96367187, 0.73457031, 0.58066406, 0.4828125, 0.41035156, 0.34902344, 0.31210938, 0.2765625,
                    0.29453125, 0.27695313,
                ],
                std: Some(vec![
                    0.01013745, 0.0060955, 0.00678272, 0.01746491, 0.02015981, 0.02184184, 0.02340167, 0.02360293,
                    0.00874773, 0.01308156,
                ]),
                seeds: 5,
            },
            SurvivalCurve {
                lengths: (0..10).map(|i| 2 + 40 * i).collect(),
                mean: vec![
                    0.98925781, 0.87734375, 0.78125, 0.73066406, 0.68496094, 0.64296875, 0.59238281, 0.57421875,
                    0.56074219, 0.54980469,
                ],
                std: Some(vec![
                    0.00276214, 0.01602991, 0.00768946, 0.01413015, 0.00820777, 0.01441348, 0.01272682, 0.01031649,
                    0.02103036, 0.01224408,
                ]),
                seeds: 5,
            },
        ];
        (pattern, curves)
    }

    #[test]
    fn reference_curves_reproduce_published_fits() {
        let (pattern, curves) = reference_curves();
        // (params, params_err, epc, relative epc_err) per group.
        let expected = [
            (
                [0.71936804, 0.98062119, 0.25803749],
                [0.0065886, 0.00046714, 0.00556488],
                0.014534104912075935,
                0.0003572769714798349,
            ),
            (
                [0.49507094, 0.99354093, 0.50027262],
                [0.0146191, 0.0004157, 0.01487439],
                0.0032295343343508587,
                0.00020920242080699664,
            ),
        ];

        let relative = DecayCurveFitter::new(FitOptions {
            propagation: crate::fit::ErrorPropagation::Relative,
            ..FitOptions::default()
        })
        .unwrap();
        let delta = DecayCurveFitter::default().fit_all(&curves, &pattern).unwrap();
        let relative = relative.fit_all(&curves, &pattern).unwrap();

        for (g, (params, params_err, epc, epc_err)) in expected.into_iter().enumerate() {
            let fit = relative[g].as_ref().unwrap();
            for i in 0..3 {
                assert_close(fit.params[i], params[i], 1e-6, "params");
                assert_close(fit.params_err[i], params_err[i], 5e-4, "params_err");
            }
            assert_close(fit.epc, epc, 1e-6, "epc");
            assert_close(fit.epc_err, epc_err, 1e-4, "epc_err");
            assert!(fit.diagnostics.weighted);

            let d = pattern.dimension(g) as f64;
            let fit = delta[g].as_ref().unwrap();
            assert_close(fit.epc_err, (d - 1.0) / d * fit.params_err[1], 1e-12, "delta epc_err");
        }
    }

    #[test]
    fn recovers_synthetic_decays() {
        let (pattern, axes) = layout();
        let records = SyntheticRb::new(pattern.clone(), axes.clone(), params())
            .unwrap()
            .with_seeds(3)
            .with_shots(1_000_000)
            .records()
            .unwrap();
        let rb = RbFitter::from_records(&records, pattern, axes, FitOptions::default()).unwrap();

        assert_eq!(rb.seed_count(), 3);
        for (g, fit) in rb.fits().iter().enumerate() {
            let fit = fit.as_ref().unwrap();
            assert!((fit.alpha() - params()[g].alpha).abs() < 2e-4, "group {g}: {:?}", fit.params);
            let d = rb.pattern().dimension(g) as f64;
            assert!((fit.epc - (d - 1.0) / d * (1.0 - fit.alpha())).abs() < 1e-15);
        }
        assert_eq!(rb.ydata().len(), 2);
    }

    #[test]
    fn incremental_and_batch_fits_agree() {
        let (pattern, axes) = layout();
        let records = SyntheticRb::new(pattern.clone(), axes.clone(), params())
            .unwrap()
            .with_seeds(4)
            .with_noise(crate::data::Noise::Shot)
            .with_rng_seed(11)
            .records()
            .unwrap();

        let batch = RbFitter::from_records(&records, pattern.clone(), axes.clone(), FitOptions::default()).unwrap();

        let mut incremental = RbFitter::new(pattern, axes, FitOptions::default()).unwrap();
        for chunk in records.rchunks(10) {
            incremental.add_data(chunk).unwrap();
        }

        assert_eq!(batch.curves(), incremental.curves());
        assert_eq!(batch.fits(), incremental.fits());
    }

    #[test]
    fn rejected_batch_keeps_previous_state() {
        let (pattern, axes) = layout();
        let records = SyntheticRb::new(pattern.clone(), axes.clone(), params())
            .unwrap()
            .with_seeds(2)
            .records()
            .unwrap();
        let mut rb = RbFitter::from_records(&records, pattern, axes, FitOptions::default()).unwrap();
        let before = rb.fits().to_vec();

        // A lone record for a new seed leaves that seed's other lengths empty.
        let mut stray = records[0].clone();
        stray.label.seed = 99;
        let err = rb.add_data(&[stray]).unwrap_err();
        assert_eq!(err.code(), "shape_mismatch");
        assert_eq!(rb.fits(), before.as_slice());
        assert_eq!(rb.seed_count(), 2);
    }
}
