//! Synthetic RB records from known decay parameters.
//!
//! Every group of the pattern is simulated independently and the group
//! outcomes are then laid side by side, shot by shot, into full-register
//! count keys. Only the per-group marginals carry meaning.

use std::collections::BTreeMap;

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Binomial;

use crate::domain::{CircuitLabel, LengthAxes, QubitPattern, RawOutcomeRecord};
use crate::error::RbError;
use crate::models::predict;

/// Known parameters of one group's decay, `y(m) = a · alpha^m + b`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecayParams {
    pub a: f64,
    pub alpha: f64,
    pub b: f64,
}

impl DecayParams {
    pub fn survival(&self, m: u32) -> f64 {
        predict(m as f64, &[self.a, self.alpha, self.b]).clamp(0.0, 1.0)
    }
}

/// How outcome counts are drawn from the outcome probabilities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Noise {
    /// Rounded expected counts (largest remainder); ignores the RNG.
    #[default]
    Exact,
    /// Multinomial shot noise.
    Shot,
}

/// Generator of standard and purity RB records.
#[derive(Debug, Clone)]
pub struct SyntheticRb {
    pattern: QubitPattern,
    lengths: LengthAxes,
    params: Vec<DecayParams>,
    seeds: u32,
    shots: u64,
    noise: Noise,
    rng_seed: u64,
}

impl SyntheticRb {
    pub fn new(pattern: QubitPattern, lengths: LengthAxes, params: Vec<DecayParams>) -> Result<Self, RbError> {
        if params.len() != pattern.len() {
            return Err(RbError::shape(format!(
                "{} parameter sets for {} groups",
                params.len(),
                pattern.len()
            )));
        }
        if lengths.groups() != pattern.len() {
            return Err(RbError::shape(format!(
                "{} length axes for {} groups",
                lengths.groups(),
                pattern.len()
            )));
        }
        if params.iter().any(|p| !(0.0..=1.0).contains(&p.alpha) || !p.a.is_finite() || !p.b.is_finite()) {
            return Err(RbError::InvalidOptions(
                "decay parameters must be finite with alpha in [0, 1]".into(),
            ));
        }
        Ok(Self {
            pattern,
            lengths,
            params,
            seeds: 5,
            shots: 1024,
            noise: Noise::Exact,
            rng_seed: 0,
        })
    }

    pub fn with_seeds(mut self, seeds: u32) -> Self {
        self.seeds = seeds;
        self
    }

    pub fn with_shots(mut self, shots: u64) -> Self {
        self.shots = shots;
        self
    }

    pub fn with_noise(mut self, noise: Noise) -> Self {
        self.noise = noise;
        self
    }

    pub fn with_rng_seed(mut self, rng_seed: u64) -> Self {
        self.rng_seed = rng_seed;
        self
    }

    /// One record per `(seed, length)`, labelled `rb_length_{k}_seed_{s}`.
    pub fn records(&self) -> Result<Vec<RawOutcomeRecord>, RbError> {
        self.check_shots()?;
        let mut rng = StdRng::seed_from_u64(self.rng_seed);
        let mut out = Vec::with_capacity(self.seeds as usize * self.lengths.points());
        for seed in 0..self.seeds {
            for k in 0..self.lengths.points() {
                let groups = (0..self.pattern.len())
                    .map(|g| {
                        let d = self.pattern.dimension(g) as usize;
                        let p = self.params[g].survival(self.lengths.axis(g).lengths()[k]);
                        let mut probs = vec![(1.0 - p) / (d - 1) as f64; d];
                        probs[0] = p;
                        self.draw(&probs, &mut rng)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                out.push(self.assemble(CircuitLabel::new(k, seed), &groups));
            }
        }
        Ok(out)
    }

    /// Purity records for every basis, seed and length.
    ///
    /// Each group is in the state `f |0><0| + (1 - f) I/d` with `f = alpha^m`;
    /// in the pure part a qubit read in Z gives 0, and X or Y reads uniformly.
    pub fn purity_records(&self) -> Result<Vec<RawOutcomeRecord>, RbError> {
        self.check_shots()?;
        let n = self.pattern.group_size(0);
        if (1..self.pattern.len()).any(|g| self.pattern.group_size(g) != n) {
            return Err(RbError::shape("purity RB needs every group to have the same size"));
        }
        let n_purity = 3usize.pow(n as u32);
        let d = 1usize << n;

        let mut rng = StdRng::seed_from_u64(self.rng_seed);
        let mut out = Vec::new();
        for basis in 0..n_purity {
            let measured_in_z: Vec<bool> = (0..n).map(|q| (basis / 3usize.pow(q as u32)) % 3 == 0).collect();
            for seed in 0..self.seeds {
                for k in 0..self.lengths.points() {
                    let groups = (0..self.pattern.len())
                        .map(|g| {
                            let m = self.lengths.axis(g).lengths()[k];
                            let f = self.params[g].alpha.powf(m as f64);
                            let probs: Vec<f64> = (0..d)
                                .map(|j| {
                                    let pure = (0..n).fold(1.0, |acc, q| {
                                        let bit = (j >> q) & 1;
                                        acc * match (measured_in_z[q], bit) {
                                            (true, 0) => 1.0,
                                            (true, _) => 0.0,
                                            (false, _) => 0.5,
                                        }
                                    });
                                    f * pure + (1.0 - f) / d as f64
                                })
                                .collect();
                            self.draw(&probs, &mut rng)
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    out.push(self.assemble(CircuitLabel::purity(basis, k, seed), &groups));
                }
            }
        }
        Ok(out)
    }

    fn check_shots(&self) -> Result<(), RbError> {
        if self.shots == 0 || self.seeds == 0 {
            return Err(RbError::InvalidOptions("shots and seeds must be > 0".into()));
        }
        Ok(())
    }

    /// Outcome runs `(outcome, count)` for one group, summing to `shots`.
    fn draw(&self, probs: &[f64], rng: &mut StdRng) -> Result<Vec<(u64, u64)>, RbError> {
        let counts = match self.noise {
            Noise::Exact => apportion(self.shots, probs),
            Noise::Shot => sample_multinomial(self.shots, probs, rng)?,
        };
        let mut runs: Vec<(u64, u64)> = counts
            .iter()
            .enumerate()
            .filter(|(_, c)| **c > 0)
            .map(|(j, &c)| (j as u64, c))
            .collect();
        if self.noise == Noise::Shot {
            let mut shots: Vec<u64> = runs
                .iter()
                .flat_map(|&(j, c)| std::iter::repeat_n(j, c as usize))
                .collect();
            shots.shuffle(rng);
            runs = shots.into_iter().map(|j| (j, 1)).collect();
        }
        Ok(runs)
    }

    /// Lay the groups' outcome runs side by side into full-register counts.
    fn assemble(&self, label: CircuitLabel, groups: &[Vec<(u64, u64)>]) -> RawOutcomeRecord {
        let offsets = self.pattern.clbit_offsets();
        let width = self.pattern.total_qubits();
        let mut cursors: Vec<(usize, u64)> = vec![(0, 0); groups.len()];
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        let mut remaining = self.shots;

        while remaining > 0 {
            let mut step = remaining;
            let mut outcome = 0u64;
            for (g, runs) in groups.iter().enumerate() {
                let (run, used) = cursors[g];
                let (value, len) = runs[run];
                step = step.min(len - used);
                outcome |= value << offsets[g];
            }
            *counts.entry(format!("{outcome:0width$b}")).or_insert(0) += step;
            for (g, runs) in groups.iter().enumerate() {
                let cursor = &mut cursors[g];
                cursor.1 += step;
                if cursor.1 == runs[cursor.0].1 && cursor.0 + 1 < runs.len() {
                    *cursor = (cursor.0 + 1, 0);
                }
            }
            remaining -= step;
        }

        RawOutcomeRecord::new(label, counts, width)
    }
}

/// Largest-remainder rounding of `total · probs`; ties go to the lower index.
fn apportion(total: u64, probs: &[f64]) -> Vec<u64> {
    let mass: f64 = probs.iter().sum();
    let exact: Vec<f64> = probs.iter().map(|p| total as f64 * p / mass).collect();
    let mut counts: Vec<u64> = exact.iter().map(|e| e.floor() as u64).collect();
    let assigned: u64 = counts.iter().sum();

    let mut order: Vec<usize> = (0..probs.len()).collect();
    order.sort_by(|&i, &j| {
        let (ri, rj) = (exact[i] - exact[i].floor(), exact[j] - exact[j].floor());
        rj.total_cmp(&ri).then(i.cmp(&j))
    });
    for &i in order.iter().take(total.saturating_sub(assigned) as usize) {
        counts[i] += 1;
    }
    counts
}

/// Multinomial draw as a chain of conditional binomials.
fn sample_multinomial(total: u64, probs: &[f64], rng: &mut StdRng) -> Result<Vec<u64>, RbError> {
    let mut counts = vec![0u64; probs.len()];
    let mut left = total;
    let mut mass: f64 = probs.iter().sum();
    for (i, &p) in probs.iter().enumerate() {
        if left == 0 {
            break;
        }
        if i + 1 == probs.len() {
            counts[i] = left;
            break;
        }
        let q = if mass > 0.0 { (p / mass).clamp(0.0, 1.0) } else { 0.0 };
        let draw = Binomial::new(left, q)
            .map_err(|e| RbError::InvalidOptions(format!("shot-noise distribution error: {e}")))?
            .sample(rng);
        counts[i] = draw;
        left -= draw;
        mass -= p;
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{PurityAggregator, aggregate};

    fn layout() -> (QubitPattern, LengthAxes) {
        let pattern = QubitPattern::new(vec![vec![0, 1], vec![2]]).unwrap();
        let axes = LengthAxes::new(
            vec![vec![1, 21, 41, 61, 81], vec![2, 42, 82, 122, 162]],
            &pattern,
        )
        .unwrap();
        (pattern, axes)
    }

    fn params() -> Vec<DecayParams> {
        vec![
            DecayParams { a: 0.7, alpha: 0.98, b: 0.25 },
            DecayParams { a: 0.45, alpha: 0.99, b: 0.5 },
        ]
    }

    #[test]
    fn apportion_preserves_total() {
        let counts = apportion(10, &[0.333, 0.333, 0.334]);
        assert_eq!(counts.iter().sum::<u64>(), 10);
        assert_eq!(counts, vec![3, 3, 4]);
    }

    #[test]
    fn exact_records_reproduce_expected_survival() {
        let (pattern, axes) = layout();
        let generator = SyntheticRb::new(pattern.clone(), axes.clone(), params())
            .unwrap()
            .with_seeds(2)
            .with_shots(10_000);
        let records = generator.records().unwrap();
        assert_eq!(records.len(), 10);
        assert!(records.iter().all(|r| r.shots == 10_000 && r.memory_slots == 3));

        let curves = aggregate(&records, &pattern, &axes).unwrap();
        for (g, curve) in curves.iter().enumerate() {
            for (i, &m) in curve.lengths.iter().enumerate() {
                let expected = params()[g].survival(m);
                assert!((curve.mean[i] - expected).abs() < 1e-4, "group {g} m={m}");
            }
            assert!(curve.std.as_ref().unwrap().iter().all(|s| *s == 0.0));
        }
    }

    #[test]
    fn shot_noise_is_seeded() {
        let (pattern, axes) = layout();
        let generator = SyntheticRb::new(pattern, axes, params())
            .unwrap()
            .with_noise(Noise::Shot)
            .with_rng_seed(7);
        assert_eq!(generator.records().unwrap(), generator.records().unwrap());
        let other = generator.clone().with_rng_seed(8);
        assert_ne!(generator.records().unwrap(), other.records().unwrap());
    }

    #[test]
    fn purity_records_decay_towards_one_over_d() {
        let pattern = QubitPattern::new(vec![vec![0], vec![1]]).unwrap();
        let axes = LengthAxes::new(vec![vec![1, 50], vec![1, 50]], &pattern).unwrap();
        let params = vec![DecayParams { a: 0.5, alpha: 0.9, b: 0.5 }; 2];
        let generator = SyntheticRb::new(pattern.clone(), axes.clone(), params)
            .unwrap()
            .with_seeds(1)
            .with_shots(100_000);
        let records = generator.purity_records().unwrap();
        assert_eq!(records.len(), 3 * 2);

        let mut agg = PurityAggregator::new(pattern, axes, 3).unwrap();
        agg.merge(&records).unwrap();
        let curves = agg.curves().unwrap();
        // Purity of f|0><0| + (1-f)I/2 is (1 + f²)/2.
        let f = 0.9_f64;
        assert!((curves[0].mean[0] - (1.0 + f * f) / 2.0).abs() < 1e-3);
        assert!((curves[0].mean[1] - 0.5).abs() < 1e-3);
    }
}
