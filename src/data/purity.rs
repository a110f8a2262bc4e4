//! Purity reconstruction from Pauli-basis measurements.
//!
//! Each group of `n` qubits is measured in all `3^n` product bases. Basis
//! index `b`, written in base 3 with qubit 0 as the least significant digit,
//! selects Z (0), X (1) or Y (2) per qubit. Every subset `a` of the qubits in
//! a basis gives an unbiased estimate of one Pauli expectation:
//!
//! ```text
//! <P> = Σ_j counts[j] · (-1)^popcount(a & j) / shots
//! ```
//!
//! Estimates of the same Pauli seen in several bases are averaged, and the
//! purity is `Tr(ρ²) = Σ_P <P>² / 2^n`.

use std::collections::BTreeMap;

use tracing::debug;

use crate::data::aggregate::{SeedTable, Tally};
use crate::data::counts::group_histograms;
use crate::domain::{LengthAxes, QubitPattern, RawOutcomeRecord, SurvivalCurve};
use crate::error::RbError;

/// Pauli slot digit per (in subset, basis): identity, or Z = 3, X = 1, Y = 2.
const PAULI_DIGIT: [[usize; 3]; 2] = [[0, 0, 0], [3, 1, 2]];

/// Group-local outcome histograms per measurement basis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BasisCounts {
    bases: BTreeMap<usize, BTreeMap<u64, u64>>,
}

impl BasisCounts {
    pub fn single(basis: usize, histogram: BTreeMap<u64, u64>) -> Self {
        Self {
            bases: BTreeMap::from([(basis, histogram)]),
        }
    }
}

impl Tally for BasisCounts {
    fn absorb(&mut self, other: &Self) {
        for (basis, hist) in &other.bases {
            let mine = self.bases.entry(*basis).or_default();
            for (outcome, count) in hist {
                *mine.entry(*outcome).or_insert(0) += count;
            }
        }
    }
}

/// Purity of an `n`-qubit state from its `3^n` basis histograms.
pub fn purity_from_bases(counts: &BasisCounts, n: usize) -> Result<f64, RbError> {
    let n_bases = 3usize.pow(n as u32);
    let n_slots = 1usize << (2 * n);
    let mut sums = vec![0.0; n_slots];
    let mut seen = vec![0u32; n_slots];

    for basis in 0..n_bases {
        let hist = counts
            .bases
            .get(&basis)
            .ok_or_else(|| RbError::shape(format!("purity basis {basis} was not measured")))?;
        let shots: u64 = hist.values().sum();
        if shots == 0 {
            return Err(RbError::shape(format!("purity basis {basis} has no shots")));
        }
        let letters = basis_letters(basis, n);

        for subset in 0..(1u64 << n) {
            let slot = (0..n).fold(0, |acc, q| {
                let in_subset = ((subset >> q) & 1) as usize;
                acc + PAULI_DIGIT[in_subset][letters[q]] * 4usize.pow(q as u32)
            });
            let signed: i128 = hist
                .iter()
                .map(|(&outcome, &count)| {
                    if (subset & outcome).count_ones() % 2 == 0 {
                        count as i128
                    } else {
                        -(count as i128)
                    }
                })
                .sum();
            sums[slot] += signed as f64 / shots as f64;
            seen[slot] += 1;
        }
    }

    let total: f64 = sums
        .iter()
        .zip(&seen)
        .filter(|(_, k)| **k > 0)
        .map(|(s, &k)| (s / k as f64).powi(2))
        .sum();
    Ok(total / (1u64 << n) as f64)
}

/// Base-3 digits of `basis`, qubit 0 first.
fn basis_letters(basis: usize, n: usize) -> Vec<usize> {
    let mut rest = basis;
    (0..n)
        .map(|_| {
            let digit = rest % 3;
            rest /= 3;
            digit
        })
        .collect()
}

/// Incremental purity aggregation over one pattern.
///
/// Every group must have the same size `n`, and records must cover all `3^n`
/// bases for each `(seed, length)` before curves can be computed.
#[derive(Debug, Clone)]
pub struct PurityAggregator {
    pattern: QubitPattern,
    lengths: LengthAxes,
    group_qubits: usize,
    n_purity: usize,
    tables: Vec<SeedTable<BasisCounts>>,
}

impl PurityAggregator {
    pub fn new(pattern: QubitPattern, lengths: LengthAxes, n_purity: usize) -> Result<Self, RbError> {
        if lengths.groups() != pattern.len() {
            return Err(RbError::shape(format!(
                "{} length axes for {} groups",
                lengths.groups(),
                pattern.len()
            )));
        }
        let group_qubits = pattern.group_size(0);
        if (1..pattern.len()).any(|g| pattern.group_size(g) != group_qubits) {
            return Err(RbError::shape("purity RB needs every group to have the same size"));
        }
        let expected = 3usize.pow(group_qubits as u32);
        if n_purity != expected {
            return Err(RbError::shape(format!(
                "n_purity is {n_purity}, {group_qubits}-qubit groups need {expected}"
            )));
        }
        let tables = (0..pattern.len()).map(|_| SeedTable::new(lengths.points())).collect();
        Ok(Self {
            pattern,
            lengths,
            group_qubits,
            n_purity,
            tables,
        })
    }

    pub fn pattern(&self) -> &QubitPattern {
        &self.pattern
    }

    pub fn lengths(&self) -> &LengthAxes {
        &self.lengths
    }

    pub fn n_purity(&self) -> usize {
        self.n_purity
    }

    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(SeedTable::is_empty)
    }

    /// Fold purity records into the accumulators; all or nothing.
    pub fn merge(&mut self, records: &[RawOutcomeRecord]) -> Result<(), RbError> {
        let mut staged = self.tables.clone();
        for record in records {
            record.validate(&self.pattern, self.lengths.points())?;
            let basis = match record.label.purity_basis {
                Some(b) if b < self.n_purity => b,
                Some(b) => {
                    return Err(RbError::shape(format!(
                        "{}: basis {b} outside 0..{}",
                        record.label, self.n_purity
                    )));
                }
                None => {
                    return Err(RbError::shape(format!(
                        "{}: not a purity circuit",
                        record.label
                    )));
                }
            };
            let hists = group_histograms(record, &self.pattern)?;
            for (table, hist) in staged.iter_mut().zip(hists) {
                table.absorb(
                    record.label.length_index,
                    record.label.seed,
                    &BasisCounts::single(basis, hist),
                );
            }
        }
        self.tables = staged;
        debug!(records = records.len(), "merged purity records");
        Ok(())
    }

    /// Purity curve of every group: mean and deviation of the per-seed purity.
    pub fn curves(&self) -> Result<Vec<SurvivalCurve>, RbError> {
        let n = self.group_qubits;
        self.tables
            .iter()
            .enumerate()
            .map(|(g, table)| {
                let (mean, std, seeds) = table.statistics(g, |c| {
                    purity_from_bases(c, n).map_err(|e| RbError::shape(format!("group {g}: {e}")))
                })?;
                Ok(SurvivalCurve {
                    lengths: self.lengths.axis(g).lengths().to_vec(),
                    mean,
                    std,
                    seeds,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CircuitLabel;

    fn uniform(n: usize, shots: u64) -> BTreeMap<u64, u64> {
        let d = 1u64 << n;
        (0..d).map(|j| (j, shots / d)).collect()
    }

    fn counts_for(n: usize, per_basis: impl Fn(&[usize]) -> BTreeMap<u64, u64>) -> BasisCounts {
        let mut counts = BasisCounts::default();
        for b in 0..3usize.pow(n as u32) {
            counts.absorb(&BasisCounts::single(b, per_basis(&basis_letters(b, n))));
        }
        counts
    }

    #[test]
    fn ground_state_is_pure() {
        // |0..0>: Z reads 0, X and Y read uniformly per qubit.
        for n in 1..=2 {
            let counts = counts_for(n, |letters| {
                let mut hist = BTreeMap::new();
                let free: Vec<usize> = (0..n).filter(|&q| letters[q] != 0).collect();
                for pick in 0..(1u64 << free.len()) {
                    let outcome = free
                        .iter()
                        .enumerate()
                        .fold(0u64, |acc, (i, &q)| acc | (((pick >> i) & 1) << q));
                    hist.insert(outcome, 1000);
                }
                hist
            });
            let p = purity_from_bases(&counts, n).unwrap();
            assert!((p - 1.0).abs() < 1e-12, "n={n}: {p}");
        }
    }

    #[test]
    fn maximally_mixed_state_has_purity_one_over_d() {
        for n in 1..=2 {
            let counts = counts_for(n, |_| uniform(n, 4000));
            let p = purity_from_bases(&counts, n).unwrap();
            assert!((p - 1.0 / (1u64 << n) as f64).abs() < 1e-12, "n={n}: {p}");
        }
    }

    #[test]
    fn missing_basis_is_reported() {
        let counts = BasisCounts::single(0, uniform(1, 100));
        assert!(purity_from_bases(&counts, 1).is_err());
    }

    #[test]
    fn pattern_and_n_purity_must_agree() {
        let pattern = QubitPattern::new(vec![vec![0, 1], vec![2, 3]]).unwrap();
        let axes = LengthAxes::new(vec![vec![1, 2], vec![1, 2]], &pattern).unwrap();
        assert!(PurityAggregator::new(pattern.clone(), axes.clone(), 9).is_ok());
        assert!(PurityAggregator::new(pattern, axes, 3).is_err());

        let uneven = QubitPattern::new(vec![vec![0, 1], vec![2]]).unwrap();
        let axes = LengthAxes::new(vec![vec![1, 2], vec![1, 2]], &uneven).unwrap();
        assert!(PurityAggregator::new(uneven, axes, 9).is_err());
    }

    #[test]
    fn rejects_non_purity_records() {
        let pattern = QubitPattern::new(vec![vec![0]]).unwrap();
        let axes = LengthAxes::new(vec![vec![1, 2]], &pattern).unwrap();
        let mut agg = PurityAggregator::new(pattern, axes, 3).unwrap();
        let counts = [("0".to_string(), 10)].into_iter().collect();
        let record = RawOutcomeRecord::new(CircuitLabel::new(0, 0), counts, 1);
        assert!(agg.merge(&[record]).is_err());
        assert!(agg.is_empty());
    }
}
