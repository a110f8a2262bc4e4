//! Seed accumulators and survival-curve aggregation.
//!
//! Per group and per length index we keep an ordered `seed -> tally` map of
//! exact integer counts. Merging new records adds integers, and statistics are
//! computed by walking seeds in ascending order, so the curves do not depend on
//! the order in which records arrived.

use std::collections::BTreeMap;

use tracing::debug;

use crate::data::counts::group_histograms;
use crate::domain::{LengthAxes, QubitPattern, RawOutcomeRecord, SurvivalCurve};
use crate::error::RbError;

/// Something that can be summed across records of the same circuit.
pub trait Tally: Clone + Default {
    fn absorb(&mut self, other: &Self);
}

/// All-zero outcomes out of total shots, for one group of one circuit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShotTally {
    pub hits: u64,
    pub shots: u64,
}

impl ShotTally {
    pub fn survival(&self) -> f64 {
        self.hits as f64 / self.shots as f64
    }
}

impl Tally for ShotTally {
    fn absorb(&mut self, other: &Self) {
        self.hits += other.hits;
        self.shots += other.shots;
    }
}

/// Per-length `seed -> tally` maps for one group.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedTable<T> {
    points: Vec<BTreeMap<u32, T>>,
}

impl<T: Tally> SeedTable<T> {
    pub fn new(points: usize) -> Self {
        Self {
            points: vec![BTreeMap::new(); points],
        }
    }

    pub fn absorb(&mut self, length_index: usize, seed: u32, tally: &T) {
        self.points[length_index].entry(seed).or_default().absorb(tally);
    }

    pub fn is_empty(&self) -> bool {
        self.points.iter().all(BTreeMap::is_empty)
    }

    /// Number of distinct seeds seen at any length.
    pub fn seed_count(&self) -> usize {
        let mut seeds: Vec<u32> = self.points.iter().flat_map(|p| p.keys().copied()).collect();
        seeds.sort_unstable();
        seeds.dedup();
        seeds.len()
    }

    /// Every length must have been measured for the same set of seeds.
    fn check_seed_coverage(&self, group: usize) -> Result<usize, RbError> {
        let Some(first) = self.points.first() else {
            return Err(RbError::shape(format!("group {group}: empty length axis")));
        };
        if first.is_empty() {
            return Err(RbError::shape(format!("group {group}: no data aggregated")));
        }
        for (k, point) in self.points.iter().enumerate().skip(1) {
            if !point.keys().eq(first.keys()) {
                let missing = first
                    .keys()
                    .find(|s| !point.contains_key(s))
                    .or_else(|| point.keys().find(|s| !first.contains_key(s)));
                return Err(RbError::shape(format!(
                    "group {group}: seeds cover different lengths (seed {} at length index {k})",
                    missing.map_or_else(|| "?".to_string(), u32::to_string)
                )));
            }
        }
        Ok(first.len())
    }

    /// Population mean and standard deviation across seeds of `value(tally)`.
    ///
    /// The deviation is `None` when a single seed has been aggregated.
    pub fn statistics<F>(&self, group: usize, value: F) -> Result<(Vec<f64>, Option<Vec<f64>>, usize), RbError>
    where
        F: Fn(&T) -> Result<f64, RbError>,
    {
        let seeds = self.check_seed_coverage(group)?;
        let mut mean = Vec::with_capacity(self.points.len());
        let mut std = Vec::with_capacity(self.points.len());
        for point in &self.points {
            let values = point.values().map(&value).collect::<Result<Vec<f64>, _>>()?;
            let (m, s) = population_moments(&values);
            mean.push(m);
            std.push(s);
        }
        Ok((mean, (seeds > 1).then_some(std), seeds))
    }
}

/// Mean and ddof = 0 standard deviation.
pub fn population_moments(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Incremental survival aggregation over one pattern.
#[derive(Debug, Clone)]
pub struct SurvivalAggregator {
    pattern: QubitPattern,
    lengths: LengthAxes,
    tables: Vec<SeedTable<ShotTally>>,
}

impl SurvivalAggregator {
    pub fn new(pattern: QubitPattern, lengths: LengthAxes) -> Result<Self, RbError> {
        if lengths.groups() != pattern.len() {
            return Err(RbError::shape(format!(
                "{} length axes for {} groups",
                lengths.groups(),
                pattern.len()
            )));
        }
        let tables = (0..pattern.len()).map(|_| SeedTable::new(lengths.points())).collect();
        Ok(Self {
            pattern,
            lengths,
            tables,
        })
    }

    pub fn pattern(&self) -> &QubitPattern {
        &self.pattern
    }

    pub fn lengths(&self) -> &LengthAxes {
        &self.lengths
    }

    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(SeedTable::is_empty)
    }

    pub fn seed_count(&self) -> usize {
        self.tables.first().map_or(0, SeedTable::seed_count)
    }

    /// Fold `records` into the accumulators.
    ///
    /// Either every record is merged or, on error, none is.
    pub fn merge(&mut self, records: &[RawOutcomeRecord]) -> Result<(), RbError> {
        let mut staged = self.tables.clone();
        for record in records {
            record.validate(&self.pattern, self.lengths.points())?;
            if record.label.purity_basis.is_some() {
                return Err(RbError::shape(format!(
                    "{}: purity circuit passed to a survival aggregator",
                    record.label
                )));
            }
            let hists = group_histograms(record, &self.pattern)?;
            for (table, hist) in staged.iter_mut().zip(&hists) {
                let tally = ShotTally {
                    hits: hist.get(&0).copied().unwrap_or(0),
                    shots: record.shots,
                };
                table.absorb(record.label.length_index, record.label.seed, &tally);
            }
        }
        self.tables = staged;
        debug!(
            records = records.len(),
            seeds = self.seed_count(),
            "merged survival records"
        );
        Ok(())
    }

    /// Current survival curve of every group.
    pub fn curves(&self) -> Result<Vec<SurvivalCurve>, RbError> {
        self.tables
            .iter()
            .enumerate()
            .map(|(g, table)| {
                let (mean, std, seeds) = table.statistics(g, |t| Ok(t.survival()))?;
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

/// One-shot aggregation of `records` into one curve per group.
pub fn aggregate(
    records: &[RawOutcomeRecord],
    pattern: &QubitPattern,
    lengths: &LengthAxes,
) -> Result<Vec<SurvivalCurve>, RbError> {
    let mut aggregator = SurvivalAggregator::new(pattern.clone(), lengths.clone())?;
    aggregator.merge(records)?;
    aggregator.curves()
}
