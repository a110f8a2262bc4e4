//! Shared domain types.
//!
//! These types are kept small and serializable so they can be:
//!
//! - produced by whatever executes the benchmark circuits
//! - validated once at construction and trusted afterwards
//! - exported alongside fit results

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RbError;

/// Largest group we accept. Purity reconstruction walks `4^n` Pauli slots and
/// group outcomes are packed into a `u64`.
pub const MAX_GROUP_QUBITS: usize = 8;

/// Ordered partition of qubits into independently benchmarked groups.
///
/// Circuits run every group simultaneously; group `g` reads its outcome from
/// the classical bits `[offset_g, offset_g + len_g)`, where the offsets follow
/// the flattened group order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<usize>>", into = "Vec<Vec<usize>>")]
pub struct QubitPattern {
    groups: Vec<Vec<usize>>,
}

impl QubitPattern {
    pub fn new(groups: Vec<Vec<usize>>) -> Result<Self, RbError> {
        if groups.is_empty() {
            return Err(RbError::shape("pattern has no groups"));
        }
        let mut seen = BTreeSet::new();
        for (g, group) in groups.iter().enumerate() {
            if group.is_empty() {
                return Err(RbError::shape(format!("group {g} is empty")));
            }
            if group.len() > MAX_GROUP_QUBITS {
                return Err(RbError::shape(format!(
                    "group {g} has {} qubits (max {MAX_GROUP_QUBITS})",
                    group.len()
                )));
            }
            for &q in group {
                if !seen.insert(q) {
                    return Err(RbError::shape(format!(
                        "qubit {q} appears in more than one group"
                    )));
                }
            }
        }
        Ok(Self { groups })
    }

    /// Like [`QubitPattern::new`], additionally rejecting qubits outside a
    /// register of `num_qubits`.
    pub fn within_register(groups: Vec<Vec<usize>>, num_qubits: usize) -> Result<Self, RbError> {
        if let Some(q) = groups.iter().flatten().find(|&&q| q >= num_qubits) {
            return Err(RbError::shape(format!(
                "qubit {q} is outside the {num_qubits}-qubit register"
            )));
        }
        Self::new(groups)
    }

    pub fn groups(&self) -> &[Vec<usize>] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn group_size(&self, group: usize) -> usize {
        self.groups[group].len()
    }

    /// Hilbert-space dimension `d = 2^n` of a group.
    pub fn dimension(&self, group: usize) -> u64 {
        1u64 << self.group_size(group)
    }

    pub fn total_qubits(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    /// First classical bit of each group.
    pub fn clbit_offsets(&self) -> Vec<usize> {
        let mut offsets = Vec::with_capacity(self.groups.len());
        let mut next = 0;
        for group in &self.groups {
            offsets.push(next);
            next += group.len();
        }
        offsets
    }
}

impl TryFrom<Vec<Vec<usize>>> for QubitPattern {
    type Error = RbError;

    fn try_from(groups: Vec<Vec<usize>>) -> Result<Self, Self::Error> {
        Self::new(groups)
    }
}

impl From<QubitPattern> for Vec<Vec<usize>> {
    fn from(pattern: QubitPattern) -> Self {
        pattern.groups
    }
}

/// Strictly increasing sequence lengths for one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u32>", into = "Vec<u32>")]
pub struct LengthAxis(Vec<u32>);

impl LengthAxis {
    pub fn new(lengths: Vec<u32>) -> Result<Self, RbError> {
        if lengths.is_empty() {
            return Err(RbError::shape("sequence-length axis is empty"));
        }
        if lengths[0] == 0 {
            return Err(RbError::shape("sequence lengths must be positive"));
        }
        if let Some(w) = lengths.windows(2).find(|w| w[1] <= w[0]) {
            return Err(RbError::shape(format!(
                "sequence lengths must be strictly increasing ({} then {})",
                w[0], w[1]
            )));
        }
        Ok(Self(lengths))
    }

    pub fn lengths(&self) -> &[u32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<Vec<u32>> for LengthAxis {
    type Error = RbError;

    fn try_from(lengths: Vec<u32>) -> Result<Self, Self::Error> {
        Self::new(lengths)
    }
}

impl From<LengthAxis> for Vec<u32> {
    fn from(axis: LengthAxis) -> Self {
        axis.0
    }
}

/// One length axis per pattern group (the `xdata` matrix).
///
/// Every axis has the same number of points because circuit `k` of a seed
/// carries length `axes[g][k]` for each group `g` at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LengthAxes {
    axes: Vec<LengthAxis>,
}

impl LengthAxes {
    pub fn new(rows: Vec<Vec<u32>>, pattern: &QubitPattern) -> Result<Self, RbError> {
        if rows.len() != pattern.len() {
            return Err(RbError::shape(format!(
                "{} length axes for a {}-group pattern",
                rows.len(),
                pattern.len()
            )));
        }
        let axes = rows
            .into_iter()
            .map(LengthAxis::new)
            .collect::<Result<Vec<_>, _>>()?;
        let points = axes[0].len();
        if let Some((g, axis)) = axes.iter().enumerate().find(|(_, a)| a.len() != points) {
            return Err(RbError::shape(format!(
                "group {g} has {} sequence lengths, group 0 has {points}",
                axis.len()
            )));
        }
        Ok(Self { axes })
    }

    pub fn axis(&self, group: usize) -> &LengthAxis {
        &self.axes[group]
    }

    /// Number of lengths per group.
    pub fn points(&self) -> usize {
        self.axes[0].len()
    }

    pub fn groups(&self) -> usize {
        self.axes.len()
    }
}

/// Identity of one executed benchmark circuit.
///
/// The canonical text form is `rb_length_{k}_seed_{s}`, or
/// `rb_purity_{b}_length_{k}_seed_{s}` for purity circuits. `k` indexes the
/// length axes, not the length itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CircuitLabel {
    pub length_index: usize,
    pub seed: u32,
    pub purity_basis: Option<usize>,
}

impl CircuitLabel {
    pub fn new(length_index: usize, seed: u32) -> Self {
        Self {
            length_index,
            seed,
            purity_basis: None,
        }
    }

    pub fn purity(basis: usize, length_index: usize, seed: u32) -> Self {
        Self {
            length_index,
            seed,
            purity_basis: Some(basis),
        }
    }
}

impl fmt::Display for CircuitLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.purity_basis {
            Some(b) => write!(
                f,
                "rb_purity_{b}_length_{}_seed_{}",
                self.length_index, self.seed
            ),
            None => write!(f, "rb_length_{}_seed_{}", self.length_index, self.seed),
        }
    }
}

impl FromStr for CircuitLabel {
    type Err = RbError;

    /// Accepts any `_`-separated name containing `length_<k>` and `seed_<s>`,
    /// plus `purity_<b>` for purity circuits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = s.split('_').collect();
        let value_after = |key: &str| -> Result<Option<usize>, RbError> {
            match tokens.iter().position(|t| *t == key) {
                None => Ok(None),
                Some(i) => tokens
                    .get(i + 1)
                    .and_then(|v| v.parse::<usize>().ok())
                    .map(Some)
                    .ok_or_else(|| RbError::Parse(format!("circuit name '{s}': bad {key} value"))),
            }
        };

        let length_index = value_after("length")?
            .ok_or_else(|| RbError::Parse(format!("circuit name '{s}': missing length")))?;
        let seed = value_after("seed")?
            .ok_or_else(|| RbError::Parse(format!("circuit name '{s}': missing seed")))?;
        let seed = u32::try_from(seed)
            .map_err(|_| RbError::Parse(format!("circuit name '{s}': seed out of range")))?;
        let purity_basis = value_after("purity")?;

        Ok(Self {
            length_index,
            seed,
            purity_basis,
        })
    }
}

impl TryFrom<String> for CircuitLabel {
    type Error = RbError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        name.parse()
    }
}

impl From<CircuitLabel> for String {
    fn from(label: CircuitLabel) -> Self {
        label.to_string()
    }
}

/// Result of one executed circuit.
///
/// Count keys are binary strings over `memory_slots` classical bits
/// (leftmost character = highest bit, spaces between registers allowed) or
/// `0x`-prefixed hexadecimal integers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOutcomeRecord {
    pub label: CircuitLabel,
    pub counts: BTreeMap<String, u64>,
    pub shots: u64,
    pub memory_slots: usize,
}

impl RawOutcomeRecord {
    /// Build a record whose shot total is the sum of its counts.
    pub fn new(label: CircuitLabel, counts: BTreeMap<String, u64>, memory_slots: usize) -> Self {
        let shots = counts.values().sum();
        Self {
            label,
            counts,
            shots,
            memory_slots,
        }
    }

    /// Check the record against a pattern and the number of circuits per seed.
    pub fn validate(&self, pattern: &QubitPattern, points: usize) -> Result<(), RbError> {
        if self.memory_slots < pattern.total_qubits() {
            return Err(RbError::shape(format!(
                "{}: register has {} bits, pattern needs {}",
                self.label,
                self.memory_slots,
                pattern.total_qubits()
            )));
        }
        if self.label.length_index >= points {
            return Err(RbError::shape(format!(
                "{}: length index {} outside an axis of {points} lengths",
                self.label, self.label.length_index
            )));
        }
        let total: u64 = self.counts.values().sum();
        if self.shots == 0 || total != self.shots {
            return Err(RbError::shape(format!(
                "{}: counts sum to {total}, record declares {} shots",
                self.label, self.shots
            )));
        }
        Ok(())
    }
}

/// Aggregated survival curve for one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurvivalCurve {
    pub lengths: Vec<u32>,
    pub mean: Vec<f64>,
    /// Population standard deviation across seeds; `None` with a single seed.
    pub std: Option<Vec<f64>>,
    pub seeds: usize,
}

impl SurvivalCurve {
    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    /// Per-point standard deviations usable as fit weights: present only when
    /// every point has a non-zero deviation.
    pub fn sigma(&self) -> Option<&[f64]> {
        self.std
            .as_deref()
            .filter(|s| s.iter().all(|v| *v != 0.0 && v.is_finite()))
    }
}
