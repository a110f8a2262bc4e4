//! Outcome-key parsing and per-group marginalisation.

use std::collections::BTreeMap;

use crate::domain::{MAX_GROUP_QUBITS, QubitPattern, RawOutcomeRecord};
use crate::error::RbError;

/// Widest classical register whose outcomes we can pack into a `u64`.
pub const MAX_REGISTER_BITS: usize = 64;

/// Parse a count key into the integer outcome over the whole register.
///
/// Binary keys may contain spaces between registers; the leftmost digit is
/// the highest classical bit and the digit count must equal `memory_slots`.
/// `0x` keys are read as hexadecimal and must fit in `memory_slots` bits.
pub fn parse_outcome(key: &str, memory_slots: usize) -> Result<u64, RbError> {
    if memory_slots > MAX_REGISTER_BITS {
        return Err(RbError::shape(format!(
            "register of {memory_slots} bits exceeds {MAX_REGISTER_BITS}"
        )));
    }

    let value = if let Some(hex) = key.strip_prefix("0x").or_else(|| key.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
            .map_err(|_| RbError::shape(format!("malformed hexadecimal outcome key {key:?}")))?
    } else {
        let digits: String = key.chars().filter(|c| !c.is_whitespace()).collect();
        if digits.len() != memory_slots {
            return Err(RbError::shape(format!(
                "outcome key {key:?} has {} digits, register has {memory_slots}",
                digits.len()
            )));
        }
        if digits.is_empty() {
            return Err(RbError::shape("empty outcome key"));
        }
        u64::from_str_radix(&digits, 2)
            .map_err(|_| RbError::shape(format!("malformed binary outcome key {key:?}")))?
    };

    if memory_slots < MAX_REGISTER_BITS && value >> memory_slots != 0 {
        return Err(RbError::shape(format!(
            "outcome key {key:?} does not fit in {memory_slots} bits"
        )));
    }
    Ok(value)
}

/// Bits `[offset, offset + width)` of `outcome`, shifted down to bit 0.
pub fn marginal(outcome: u64, offset: usize, width: usize) -> u64 {
    debug_assert!(width <= MAX_GROUP_QUBITS);
    let mask = (1u64 << width) - 1;
    (outcome >> offset) & mask
}

/// Parse every key of a record once.
pub fn parse_counts(record: &RawOutcomeRecord) -> Result<Vec<(u64, u64)>, RbError> {
    record
        .counts
        .iter()
        .map(|(key, &count)| {
            parse_outcome(key, record.memory_slots)
                .map(|outcome| (outcome, count))
                .map_err(|e| RbError::shape(format!("{}: {e}", record.label)))
        })
        .collect()
}

/// Per-group marginal histograms of one record.
pub fn group_histograms(
    record: &RawOutcomeRecord,
    pattern: &QubitPattern,
) -> Result<Vec<BTreeMap<u64, u64>>, RbError> {
    let outcomes = parse_counts(record)?;
    let offsets = pattern.clbit_offsets();
    Ok(offsets
        .iter()
        .enumerate()
        .map(|(g, &offset)| {
            let width = pattern.group_size(g);
            let mut hist = BTreeMap::new();
            for &(outcome, count) in &outcomes {
                *hist.entry(marginal(outcome, offset, width)).or_insert(0) += count;
            }
            hist
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CircuitLabel;

    #[test]
    fn binary_keys_ignore_register_spaces() {
        assert_eq!(parse_outcome("01 101", 5).unwrap(), 0b01101);
        assert_eq!(parse_outcome("000", 3).unwrap(), 0);
    }

    #[test]
    fn hex_keys_are_accepted() {
        assert_eq!(parse_outcome("0x5", 3).unwrap(), 5);
        assert!(parse_outcome("0x8", 3).is_err());
    }

    #[test]
    fn malformed_keys_are_shape_errors() {
        assert_eq!(parse_outcome("0120", 4).unwrap_err().code(), "shape_mismatch");
        assert!(parse_outcome("01", 3).is_err());
        assert!(parse_outcome("0xzz", 3).is_err());
    }

    #[test]
    fn histograms_follow_clbit_offsets() {
        let pattern = QubitPattern::new(vec![vec![0, 1], vec![2]]).unwrap();
        let counts = [("000".to_string(), 5), ("100".to_string(), 3), ("011".to_string(), 2)]
            .into_iter()
            .collect();
        let record = RawOutcomeRecord::new(CircuitLabel::new(0, 0), counts, 3);
        let hists = group_histograms(&record, &pattern).unwrap();
        assert_eq!(hists[0].get(&0), Some(&8));
        assert_eq!(hists[0].get(&3), Some(&2));
        assert_eq!(hists[1].get(&0), Some(&7));
        assert_eq!(hists[1].get(&1), Some(&3));
    }
}
