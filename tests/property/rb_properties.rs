use std::collections::BTreeMap;

use proptest::prelude::*;
use rb_curves::data::{SurvivalAggregator, aggregate};
use rb_curves::domain::{CircuitLabel, LengthAxes, QubitPattern, RawOutcomeRecord, SurvivalCurve};
use rb_curves::fit::{DecayCurveFitter, FitOptions};

const SHOTS: u64 = 100;
const POINTS: usize = 3;
const SEEDS: usize = 4;

fn layout() -> (QubitPattern, LengthAxes) {
    let pattern = QubitPattern::new(vec![vec![0], vec![1]]).unwrap();
    let axes = LengthAxes::new(vec![vec![1, 10, 20], vec![1, 10, 20]], &pattern).unwrap();
    (pattern, axes)
}

/// Two one-qubit groups; `h0`/`h1` shots leave group 0/1 in `0`.
fn record(index: usize, h0: u64, h1: u64) -> RawOutcomeRecord {
    let both = h0.min(h1);
    let counts: BTreeMap<String, u64> = [
        ("00".to_string(), both),
        ("10".to_string(), h0 - both),
        ("01".to_string(), h1 - both),
        ("11".to_string(), SHOTS - h0.max(h1)),
    ]
    .into_iter()
    .collect();
    let label = CircuitLabel::new(index % POINTS, (index / POINTS) as u32);
    RawOutcomeRecord::new(label, counts, 2)
}

fn decay_curve(a: f64, alpha: f64, b: f64) -> SurvivalCurve {
    let lengths: Vec<u32> = (0..10).map(|i| 1 + 20 * i).collect();
    SurvivalCurve {
        mean: lengths.iter().map(|&m| a * alpha.powi(m as i32) + b).collect(),
        lengths,
        std: None,
        seeds: 1,
    }
}

proptest! {
    #[test]
    fn merge_order_does_not_change_curves(
        hits in prop::collection::vec((0..=SHOTS, 0..=SHOTS), SEEDS * POINTS),
        order in Just((0..SEEDS * POINTS).collect::<Vec<usize>>()).prop_shuffle(),
        split in 0..SEEDS * POINTS,
    ) {
        let (pattern, axes) = layout();
        let records: Vec<RawOutcomeRecord> =
            hits.iter().enumerate().map(|(i, &(h0, h1))| record(i, h0, h1)).collect();

        let batch = aggregate(&records, &pattern, &axes).unwrap();

        let shuffled: Vec<RawOutcomeRecord> = order.iter().map(|&i| records[i].clone()).collect();
        let mut incremental = SurvivalAggregator::new(pattern, axes).unwrap();
        incremental.merge(&shuffled[..split]).unwrap();
        incremental.merge(&shuffled[split..]).unwrap();

        prop_assert_eq!(batch, incremental.curves().unwrap());
    }

    #[test]
    fn label_text_round_trips(k in 0usize..10_000, seed in 0u32..10_000, basis in prop::option::of(0usize..81)) {
        let label = match basis {
            Some(b) => CircuitLabel::purity(b, k, seed),
            None => CircuitLabel::new(k, seed),
        };
        prop_assert_eq!(label.to_string().parse::<CircuitLabel>().unwrap(), label);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn fitting_is_deterministic_and_epc_follows_alpha(
        a in 0.4f64..0.7,
        alpha in 0.9f64..0.995,
        b in 0.2f64..0.3,
    ) {
        let curve = decay_curve(a, alpha, b);
        let fitter = DecayCurveFitter::new(FitOptions { parallel: false, ..FitOptions::default() }).unwrap();
        let first = fitter.fit(0, &curve, 4);
        let second = fitter.fit(0, &curve, 4);
        prop_assert_eq!(&first, &second);

        prop_assert!(first.is_ok(), "fit failed: {:?}", first);
        let fit = first.unwrap();
        prop_assert_eq!(fit.epc, 0.75 * (1.0 - fit.params[1]));
        prop_assert!((fit.params[1] - alpha).abs() < 1e-5, "alpha {} vs {}", fit.params[1], alpha);
    }
}
