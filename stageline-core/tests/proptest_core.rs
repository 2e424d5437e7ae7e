//! Property-based tests for the data partitioning helpers using proptest.

use proptest::prelude::*;

use serde_json::json;
use stageline_core::data::Dataset;
use stageline_core::data::loader::{INFERENCE_FRACTION, partition};
use stageline_core::data::splitter::{test_rows, train_test_split};
use stageline_core::registry::decide_promotion;
use std::collections::BTreeSet;

fn numbered(n: usize) -> Dataset {
    Dataset::new(
        vec!["x".into(), "target".into()],
        (0..n).map(|i| vec![json!(i), json!(i % 3)]).collect(),
    )
    .unwrap()
}

fn ids(dataset: &Dataset) -> Vec<u64> {
    dataset
        .column("x")
        .unwrap()
        .iter()
        .map(|v| v.as_u64().unwrap())
        .collect()
}

// --- Inference slice properties ---

proptest! {
    #[test]
    fn partition_is_disjoint_and_complete(n in 0usize..500, seed in any::<u64>()) {
        let split = partition(n, seed);
        let inference: BTreeSet<_> = split.inference.iter().copied().collect();
        let training: BTreeSet<_> = split.training.iter().copied().collect();

        prop_assert_eq!(inference.len(), split.inference.len());
        prop_assert!(inference.is_disjoint(&training));
        let union: Vec<_> = inference.union(&training).copied().collect();
        prop_assert_eq!(union, (0..n).collect::<Vec<_>>());
    }

    #[test]
    fn partition_size_is_floored_fraction(n in 0usize..500, seed in any::<u64>()) {
        let split = partition(n, seed);
        prop_assert_eq!(split.inference.len(), (n as f64 * INFERENCE_FRACTION) as usize);
    }

    #[test]
    fn partition_is_reproducible(n in 1usize..300, seed in any::<u64>()) {
        prop_assert_eq!(partition(n, seed), partition(n, seed));
    }
}

// --- Train/test split properties ---

proptest! {
    #[test]
    fn split_sizes_follow_ceiling(n in 4usize..300, test_size in 0.05f64..0.6, seed in any::<u64>()) {
        let data = numbered(n);
        let (train, test) = train_test_split(&data, test_size, seed).unwrap();
        prop_assert_eq!(test.len(), test_rows(n, test_size));
        prop_assert_eq!(train.len() + test.len(), n);
    }

    #[test]
    fn split_halves_cover_every_row_once(n in 4usize..200, seed in any::<u64>()) {
        let data = numbered(n);
        let (train, test) = train_test_split(&data, 0.25, seed).unwrap();
        let mut all: Vec<u64> = ids(&train);
        all.extend(ids(&test));
        all.sort_unstable();
        prop_assert_eq!(all, (0..n as u64).collect::<Vec<_>>());
    }

    #[test]
    fn split_rejects_fractions_outside_unit_interval(test_size in prop_oneof![-5.0f64..=0.0, 1.0f64..5.0]) {
        prop_assert!(train_test_split(&numbered(10), test_size, 1).is_err());
    }
}

// --- Promotion properties ---

proptest! {
    #[test]
    fn below_threshold_is_never_promoted(acc in 0.0f64..0.8, incumbent in proptest::option::of(0.0f64..1.0)) {
        prop_assert!(!decide_promotion(acc, 0.8, incumbent).promoted());
    }

    #[test]
    fn promotion_requires_strict_improvement(acc in 0.8f64..=1.0, incumbent in 0.0f64..=1.0) {
        let decision = decide_promotion(acc, 0.8, Some(incumbent));
        prop_assert_eq!(decision.promoted(), acc > incumbent);
    }
}
