//! Property-based tests for parameter transfer and freeze policies.

use proptest::prelude::*;
use std::collections::BTreeSet;

use tstcc_pipeline::StageError;
use tstcc_pipeline::tensor::{ParameterMapping, Tensor};
use tstcc_pipeline::transfer::{self, ExclusionPolicy, FreezePolicy, FreezeRule};

const KEYS: &[&str] = &[
    "conv_block1.0.weight",
    "conv_block1.1.bias",
    "conv_block2.0.weight",
    "conv_block3.1.running_mean",
    "logits.weight",
    "logits.bias",
    "projection_head.0.weight",
];

fn shape() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(1usize..4, 1..3)
}

fn mapping(fill: f32) -> impl Strategy<Value = ParameterMapping> {
    prop::collection::btree_map(prop::sample::select(KEYS), shape(), 0..5).prop_map(
        move |entries| {
            entries
                .into_iter()
                .map(|(k, s)| (k.to_string(), Tensor::full(s, fill)))
                .collect()
        },
    )
}

/// A target, plus a source sharing a random subset of its keys (same shapes)
/// and possibly carrying keys of its own.
fn compatible_pair() -> impl Strategy<Value = (ParameterMapping, ParameterMapping)> {
    (mapping(0.0), mapping(1.0), any::<u64>()).prop_map(|(target, extra, pick)| {
        let mut source = ParameterMapping::new();
        for (i, (key, value)) in target.iter().enumerate() {
            if pick & (1 << (i % 64)) != 0 {
                source.insert(key.clone(), Tensor::full(value.shape.clone(), 1.0));
            }
        }
        for (key, value) in extra {
            if !target.contains_key(&key) {
                source.insert(key, value);
            }
        }
        (source, target)
    })
}

proptest! {
    #[test]
    fn merge_keeps_exactly_the_target_keys((source, target) in compatible_pair()) {
        let outcome = transfer::merge(&source, &target, &ExclusionPolicy::classifier()).unwrap();
        let merged: Vec<&str> = outcome.merged.keys().collect();
        let expected: Vec<&str> = target.keys().collect();
        prop_assert_eq!(merged, expected);
    }

    #[test]
    fn merge_transfers_shared_non_excluded_keys((source, target) in compatible_pair()) {
        let exclusion = ExclusionPolicy::classifier();
        let outcome = transfer::merge(&source, &target, &exclusion).unwrap();

        let expected: BTreeSet<String> = target
            .keys()
            .filter(|k| source.contains_key(k) && !exclusion.matches(k))
            .map(str::to_string)
            .collect();
        prop_assert_eq!(&outcome.transferred, &expected);

        for (key, value) in &outcome.merged {
            let origin = if expected.contains(key) { &source } else { &target };
            prop_assert_eq!(Some(value), origin.get(key));
        }
    }

    #[test]
    fn merge_never_copies_excluded_keys((source, target) in compatible_pair()) {
        let exclusion = ExclusionPolicy::classifier();
        let outcome = transfer::merge(&source, &target, &exclusion).unwrap();
        for key in target.keys().filter(|k| exclusion.matches(k)) {
            prop_assert!(!outcome.transferred.contains(key));
            prop_assert_eq!(outcome.merged.get(key), target.get(key));
        }
    }

    #[test]
    fn merge_into_identical_targets_agrees((source, target) in compatible_pair()) {
        let exclusion = ExclusionPolicy::classifier();
        let copy = target.clone();
        let first = transfer::merge(&source, &target, &exclusion).unwrap();
        let second = transfer::merge(&source, &copy, &exclusion).unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(&target, &copy);
    }

    #[test]
    fn merged_state_is_a_fixed_point((source, target) in compatible_pair()) {
        let exclusion = ExclusionPolicy::classifier();
        let once = transfer::merge(&source, &target, &exclusion).unwrap();
        let twice = transfer::merge(&source, &once.merged, &exclusion).unwrap();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn linear_probe_freezes_exactly_the_transferred_keys((source, target) in compatible_pair()) {
        let outcome = transfer::merge(&source, &target, &ExclusionPolicy::classifier()).unwrap();
        let frozen = transfer::freeze_set(FreezeRule::Transferred, &outcome.transferred);
        prop_assert_eq!(frozen.keys(), &outcome.transferred);
    }

    #[test]
    fn fine_tune_freezes_nothing((source, target) in compatible_pair()) {
        let outcome = transfer::merge(&source, &target, &ExclusionPolicy::classifier()).unwrap();
        prop_assert!(transfer::freeze_set(FreezeRule::Nothing, &outcome.transferred).is_empty());
    }

    #[test]
    fn random_init_freeze_partitions_the_model(target in mapping(0.0)) {
        let exclusion = ExclusionPolicy::classifier();
        let frozen = FreezePolicy::all_except(&target, &exclusion);
        for key in target.keys() {
            prop_assert_ne!(frozen.contains(key), exclusion.matches(key));
        }
        prop_assert!(frozen.keys().iter().all(|k| target.contains_key(k)));
    }

    #[test]
    fn shape_conflict_on_a_shared_key_is_rejected(
        target in mapping(0.0).prop_filter("needs a transferable key", |m| {
            m.keys().any(|k| !k.contains("logits"))
        }),
    ) {
        let key = target
            .keys()
            .find(|k| !k.contains("logits"))
            .map(str::to_string)
            .unwrap();
        let mut wrong = target.get(&key).unwrap().shape.clone();
        wrong.push(7);
        let mut source = ParameterMapping::new();
        source.insert(key.clone(), Tensor::zeros(wrong));

        let is_shape_mismatch = matches!(
            transfer::merge(&source, &target, &ExclusionPolicy::classifier()),
            Err(StageError::ShapeMismatch { key: ref k, .. }) if *k == key
        );
        prop_assert!(is_shape_mismatch);
    }
}
