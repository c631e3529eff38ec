use convparity::compare::{compare_output_sets, compare_tensors, CompareMode, ToleranceSpec};
use convparity::eval::{OutputSet, TensorValue};
use proptest::prelude::*;

fn tensor(shape: Vec<usize>, data: Vec<f32>) -> TensorValue {
    TensorValue::new(shape, data).expect("consistent tensor")
}

fn finite_tensor() -> impl Strategy<Value = TensorValue> {
    prop::collection::vec(1usize..5, 1..4).prop_flat_map(|shape| {
        let numel = shape.iter().product::<usize>();
        prop::collection::vec(-1.0e3f32..1.0e3, numel).prop_map(move |data| tensor(shape.clone(), data))
    })
}

proptest! {
    #[test]
    fn comparator_is_reflexive(t in finite_tensor()) {
        for mode in [CompareMode::TIGHT, CompareMode::LOOSE, CompareMode::Exact] {
            let cmp = compare_tensors(0, &t, &t, mode);
            prop_assert!(cmp.passed());
            prop_assert_eq!(cmp.max_abs_diff, 0.0);
        }
    }

    #[test]
    fn shifts_inside_atol_pass(t in finite_tensor(), frac in 0.0f32..0.5) {
        let shifted = t.map(|v| v + frac * 1e-4);
        let cmp = compare_tensors(0, &t, &shifted, CompareMode::TIGHT);
        prop_assert!(cmp.passed(), "{:?}", cmp.near_misses);
    }

    #[test]
    fn exact_mode_flags_every_changed_bit(t in finite_tensor(), at in any::<prop::sample::Index>()) {
        let mut data = t.data().to_vec();
        let i = at.index(data.len());
        data[i] = f32::from_bits(data[i].to_bits() ^ 1);
        let other = tensor(t.shape().to_vec(), data);
        let cmp = compare_tensors(0, &t, &other, CompareMode::Exact);
        prop_assert_eq!(cmp.mismatches, 1);
    }
}

#[test]
fn relative_term_scales_with_reference() {
    let tol = ToleranceSpec::new(1e-3, 0.0).unwrap();
    assert!(tol.accepts(1000.0, 1000.9));
    assert!(!tol.accepts(1000.0, 1001.5));
    assert!(!tol.accepts(0.0, 1e-6));
}

#[test]
fn nan_never_matches_approximately() {
    let t = tensor(vec![2], vec![f32::NAN, 1.0]);
    let cmp = compare_tensors(0, &t, &t, CompareMode::TIGHT);
    assert_eq!(cmp.mismatches, 1);
    assert_eq!(cmp.near_misses[0].index, vec![0]);

    // bitwise identity still holds
    assert!(compare_tensors(0, &t, &t, CompareMode::Exact).passed());
}

#[test]
fn signed_zero_is_distinct_only_in_exact_mode() {
    let pos = tensor(vec![1], vec![0.0]);
    let neg = tensor(vec![1], vec![-0.0]);
    assert!(compare_tensors(0, &pos, &neg, CompareMode::TIGHT).passed());
    assert!(!compare_tensors(0, &pos, &neg, CompareMode::Exact).passed());
}

#[test]
fn near_misses_are_capped_and_indexed() {
    let reference = TensorValue::zeros(vec![4, 5]);
    let converted = TensorValue::filled(vec![4, 5], 1.0);
    let cmp = compare_tensors(2, &reference, &converted, CompareMode::TIGHT);
    assert_eq!(cmp.slot, 2);
    assert_eq!(cmp.mismatches, 20);
    assert_eq!(cmp.near_misses.len(), convparity::compare::NEAR_MISS_LIMIT);
    assert_eq!(cmp.near_misses[6].index, vec![1, 1]);
    assert_eq!(cmp.max_abs_diff, 1.0);
}

#[test]
fn output_sets_report_only_failing_slots() {
    let good = tensor(vec![3], vec![1.0, 2.0, 3.0]);
    let bad = tensor(vec![3], vec![1.0, 2.5, 3.0]);
    let reference = OutputSet::new(vec![good.clone(), good.clone()]);
    let converted = OutputSet::new(vec![good, bad]);

    let err = compare_output_sets(&reference, &converted, CompareMode::LOOSE).unwrap_err();
    assert_eq!(err.failed.len(), 1);
    assert_eq!(err.failed[0].slot, 1);
    let text = err.to_string();
    assert!(text.contains("slot 1"), "{text}");
    assert!(text.contains("1/3 elements differ"), "{text}");
}

#[test]
fn invalid_tolerances_are_rejected() {
    assert!(CompareMode::approximate(-1.0).is_err());
    assert!(ToleranceSpec::new(f64::NAN, 0.0).is_err());
    assert!(ToleranceSpec::new(0.0, f64::INFINITY).is_err());
    assert_eq!(CompareMode::approximate(1e-4).unwrap(), CompareMode::TIGHT);
}
