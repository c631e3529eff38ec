use convparity::eval::{OutputSet, TensorValue};
use convparity::reconcile::{reconcile, OutputLayout, StructuralMismatch};

fn ramp(shape: Vec<usize>) -> TensorValue {
    let numel = shape.iter().product::<usize>();
    TensorValue::new(shape, (0..numel).map(|v| v as f32).collect()).unwrap()
}

#[test]
fn arity_is_checked_before_any_slot() {
    // slot 0 would also fail on shape; arity must win
    let reference = OutputSet::new(vec![ramp(vec![2, 3]), ramp(vec![4])]);
    let converted = OutputSet::new(vec![ramp(vec![7])]);
    let err = reconcile(reference, converted, &[]).unwrap_err();
    assert_eq!(
        err,
        StructuralMismatch::Arity {
            reference: 2,
            converted: 1
        }
    );
}

#[test]
fn native_layout_requires_identical_shapes() {
    let reference = OutputSet::single(ramp(vec![2, 3]));
    let converted = OutputSet::single(ramp(vec![3, 2]));
    let err = reconcile(reference, converted, &[OutputLayout::Native]).unwrap_err();
    assert!(matches!(err, StructuralMismatch::Shape { slot: 0, .. }));
    assert!(err.to_string().contains("reference shape [2,3]"));
}

#[test]
fn mixed_layouts_are_normalized_per_slot() {
    let a = ramp(vec![1, 4, 5]);
    let b = ramp(vec![2, 3, 4]);
    let reference = OutputSet::new(vec![a.clone(), b.clone()]);
    let converted = OutputSet::new(vec![
        a.reshape(vec![4, 5]).unwrap(),
        b.permute(&[2, 0, 1]).unwrap(),
    ]);
    let layouts = [
        OutputLayout::BatchSqueezed,
        OutputLayout::Permuted { perm: vec![2, 0, 1] },
    ];

    let (reference, converted) = reconcile(reference, converted, &layouts).unwrap();
    assert!(reference.bit_identical(&converted));
}

#[test]
fn squeezed_layout_does_not_hide_real_shape_changes() {
    let reference = OutputSet::single(ramp(vec![1, 4, 5]));
    let converted = OutputSet::single(ramp(vec![5, 4]));
    let err = reconcile(reference, converted, &[OutputLayout::BatchSqueezed]).unwrap_err();
    assert!(matches!(err, StructuralMismatch::Shape { .. }));
}

#[test]
fn bad_permutation_is_a_layout_error() {
    let reference = OutputSet::single(ramp(vec![2, 3]));
    let converted = OutputSet::single(ramp(vec![3, 2]));
    let err = reconcile(
        reference,
        converted,
        &[OutputLayout::Permuted { perm: vec![0, 4] }],
    )
    .unwrap_err();
    assert!(matches!(err, StructuralMismatch::Layout { slot: 0, rank: 2, .. }));
}

#[test]
fn repeated_axis_is_not_a_transpose() {
    let square = ramp(vec![3, 3]);
    let transposed = square.permute(&[1, 0]).unwrap();
    let err = reconcile(
        OutputSet::single(square),
        OutputSet::single(transposed),
        &[OutputLayout::Permuted { perm: vec![0, 0] }],
    )
    .unwrap_err();
    assert_eq!(
        err,
        StructuralMismatch::Layout {
            slot: 0,
            perm: vec![0, 0],
            rank: 2
        }
    );
}

#[test]
fn missing_layouts_default_to_native() {
    let reference = OutputSet::new(vec![ramp(vec![3]), ramp(vec![1, 3])]);
    let converted = reference.clone();
    assert!(reconcile(reference, converted, &[OutputLayout::BatchSqueezed]).is_ok());
}
