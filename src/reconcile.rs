//! Output reconciliation.
//!
//! Target engines may return outputs whose layout differs from the
//! reference in known, declared ways. Reconciliation checks arity first and
//! then undoes each declared layout difference, so that the comparator only
//! ever sees pairs of equal shape.

use serde::Serialize;

use crate::eval::value::{OutputSet, TensorValue};
use crate::types::format_shape;

/// How a converted output slot is laid out relative to the reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum OutputLayout {
    /// Same shape as the reference.
    #[default]
    Native,
    /// The engine dropped leading unit axes (typically the batch axis).
    BatchSqueezed,
    /// The converted tensor is the reference permuted by `perm`.
    Permuted { perm: Vec<usize> },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StructuralMismatch {
    #[error("reference produced {reference} outputs, converted produced {converted}")]
    Arity { reference: usize, converted: usize },
    #[error("output {slot}: reference shape {reference}, converted shape {converted}")]
    Shape {
        slot: usize,
        reference: String,
        converted: String,
    },
    #[error("output {slot}: layout permutation {perm:?} does not fit rank {rank}")]
    Layout {
        slot: usize,
        perm: Vec<usize>,
        rank: usize,
    },
}

/// Normalize `converted` to the reference layout.
///
/// Returns the reference set unchanged and the converted set with every
/// slot reshaped or permuted into the reference shape. Arity is checked
/// before any slot is touched.
pub fn reconcile(
    reference: OutputSet,
    converted: OutputSet,
    layouts: &[OutputLayout],
) -> Result<(OutputSet, OutputSet), StructuralMismatch> {
    if reference.len() != converted.len() {
        return Err(StructuralMismatch::Arity {
            reference: reference.len(),
            converted: converted.len(),
        });
    }

    let mut normalized = Vec::with_capacity(converted.len());
    for (slot, (r, c)) in reference.iter().zip(converted.tensors).enumerate() {
        let layout = layouts.get(slot).cloned().unwrap_or_default();
        normalized.push(normalize_slot(slot, r, c, &layout)?);
    }
    Ok((reference, OutputSet::new(normalized)))
}

fn shape_mismatch(slot: usize, reference: &TensorValue, converted: &TensorValue) -> StructuralMismatch {
    StructuralMismatch::Shape {
        slot,
        reference: format_shape(reference.shape()),
        converted: format_shape(converted.shape()),
    }
}

fn normalize_slot(
    slot: usize,
    reference: &TensorValue,
    converted: TensorValue,
    layout: &OutputLayout,
) -> Result<TensorValue, StructuralMismatch> {
    let restored = match layout {
        OutputLayout::Native => converted,
        OutputLayout::BatchSqueezed => {
            let significant = |shape: &[usize]| -> Vec<usize> {
                let lead = shape.iter().take_while(|d| **d == 1).count();
                shape[lead..].to_vec()
            };
            if significant(reference.shape()) != significant(converted.shape()) {
                return Err(shape_mismatch(slot, reference, &converted));
            }
            converted
                .reshape(reference.shape().to_vec())
                .map_err(|_| shape_mismatch(slot, reference, &converted))?
        }
        OutputLayout::Permuted { perm } => {
            let layout_err = || StructuralMismatch::Layout {
                slot,
                perm: perm.clone(),
                rank: converted.rank(),
            };
            let inverse = invert_permutation(perm, converted.rank()).ok_or_else(layout_err)?;
            converted.permute(&inverse).map_err(|_| layout_err())?
        }
    };

    if restored.shape() != reference.shape() {
        return Err(shape_mismatch(slot, reference, &restored));
    }
    Ok(restored)
}

/// Inverse of `perm` when it names every axis of `rank` exactly once.
fn invert_permutation(perm: &[usize], rank: usize) -> Option<Vec<usize>> {
    if perm.len() != rank {
        return None;
    }
    let mut inverse = vec![usize::MAX; rank];
    for (position, &axis) in perm.iter().enumerate() {
        let slot = inverse.get_mut(axis)?;
        if *slot != usize::MAX {
            return None;
        }
        *slot = position;
    }
    Some(inverse)
}
