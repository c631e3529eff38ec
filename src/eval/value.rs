// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the “License”);
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an “AS IS” BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Part of convparity (tensor-graph conversion parity harness).

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::types::{contiguous_strides, format_shape, numel, Shape};

/// Errors raised when constructing or reshaping tensors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TensorError {
    #[error("shape {shape} holds {expected} elements but {actual} were provided")]
    ElementCount {
        shape: String,
        expected: usize,
        actual: usize,
    },
    #[error("cannot reshape {from} into {to}")]
    Reshape { from: String, to: String },
    #[error("invalid permutation {perm:?} for rank {rank}")]
    Permutation { perm: Vec<usize>, rank: usize },
}

/// Dense row-major f32 tensor. Immutable once built: every operation returns
/// a new tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTensor")]
pub struct TensorValue {
    shape: Shape,
    data: Vec<f32>,
}

/// Wire form of [`TensorValue`]; deserialization re-checks the element count.
#[derive(Deserialize)]
struct RawTensor {
    shape: Shape,
    data: Vec<f32>,
}

impl TryFrom<RawTensor> for TensorValue {
    type Error = TensorError;

    fn try_from(raw: RawTensor) -> Result<Self, Self::Error> {
        TensorValue::new(raw.shape, raw.data)
    }
}

impl TensorValue {
    pub fn new(shape: Shape, data: Vec<f32>) -> Result<Self, TensorError> {
        let expected = numel(&shape);
        if expected != data.len() {
            return Err(TensorError::ElementCount {
                shape: format_shape(&shape),
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    pub fn zeros(shape: Shape) -> Self {
        let len = numel(&shape);
        Self {
            shape,
            data: vec![0.0; len],
        }
    }

    pub fn filled(shape: Shape, value: f32) -> Self {
        let len = numel(&shape);
        Self {
            shape,
            data: vec![value; len],
        }
    }

    /// Uniform `[0, 1)` fill drawn from `rng` in row-major order.
    pub fn random_uniform<R: Rng + ?Sized>(shape: Shape, rng: &mut R) -> Self {
        let len = numel(&shape);
        let data = (0..len).map(|_| rng.gen::<f32>()).collect();
        Self { shape, data }
    }

    /// Uniform `[low, high)` fill drawn from `rng` in row-major order.
    pub fn random_range<R: Rng + ?Sized>(shape: Shape, low: f32, high: f32, rng: &mut R) -> Self {
        let len = numel(&shape);
        let span = high - low;
        let data = (0..len).map(|_| low + rng.gen::<f32>() * span).collect();
        Self { shape, data }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    pub fn map(&self, f: impl Fn(f32) -> f32) -> Self {
        Self {
            shape: self.shape.clone(),
            data: self.data.iter().copied().map(f).collect(),
        }
    }

    pub fn reshape(&self, shape: Shape) -> Result<Self, TensorError> {
        if numel(&shape) != self.data.len() {
            return Err(TensorError::Reshape {
                from: format_shape(&self.shape),
                to: format_shape(&shape),
            });
        }
        Ok(Self {
            shape,
            data: self.data.clone(),
        })
    }

    /// Reorder axes so that output axis `i` is input axis `perm[i]`.
    pub fn permute(&self, perm: &[usize]) -> Result<Self, TensorError> {
        let rank = self.rank();
        let mut seen = vec![false; rank];
        if perm.len() != rank
            || perm
                .iter()
                .any(|&axis| axis >= rank || std::mem::replace(&mut seen[axis], true))
        {
            return Err(TensorError::Permutation {
                perm: perm.to_vec(),
                rank,
            });
        }

        let out_shape: Shape = perm.iter().map(|&axis| self.shape[axis]).collect();
        let in_strides = contiguous_strides(&self.shape);
        let permuted_strides: Vec<usize> = perm.iter().map(|&axis| in_strides[axis]).collect();

        let mut data = Vec::with_capacity(self.data.len());
        let mut index = vec![0usize; rank];
        for _ in 0..self.data.len() {
            let offset: usize = index
                .iter()
                .zip(&permuted_strides)
                .map(|(i, s)| i * s)
                .sum();
            data.push(self.data[offset]);
            for axis in (0..rank).rev() {
                index[axis] += 1;
                if index[axis] < out_shape[axis] {
                    break;
                }
                index[axis] = 0;
            }
        }

        Ok(Self {
            shape: out_shape,
            data,
        })
    }

    /// Swap two axes.
    pub fn transpose(&self, dim0: usize, dim1: usize) -> Result<Self, TensorError> {
        let mut perm: Vec<usize> = (0..self.rank()).collect();
        if dim0 >= perm.len() || dim1 >= perm.len() {
            return Err(TensorError::Permutation {
                perm: vec![dim0, dim1],
                rank: self.rank(),
            });
        }
        perm.swap(dim0, dim1);
        self.permute(&perm)
    }

    /// True when both tensors have the same shape and bit-identical elements.
    pub fn bit_identical(&self, other: &Self) -> bool {
        self.shape == other.shape
            && self
                .data
                .iter()
                .zip(&other.data)
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

/// Ordered outputs of one execution. Slot position is the identity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OutputSet {
    pub tensors: Vec<TensorValue>,
}

impl OutputSet {
    pub fn new(tensors: Vec<TensorValue>) -> Self {
        Self { tensors }
    }

    pub fn single(tensor: TensorValue) -> Self {
        Self {
            tensors: vec![tensor],
        }
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TensorValue> {
        self.tensors.iter()
    }

    pub fn bit_identical(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .tensors
                .iter()
                .zip(&other.tensors)
                .all(|(a, b)| a.bit_identical(b))
    }
}

pub fn format_tensor_summary(t: &TensorValue) -> String {
    let (min, max, sum) = t.data().iter().fold(
        (f32::INFINITY, f32::NEG_INFINITY, 0.0f64),
        |(lo, hi, acc), &v| (lo.min(v), hi.max(v), acc + f64::from(v)),
    );
    if t.numel() == 0 {
        return format!("Tensor{} <empty>", format_shape(t.shape()));
    }
    format!(
        "Tensor{} min={} max={} mean={}",
        format_shape(t.shape()),
        trim_float(f64::from(min)),
        trim_float(f64::from(max)),
        trim_float(sum / t.numel() as f64)
    )
}

fn trim_float(x: f64) -> String {
    let s = format!("{:.6}", x);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_element_count() {
        let err = TensorValue::new(vec![2, 2], vec![1.0; 3]).unwrap_err();
        assert!(matches!(err, TensorError::ElementCount { expected: 4, actual: 3, .. }));
    }

    #[test]
    fn permute_moves_axes() {
        let t = TensorValue::new(vec![2, 3], vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        let p = t.permute(&[1, 0]).unwrap();
        assert_eq!(p.shape(), &[3, 2]);
        assert_eq!(p.data(), &[0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
    }

    #[test]
    fn permute_rejects_duplicate_axes() {
        let t = TensorValue::zeros(vec![2, 3]);
        assert!(t.permute(&[0, 0]).is_err());
    }

    #[test]
    fn summary_trims_floats() {
        let t = TensorValue::filled(vec![2], 1.25);
        let s = format_tensor_summary(&t);
        assert!(s.contains("[2]"));
        assert!(s.contains("mean=1.25"));
    }
}
