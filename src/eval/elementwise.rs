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

//! Pointwise and single-axis reduction kernels.

use rand::Rng;

use crate::eval::value::{TensorError, TensorValue};

pub fn affine(x: &TensorValue, scale: f32, shift: f32) -> TensorValue {
    x.map(|v| v * scale + shift)
}

pub fn relu(x: &TensorValue) -> TensorValue {
    x.map(|v| if v < 0.0 { 0.0 } else { v })
}

pub fn abs(x: &TensorValue) -> TensorValue {
    x.map(f32::abs)
}

/// NaN passes through untouched.
pub fn clamp(x: &TensorValue, min: Option<f32>, max: Option<f32>) -> TensorValue {
    x.map(|v| {
        let mut out = v;
        if let Some(lo) = min {
            if out < lo {
                out = lo;
            }
        }
        if let Some(hi) = max {
            if out > hi {
                out = hi;
            }
        }
        out
    })
}

/// Randomized leaky ReLU.
///
/// Evaluation mode uses the fixed slope `(lower + upper) / 2`. Training mode
/// draws one slope per element from `rng` in row-major order, for every
/// element, so the stream position depends only on the tensor size.
pub fn rrelu<R: Rng + ?Sized>(
    x: &TensorValue,
    lower: f32,
    upper: f32,
    training: bool,
    rng: &mut R,
) -> Result<TensorValue, TensorError> {
    if !training {
        let slope = (lower + upper) / 2.0;
        return Ok(x.map(|v| if v >= 0.0 { v } else { v * slope }));
    }
    let span = upper - lower;
    let data = x
        .data()
        .iter()
        .map(|&v| {
            let slope = lower + rng.gen::<f32>() * span;
            if v >= 0.0 {
                v
            } else {
                v * slope
            }
        })
        .collect();
    TensorValue::new(x.shape().to_vec(), data)
}

/// Split a shape around `axis` into (outer, extent, inner) loop bounds.
fn axis_bounds(shape: &[usize], axis: usize) -> (usize, usize, usize) {
    let outer = shape[..axis].iter().product();
    let inner = shape[axis + 1..].iter().product();
    (outer, shape[axis], inner)
}

pub fn softmax(x: &TensorValue, axis: usize) -> Result<TensorValue, TensorError> {
    let (outer, extent, inner) = axis_bounds(x.shape(), axis);
    let src = x.data();
    let mut out = vec![0.0f32; src.len()];
    for o in 0..outer {
        for i in 0..inner {
            let at = |k: usize| o * extent * inner + k * inner + i;
            let max = (0..extent)
                .map(|k| src[at(k)])
                .fold(f32::NEG_INFINITY, f32::max);
            let mut sum = 0.0f32;
            for k in 0..extent {
                let e = (src[at(k)] - max).exp();
                out[at(k)] = e;
                sum += e;
            }
            for k in 0..extent {
                out[at(k)] /= sum;
            }
        }
    }
    TensorValue::new(x.shape().to_vec(), out)
}

/// `x / max(||x||_p, eps)` along `axis`.
pub fn normalize(x: &TensorValue, p: f32, axis: usize, eps: f32) -> Result<TensorValue, TensorError> {
    let (outer, extent, inner) = axis_bounds(x.shape(), axis);
    let src = x.data();
    let mut out = vec![0.0f32; src.len()];
    for o in 0..outer {
        for i in 0..inner {
            let at = |k: usize| o * extent * inner + k * inner + i;
            let norm = if p == 2.0 {
                (0..extent).map(|k| src[at(k)] * src[at(k)]).sum::<f32>().sqrt()
            } else if p == 1.0 {
                (0..extent).map(|k| src[at(k)].abs()).sum::<f32>()
            } else {
                (0..extent)
                    .map(|k| src[at(k)].abs().powf(p))
                    .sum::<f32>()
                    .powf(1.0 / p)
            };
            let denom = norm.max(eps);
            for k in 0..extent {
                out[at(k)] = src[at(k)] / denom;
            }
        }
    }
    TensorValue::new(x.shape().to_vec(), out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SeedStream;

    fn t(shape: &[usize], data: &[f32]) -> TensorValue {
        TensorValue::new(shape.to_vec(), data.to_vec()).unwrap()
    }

    #[test]
    fn rrelu_eval_uses_midpoint_slope() {
        let x = t(&[3], &[-1.0, 0.0, 2.0]);
        let mut rng = SeedStream::Execution.rng(0);
        let y = rrelu(&x, 0.1, 0.3, false, &mut rng).unwrap();
        assert!((y.data()[0] + 0.2).abs() < 1e-7);
        assert_eq!(&y.data()[1..], &[0.0, 2.0]);
    }

    #[test]
    fn rrelu_training_is_repeatable_per_seed() {
        let x = t(&[4], &[-1.0, -2.0, -3.0, 4.0]);
        let a = rrelu(&x, 0.1, 0.3, true, &mut SeedStream::Execution.rng(9)).unwrap();
        let b = rrelu(&x, 0.1, 0.3, true, &mut SeedStream::Execution.rng(9)).unwrap();
        assert!(a.bit_identical(&b));
        assert!(a.data()[..3].iter().zip(x.data()).all(|(y, x)| *y <= -0.1 * -x && *y >= -0.3 * -x));
    }

    #[test]
    fn softmax_rows_sum_to_one() {
        let x = t(&[2, 3], &[1.0, 2.0, 3.0, -1.0, 0.0, 1.0]);
        let y = softmax(&x, 1).unwrap();
        for row in y.data().chunks(3) {
            assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn clamp_accepts_one_sided_bounds() {
        let x = t(&[3], &[-2.0, 0.5, 2.0]);
        assert_eq!(clamp(&x, Some(0.0), None).data(), &[0.0, 0.5, 2.0]);
        assert_eq!(clamp(&x, None, Some(1.0)).data(), &[-2.0, 0.5, 1.0]);
    }

    #[test]
    fn normalize_produces_unit_l2_columns() {
        let x = t(&[1, 2, 1], &[3.0, 4.0]);
        let y = normalize(&x, 2.0, 1, 1e-12).unwrap();
        assert_eq!(y.data(), &[0.6, 0.8]);
    }
}
