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

use crate::eval::value::{TensorError, TensorValue};
use crate::types::{advance_index, contiguous_strides, numel};

/// Window attributes shared by max and average pooling.
#[derive(Debug, Clone, Copy)]
pub struct PoolWindow<'a> {
    pub kernel: &'a [usize],
    pub stride: &'a [usize],
    pub padding: &'a [usize],
    pub dilation: &'a [usize],
}

/// Iterate pooling planes: the trailing `kernel.len()` axes are spatial,
/// everything before them (batch and channel, or channel only) is a plane.
fn for_each_plane(
    input: &TensorValue,
    out_shape: &[usize],
    spatial: usize,
    mut reduce: impl FnMut(&[f32], &[usize], &[usize], &mut [f32]),
) -> Result<TensorValue, TensorError> {
    let in_shape = input.shape();
    let lead = in_shape.len() - spatial;
    let in_spatial = &in_shape[lead..];
    let out_spatial = &out_shape[lead..];
    let in_plane = numel(in_spatial);
    let out_plane = numel(out_spatial);
    let planes = numel(&in_shape[..lead]);

    let mut out = vec![0.0f32; numel(out_shape)];
    for plane in 0..planes {
        let src = &input.data()[plane * in_plane..(plane + 1) * in_plane];
        let dst = &mut out[plane * out_plane..(plane + 1) * out_plane];
        reduce(src, in_spatial, out_spatial, dst);
    }
    TensorValue::new(out_shape.to_vec(), out)
}

/// Max pooling. Padding never wins; NaN inside a window propagates.
pub fn max_pool(
    input: &TensorValue,
    window: PoolWindow<'_>,
    out_shape: &[usize],
) -> Result<TensorValue, TensorError> {
    let spatial = window.kernel.len();
    for_each_plane(input, out_shape, spatial, |src, in_spatial, out_spatial, dst| {
        let in_strides = contiguous_strides(in_spatial);
        let mut o_index = vec![0usize; spatial];
        let mut k_index = vec![0usize; spatial];
        for slot in dst.iter_mut() {
            let mut best = f32::NEG_INFINITY;
            k_index.fill(0);
            loop {
                let mut offset = Some(0usize);
                for axis in 0..spatial {
                    let pos = (o_index[axis] * window.stride[axis]
                        + k_index[axis] * window.dilation[axis])
                        .checked_sub(window.padding[axis])
                        .filter(|p| *p < in_spatial[axis]);
                    offset = match (offset, pos) {
                        (Some(acc), Some(p)) => Some(acc + p * in_strides[axis]),
                        _ => None,
                    };
                }
                if let Some(offset) = offset {
                    let v = src[offset];
                    if v > best || v.is_nan() {
                        best = v;
                    }
                }
                if !advance_index(&mut k_index, window.kernel) {
                    break;
                }
            }
            *slot = best;
            advance_index(&mut o_index, out_spatial);
        }
    })
}

/// Average pooling. With `count_include_pad` the divisor counts padded
/// positions of the window (clipped at `input + padding`); otherwise only
/// positions inside the input.
pub fn avg_pool(
    input: &TensorValue,
    window: PoolWindow<'_>,
    count_include_pad: bool,
    out_shape: &[usize],
) -> Result<TensorValue, TensorError> {
    let spatial = window.kernel.len();
    for_each_plane(input, out_shape, spatial, |src, in_spatial, out_spatial, dst| {
        let in_strides = contiguous_strides(in_spatial);
        let mut o_index = vec![0usize; spatial];
        for slot in dst.iter_mut() {
            let mut starts = Vec::with_capacity(spatial);
            let mut ends = Vec::with_capacity(spatial);
            let mut padded_count = 1usize;
            for axis in 0..spatial {
                let start = (o_index[axis] * window.stride[axis]) as isize
                    - window.padding[axis] as isize;
                let end = (start + window.kernel[axis] as isize)
                    .min((in_spatial[axis] + window.padding[axis]) as isize);
                padded_count *= (end - start) as usize;
                let start = start.max(0) as usize;
                let end = end.min(in_spatial[axis] as isize).max(0) as usize;
                starts.push(start);
                ends.push(end.max(start));
            }

            let extents: Vec<usize> = starts.iter().zip(&ends).map(|(s, e)| e - s).collect();
            let valid_count = numel(&extents);
            let mut sum = 0.0f32;
            if valid_count > 0 {
                let mut w_index = vec![0usize; spatial];
                loop {
                    let offset: usize = (0..spatial)
                        .map(|axis| (starts[axis] + w_index[axis]) * in_strides[axis])
                        .sum();
                    sum += src[offset];
                    if !advance_index(&mut w_index, &extents) {
                        break;
                    }
                }
            }

            let divisor = if count_include_pad {
                padded_count
            } else {
                valid_count
            };
            *slot = if divisor == 0 {
                0.0
            } else {
                sum / divisor as f32
            };
            advance_index(&mut o_index, out_spatial);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_pool_ceil_mode_keeps_partial_window() {
        let input = TensorValue::new(vec![1, 5], vec![1.0, 5.0, 2.0, 4.0, 3.0]).unwrap();
        let window = PoolWindow {
            kernel: &[2],
            stride: &[2],
            padding: &[0],
            dilation: &[1],
        };
        let out = max_pool(&input, window, &[1, 3]).unwrap();
        assert_eq!(out.data(), &[5.0, 4.0, 3.0]);
    }

    #[test]
    fn avg_pool_divisor_depends_on_count_include_pad() {
        let input = TensorValue::new(vec![1, 1, 2], vec![2.0, 4.0]).unwrap();
        let window = PoolWindow {
            kernel: &[2],
            stride: &[1],
            padding: &[1],
            dilation: &[1],
        };
        let with_pad = avg_pool(&input, window, true, &[1, 1, 3]).unwrap();
        assert_eq!(with_pad.data(), &[1.0, 3.0, 2.0]);
        let without_pad = avg_pool(&input, window, false, &[1, 1, 3]).unwrap();
        assert_eq!(without_pad.data(), &[2.0, 3.0, 4.0]);
    }
}
