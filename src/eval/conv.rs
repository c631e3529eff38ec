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

/// Attributes of a transposed convolution, one entry per spatial axis.
#[derive(Debug, Clone, Copy)]
pub struct ConvTransposeParams<'a> {
    pub stride: &'a [usize],
    pub padding: &'a [usize],
    pub dilation: &'a [usize],
    pub groups: usize,
}

/// Scatter form of a grouped N-d transposed convolution.
///
/// `input` is `[N, C_in, in...]`, `weight` is `[C_in, C_out / groups, k...]`
/// and `out_shape` must come from shape inference so that output padding is
/// already accounted for. Every input element contributes
/// `x * w` at output position `i * stride + k * dilation - padding`.
pub fn conv_transpose(
    input: &TensorValue,
    weight: &TensorValue,
    bias: Option<&TensorValue>,
    params: ConvTransposeParams<'_>,
    out_shape: &[usize],
) -> Result<TensorValue, TensorError> {
    let in_shape = input.shape();
    let w_shape = weight.shape();
    let spatial = in_shape.len() - 2;
    let (batch, in_channels) = (in_shape[0], in_shape[1]);
    let in_spatial = &in_shape[2..];
    let kernel = &w_shape[2..];
    let out_spatial = &out_shape[2..];
    let out_per_group = w_shape[1];
    let out_channels = out_shape[1];
    let in_per_group = in_channels / params.groups;

    let in_plane = numel(in_spatial);
    let out_plane = numel(out_spatial);
    let kernel_size = numel(kernel);
    let out_strides = contiguous_strides(out_spatial);

    let mut out = vec![0.0f32; numel(out_shape)];
    if let Some(bias) = bias {
        for n in 0..batch {
            for (oc, b) in bias.data().iter().enumerate() {
                let base = (n * out_channels + oc) * out_plane;
                out[base..base + out_plane].fill(*b);
            }
        }
    }

    let x = input.data();
    let w = weight.data();
    let mut in_index = vec![0usize; spatial];
    let mut k_index = vec![0usize; spatial];
    for n in 0..batch {
        for ic in 0..in_channels {
            let group = ic / in_per_group;
            let x_base = (n * in_channels + ic) * in_plane;
            in_index.fill(0);
            for flat_in in 0..in_plane {
                let value = x[x_base + flat_in];
                for oc_local in 0..out_per_group {
                    let oc = group * out_per_group + oc_local;
                    let w_base = (ic * out_per_group + oc_local) * kernel_size;
                    let out_base = (n * out_channels + oc) * out_plane;
                    k_index.fill(0);
                    for flat_k in 0..kernel_size {
                        if let Some(offset) = scatter_offset(
                            &in_index,
                            &k_index,
                            params,
                            out_spatial,
                            &out_strides,
                        ) {
                            out[out_base + offset] += value * w[w_base + flat_k];
                        }
                        advance_index(&mut k_index, kernel);
                    }
                }
                advance_index(&mut in_index, in_spatial);
            }
        }
    }

    TensorValue::new(out_shape.to_vec(), out)
}

fn scatter_offset(
    in_index: &[usize],
    k_index: &[usize],
    params: ConvTransposeParams<'_>,
    out_spatial: &[usize],
    out_strides: &[usize],
) -> Option<usize> {
    let mut offset = 0;
    for axis in 0..in_index.len() {
        let pos = in_index[axis] * params.stride[axis] + k_index[axis] * params.dilation[axis];
        let pos = pos.checked_sub(params.padding[axis])?;
        if pos >= out_spatial[axis] {
            return None;
        }
        offset += pos * out_strides[axis];
    }
    Some(offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_two_spreads_single_channel() {
        let input = TensorValue::new(vec![1, 1, 2], vec![1.0, 2.0]).unwrap();
        let weight = TensorValue::new(vec![1, 1, 2], vec![1.0, 10.0]).unwrap();
        let params = ConvTransposeParams {
            stride: &[2],
            padding: &[0],
            dilation: &[1],
            groups: 1,
        };
        let out = conv_transpose(&input, &weight, None, params, &[1, 1, 4]).unwrap();
        assert_eq!(out.data(), &[1.0, 10.0, 2.0, 20.0]);
    }

    #[test]
    fn bias_and_padding_crop_edges() {
        let input = TensorValue::new(vec![1, 1, 2], vec![1.0, 1.0]).unwrap();
        let weight = TensorValue::new(vec![1, 1, 3], vec![1.0, 1.0, 1.0]).unwrap();
        let bias = TensorValue::new(vec![1], vec![0.5]).unwrap();
        let params = ConvTransposeParams {
            stride: &[1],
            padding: &[1],
            dilation: &[1],
            groups: 1,
        };
        // full output [1, 2, 2, 1] cropped by one on each side
        let out = conv_transpose(&input, &weight, Some(&bias), params, &[1, 1, 2]).unwrap();
        assert_eq!(out.data(), &[2.5, 2.5]);
    }
}
