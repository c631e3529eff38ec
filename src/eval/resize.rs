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

//! Spatial resize of NCHW tensors.
//!
//! Coordinate mapping follows the usual interpolation conventions: with
//! `align_corners` the corner pixels of input and output coincide, otherwise
//! pixel centers are mapped through `(dst + 0.5) * ratio - 0.5`. The ratio is
//! the reciprocal of the requested scale when one was given, else
//! `in / out`. Zero interpolation weights are skipped, so a unit-scale resize
//! reproduces its input bit for bit.

use crate::eval::value::{TensorError, TensorValue};
use crate::ir::ResizeMode;
use crate::types::numel;

const CUBIC_A: f32 = -0.75;

pub fn resize(
    input: &TensorValue,
    mode: ResizeMode,
    scale: Option<&[f32]>,
    align_corners: bool,
    out_shape: &[usize],
) -> Result<TensorValue, TensorError> {
    let in_shape = input.shape();
    let planes = in_shape[0] * in_shape[1];
    let (in_h, in_w) = (in_shape[2], in_shape[3]);
    let (out_h, out_w) = (out_shape[2], out_shape[3]);
    let ratio_h = ratio(in_h, out_h, scale.map(|s| s[0]), align_corners);
    let ratio_w = ratio(in_w, out_w, scale.map(|s| s[1]), align_corners);

    let taps_h: Vec<Vec<(usize, f32)>> = (0..out_h)
        .map(|o| taps(mode, o, in_h, ratio_h, align_corners))
        .collect();
    let taps_w: Vec<Vec<(usize, f32)>> = (0..out_w)
        .map(|o| taps(mode, o, in_w, ratio_w, align_corners))
        .collect();

    let src = input.data();
    let mut out = vec![0.0f32; numel(out_shape)];
    for plane in 0..planes {
        let src = &src[plane * in_h * in_w..(plane + 1) * in_h * in_w];
        let dst = &mut out[plane * out_h * out_w..(plane + 1) * out_h * out_w];
        for (oy, ty) in taps_h.iter().enumerate() {
            for (ox, tx) in taps_w.iter().enumerate() {
                let mut acc = 0.0f32;
                let mut first = true;
                for &(iy, wy) in ty {
                    for &(ix, wx) in tx {
                        let term = wy * wx * src[iy * in_w + ix];
                        if first {
                            acc = term;
                            first = false;
                        } else {
                            acc += term;
                        }
                    }
                }
                dst[oy * out_w + ox] = acc;
            }
        }
    }
    TensorValue::new(out_shape.to_vec(), out)
}

fn ratio(input: usize, output: usize, scale: Option<f32>, align_corners: bool) -> f32 {
    if align_corners {
        if output > 1 {
            (input as f32 - 1.0) / (output as f32 - 1.0)
        } else {
            0.0
        }
    } else {
        match scale {
            Some(scale) => 1.0 / scale,
            None => input as f32 / output as f32,
        }
    }
}

fn source_coordinate(dst: usize, ratio: f32, align_corners: bool, cubic: bool) -> f32 {
    if align_corners {
        ratio * dst as f32
    } else {
        let src = ratio * (dst as f32 + 0.5) - 0.5;
        if !cubic && src < 0.0 {
            0.0
        } else {
            src
        }
    }
}

/// Input positions and weights contributing to one output coordinate.
fn taps(mode: ResizeMode, dst: usize, input: usize, ratio: f32, align_corners: bool) -> Vec<(usize, f32)> {
    let Some(last) = input.checked_sub(1) else {
        return Vec::new();
    };
    let mut taps = Vec::with_capacity(4);
    let mut push = |index: isize, weight: f32| {
        if weight != 0.0 {
            taps.push((index.clamp(0, last as isize) as usize, weight));
        }
    };
    match mode {
        ResizeMode::Nearest => {
            let src = (dst as f32 * ratio).floor() as isize;
            push(src.min(last as isize), 1.0);
        }
        ResizeMode::Bilinear => {
            let src = source_coordinate(dst, ratio, align_corners, false);
            let lo = src.floor();
            let lambda = src - lo;
            let lo = lo as isize;
            let hi = if lo < last as isize { lo + 1 } else { lo };
            push(lo, 1.0 - lambda);
            push(hi, lambda);
        }
        ResizeMode::Bicubic => {
            let src = source_coordinate(dst, ratio, align_corners, true);
            let lo = src.floor();
            let t = src - lo;
            let lo = lo as isize;
            let weights = [
                cubic_far(t + 1.0),
                cubic_near(t),
                cubic_near(1.0 - t),
                cubic_far(2.0 - t),
            ];
            for (offset, weight) in weights.into_iter().enumerate() {
                push(lo - 1 + offset as isize, weight);
            }
        }
    }
    taps
}

fn cubic_near(x: f32) -> f32 {
    ((CUBIC_A + 2.0) * x - (CUBIC_A + 3.0)) * x * x + 1.0
}

fn cubic_far(x: f32) -> f32 {
    ((CUBIC_A * x - 5.0 * CUBIC_A) * x + 8.0 * CUBIC_A) * x - 4.0 * CUBIC_A
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(shape: &[usize]) -> TensorValue {
        let n = numel(shape);
        TensorValue::new(shape.to_vec(), (0..n).map(|i| i as f32 * 0.37 + 0.01).collect()).unwrap()
    }

    #[test]
    fn unit_scale_is_bit_exact_for_every_mode() {
        let x = ramp(&[1, 2, 3, 5]);
        for mode in [ResizeMode::Nearest, ResizeMode::Bilinear, ResizeMode::Bicubic] {
            for align_corners in [false, true] {
                if mode == ResizeMode::Nearest && align_corners {
                    continue;
                }
                let y = resize(&x, mode, Some(&[1.0, 1.0]), align_corners, x.shape()).unwrap();
                assert!(y.bit_identical(&x), "{mode:?} align_corners={align_corners}");
                let y = resize(&x, mode, None, align_corners, x.shape()).unwrap();
                assert!(y.bit_identical(&x), "{mode:?} sized align_corners={align_corners}");
            }
        }
    }

    #[test]
    fn nearest_doubles_pixels() {
        let x = TensorValue::new(vec![1, 1, 1, 2], vec![1.0, 2.0]).unwrap();
        let y = resize(&x, ResizeMode::Nearest, Some(&[1.0, 2.0]), false, &[1, 1, 1, 4]).unwrap();
        assert_eq!(y.data(), &[1.0, 1.0, 2.0, 2.0]);
    }
}
