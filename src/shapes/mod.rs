// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Window arithmetic shared by shape inference and the reference kernels.

pub mod engine;

pub use engine::{infer_module_shapes, infer_output_shapes, ShapeError, ShapeErrorKind};

/// Output extent of a transposed convolution along one spatial axis:
/// `(in - 1) * stride - 2 * padding + dilation * (kernel - 1) + output_padding + 1`.
///
/// Returns `None` when padding consumes the whole extent.
pub fn conv_transpose_extent(
    input: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
    output_padding: usize,
    dilation: usize,
) -> Option<usize> {
    if input == 0 || kernel == 0 {
        return None;
    }
    let full = (input - 1) * stride + dilation * (kernel - 1) + output_padding + 1;
    full.checked_sub(2 * padding).filter(|out| *out > 0)
}

/// Output extent of a pooling window along one spatial axis.
///
/// In ceil mode the last window is kept only when it starts inside the input
/// or the left padding, so no window lies entirely in the right padding.
pub fn pool_extent(
    input: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
    dilation: usize,
    ceil_mode: bool,
) -> Option<usize> {
    if stride == 0 {
        return None;
    }
    let span = dilation * (kernel.checked_sub(1)?) + 1;
    let padded = input + 2 * padding;
    let numerator = padded.checked_sub(span)? + if ceil_mode { stride - 1 } else { 0 };
    let mut out = numerator / stride + 1;
    if ceil_mode && (out - 1) * stride >= input + padding {
        out -= 1;
    }
    Some(out).filter(|out| *out > 0)
}

/// Output extent of a resize along one spatial axis.
pub fn resize_extent(input: usize, size: Option<usize>, scale: Option<f32>) -> Option<usize> {
    if input == 0 {
        return None;
    }
    match (size, scale) {
        (Some(size), _) => Some(size).filter(|size| *size > 0),
        (None, Some(scale)) => {
            let out = (input as f64 * f64::from(scale)).floor();
            (out >= 1.0).then_some(out as usize)
        }
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conv_transpose_extent_matches_closed_form() {
        assert_eq!(conv_transpose_extent(4, 4, 2, 1, 1, 1), Some(9));
        assert_eq!(conv_transpose_extent(5, 3, 1, 2, 0, 2), Some(5));
        assert_eq!(conv_transpose_extent(1, 1, 1, 1, 0, 1), None);
    }

    #[test]
    fn pool_extent_ceil_mode_drops_window_in_padding() {
        assert_eq!(pool_extent(128, 3, 3, 0, 1, false), Some(42));
        assert_eq!(pool_extent(42, 4, 2, 2, 1, false), Some(22));
        assert_eq!(pool_extent(22, 5, 2, 2, 1, true), Some(12));
        assert_eq!(pool_extent(6, 2, 4, 1, 1, true), Some(2));
        assert_eq!(pool_extent(11, 2, 1, 0, 1, true), Some(10));
        assert_eq!(pool_extent(5, 2, 2, 0, 1, true), Some(3));
        assert_eq!(pool_extent(2, 3, 1, 0, 1, false), None);
    }

    #[test]
    fn resize_extent_floors_scaled_size() {
        assert_eq!(resize_extent(12, None, Some(1.0)), Some(12));
        assert_eq!(resize_extent(5, None, Some(1.5)), Some(7));
        assert_eq!(resize_extent(5, Some(9), None), Some(9));
    }
}
