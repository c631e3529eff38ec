//! Basic shape and precision definitions shared by the graph IR, the
//! reference interpreter and the conversion artifacts.
//!
//! # Example
//! ```
//! use convparity::types::{format_shape, numel, Precision};
//! assert_eq!(numel(&[2, 3, 4]), 24);
//! assert_eq!(format_shape(&[1, 12, 64]), "[1,12,64]");
//! assert_eq!(Precision::HalfRoundTrip.round(0.1), half::f16::from_f32(0.1).to_f32());
//! ```

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// A concrete tensor shape: ordered list of non-negative extents.
pub type Shape = Vec<usize>;

/// Numeric precision applied to materialized model parameters.
///
/// `HalfRoundTrip` mirrors casting a model to half precision and back to
/// single precision before tracing: every parameter is rounded to the nearest
/// IEEE binary16 value, then widened again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    #[default]
    Full,
    HalfRoundTrip,
}

impl Precision {
    pub fn round(self, value: f32) -> f32 {
        match self {
            Precision::Full => value,
            Precision::HalfRoundTrip => half::f16::from_f32(value).to_f32(),
        }
    }
}

/// Independent random streams derived from one case seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedStream {
    Parameters,
    Inputs,
    Execution,
}

impl SeedStream {
    pub fn rng(self, seed: u64) -> ChaCha8Rng {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(match self {
            SeedStream::Parameters => 0,
            SeedStream::Inputs => 1,
            SeedStream::Execution => 2,
        });
        rng
    }
}

/// Number of elements for a shape. The empty shape is a scalar (one element).
pub fn numel(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Row-major strides for a shape.
pub fn contiguous_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; shape.len()];
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }
    strides
}

/// Convert a flat row-major offset into a multi-dimensional index.
pub fn unravel_index(mut flat: usize, shape: &[usize]) -> Vec<usize> {
    let mut index = vec![0usize; shape.len()];
    for axis in (0..shape.len()).rev() {
        let dim = shape[axis].max(1);
        index[axis] = flat % dim;
        flat /= dim;
    }
    index
}

/// Advance a row-major multi-index in place. Returns `false` once the index
/// wraps past the last element.
pub fn advance_index(index: &mut [usize], shape: &[usize]) -> bool {
    for axis in (0..shape.len()).rev() {
        index[axis] += 1;
        if index[axis] < shape[axis] {
            return true;
        }
        index[axis] = 0;
    }
    false
}

/// Render a shape the way the converter's shape manifest expects it.
pub fn format_shape(shape: &[usize]) -> String {
    let dims = shape
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!("[{dims}]")
}
