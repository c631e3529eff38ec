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

//! Element-wise tolerance comparison of reconciled output sets.

use std::fmt;

use serde::Serialize;

use crate::eval::value::{OutputSet, TensorValue};
use crate::types::{format_shape, unravel_index};

/// Number of offending elements recorded per tensor.
pub const NEAR_MISS_LIMIT: usize = 8;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("tolerances must be finite and non-negative (rtol={rtol}, atol={atol})")]
pub struct InvalidTolerance {
    pub rtol: f64,
    pub atol: f64,
}

/// Relative and absolute tolerance of the approximate comparison.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ToleranceSpec {
    rtol: f64,
    atol: f64,
}

impl ToleranceSpec {
    pub fn new(rtol: f64, atol: f64) -> Result<Self, InvalidTolerance> {
        let valid = |v: f64| v.is_finite() && v >= 0.0;
        if !valid(rtol) || !valid(atol) {
            return Err(InvalidTolerance { rtol, atol });
        }
        Ok(Self { rtol, atol })
    }

    /// Same value for `rtol` and `atol`, e.g. `1e-4`.
    pub fn uniform(tol: f64) -> Result<Self, InvalidTolerance> {
        Self::new(tol, tol)
    }

    pub fn rtol(&self) -> f64 {
        self.rtol
    }

    pub fn atol(&self) -> f64 {
        self.atol
    }

    /// Largest difference accepted around `reference`.
    pub fn bound(&self, reference: f32) -> f64 {
        self.atol + self.rtol * f64::from(reference).abs()
    }

    pub fn accepts(&self, reference: f32, converted: f32) -> bool {
        if reference == converted {
            return true;
        }
        let diff = (f64::from(reference) - f64::from(converted)).abs();
        diff <= self.bound(reference)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CompareMode {
    /// `|r - c| <= atol + rtol * |r|`; NaN never passes.
    Approximate(ToleranceSpec),
    /// Bitwise identity of every element.
    Exact,
}

impl CompareMode {
    /// `rtol = atol = 1e-4`.
    pub const TIGHT: CompareMode = CompareMode::Approximate(ToleranceSpec {
        rtol: 1e-4,
        atol: 1e-4,
    });
    /// `rtol = atol = 1e-3`, for half-precision parameters.
    pub const LOOSE: CompareMode = CompareMode::Approximate(ToleranceSpec {
        rtol: 1e-3,
        atol: 1e-3,
    });

    pub fn approximate(tol: f64) -> Result<Self, InvalidTolerance> {
        ToleranceSpec::uniform(tol).map(CompareMode::Approximate)
    }

    pub fn element_matches(&self, reference: f32, converted: f32) -> bool {
        match self {
            CompareMode::Approximate(spec) => spec.accepts(reference, converted),
            CompareMode::Exact => reference.to_bits() == converted.to_bits(),
        }
    }

    fn bound(&self, reference: f32) -> f64 {
        match self {
            CompareMode::Approximate(spec) => spec.bound(reference),
            CompareMode::Exact => 0.0,
        }
    }
}

impl fmt::Display for CompareMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareMode::Approximate(spec) => {
                write!(f, "rtol={:e} atol={:e}", spec.rtol, spec.atol)
            }
            CompareMode::Exact => f.write_str("exact"),
        }
    }
}

/// One offending element.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementMismatch {
    pub index: Vec<usize>,
    pub reference: f32,
    pub converted: f32,
    pub allowed: f64,
}

/// Outcome of comparing one output slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TensorComparison {
    pub slot: usize,
    pub shape: Vec<usize>,
    pub elements: usize,
    pub mismatches: usize,
    pub max_abs_diff: f64,
    pub near_misses: Vec<ElementMismatch>,
}

impl TensorComparison {
    pub fn passed(&self) -> bool {
        self.mismatches == 0
    }
}

/// Compare two tensors of equal shape. Shapes must already be reconciled;
/// differing shapes are reported as every element mismatching.
pub fn compare_tensors(
    slot: usize,
    reference: &TensorValue,
    converted: &TensorValue,
    mode: CompareMode,
) -> TensorComparison {
    let mut comparison = TensorComparison {
        slot,
        shape: reference.shape().to_vec(),
        elements: reference.numel(),
        mismatches: 0,
        max_abs_diff: 0.0,
        near_misses: Vec::new(),
    };
    if reference.shape() != converted.shape() {
        comparison.mismatches = reference.numel().max(converted.numel()).max(1);
        comparison.max_abs_diff = f64::INFINITY;
        return comparison;
    }

    for (flat, (&r, &c)) in reference.data().iter().zip(converted.data()).enumerate() {
        let diff = (f64::from(r) - f64::from(c)).abs();
        if diff > comparison.max_abs_diff || diff.is_nan() {
            comparison.max_abs_diff = diff;
        }
        if mode.element_matches(r, c) {
            continue;
        }
        comparison.mismatches += 1;
        if comparison.near_misses.len() < NEAR_MISS_LIMIT {
            comparison.near_misses.push(ElementMismatch {
                index: unravel_index(flat, reference.shape()),
                reference: r,
                converted: c,
                allowed: mode.bound(r),
            });
        }
    }
    comparison
}

/// Numeric disagreement in at least one output slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericMismatch {
    pub mode: CompareMode,
    pub failed: Vec<TensorComparison>,
}

impl fmt::Display for NumericMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} output(s) outside tolerance ({})", self.failed.len(), self.mode)?;
        for cmp in &self.failed {
            write!(
                f,
                "; slot {} {}: {}/{} elements differ, max |diff| {:e}",
                cmp.slot,
                format_shape(&cmp.shape),
                cmp.mismatches,
                cmp.elements,
                cmp.max_abs_diff
            )?;
            if let Some(first) = cmp.near_misses.first() {
                write!(
                    f,
                    " (first at {:?}: {} vs {})",
                    first.index, first.reference, first.converted
                )?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for NumericMismatch {}

/// Compare reconciled output sets slot by slot. Arity must already match.
pub fn compare_output_sets(
    reference: &OutputSet,
    converted: &OutputSet,
    mode: CompareMode,
) -> Result<Vec<TensorComparison>, NumericMismatch> {
    let comparisons: Vec<TensorComparison> = reference
        .iter()
        .zip(converted.iter())
        .enumerate()
        .map(|(slot, (r, c))| compare_tensors(slot, r, c, mode))
        .collect();
    let failed: Vec<TensorComparison> = comparisons.iter().filter(|c| !c.passed()).cloned().collect();
    if failed.is_empty() {
        Ok(comparisons)
    } else {
        Err(NumericMismatch { mode, failed })
    }
}
