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

use std::collections::BTreeSet;

use crate::ir::{instruction_dsts, instruction_operands, IRModule, Instr, ValueId};

/// Structured errors returned by the IR verifier.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IrVerifyError {
    /// Multiple instructions attempted to define the same SSA value.
    #[error("duplicate definition for value %{0}")]
    DuplicateDefinition(ValueId),
    /// A value was referenced before it had been defined.
    #[error("use of undefined value %{value} at instruction {instr_index}")]
    UseBeforeDefinition { value: ValueId, instr_index: usize },
    /// The module contains no `Output` instruction.
    #[error("module is missing an Output instruction")]
    MissingOutput,
    /// The module's `next_id` counter does not match the SSA IDs in use.
    #[error("next_id {found} is smaller than required {expected}")]
    NextIdOutOfSync { found: usize, expected: usize },
    /// Declared inputs must be numbered 0..n without gaps or repeats.
    #[error("graph inputs are not numbered contiguously: {0:?}")]
    InputNumbering(Vec<usize>),
    /// Operand validation failed (e.g., a zero stride).
    #[error("invalid operand in instruction {instr_index}: {message}")]
    InvalidOperand { instr_index: usize, message: String },
}

/// Verify that an [`IRModule`] is a well-formed trace.
///
/// Enforces SSA discipline (unique definitions, no use-before-def), operand
/// sanity for operator attributes, contiguous input numbering and the
/// synchronization of `next_id`.
pub fn verify_module(module: &IRModule) -> Result<(), IrVerifyError> {
    let mut defined: BTreeSet<ValueId> = BTreeSet::new();
    let mut saw_output = false;
    let mut max_seen = 0usize;
    let mut input_indices = Vec::new();

    for (idx, instr) in module.instrs.iter().enumerate() {
        for operand in instruction_operands(instr) {
            if !defined.contains(&operand) {
                return Err(IrVerifyError::UseBeforeDefinition {
                    value: operand,
                    instr_index: idx,
                });
            }
        }
        validate_attributes(idx, instr)?;

        for dst in instruction_dsts(instr) {
            if !defined.insert(dst) {
                return Err(IrVerifyError::DuplicateDefinition(dst));
            }
            max_seen = max_seen.max(dst.0 + 1);
        }

        match instr {
            Instr::Output { .. } => saw_output = true,
            Instr::Input { index, .. } => input_indices.push(*index),
            _ => {}
        }
    }

    if !saw_output {
        return Err(IrVerifyError::MissingOutput);
    }

    let mut sorted = input_indices.clone();
    sorted.sort_unstable();
    if sorted.iter().enumerate().any(|(pos, index)| pos != *index) {
        return Err(IrVerifyError::InputNumbering(input_indices));
    }

    if module.next_id < max_seen {
        return Err(IrVerifyError::NextIdOutOfSync {
            found: module.next_id,
            expected: max_seen,
        });
    }

    Ok(())
}

fn validate_attributes(instr_index: usize, instr: &Instr) -> Result<(), IrVerifyError> {
    let invalid = |message: &str| {
        Err(IrVerifyError::InvalidOperand {
            instr_index,
            message: message.to_string(),
        })
    };

    match instr {
        Instr::ConvTranspose {
            stride,
            padding,
            output_padding,
            dilation,
            groups,
            ..
        } => {
            let rank = stride.len();
            if rank == 0 || rank > 3 {
                return invalid("conv_transpose supports 1 to 3 spatial axes");
            }
            if padding.len() != rank || output_padding.len() != rank || dilation.len() != rank {
                return invalid("conv_transpose attribute lengths disagree");
            }
            if stride.contains(&0) || dilation.contains(&0) || *groups == 0 {
                return invalid("conv_transpose strides, dilations and groups must be positive");
            }
            if output_padding
                .iter()
                .zip(stride.iter().zip(dilation))
                .any(|(op, (s, d))| op >= s && op >= d)
            {
                return invalid("output_padding must be smaller than stride or dilation");
            }
        }
        Instr::MaxPool {
            kernel,
            stride,
            padding,
            dilation,
            ..
        } => {
            let rank = kernel.len();
            if rank == 0 || stride.len() != rank || padding.len() != rank || dilation.len() != rank
            {
                return invalid("max_pool attribute lengths disagree");
            }
            if kernel.contains(&0) || stride.contains(&0) || dilation.contains(&0) {
                return invalid("max_pool kernel, stride and dilation must be positive");
            }
            if padding.iter().zip(kernel).any(|(p, k)| p * 2 > *k) {
                return invalid("max_pool padding must be at most half the kernel size");
            }
        }
        Instr::AvgPool {
            kernel,
            stride,
            padding,
            ..
        } => {
            let rank = kernel.len();
            if rank == 0 || stride.len() != rank || padding.len() != rank {
                return invalid("avg_pool attribute lengths disagree");
            }
            if kernel.contains(&0) || stride.contains(&0) {
                return invalid("avg_pool kernel and stride must be positive");
            }
            if padding.iter().zip(kernel).any(|(p, k)| p * 2 > *k) {
                return invalid("avg_pool padding must be at most half the kernel size");
            }
        }
        Instr::Rnn {
            cells,
            hidden_size,
            num_layers,
            bidirectional,
            ..
        } => {
            let directions = if *bidirectional { 2 } else { 1 };
            if *hidden_size == 0 || *num_layers == 0 {
                return invalid("rnn hidden_size and num_layers must be positive");
            }
            if cells.len() != num_layers * directions {
                return invalid("rnn cell count must equal num_layers * directions");
            }
        }
        Instr::RRelu { lower, upper, .. } => {
            if !(lower <= upper) {
                return invalid("rrelu lower bound exceeds upper bound");
            }
        }
        Instr::Clamp { min, max, .. } => {
            if min.is_none() && max.is_none() {
                return invalid("clamp requires at least one bound");
            }
            if let (Some(lo), Some(hi)) = (min, max) {
                if lo > hi {
                    return invalid("clamp min exceeds max");
                }
            }
        }
        Instr::Normalize { p, eps, .. } => {
            if !(*p > 0.0) || !(*eps >= 0.0) {
                return invalid("normalize requires p > 0 and eps >= 0");
            }
        }
        Instr::Resize { size, scale, .. } => match (size, scale) {
            (Some(size), None) if size.len() == 2 && !size.contains(&0) => {}
            (None, Some(scale)) if scale.len() == 2 && scale.iter().all(|s| *s > 0.0) => {}
            _ => return invalid("resize requires exactly one of a 2d size or a positive 2d scale"),
        },
        _ => {}
    }

    Ok(())
}
