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

use std::collections::HashMap;

use rand_chacha::ChaCha8Rng;

use crate::eval::conv::{conv_transpose, ConvTransposeParams};
use crate::eval::elementwise;
use crate::eval::pool::{avg_pool, max_pool, PoolWindow};
use crate::eval::resize::resize;
use crate::eval::rnn::{rnn, RnnCell, RnnConfig};
use crate::eval::value::{OutputSet, TensorValue};
use crate::eval::EvalError;
use crate::ir::{instruction_operands, IRModule, Instr, ValueId};
use crate::shapes::infer_output_shapes;
use crate::types::format_shape;

/// Run every instruction of a verified module in order.
///
/// `rng` is the execution random stream; only stochastic operators draw
/// from it, in instruction order.
pub fn eval_ir(
    ir: &IRModule,
    inputs: &[TensorValue],
    rng: &mut ChaCha8Rng,
) -> Result<OutputSet, EvalError> {
    let mut vals: HashMap<ValueId, TensorValue> = HashMap::new();
    let mut outputs = Vec::new();

    for instr in &ir.instrs {
        let operand_ids = instruction_operands(instr);
        let mut operands = Vec::with_capacity(operand_ids.len());
        for id in &operand_ids {
            operands.push(vals.get(id).ok_or(EvalError::MissingValue(*id))?);
        }
        let operand_shapes: Vec<&[usize]> = operands.iter().map(|t| t.shape()).collect();
        let out_shapes = infer_output_shapes(instr, &operand_shapes)?;
        let first = || operands[0];

        let produced: Vec<(ValueId, TensorValue)> = match instr {
            Instr::Input { dst, index, shape } => {
                let value = inputs.get(*index).ok_or(EvalError::InputCount {
                    expected: index + 1,
                    actual: inputs.len(),
                })?;
                if value.shape() != shape.as_slice() {
                    return Err(EvalError::InputShape {
                        index: *index,
                        expected: format_shape(shape),
                        actual: format_shape(value.shape()),
                    });
                }
                vec![(*dst, value.clone())]
            }
            Instr::Constant { dst, value, .. } => vec![(*dst, value.clone())],
            Instr::Affine {
                dst, scale, shift, ..
            } => vec![(*dst, elementwise::affine(first(), *scale, *shift))],
            Instr::Relu { dst, .. } => vec![(*dst, elementwise::relu(first()))],
            Instr::Abs { dst, .. } => vec![(*dst, elementwise::abs(first()))],
            Instr::Clamp { dst, min, max, .. } => {
                vec![(*dst, elementwise::clamp(first(), *min, *max))]
            }
            Instr::RRelu {
                dst,
                lower,
                upper,
                training,
                ..
            } => vec![(
                *dst,
                elementwise::rrelu(first(), *lower, *upper, *training, rng)?,
            )],
            Instr::Softmax { dst, axis, .. } => {
                vec![(*dst, elementwise::softmax(first(), *axis)?)]
            }
            Instr::Normalize {
                dst, p, axis, eps, ..
            } => vec![(*dst, elementwise::normalize(first(), *p, *axis, *eps)?)],
            Instr::Transpose {
                dst, dim0, dim1, ..
            } => vec![(*dst, first().transpose(*dim0, *dim1)?)],
            Instr::Permute { dst, perm, .. } => vec![(*dst, first().permute(perm)?)],
            Instr::Reshape { dst, shape, .. } => vec![(*dst, first().reshape(shape.clone())?)],
            Instr::ConvTranspose {
                dst,
                bias,
                stride,
                padding,
                dilation,
                groups,
                ..
            } => {
                let params = ConvTransposeParams {
                    stride,
                    padding,
                    dilation,
                    groups: *groups,
                };
                let bias = bias.map(|_| operands[2]);
                vec![(
                    *dst,
                    conv_transpose(operands[0], operands[1], bias, params, &out_shapes[0])?,
                )]
            }
            Instr::MaxPool {
                dst,
                kernel,
                stride,
                padding,
                dilation,
                ..
            } => {
                let window = PoolWindow {
                    kernel,
                    stride,
                    padding,
                    dilation,
                };
                vec![(*dst, max_pool(first(), window, &out_shapes[0])?)]
            }
            Instr::AvgPool {
                dst,
                kernel,
                stride,
                padding,
                count_include_pad,
                ..
            } => {
                let ones = vec![1; kernel.len()];
                let window = PoolWindow {
                    kernel,
                    stride,
                    padding,
                    dilation: &ones,
                };
                vec![(
                    *dst,
                    avg_pool(first(), window, *count_include_pad, &out_shapes[0])?,
                )]
            }
            Instr::Rnn {
                output,
                hidden,
                h0,
                cells,
                hidden_size,
                num_layers,
                bidirectional,
                batch_first,
                nonlinearity,
                ..
            } => {
                let mut cursor = 1;
                let h0 = h0.map(|_| {
                    cursor += 1;
                    operands[1]
                });
                let mut bound = Vec::with_capacity(cells.len());
                for cell in cells {
                    let w_ih = operands[cursor];
                    let w_hh = operands[cursor + 1];
                    cursor += 2;
                    let b_ih = cell.b_ih.map(|_| {
                        cursor += 1;
                        operands[cursor - 1]
                    });
                    let b_hh = cell.b_hh.map(|_| {
                        cursor += 1;
                        operands[cursor - 1]
                    });
                    bound.push(RnnCell {
                        w_ih,
                        w_hh,
                        b_ih,
                        b_hh,
                    });
                }
                let config = RnnConfig {
                    hidden_size: *hidden_size,
                    num_layers: *num_layers,
                    bidirectional: *bidirectional,
                    batch_first: *batch_first,
                    nonlinearity: *nonlinearity,
                };
                let (out, h_n) = rnn(operands[0], h0, &bound, config)?;
                vec![(*output, out), (*hidden, h_n)]
            }
            Instr::Resize {
                dst,
                mode,
                scale,
                align_corners,
                ..
            } => vec![(
                *dst,
                resize(
                    first(),
                    *mode,
                    scale.as_deref(),
                    *align_corners,
                    &out_shapes[0],
                )?,
            )],
            Instr::Output { .. } => {
                outputs.push(first().clone());
                Vec::new()
            }
        };

        for (dst, value) in produced {
            tracing::trace!(
                op = instr.op_name(),
                value = %dst,
                shape = %format_shape(value.shape()),
                "evaluated"
            );
            vals.insert(dst, value);
        }
    }

    Ok(OutputSet::new(outputs))
}
