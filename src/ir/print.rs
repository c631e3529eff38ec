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

use std::fmt::Write;

use crate::ir::{IRModule, Instr, ResizeMode, RnnNonlinearity, ValueId};
use crate::types::format_shape;

/// Format an [`IRModule`] into a stable, human-readable string.
pub fn format_ir_module(module: &IRModule) -> String {
    let mut out = String::new();
    let _ = writeln!(&mut out, "module {{");
    for instr in &module.instrs {
        format_instr(instr, &mut out);
    }
    let _ = writeln!(&mut out, "}}  // next_id = {}", module.next_id);
    out
}

fn format_instr(instr: &Instr, out: &mut String) {
    let line = match instr {
        Instr::Input { dst, index, shape } => format!(
            "{} = graph.input #{} {}",
            value_name(*dst),
            index,
            format_shape(shape)
        ),
        Instr::Constant { dst, name, value } => format!(
            "{} = graph.constant @{} {}",
            value_name(*dst),
            name,
            format_shape(value.shape())
        ),
        Instr::Affine {
            dst,
            src,
            scale,
            shift,
        } => format!(
            "{} = tensor.affine {} scale={:?} shift={:?}",
            value_name(*dst),
            value_name(*src),
            scale,
            shift
        ),
        Instr::Relu { dst, src } | Instr::Abs { dst, src } => {
            format!("{} = {} {}", value_name(*dst), instr.op_name(), value_name(*src))
        }
        Instr::Clamp { dst, src, min, max } => format!(
            "{} = tensor.clamp {} min={} max={}",
            value_name(*dst),
            value_name(*src),
            format_bound(*min),
            format_bound(*max)
        ),
        Instr::RRelu {
            dst,
            src,
            lower,
            upper,
            training,
        } => format!(
            "{} = nn.rrelu {} lower={:?} upper={:?} training={}",
            value_name(*dst),
            value_name(*src),
            lower,
            upper,
            training
        ),
        Instr::Softmax { dst, src, axis } => format!(
            "{} = nn.softmax {} axis={}",
            value_name(*dst),
            value_name(*src),
            axis
        ),
        Instr::Normalize {
            dst,
            src,
            p,
            axis,
            eps,
        } => format!(
            "{} = nn.normalize {} p={:?} axis={} eps={:?}",
            value_name(*dst),
            value_name(*src),
            p,
            axis,
            eps
        ),
        Instr::Transpose {
            dst,
            src,
            dim0,
            dim1,
        } => format!(
            "{} = tensor.transpose {} dims=({}, {})",
            value_name(*dst),
            value_name(*src),
            dim0,
            dim1
        ),
        Instr::Permute { dst, src, perm } => format!(
            "{} = tensor.permute {} perm={:?}",
            value_name(*dst),
            value_name(*src),
            perm
        ),
        Instr::Reshape { dst, src, shape } => format!(
            "{} = tensor.reshape {} {}",
            value_name(*dst),
            value_name(*src),
            format_shape(shape)
        ),
        Instr::ConvTranspose {
            dst,
            input,
            weight,
            bias,
            stride,
            padding,
            output_padding,
            dilation,
            groups,
        } => format!(
            "{} = nn.conv_transpose {}, {}, {} stride={:?} padding={:?} output_padding={:?} dilation={:?} groups={}",
            value_name(*dst),
            value_name(*input),
            value_name(*weight),
            bias.map(value_name).unwrap_or_else(|| "none".to_string()),
            stride,
            padding,
            output_padding,
            dilation,
            groups
        ),
        Instr::MaxPool {
            dst,
            src,
            kernel,
            stride,
            padding,
            dilation,
            ceil_mode,
        } => format!(
            "{} = nn.max_pool {} kernel={:?} stride={:?} padding={:?} dilation={:?} ceil_mode={}",
            value_name(*dst),
            value_name(*src),
            kernel,
            stride,
            padding,
            dilation,
            ceil_mode
        ),
        Instr::AvgPool {
            dst,
            src,
            kernel,
            stride,
            padding,
            ceil_mode,
            count_include_pad,
        } => format!(
            "{} = nn.avg_pool {} kernel={:?} stride={:?} padding={:?} ceil_mode={} count_include_pad={}",
            value_name(*dst),
            value_name(*src),
            kernel,
            stride,
            padding,
            ceil_mode,
            count_include_pad
        ),
        Instr::Rnn {
            output,
            hidden,
            input,
            h0,
            cells,
            hidden_size,
            num_layers,
            bidirectional,
            batch_first,
            nonlinearity,
        } => format!(
            "{}, {} = nn.rnn {}, {} hidden_size={} num_layers={} bidirectional={} batch_first={} nonlinearity={} cells={}",
            value_name(*output),
            value_name(*hidden),
            value_name(*input),
            h0.map(value_name).unwrap_or_else(|| "zeros".to_string()),
            hidden_size,
            num_layers,
            bidirectional,
            batch_first,
            match nonlinearity {
                RnnNonlinearity::Tanh => "tanh",
                RnnNonlinearity::Relu => "relu",
            },
            cells.len()
        ),
        Instr::Resize {
            dst,
            src,
            mode,
            size,
            scale,
            align_corners,
        } => {
            let target = match (size, scale) {
                (Some(size), _) => format!("size={}", format_shape(size)),
                (None, Some(scale)) => format!("scale={:?}", scale),
                (None, None) => "unset".to_string(),
            };
            format!(
                "{} = nn.resize {} mode={} {} align_corners={}",
                value_name(*dst),
                value_name(*src),
                match mode {
                    ResizeMode::Nearest => "nearest",
                    ResizeMode::Bilinear => "bilinear",
                    ResizeMode::Bicubic => "bicubic",
                },
                target,
                align_corners
            )
        }
        Instr::Output { src } => format!("graph.output {}", value_name(*src)),
    };
    let _ = writeln!(out, "  {line}");
}

fn value_name(id: ValueId) -> String {
    format!("%{}", id.0)
}

fn format_bound(bound: Option<f32>) -> String {
    bound
        .map(|b| format!("{b:?}"))
        .unwrap_or_else(|| "none".to_string())
}
