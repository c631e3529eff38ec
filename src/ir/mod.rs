//! Traced graph IR.
//!
//! A module is a straight-line SSA program: every instruction defines zero
//! or more fresh values, operands always refer to earlier definitions, and
//! `Output` instructions list the returned values in order. Parameters are
//! baked into the module as `Constant` instructions, so a module is a frozen
//! graph in the sense of a trace: it records exactly the operators one
//! concrete execution invoked.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::eval::value::TensorValue;

pub mod print;
pub mod verify;

pub use print::format_ir_module;
pub use verify::{verify_module, IrVerifyError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueId(pub usize);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RnnNonlinearity {
    Tanh,
    Relu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeMode {
    Nearest,
    Bilinear,
    Bicubic,
}

/// Weights for one (layer, direction) cell of an Elman RNN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RnnCellWeights {
    pub w_ih: ValueId,
    pub w_hh: ValueId,
    pub b_ih: Option<ValueId>,
    pub b_hh: Option<ValueId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instr {
    /// Declared graph input, in declaration order.
    Input {
        dst: ValueId,
        index: usize,
        shape: Vec<usize>,
    },
    /// Baked parameter tensor.
    Constant {
        dst: ValueId,
        name: String,
        value: TensorValue,
    },
    /// `src * scale + shift`, elementwise.
    Affine {
        dst: ValueId,
        src: ValueId,
        scale: f32,
        shift: f32,
    },
    Relu {
        dst: ValueId,
        src: ValueId,
    },
    Abs {
        dst: ValueId,
        src: ValueId,
    },
    Clamp {
        dst: ValueId,
        src: ValueId,
        min: Option<f32>,
        max: Option<f32>,
    },
    /// Randomized leaky ReLU. In evaluation mode the negative slope is the
    /// midpoint of `[lower, upper]`; in training mode it is drawn per element
    /// from the execution random stream.
    RRelu {
        dst: ValueId,
        src: ValueId,
        lower: f32,
        upper: f32,
        training: bool,
    },
    Softmax {
        dst: ValueId,
        src: ValueId,
        axis: usize,
    },
    /// `x / max(||x||_p, eps)` along `axis`.
    Normalize {
        dst: ValueId,
        src: ValueId,
        p: f32,
        axis: usize,
        eps: f32,
    },
    Transpose {
        dst: ValueId,
        src: ValueId,
        dim0: usize,
        dim1: usize,
    },
    Permute {
        dst: ValueId,
        src: ValueId,
        perm: Vec<usize>,
    },
    Reshape {
        dst: ValueId,
        src: ValueId,
        shape: Vec<usize>,
    },
    /// Transposed convolution over `stride.len()` spatial axes. The weight is
    /// laid out `[C_in, C_out / groups, k...]`.
    ConvTranspose {
        dst: ValueId,
        input: ValueId,
        weight: ValueId,
        bias: Option<ValueId>,
        stride: Vec<usize>,
        padding: Vec<usize>,
        output_padding: Vec<usize>,
        dilation: Vec<usize>,
        groups: usize,
    },
    MaxPool {
        dst: ValueId,
        src: ValueId,
        kernel: Vec<usize>,
        stride: Vec<usize>,
        padding: Vec<usize>,
        dilation: Vec<usize>,
        ceil_mode: bool,
    },
    AvgPool {
        dst: ValueId,
        src: ValueId,
        kernel: Vec<usize>,
        stride: Vec<usize>,
        padding: Vec<usize>,
        ceil_mode: bool,
        count_include_pad: bool,
    },
    /// Multi-layer Elman RNN. Defines the sequence output and the final
    /// hidden state. `cells` is indexed `layer * directions + direction`.
    Rnn {
        output: ValueId,
        hidden: ValueId,
        input: ValueId,
        h0: Option<ValueId>,
        cells: Vec<RnnCellWeights>,
        hidden_size: usize,
        num_layers: usize,
        bidirectional: bool,
        batch_first: bool,
        nonlinearity: RnnNonlinearity,
    },
    /// Spatial resize of an NCHW tensor. Exactly one of `size` and `scale`
    /// is set.
    Resize {
        dst: ValueId,
        src: ValueId,
        mode: ResizeMode,
        size: Option<Vec<usize>>,
        scale: Option<Vec<f32>>,
        align_corners: bool,
    },
    Output {
        src: ValueId,
    },
}

impl Instr {
    /// Operator name as recorded in the operator registry.
    pub fn op_name(&self) -> &'static str {
        match self {
            Instr::Input { .. } => "graph.input",
            Instr::Constant { .. } => "graph.constant",
            Instr::Affine { .. } => "tensor.affine",
            Instr::Relu { .. } => "nn.relu",
            Instr::Abs { .. } => "tensor.abs",
            Instr::Clamp { .. } => "tensor.clamp",
            Instr::RRelu { .. } => "nn.rrelu",
            Instr::Softmax { .. } => "nn.softmax",
            Instr::Normalize { .. } => "nn.normalize",
            Instr::Transpose { .. } => "tensor.transpose",
            Instr::Permute { .. } => "tensor.permute",
            Instr::Reshape { .. } => "tensor.reshape",
            Instr::ConvTranspose { .. } => "nn.conv_transpose",
            Instr::MaxPool { .. } => "nn.max_pool",
            Instr::AvgPool { .. } => "nn.avg_pool",
            Instr::Rnn { .. } => "nn.rnn",
            Instr::Resize { .. } => "nn.resize",
            Instr::Output { .. } => "graph.output",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IRModule {
    pub instrs: Vec<Instr>,
    pub next_id: usize,
}

impl IRModule {
    pub fn new() -> Self {
        Self {
            instrs: Vec::new(),
            next_id: 0,
        }
    }

    pub fn fresh(&mut self) -> ValueId {
        let id = self.next_id;
        self.next_id += 1;
        ValueId(id)
    }

    /// Declared input shapes in declaration order.
    pub fn input_shapes(&self) -> Vec<Vec<usize>> {
        let mut inputs: Vec<(usize, Vec<usize>)> = self
            .instrs
            .iter()
            .filter_map(|instr| match instr {
                Instr::Input { index, shape, .. } => Some((*index, shape.clone())),
                _ => None,
            })
            .collect();
        inputs.sort_by_key(|(index, _)| *index);
        inputs.into_iter().map(|(_, shape)| shape).collect()
    }

    /// Returned values in order.
    pub fn outputs(&self) -> Vec<ValueId> {
        self.instrs
            .iter()
            .filter_map(|instr| match instr {
                Instr::Output { src } => Some(*src),
                _ => None,
            })
            .collect()
    }
}

impl fmt::Display for IRModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_ir_module(self))
    }
}

/// Values defined by an instruction.
pub fn instruction_dsts(instr: &Instr) -> Vec<ValueId> {
    match instr {
        Instr::Input { dst, .. }
        | Instr::Constant { dst, .. }
        | Instr::Affine { dst, .. }
        | Instr::Relu { dst, .. }
        | Instr::Abs { dst, .. }
        | Instr::Clamp { dst, .. }
        | Instr::RRelu { dst, .. }
        | Instr::Softmax { dst, .. }
        | Instr::Normalize { dst, .. }
        | Instr::Transpose { dst, .. }
        | Instr::Permute { dst, .. }
        | Instr::Reshape { dst, .. }
        | Instr::ConvTranspose { dst, .. }
        | Instr::MaxPool { dst, .. }
        | Instr::AvgPool { dst, .. }
        | Instr::Resize { dst, .. } => vec![*dst],
        Instr::Rnn { output, hidden, .. } => vec![*output, *hidden],
        Instr::Output { .. } => Vec::new(),
    }
}

/// Values read by an instruction, in operand order.
pub fn instruction_operands(instr: &Instr) -> Vec<ValueId> {
    match instr {
        Instr::Input { .. } | Instr::Constant { .. } => Vec::new(),
        Instr::Affine { src, .. }
        | Instr::Relu { src, .. }
        | Instr::Abs { src, .. }
        | Instr::Clamp { src, .. }
        | Instr::RRelu { src, .. }
        | Instr::Softmax { src, .. }
        | Instr::Normalize { src, .. }
        | Instr::Transpose { src, .. }
        | Instr::Permute { src, .. }
        | Instr::Reshape { src, .. }
        | Instr::MaxPool { src, .. }
        | Instr::AvgPool { src, .. }
        | Instr::Resize { src, .. } => vec![*src],
        Instr::ConvTranspose {
            input,
            weight,
            bias,
            ..
        } => {
            let mut ops = vec![*input, *weight];
            ops.extend(bias.iter().copied());
            ops
        }
        Instr::Rnn {
            input, h0, cells, ..
        } => {
            let mut ops = vec![*input];
            ops.extend(h0.iter().copied());
            for cell in cells {
                ops.push(cell.w_ih);
                ops.push(cell.w_hh);
                ops.extend(cell.b_ih.iter().copied());
                ops.extend(cell.b_hh.iter().copied());
            }
            ops
        }
        Instr::Output { src } => vec![*src],
    }
}

/// Rewrite every operand equal to `from` into `to`.
pub fn replace_operand(instr: &mut Instr, from: ValueId, to: ValueId) {
    let swap = |id: &mut ValueId| {
        if *id == from {
            *id = to;
        }
    };
    match instr {
        Instr::Input { .. } | Instr::Constant { .. } => {}
        Instr::Affine { src, .. }
        | Instr::Relu { src, .. }
        | Instr::Abs { src, .. }
        | Instr::Clamp { src, .. }
        | Instr::RRelu { src, .. }
        | Instr::Softmax { src, .. }
        | Instr::Normalize { src, .. }
        | Instr::Transpose { src, .. }
        | Instr::Permute { src, .. }
        | Instr::Reshape { src, .. }
        | Instr::MaxPool { src, .. }
        | Instr::AvgPool { src, .. }
        | Instr::Resize { src, .. } => swap(src),
        Instr::ConvTranspose {
            input,
            weight,
            bias,
            ..
        } => {
            swap(input);
            swap(weight);
            if let Some(bias) = bias {
                swap(bias);
            }
        }
        Instr::Rnn {
            input, h0, cells, ..
        } => {
            swap(input);
            if let Some(h0) = h0 {
                swap(h0);
            }
            for cell in cells {
                swap(&mut cell.w_ih);
                swap(&mut cell.w_hh);
                if let Some(b) = &mut cell.b_ih {
                    swap(b);
                }
                if let Some(b) = &mut cell.b_hh {
                    swap(b);
                }
            }
        }
        Instr::Output { src } => swap(src),
    }
}
