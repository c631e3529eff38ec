use std::collections::BTreeMap;
use std::fmt;

use crate::ir::{instruction_dsts, instruction_operands, IRModule, Instr, ValueId};
use crate::shapes::{conv_transpose_extent, pool_extent, resize_extent};
use crate::types::{format_shape, numel, Shape};

/// Error kinds produced by the shape engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeErrorKind {
    /// An operand refers to a value with no inferred shape.
    UnknownValue(ValueId),
    /// Rank of an operand does not fit the operator.
    RankMismatch { expected: String, actual: Vec<usize> },
    /// Two extents that must agree do not.
    ExtentMismatch { expected: String, actual: Vec<usize> },
    /// Axis index outside the operand rank.
    AxisOutOfRange { axis: usize, rank: usize },
    /// Permutation is not a bijection over the operand axes.
    InvalidPermutation { perm: Vec<usize>, rank: usize },
    /// Reshape changes the element count.
    ElementCount { from: Vec<usize>, to: Vec<usize> },
    /// Window arithmetic produced an empty output.
    EmptyOutput { input: Vec<usize> },
}

/// Rich shape error containing the operator name and a structured kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeError {
    pub op: String,
    pub kind: ShapeErrorKind,
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ShapeErrorKind::UnknownValue(id) => {
                write!(f, "op `{}` reads %{} which has no known shape", self.op, id)
            }
            ShapeErrorKind::RankMismatch { expected, actual } => write!(
                f,
                "rank mismatch for op `{}`: expected {}, got {}",
                self.op,
                expected,
                format_shape(actual)
            ),
            ShapeErrorKind::ExtentMismatch { expected, actual } => write!(
                f,
                "extent mismatch for op `{}`: expected {}, got {}",
                self.op,
                expected,
                format_shape(actual)
            ),
            ShapeErrorKind::AxisOutOfRange { axis, rank } => write!(
                f,
                "axis {} out of range for rank {} in op `{}`",
                axis, rank, self.op
            ),
            ShapeErrorKind::InvalidPermutation { perm, rank } => write!(
                f,
                "invalid permutation {:?} for rank {} in op `{}`",
                perm, rank, self.op
            ),
            ShapeErrorKind::ElementCount { from, to } => write!(
                f,
                "op `{}` cannot reshape {} into {}",
                self.op,
                format_shape(from),
                format_shape(to)
            ),
            ShapeErrorKind::EmptyOutput { input } => write!(
                f,
                "op `{}` produces an empty output for input {}",
                self.op,
                format_shape(input)
            ),
        }
    }
}

impl std::error::Error for ShapeError {}

/// Infer the shape of every value defined in `module`.
pub fn infer_module_shapes(module: &IRModule) -> Result<BTreeMap<ValueId, Shape>, ShapeError> {
    let mut shapes: BTreeMap<ValueId, Shape> = BTreeMap::new();
    for instr in &module.instrs {
        let operands = instruction_operands(instr);
        let mut operand_shapes: Vec<&[usize]> = Vec::with_capacity(operands.len());
        for id in &operands {
            let shape = shapes.get(id).ok_or_else(|| ShapeError {
                op: instr.op_name().to_string(),
                kind: ShapeErrorKind::UnknownValue(*id),
            })?;
            operand_shapes.push(shape);
        }
        let outputs = infer_output_shapes(instr, &operand_shapes)?;
        for (dst, shape) in instruction_dsts(instr).into_iter().zip(outputs) {
            shapes.insert(dst, shape);
        }
    }
    Ok(shapes)
}

/// Infer the output shapes of one instruction given its operand shapes, in
/// the order returned by [`instruction_operands`].
pub fn infer_output_shapes(instr: &Instr, operands: &[&[usize]]) -> Result<Vec<Shape>, ShapeError> {
    let op = instr.op_name();
    let err = |kind: ShapeErrorKind| ShapeError {
        op: op.to_string(),
        kind,
    };
    let first = || operands.first().copied().unwrap_or(&[]);

    match instr {
        Instr::Input { shape, .. } => Ok(vec![shape.clone()]),
        Instr::Constant { value, .. } => Ok(vec![value.shape().to_vec()]),
        Instr::Output { .. } => Ok(Vec::new()),
        Instr::Affine { .. }
        | Instr::Relu { .. }
        | Instr::Abs { .. }
        | Instr::Clamp { .. }
        | Instr::RRelu { .. } => Ok(vec![first().to_vec()]),
        Instr::Softmax { axis, .. } | Instr::Normalize { axis, .. } => {
            let input = first();
            if *axis >= input.len() {
                return Err(err(ShapeErrorKind::AxisOutOfRange {
                    axis: *axis,
                    rank: input.len(),
                }));
            }
            Ok(vec![input.to_vec()])
        }
        Instr::Transpose { dim0, dim1, .. } => {
            let input = first();
            for axis in [*dim0, *dim1] {
                if axis >= input.len() {
                    return Err(err(ShapeErrorKind::AxisOutOfRange {
                        axis,
                        rank: input.len(),
                    }));
                }
            }
            let mut out = input.to_vec();
            out.swap(*dim0, *dim1);
            Ok(vec![out])
        }
        Instr::Permute { perm, .. } => {
            let input = first();
            let mut seen = vec![false; input.len()];
            let valid = perm.len() == input.len()
                && perm
                    .iter()
                    .all(|&axis| axis < input.len() && !std::mem::replace(&mut seen[axis], true));
            if !valid {
                return Err(err(ShapeErrorKind::InvalidPermutation {
                    perm: perm.clone(),
                    rank: input.len(),
                }));
            }
            Ok(vec![perm.iter().map(|&axis| input[axis]).collect()])
        }
        Instr::Reshape { shape, .. } => {
            let input = first();
            if numel(input) != numel(shape) {
                return Err(err(ShapeErrorKind::ElementCount {
                    from: input.to_vec(),
                    to: shape.clone(),
                }));
            }
            Ok(vec![shape.clone()])
        }
        Instr::ConvTranspose {
            bias,
            stride,
            padding,
            output_padding,
            dilation,
            groups,
            ..
        } => {
            let spatial = stride.len();
            let input = first();
            let weight = operands.get(1).copied().unwrap_or(&[]);
            if input.len() != spatial + 2 {
                return Err(err(ShapeErrorKind::RankMismatch {
                    expected: format!("input of rank {}", spatial + 2),
                    actual: input.to_vec(),
                }));
            }
            if weight.len() != spatial + 2 {
                return Err(err(ShapeErrorKind::RankMismatch {
                    expected: format!("weight of rank {}", spatial + 2),
                    actual: weight.to_vec(),
                }));
            }
            if weight[0] != input[1] || input[1] % groups != 0 {
                return Err(err(ShapeErrorKind::ExtentMismatch {
                    expected: format!(
                        "weight[0] == input channels {} divisible by {} groups",
                        input[1], groups
                    ),
                    actual: weight.to_vec(),
                }));
            }
            let out_channels = weight[1] * groups;
            if bias.is_some() {
                let bias_shape = operands.get(2).copied().unwrap_or(&[]);
                if bias_shape != [out_channels] {
                    return Err(err(ShapeErrorKind::ExtentMismatch {
                        expected: format!("bias of shape [{out_channels}]"),
                        actual: bias_shape.to_vec(),
                    }));
                }
            }
            let mut out = vec![input[0], out_channels];
            for axis in 0..spatial {
                let extent = conv_transpose_extent(
                    input[axis + 2],
                    weight[axis + 2],
                    stride[axis],
                    padding[axis],
                    output_padding[axis],
                    dilation[axis],
                )
                .ok_or_else(|| {
                    err(ShapeErrorKind::EmptyOutput {
                        input: input.to_vec(),
                    })
                })?;
                out.push(extent);
            }
            Ok(vec![out])
        }
        Instr::MaxPool {
            kernel,
            stride,
            padding,
            dilation,
            ceil_mode,
            ..
        } => pool_output(op, first(), kernel, stride, padding, dilation, *ceil_mode)
            .map(|shape| vec![shape]),
        Instr::AvgPool {
            kernel,
            stride,
            padding,
            ceil_mode,
            ..
        } => {
            let ones = vec![1; kernel.len()];
            pool_output(op, first(), kernel, stride, padding, &ones, *ceil_mode)
                .map(|shape| vec![shape])
        }
        Instr::Rnn {
            h0,
            cells,
            hidden_size,
            num_layers,
            bidirectional,
            batch_first,
            ..
        } => {
            let input = first();
            if input.len() != 3 {
                return Err(err(ShapeErrorKind::RankMismatch {
                    expected: "sequence input of rank 3".to_string(),
                    actual: input.to_vec(),
                }));
            }
            let directions = if *bidirectional { 2 } else { 1 };
            let (steps, batch) = if *batch_first {
                (input[1], input[0])
            } else {
                (input[0], input[1])
            };
            let hidden_shape = vec![num_layers * directions, batch, *hidden_size];

            let mut cursor = 1;
            if h0.is_some() {
                let h0_shape = operands.get(cursor).copied().unwrap_or(&[]);
                if h0_shape != hidden_shape.as_slice() {
                    return Err(err(ShapeErrorKind::ExtentMismatch {
                        expected: format!("initial hidden state {}", format_shape(&hidden_shape)),
                        actual: h0_shape.to_vec(),
                    }));
                }
                cursor += 1;
            }
            for (index, cell) in cells.iter().enumerate() {
                let layer = index / directions;
                let in_features = if layer == 0 {
                    input[2]
                } else {
                    hidden_size * directions
                };
                let mut expect = |expected: Vec<usize>| -> Result<(), ShapeError> {
                    let actual = operands.get(cursor).copied().unwrap_or(&[]);
                    cursor += 1;
                    if actual != expected.as_slice() {
                        return Err(err(ShapeErrorKind::ExtentMismatch {
                            expected: format!("rnn cell {} weight {}", index, format_shape(&expected)),
                            actual: actual.to_vec(),
                        }));
                    }
                    Ok(())
                };
                expect(vec![*hidden_size, in_features])?;
                expect(vec![*hidden_size, *hidden_size])?;
                if cell.b_ih.is_some() {
                    expect(vec![*hidden_size])?;
                }
                if cell.b_hh.is_some() {
                    expect(vec![*hidden_size])?;
                }
            }

            let output = if *batch_first {
                vec![batch, steps, hidden_size * directions]
            } else {
                vec![steps, batch, hidden_size * directions]
            };
            Ok(vec![output, hidden_shape])
        }
        Instr::Resize { size, scale, .. } => {
            let input = first();
            if input.len() != 4 {
                return Err(err(ShapeErrorKind::RankMismatch {
                    expected: "NCHW input of rank 4".to_string(),
                    actual: input.to_vec(),
                }));
            }
            let mut out = input[..2].to_vec();
            for axis in 0..2 {
                let extent = resize_extent(
                    input[axis + 2],
                    size.as_ref().map(|s| s[axis]),
                    scale.as_ref().map(|s| s[axis]),
                )
                .ok_or_else(|| {
                    err(ShapeErrorKind::EmptyOutput {
                        input: input.to_vec(),
                    })
                })?;
                out.push(extent);
            }
            Ok(vec![out])
        }
    }
}

/// Pooling accepts a batched `[N, C, spatial...]` or unbatched
/// `[C, spatial...]` operand.
fn pool_output(
    op: &str,
    input: &[usize],
    kernel: &[usize],
    stride: &[usize],
    padding: &[usize],
    dilation: &[usize],
    ceil_mode: bool,
) -> Result<Shape, ShapeError> {
    let spatial = kernel.len();
    if input.len() != spatial + 1 && input.len() != spatial + 2 {
        return Err(ShapeError {
            op: op.to_string(),
            kind: ShapeErrorKind::RankMismatch {
                expected: format!("input of rank {} or {}", spatial + 1, spatial + 2),
                actual: input.to_vec(),
            },
        });
    }
    let lead = input.len() - spatial;
    let mut out = input[..lead].to_vec();
    for axis in 0..spatial {
        let extent = pool_extent(
            input[lead + axis],
            kernel[axis],
            stride[axis],
            padding[axis],
            dilation[axis],
            ceil_mode,
        )
        .ok_or_else(|| ShapeError {
            op: op.to_string(),
            kind: ShapeErrorKind::EmptyOutput {
                input: input.to_vec(),
            },
        })?;
        out.push(extent);
    }
    Ok(out)
}
