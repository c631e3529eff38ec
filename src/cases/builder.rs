//! Tracing graph builder.
//!
//! Models are written as ordinary Rust code against [`GraphBuilder`]; every
//! call records one operator into the module, exactly as tracing a concrete
//! forward pass would. Parameters are drawn from the parameter stream of the
//! case seed at the moment they are created, so build order is part of the
//! case definition.

use rand_chacha::ChaCha8Rng;

use crate::eval::value::TensorValue;
use crate::ir::{IRModule, Instr, ResizeMode, RnnCellWeights, RnnNonlinearity, ValueId};
use crate::types::{Precision, SeedStream, Shape};

/// Parameter initialization rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Init {
    /// Uniform `[0, 1)`.
    Unit,
    /// Uniform `[-bound, bound)`.
    Symmetric(f32),
}

pub struct GraphBuilder {
    module: IRModule,
    rng: ChaCha8Rng,
    precision: Precision,
    inputs: usize,
}

impl GraphBuilder {
    pub fn new(seed: u64, precision: Precision) -> Self {
        Self {
            module: IRModule::new(),
            rng: SeedStream::Parameters.rng(seed),
            precision,
            inputs: 0,
        }
    }

    fn push(&mut self, make: impl FnOnce(ValueId) -> Instr) -> ValueId {
        let dst = self.module.fresh();
        self.module.instrs.push(make(dst));
        dst
    }

    pub fn input(&mut self, shape: Shape) -> ValueId {
        let index = self.inputs;
        self.inputs += 1;
        self.push(|dst| Instr::Input { dst, index, shape })
    }

    /// Materialize a parameter tensor and bake it into the trace.
    pub fn parameter(&mut self, name: &str, shape: Shape, init: Init) -> ValueId {
        let value = match init {
            Init::Unit => TensorValue::random_uniform(shape, &mut self.rng),
            Init::Symmetric(bound) => TensorValue::random_range(shape, -bound, bound, &mut self.rng),
        };
        let precision = self.precision;
        let value = value.map(|v| precision.round(v));
        let name = name.to_string();
        self.push(|dst| Instr::Constant { dst, name, value })
    }

    pub fn affine(&mut self, src: ValueId, scale: f32, shift: f32) -> ValueId {
        self.push(|dst| Instr::Affine {
            dst,
            src,
            scale,
            shift,
        })
    }

    pub fn relu(&mut self, src: ValueId) -> ValueId {
        self.push(|dst| Instr::Relu { dst, src })
    }

    pub fn abs(&mut self, src: ValueId) -> ValueId {
        self.push(|dst| Instr::Abs { dst, src })
    }

    pub fn clamp(&mut self, src: ValueId, min: Option<f32>, max: Option<f32>) -> ValueId {
        self.push(|dst| Instr::Clamp { dst, src, min, max })
    }

    pub fn rrelu(&mut self, src: ValueId, lower: f32, upper: f32, training: bool) -> ValueId {
        self.push(|dst| Instr::RRelu {
            dst,
            src,
            lower,
            upper,
            training,
        })
    }

    pub fn softmax(&mut self, src: ValueId, axis: usize) -> ValueId {
        self.push(|dst| Instr::Softmax { dst, src, axis })
    }

    pub fn normalize(&mut self, src: ValueId, p: f32, axis: usize, eps: f32) -> ValueId {
        self.push(|dst| Instr::Normalize {
            dst,
            src,
            p,
            axis,
            eps,
        })
    }

    pub fn transpose(&mut self, src: ValueId, dim0: usize, dim1: usize) -> ValueId {
        self.push(|dst| Instr::Transpose {
            dst,
            src,
            dim0,
            dim1,
        })
    }

    pub fn permute(&mut self, src: ValueId, perm: Vec<usize>) -> ValueId {
        self.push(|dst| Instr::Permute { dst, src, perm })
    }

    pub fn reshape(&mut self, src: ValueId, shape: Shape) -> ValueId {
        self.push(|dst| Instr::Reshape { dst, src, shape })
    }

    pub fn conv_transpose(
        &mut self,
        input: ValueId,
        weight: ValueId,
        bias: Option<ValueId>,
        attrs: &ConvTransposeAttrs,
    ) -> ValueId {
        let attrs = attrs.clone();
        self.push(|dst| Instr::ConvTranspose {
            dst,
            input,
            weight,
            bias,
            stride: attrs.stride,
            padding: attrs.padding,
            output_padding: attrs.output_padding,
            dilation: attrs.dilation,
            groups: attrs.groups,
        })
    }

    pub fn max_pool(&mut self, src: ValueId, attrs: &PoolAttrs) -> ValueId {
        let attrs = attrs.clone();
        self.push(|dst| Instr::MaxPool {
            dst,
            src,
            kernel: attrs.kernel,
            stride: attrs.stride,
            padding: attrs.padding,
            dilation: attrs.dilation,
            ceil_mode: attrs.ceil_mode,
        })
    }

    pub fn avg_pool(&mut self, src: ValueId, attrs: &PoolAttrs, count_include_pad: bool) -> ValueId {
        let attrs = attrs.clone();
        self.push(|dst| Instr::AvgPool {
            dst,
            src,
            kernel: attrs.kernel,
            stride: attrs.stride,
            padding: attrs.padding,
            ceil_mode: attrs.ceil_mode,
            count_include_pad,
        })
    }

    pub fn resize(
        &mut self,
        src: ValueId,
        mode: ResizeMode,
        size: Option<Vec<usize>>,
        scale: Option<Vec<f32>>,
        align_corners: bool,
    ) -> ValueId {
        self.push(|dst| Instr::Resize {
            dst,
            src,
            mode,
            size,
            scale,
            align_corners,
        })
    }

    /// Trace one call of a recurrent module; returns `(output, h_n)`.
    pub fn rnn(&mut self, input: ValueId, h0: Option<ValueId>, module: &RnnModule) -> (ValueId, ValueId) {
        let output = self.module.fresh();
        let hidden = self.module.fresh();
        self.module.instrs.push(Instr::Rnn {
            output,
            hidden,
            input,
            h0,
            cells: module.cells.clone(),
            hidden_size: module.hidden_size,
            num_layers: module.num_layers,
            bidirectional: module.bidirectional,
            batch_first: module.batch_first,
            nonlinearity: module.nonlinearity,
        });
        (output, hidden)
    }

    /// Create the weights of a recurrent module. Weights are drawn up front,
    /// layer by layer and direction by direction, from
    /// `U(-1/sqrt(hidden), 1/sqrt(hidden))`.
    pub fn rnn_module(&mut self, name: &str, spec: &RnnSpec) -> RnnModule {
        let directions = if spec.bidirectional { 2 } else { 1 };
        let bound = 1.0 / (spec.hidden_size as f32).sqrt();
        let init = Init::Symmetric(bound);
        let mut cells = Vec::with_capacity(spec.num_layers * directions);
        for layer in 0..spec.num_layers {
            let in_features = if layer == 0 {
                spec.input_size
            } else {
                spec.hidden_size * directions
            };
            for direction in 0..directions {
                let suffix = if direction == 1 { "_reverse" } else { "" };
                let w_ih = self.parameter(
                    &format!("{name}.weight_ih_l{layer}{suffix}"),
                    vec![spec.hidden_size, in_features],
                    init,
                );
                let w_hh = self.parameter(
                    &format!("{name}.weight_hh_l{layer}{suffix}"),
                    vec![spec.hidden_size, spec.hidden_size],
                    init,
                );
                let (b_ih, b_hh) = if spec.bias {
                    (
                        Some(self.parameter(
                            &format!("{name}.bias_ih_l{layer}{suffix}"),
                            vec![spec.hidden_size],
                            init,
                        )),
                        Some(self.parameter(
                            &format!("{name}.bias_hh_l{layer}{suffix}"),
                            vec![spec.hidden_size],
                            init,
                        )),
                    )
                } else {
                    (None, None)
                };
                cells.push(RnnCellWeights {
                    w_ih,
                    w_hh,
                    b_ih,
                    b_hh,
                });
            }
        }
        RnnModule {
            cells,
            hidden_size: spec.hidden_size,
            num_layers: spec.num_layers,
            bidirectional: spec.bidirectional,
            batch_first: spec.batch_first,
            nonlinearity: spec.nonlinearity,
        }
    }

    pub fn output(&mut self, value: ValueId) {
        self.module.instrs.push(Instr::Output { src: value });
    }

    pub fn finish(self) -> IRModule {
        self.module
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ConvTransposeAttrs {
    pub stride: Vec<usize>,
    pub padding: Vec<usize>,
    pub output_padding: Vec<usize>,
    pub dilation: Vec<usize>,
    pub groups: usize,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PoolAttrs {
    pub kernel: Vec<usize>,
    pub stride: Vec<usize>,
    pub padding: Vec<usize>,
    pub dilation: Vec<usize>,
    pub ceil_mode: bool,
}

impl PoolAttrs {
    /// Window with stride equal to the kernel and no padding.
    pub fn kernel(kernel: Vec<usize>) -> Self {
        let rank = kernel.len();
        Self {
            stride: kernel.clone(),
            kernel,
            padding: vec![0; rank],
            dilation: vec![1; rank],
            ceil_mode: false,
        }
    }
}

/// Hyper-parameters of a recurrent module.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RnnSpec {
    pub input_size: usize,
    pub hidden_size: usize,
    pub num_layers: usize,
    pub bias: bool,
    pub bidirectional: bool,
    pub batch_first: bool,
    pub nonlinearity: RnnNonlinearity,
}

impl RnnSpec {
    pub fn new(input_size: usize, hidden_size: usize) -> Self {
        Self {
            input_size,
            hidden_size,
            num_layers: 1,
            bias: true,
            bidirectional: false,
            batch_first: false,
            nonlinearity: RnnNonlinearity::Tanh,
        }
    }
}

/// A recurrent module whose weights live in the trace. Calling it twice
/// through [`GraphBuilder::rnn`] shares the weights.
#[derive(Debug, Clone)]
pub struct RnnModule {
    cells: Vec<RnnCellWeights>,
    hidden_size: usize,
    num_layers: usize,
    bidirectional: bool,
    batch_first: bool,
    nonlinearity: RnnNonlinearity,
}
