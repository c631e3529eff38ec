//! Case definitions: a model, its declared inputs, a seed and the rules for
//! judging the converted outputs.
//!
//! A [`CaseDefinition`] is immutable. Building its graph or materializing
//! its inputs derives everything from the seed, so two calls always return
//! identical values.

use serde::Serialize;

use crate::compare::CompareMode;
use crate::eval::value::TensorValue;
use crate::ir::{verify_module, IRModule, IrVerifyError, ResizeMode};
use crate::reconcile::OutputLayout;
use crate::shapes::{infer_module_shapes, ShapeError};
use crate::types::{Precision, SeedStream, Shape};

pub mod builder;
pub mod catalog;
pub mod models;

pub use builder::{ConvTransposeAttrs, GraphBuilder, Init, PoolAttrs, RnnSpec};
pub use catalog::{all_cases, cases_for_family, families, find_case};

#[derive(Debug, thiserror::Error)]
pub enum CaseError {
    #[error("model expects {expected} inputs but the case declares {actual}")]
    InputArity { expected: usize, actual: usize },
    #[error("chain reads input {input} but the case declares only {declared}")]
    UnknownInput { input: usize, declared: usize },
    #[error("traced graph is malformed: {0}")]
    Verify(#[from] IrVerifyError),
    #[error("traced graph does not fit the declared inputs: {0}")]
    Shape(#[from] ShapeError),
}

/// One operator application inside a [`Chain`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LayerOp {
    Affine {
        scale: f32,
        shift: f32,
    },
    Relu,
    Abs,
    Clamp {
        min: Option<f32>,
        max: Option<f32>,
    },
    RRelu {
        lower: f32,
        upper: f32,
        training: bool,
    },
    Softmax {
        axis: usize,
    },
    Normalize {
        p: f32,
        axis: usize,
        eps: f32,
    },
    Transpose {
        dim0: usize,
        dim1: usize,
    },
    Permute {
        perm: Vec<usize>,
    },
    Reshape {
        shape: Shape,
    },
    /// Transposed convolution whose weight (and optional bias) are fresh
    /// parameters drawn when the op is traced.
    ConvTranspose {
        weight: Shape,
        bias: bool,
        attrs: ConvTransposeAttrs,
    },
    MaxPool(PoolAttrs),
    AvgPool {
        attrs: PoolAttrs,
        count_include_pad: bool,
    },
    Resize {
        mode: ResizeMode,
        size: Option<Vec<usize>>,
        scale: Option<Vec<f32>>,
        align_corners: bool,
    },
}

/// A straight chain of ops applied to one graph input; its final value is
/// one graph output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chain {
    pub input: usize,
    pub ops: Vec<LayerOp>,
}

impl Chain {
    pub fn new(input: usize, ops: Vec<LayerOp>) -> Self {
        Self { input, ops }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSpec {
    /// Independent chains, one output each, in chain order.
    Chains { chains: Vec<Chain> },
    /// One recurrent module over input 0. With `with_h0` input 1 is the
    /// initial hidden state; with `return_hidden` the final hidden state is
    /// a second output.
    Rnn {
        spec: RnnSpec,
        with_h0: bool,
        return_hidden: bool,
    },
    /// Two stacks of recurrent modules chained through their hidden states:
    /// a time-major stack over a permuted input 0 and a batch-first stack
    /// over input 1 that calls one module twice.
    RnnStacks { hidden_size: usize },
}

impl ModelSpec {
    pub fn chains(chains: Vec<Chain>) -> Self {
        ModelSpec::Chains { chains }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseDefinition {
    pub name: String,
    pub family: String,
    pub model: ModelSpec,
    pub inputs: Vec<Shape>,
    pub seed: u64,
    pub precision: Precision,
    pub compare: CompareMode,
    /// Expected converted layout per output slot. Missing entries are
    /// [`OutputLayout::Native`].
    pub layouts: Vec<OutputLayout>,
}

impl CaseDefinition {
    pub fn new(name: &str, family: &str, model: ModelSpec, inputs: Vec<Shape>, compare: CompareMode) -> Self {
        Self {
            name: name.to_string(),
            family: family.to_string(),
            model,
            inputs,
            seed: 0,
            precision: Precision::Full,
            compare,
            layouts: Vec::new(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_layouts(mut self, layouts: Vec<OutputLayout>) -> Self {
        self.layouts = layouts;
        self
    }

    /// Layout expected for output `slot`.
    pub fn layout(&self, slot: usize) -> OutputLayout {
        self.layouts.get(slot).cloned().unwrap_or_default()
    }

    /// Trace the model into a verified graph whose shapes fit the declared
    /// inputs.
    pub fn build_graph(&self) -> Result<IRModule, CaseError> {
        let mut builder = GraphBuilder::new(self.seed, self.precision);
        models::trace(&self.model, &self.inputs, &mut builder)?;
        let module = builder.finish();
        verify_module(&module)?;
        infer_module_shapes(&module)?;
        Ok(module)
    }

    /// Uniform `[0, 1)` input tensors in declaration order.
    pub fn materialize_inputs(&self) -> Vec<TensorValue> {
        let mut rng = SeedStream::Inputs.rng(self.seed);
        self.inputs
            .iter()
            .map(|shape| TensorValue::random_uniform(shape.clone(), &mut rng))
            .collect()
    }
}
