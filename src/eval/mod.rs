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

//! Reference executor: evaluates a traced graph with source-framework
//! semantics.

use crate::ir::{verify_module, IRModule, IrVerifyError, ValueId};
use crate::shapes::ShapeError;
use crate::types::{format_shape, SeedStream};

pub mod conv;
pub mod elementwise;
pub mod ir_interp;
pub mod pool;
pub mod resize;
pub mod rnn;
pub mod value;

pub use ir_interp::eval_ir;
pub use value::{OutputSet, TensorError, TensorValue};

#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("graph failed verification: {0}")]
    Verify(#[from] IrVerifyError),
    #[error("graph declares {expected} inputs but {actual} were supplied")]
    InputCount { expected: usize, actual: usize },
    #[error("input {index} has shape {actual}, graph declares {expected}")]
    InputShape {
        index: usize,
        expected: String,
        actual: String,
    },
    #[error("{0}")]
    Shape(#[from] ShapeError),
    #[error("{0}")]
    Tensor(#[from] TensorError),
    #[error("value %{0} was read before it was computed")]
    MissingValue(ValueId),
}

/// Evaluates traced graphs in process.
///
/// Each call re-creates the execution random stream from the seed, so two
/// evaluations with the same module, inputs and seed are bit-identical.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceExecutor;

impl ReferenceExecutor {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(
        &self,
        module: &IRModule,
        inputs: &[TensorValue],
        seed: u64,
    ) -> Result<OutputSet, EvalError> {
        verify_module(module)?;
        let declared = module.input_shapes();
        if declared.len() != inputs.len() {
            return Err(EvalError::InputCount {
                expected: declared.len(),
                actual: inputs.len(),
            });
        }
        for (index, (shape, value)) in declared.iter().zip(inputs).enumerate() {
            if value.shape() != shape.as_slice() {
                return Err(EvalError::InputShape {
                    index,
                    expected: format_shape(shape),
                    actual: format_shape(value.shape()),
                });
            }
        }

        let mut rng = SeedStream::Execution.rng(seed);
        eval_ir(module, inputs, &mut rng)
    }
}
