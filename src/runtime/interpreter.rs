use crate::convert::{ConversionArtifact, EngineArtifact};
use crate::eval::{EvalError, OutputSet, ReferenceExecutor, TensorValue};
use crate::runtime::{ConvertedRuntime, RuntimeError};

/// Executes loopback engine artifacts with the crate interpreter.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterpreterRuntime {
    /// Drop a leading unit batch axis from every output, the way engines
    /// without an explicit batch dimension report results.
    pub squeeze_batch: bool,
}

impl InterpreterRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn squeezing_batch() -> Self {
        Self { squeeze_batch: true }
    }
}

fn drop_batch_axis(tensor: TensorValue) -> Result<TensorValue, RuntimeError> {
    match tensor.shape() {
        [1, rest @ ..] if !rest.is_empty() => {
            let shape = rest.to_vec();
            tensor
                .reshape(shape)
                .map_err(|e| RuntimeError::Execution(EvalError::from(e)))
        }
        _ => Ok(tensor),
    }
}

impl ConvertedRuntime for InterpreterRuntime {
    fn name(&self) -> &str {
        "interpreter"
    }

    fn execute(
        &self,
        artifact: &ConversionArtifact,
        inputs: &[TensorValue],
        seed: u64,
    ) -> Result<OutputSet, RuntimeError> {
        artifact.verify()?;
        let engine = EngineArtifact::load(&artifact.engine_path)?;
        let outputs = ReferenceExecutor::new().evaluate(&engine.module, inputs, seed)?;
        if !self.squeeze_batch {
            return Ok(outputs);
        }
        let squeezed = outputs
            .tensors
            .into_iter()
            .map(drop_batch_axis)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(OutputSet::new(squeezed))
    }
}
