//! Converted executors.
//!
//! A runtime consumes a [`ConversionArtifact`] once, re-verifies the digests
//! recorded at conversion time, feeds it the exact input tensors used by the
//! reference path and returns its outputs in slot order. The external
//! runtime is a black box behind [`ConvertedRuntime`]; [`InterpreterRuntime`]
//! is the in-process counterpart of the loopback converter.

pub mod interpreter;
pub mod process;
pub mod tensor_io;
pub mod types;

pub use interpreter::InterpreterRuntime;
pub use process::ProcessRuntime;
pub use tensor_io::{read_bundle, write_bundle, TensorBundle};
pub use types::RuntimeError;

use crate::convert::ConversionArtifact;
use crate::eval::{OutputSet, TensorValue};

pub trait ConvertedRuntime: Send + Sync {
    /// Short name used in logs and reports.
    fn name(&self) -> &str;

    fn execute(
        &self,
        artifact: &ConversionArtifact,
        inputs: &[TensorValue],
        seed: u64,
    ) -> Result<OutputSet, RuntimeError>;
}
