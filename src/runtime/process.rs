use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::convert::{ConversionArtifact, ToolCommand};
use crate::eval::{OutputSet, TensorValue};
use crate::runtime::tensor_io::{read_bundle, write_bundle};
use crate::runtime::{ConvertedRuntime, RuntimeError};

/// Runs an external engine as
/// `<program> [args..] <engine> <inputs.json> <outputs.json> --seed <seed>`.
#[derive(Debug, Clone)]
pub struct ProcessRuntime {
    pub tool: ToolCommand,
}

impl ProcessRuntime {
    pub fn new(tool: ToolCommand) -> Self {
        Self { tool }
    }

    fn exchange_paths(artifact: &ConversionArtifact) -> (PathBuf, PathBuf) {
        let dir = artifact.engine_path.parent().unwrap_or_else(|| Path::new("."));
        (
            dir.join(format!("{}.inputs.json", artifact.case)),
            dir.join(format!("{}.outputs.json", artifact.case)),
        )
    }
}

impl ConvertedRuntime for ProcessRuntime {
    fn name(&self) -> &str {
        self.tool.program.to_str().unwrap_or("runtime")
    }

    fn execute(
        &self,
        artifact: &ConversionArtifact,
        inputs: &[TensorValue],
        seed: u64,
    ) -> Result<OutputSet, RuntimeError> {
        artifact.verify()?;
        let (inputs_path, outputs_path) = Self::exchange_paths(artifact);
        match fs::remove_file(&outputs_path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(RuntimeError::Io {
                    path: outputs_path,
                    source,
                })
            }
        }
        write_bundle(&inputs_path, inputs)?;

        let extra = [
            artifact.engine_path.clone().into_os_string(),
            inputs_path.into_os_string(),
            outputs_path.clone().into_os_string(),
            OsString::from("--seed"),
            OsString::from(seed.to_string()),
        ];
        self.tool.run(&extra)?;
        read_bundle(&outputs_path)
    }
}
