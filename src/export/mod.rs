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

//! Export adapter: freezes a traced graph into the file the converter reads.
//!
//! The frozen graph is JSON with a format version, the case name, the
//! declared input shapes and every instruction with its parameters baked
//! in. It is written to `<dir>/<case>.trace.json`.

mod manifest;

pub use manifest::{ManifestParseError, ShapeManifest};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cases::CaseDefinition;
use crate::ir::{instruction_operands, verify_module, IRModule, IrVerifyError};
use crate::ops::registry::op_signature;
use crate::shapes::{infer_module_shapes, ShapeError};
use crate::types::{format_shape, Shape};

pub const FROZEN_GRAPH_VERSION: u32 = 1;
pub const TRACE_SUFFIX: &str = ".trace.json";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("traced graph is malformed: {0}")]
    Verify(#[from] IrVerifyError),
    #[error("operator `{op}` (instruction {instr_index}) is not in the operator registry")]
    UnsupportedOperator { op: String, instr_index: usize },
    #[error("operator `{op}` (instruction {instr_index}) has {count} operands")]
    OperandArity {
        op: String,
        instr_index: usize,
        count: usize,
    },
    #[error("traced graph does not fit its declared inputs: {0}")]
    Shape(#[from] ShapeError),
    #[error("case declares inputs {declared} but the traced graph reads {traced}")]
    InputMismatch { declared: String, traced: String },
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode frozen graph: {0}")]
    Encode(#[from] serde_json::Error),
}

/// On-disk form of a traced graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrozenGraph {
    pub format_version: u32,
    pub case: String,
    pub inputs: Vec<Shape>,
    pub module: IRModule,
}

impl FrozenGraph {
    pub fn load(path: &Path) -> Result<Self, FrozenGraphError> {
        let text = fs::read_to_string(path).map_err(|source| FrozenGraphError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let graph: FrozenGraph = serde_json::from_str(&text)?;
        if graph.format_version != FROZEN_GRAPH_VERSION {
            return Err(FrozenGraphError::Version(graph.format_version));
        }
        Ok(graph)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrozenGraphError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid frozen graph: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("unsupported frozen graph version {0}")]
    Version(u32),
}

/// A frozen graph on disk, ready to hand to a converter.
#[derive(Debug, Clone)]
pub struct ExportedGraph {
    pub case: String,
    pub trace_path: PathBuf,
    pub manifest: ShapeManifest,
    pub module: IRModule,
}

impl ExportedGraph {
    pub fn artifact_dir(&self) -> &Path {
        self.trace_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }

    /// File stem shared by every artifact derived from this trace.
    pub fn stem(&self) -> &str {
        &self.case
    }
}

/// Check that `module` can be frozen for `case`.
pub fn check_exportable(case: &CaseDefinition, module: &IRModule) -> Result<(), ExportError> {
    verify_module(module)?;
    for (instr_index, instr) in module.instrs.iter().enumerate() {
        let op = instr.op_name();
        let signature = op_signature(op).ok_or_else(|| ExportError::UnsupportedOperator {
            op: op.to_string(),
            instr_index,
        })?;
        let count = instruction_operands(instr).len();
        if !signature.arity.accepts(count) {
            return Err(ExportError::OperandArity {
                op: op.to_string(),
                instr_index,
                count,
            });
        }
    }
    let traced = module.input_shapes();
    if traced != case.inputs {
        let render = |shapes: &[Shape]| {
            shapes.iter().map(|s| format_shape(s)).collect::<Vec<_>>().join(",")
        };
        return Err(ExportError::InputMismatch {
            declared: render(&case.inputs),
            traced: render(&traced),
        });
    }
    infer_module_shapes(module)?;
    Ok(())
}

/// Freeze `module` into `<dir>/<case>.trace.json`.
pub fn export_case(case: &CaseDefinition, module: &IRModule, dir: &Path) -> Result<ExportedGraph, ExportError> {
    check_exportable(case, module)?;

    let frozen = FrozenGraph {
        format_version: FROZEN_GRAPH_VERSION,
        case: case.name.clone(),
        inputs: case.inputs.clone(),
        module: module.clone(),
    };
    let text = serde_json::to_string_pretty(&frozen)?;

    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ExportError::Io { path, source }
    };
    fs::create_dir_all(dir).map_err(io_err(dir))?;
    let trace_path = dir.join(format!("{}{TRACE_SUFFIX}", case.name));
    fs::write(&trace_path, text).map_err(io_err(&trace_path))?;

    tracing::debug!(case = %case.name, path = %trace_path.display(), "frozen graph written");
    Ok(ExportedGraph {
        case: case.name.clone(),
        trace_path,
        manifest: ShapeManifest::new(case.inputs.clone()),
        module: module.clone(),
    })
}
