//! In-process converter.
//!
//! Reads the frozen graph back from disk, canonicalizes it and writes both
//! artifacts the same way an external converter would. Used for self-tests
//! and for running the suite without external tooling.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::convert::{remove_stale, ArtifactNaming, ConversionArtifact, ConversionError, Converter};
use crate::export::{ExportedGraph, FrozenGraph, FrozenGraphError};
use crate::ir::IRModule;
use crate::opt::canonicalize_module;
use crate::types::Shape;

pub const ENGINE_FORMAT_VERSION: u32 = 1;

/// Engine artifact written by the loopback converter and executed by
/// [`crate::runtime::InterpreterRuntime`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineArtifact {
    pub format_version: u32,
    pub case: String,
    pub inputs: Vec<Shape>,
    pub module: IRModule,
}

impl EngineArtifact {
    pub fn load(path: &Path) -> Result<Self, FrozenGraphError> {
        let text = fs::read_to_string(path).map_err(|source| FrozenGraphError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let engine: EngineArtifact = serde_json::from_str(&text)?;
        if engine.format_version != ENGINE_FORMAT_VERSION {
            return Err(FrozenGraphError::Version(engine.format_version));
        }
        Ok(engine)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoopbackConverter {
    pub naming: ArtifactNaming,
}

impl LoopbackConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_naming(naming: ArtifactNaming) -> Self {
        Self { naming }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ConversionError> {
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text).map_err(|source| ConversionError::Io {
        path: path.to_path_buf(),
        source,
    })
}

impl Converter for LoopbackConverter {
    fn name(&self) -> &str {
        "loopback"
    }

    fn convert(&self, graph: &ExportedGraph) -> Result<ConversionArtifact, ConversionError> {
        let ir_path = self.naming.ir_path(graph);
        let engine_path = self.naming.engine_path(graph);
        remove_stale(&[&ir_path, &engine_path])?;

        let frozen = FrozenGraph::load(&graph.trace_path)?;
        let mut module = frozen.module;
        let stats = canonicalize_module(&mut module)?;
        tracing::debug!(
            case = %frozen.case,
            resizes_removed = stats.resizes_removed,
            instrs_pruned = stats.instrs_pruned,
            "canonicalized"
        );

        let ir = FrozenGraph {
            format_version: frozen.format_version,
            case: frozen.case.clone(),
            inputs: frozen.inputs.clone(),
            module: module.clone(),
        };
        write_json(&ir_path, &ir)?;
        write_json(
            &engine_path,
            &EngineArtifact {
                format_version: ENGINE_FORMAT_VERSION,
                case: frozen.case,
                inputs: frozen.inputs,
                module,
            },
        )?;

        ConversionArtifact::collect(&graph.case, ir_path, engine_path)
    }
}
