//! Error surface shared by the converted executors.

use std::io;
use std::path::PathBuf;

use crate::convert::{ArtifactIntegrityError, ToolError};
use crate::eval::EvalError;
use crate::export::FrozenGraphError;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Integrity(#[from] ArtifactIntegrityError),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("runtime exited cleanly but wrote no outputs to {0}")]
    MissingOutputs(PathBuf),
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed tensor bundle {path}: {source}")]
    Bundle {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("cannot load engine artifact: {0}")]
    Engine(#[from] FrozenGraphError),
    #[error("engine execution failed: {0}")]
    Execution(#[from] EvalError),
}
