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

//! Converter invocation.
//!
//! A converter turns a frozen graph into two artifacts next to it: an IR
//! file and a target-engine file. The harness only depends on that contract,
//! so the converter may be an external tool ([`ProcessConverter`]) or the
//! in-process [`LoopbackConverter`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::export::{ExportedGraph, FrozenGraphError};
use crate::shapes::ShapeError;

pub mod loopback;
pub mod process;

pub use loopback::{EngineArtifact, LoopbackConverter};
pub use process::{ProcessConverter, ToolCommand, ToolError};

/// File suffixes of the artifacts a converter leaves next to the trace.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ArtifactNaming {
    pub ir_suffix: String,
    pub engine_suffix: String,
}

impl Default for ArtifactNaming {
    fn default() -> Self {
        Self {
            ir_suffix: ".ir.json".to_string(),
            engine_suffix: ".engine.json".to_string(),
        }
    }
}

impl ArtifactNaming {
    pub fn ir_path(&self, graph: &ExportedGraph) -> PathBuf {
        graph.artifact_dir().join(format!("{}{}", graph.stem(), self.ir_suffix))
    }

    pub fn engine_path(&self, graph: &ExportedGraph) -> PathBuf {
        graph.artifact_dir().join(format!("{}{}", graph.stem(), self.engine_suffix))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("converter reported success but did not produce {0}")]
    MissingArtifact(PathBuf),
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot load frozen graph: {0}")]
    Load(#[from] FrozenGraphError),
    #[error("graph rejected during canonicalization: {0}")]
    Canonicalize(#[from] ShapeError),
    #[error("failed to encode artifact: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ArtifactIntegrityError {
    #[error("artifact {0} was modified after conversion")]
    Modified(PathBuf),
    #[error("artifact {path} is unreadable: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// The two files a successful conversion produced, with their digests at
/// the time the conversion finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionArtifact {
    pub case: String,
    pub ir_path: PathBuf,
    pub engine_path: PathBuf,
    pub ir_digest: String,
    pub engine_digest: String,
}

impl ConversionArtifact {
    /// Collect both artifacts, failing if either is missing.
    pub fn collect(case: &str, ir_path: PathBuf, engine_path: PathBuf) -> Result<Self, ConversionError> {
        let digest = |path: &Path| -> Result<String, ConversionError> {
            if !path.is_file() {
                return Err(ConversionError::MissingArtifact(path.to_path_buf()));
            }
            file_digest(path).map_err(|source| ConversionError::Io {
                path: path.to_path_buf(),
                source,
            })
        };
        Ok(Self {
            case: case.to_string(),
            ir_digest: digest(&ir_path)?,
            engine_digest: digest(&engine_path)?,
            ir_path,
            engine_path,
        })
    }

    /// Re-hash both files and compare against the recorded digests.
    pub fn verify(&self) -> Result<(), ArtifactIntegrityError> {
        for (path, expected) in [(&self.ir_path, &self.ir_digest), (&self.engine_path, &self.engine_digest)] {
            let actual = file_digest(path).map_err(|source| ArtifactIntegrityError::Unreadable {
                path: path.clone(),
                source,
            })?;
            if &actual != expected {
                return Err(ArtifactIntegrityError::Modified(path.clone()));
            }
        }
        Ok(())
    }
}

/// Lowercase hex SHA-256 of a file.
pub fn file_digest(path: &Path) -> io::Result<String> {
    let data = fs::read(path)?;
    Ok(format!("{:x}", Sha256::digest(&data)))
}

/// Turns a frozen graph into IR and engine artifacts.
pub trait Converter: Send + Sync {
    /// Short name used in logs and reports.
    fn name(&self) -> &str;

    fn convert(&self, graph: &ExportedGraph) -> Result<ConversionArtifact, ConversionError>;
}

/// Delete artifacts left behind by an earlier run so that a failing
/// converter cannot be mistaken for a successful one.
pub(crate) fn remove_stale(paths: &[&Path]) -> Result<(), ConversionError> {
    for path in paths {
        match fs::remove_file(path) {
            Ok(()) => tracing::debug!(path = %path.display(), "removed stale artifact"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(ConversionError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    }
    Ok(())
}
