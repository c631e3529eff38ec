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

//! Harness driver.
//!
//! Runs one case through
//! `Init → ReferenceComputed → Exported → ConvertedArtifactReady →
//! ConvertedComputed → Reconciled → Compared`. The first failing stage ends
//! the case; nothing is retried. Failure kinds stay distinct all the way to
//! the [`CaseReport`].

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;

use crate::cases::{CaseDefinition, CaseError};
use crate::compare::{compare_output_sets, CompareMode, NumericMismatch, TensorComparison};
use crate::convert::{ConversionError, Converter, LoopbackConverter};
use crate::eval::{EvalError, ReferenceExecutor};
use crate::export::{export_case, ExportError};
use crate::reconcile::{reconcile, StructuralMismatch};
use crate::runtime::{ConvertedRuntime, InterpreterRuntime, RuntimeError};

pub mod report;

pub use report::{render_case, ReportFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HarnessStage {
    Init,
    ReferenceComputed,
    Exported,
    ConvertedArtifactReady,
    ConvertedComputed,
    Reconciled,
    Compared,
}

impl fmt::Display for HarnessStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HarnessStage::Init => "init",
            HarnessStage::ReferenceComputed => "reference computed",
            HarnessStage::Exported => "exported",
            HarnessStage::ConvertedArtifactReady => "converted artifact ready",
            HarnessStage::ConvertedComputed => "converted computed",
            HarnessStage::Reconciled => "reconciled",
            HarnessStage::Compared => "compared",
        };
        f.write_str(name)
    }
}

/// The reference path could not produce outputs.
#[derive(Debug, thiserror::Error)]
pub enum ReferenceError {
    #[error("case could not be traced: {0}")]
    Build(#[from] CaseError),
    #[error("reference execution failed: {0}")]
    Eval(#[from] EvalError),
}

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error(transparent)]
    ReferenceComputation(#[from] ReferenceError),
    #[error("export failed: {0}")]
    Export(#[from] ExportError),
    #[error("conversion failed: {0}")]
    Conversion(#[from] ConversionError),
    #[error("converted execution failed: {0}")]
    ConvertedExecution(#[from] RuntimeError),
    #[error("structural mismatch: {0}")]
    StructuralMismatch(#[from] StructuralMismatch),
    #[error("numeric mismatch: {0}")]
    NumericMismatch(#[from] NumericMismatch),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    ReferenceComputation,
    Export,
    Conversion,
    ConvertedExecution,
    StructuralMismatch,
    NumericMismatch,
}

impl FailureKind {
    pub const ALL: [FailureKind; 6] = [
        FailureKind::ReferenceComputation,
        FailureKind::Export,
        FailureKind::Conversion,
        FailureKind::ConvertedExecution,
        FailureKind::StructuralMismatch,
        FailureKind::NumericMismatch,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::ReferenceComputation => "reference-computation",
            FailureKind::Export => "export",
            FailureKind::Conversion => "conversion",
            FailureKind::ConvertedExecution => "converted-execution",
            FailureKind::StructuralMismatch => "structural-mismatch",
            FailureKind::NumericMismatch => "numeric-mismatch",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl HarnessError {
    pub fn kind(&self) -> FailureKind {
        match self {
            HarnessError::ReferenceComputation(_) => FailureKind::ReferenceComputation,
            HarnessError::Export(_) => FailureKind::Export,
            HarnessError::Conversion(_) => FailureKind::Conversion,
            HarnessError::ConvertedExecution(_) => FailureKind::ConvertedExecution,
            HarnessError::StructuralMismatch(_) => FailureKind::StructuralMismatch,
            HarnessError::NumericMismatch(_) => FailureKind::NumericMismatch,
        }
    }
}

/// Outcome of one case.
#[derive(Debug)]
pub struct CaseReport {
    pub case: String,
    pub family: String,
    pub compare: CompareMode,
    /// Last stage completed successfully.
    pub reached: HarnessStage,
    pub comparisons: Vec<TensorComparison>,
    pub failure: Option<HarnessError>,
    pub elapsed_ms: u128,
    /// Working directory, when it was left on disk.
    pub artifact_dir: Option<PathBuf>,
}

impl CaseReport {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure.as_ref().map(HarnessError::kind)
    }
}

/// Drives cases through a converter and a runtime.
pub struct Harness {
    converter: Box<dyn Converter>,
    runtime: Box<dyn ConvertedRuntime>,
    work_root: PathBuf,
    keep_artifacts: bool,
    executor: ReferenceExecutor,
}

impl Harness {
    pub fn new(converter: Box<dyn Converter>, runtime: Box<dyn ConvertedRuntime>, work_root: impl Into<PathBuf>) -> Self {
        Self {
            converter,
            runtime,
            work_root: work_root.into(),
            keep_artifacts: false,
            executor: ReferenceExecutor::new(),
        }
    }

    /// In-process converter and interpreter runtime.
    pub fn loopback(work_root: impl Into<PathBuf>) -> Self {
        Self::new(
            Box::new(LoopbackConverter::new()),
            Box::new(InterpreterRuntime::new()),
            work_root,
        )
    }

    pub fn keep_artifacts(mut self, keep: bool) -> Self {
        self.keep_artifacts = keep;
        self
    }

    pub fn work_root(&self) -> &Path {
        &self.work_root
    }

    pub fn case_dir(&self, case: &CaseDefinition) -> PathBuf {
        self.work_root.join(&case.name)
    }

    pub fn run_case(&self, case: &CaseDefinition) -> CaseReport {
        let span = tracing::info_span!("case", case = %case.name);
        let _enter = span.enter();

        let started = Instant::now();
        let dir = self.case_dir(case);
        let mut reached = HarnessStage::Init;
        let outcome = self.drive(case, &dir, &mut reached, started);
        let elapsed_ms = started.elapsed().as_millis();

        let (comparisons, failure) = match outcome {
            Ok(comparisons) => {
                tracing::info!(elapsed_ms, "pass");
                (comparisons, None)
            }
            Err(err) => {
                tracing::warn!(stage = %reached, kind = %err.kind(), elapsed_ms, "fail: {err}");
                (Vec::new(), Some(err))
            }
        };

        let keep = self.keep_artifacts || failure.is_some();
        if !keep {
            if let Err(err) = fs::remove_dir_all(&dir) {
                tracing::debug!(dir = %dir.display(), "could not remove work dir: {err}");
            }
        }

        CaseReport {
            case: case.name.clone(),
            family: case.family.clone(),
            compare: case.compare,
            reached,
            comparisons,
            failure,
            elapsed_ms,
            artifact_dir: (keep && dir.exists()).then_some(dir),
        }
    }

    fn drive(
        &self,
        case: &CaseDefinition,
        dir: &Path,
        reached: &mut HarnessStage,
        started: Instant,
    ) -> Result<Vec<TensorComparison>, HarnessError> {
        let mut advance = |stage: HarnessStage| {
            *reached = stage;
            tracing::debug!(stage = %stage, elapsed_ms = started.elapsed().as_millis() as u64, "stage complete");
        };

        let module = case.build_graph().map_err(ReferenceError::from)?;
        let inputs = case.materialize_inputs();
        let reference = self
            .executor
            .evaluate(&module, &inputs, case.seed)
            .map_err(ReferenceError::from)?;
        advance(HarnessStage::ReferenceComputed);

        let exported = export_case(case, &module, dir)?;
        advance(HarnessStage::Exported);

        let artifact = self.converter.convert(&exported)?;
        advance(HarnessStage::ConvertedArtifactReady);

        let converted = self.runtime.execute(&artifact, &inputs, case.seed)?;
        advance(HarnessStage::ConvertedComputed);

        let (reference, converted) = reconcile(reference, converted, &case.layouts)?;
        advance(HarnessStage::Reconciled);

        let comparisons = compare_output_sets(&reference, &converted, case.compare)?;
        advance(HarnessStage::Compared);
        Ok(comparisons)
    }
}
