//! Rendering of case reports.

use std::fmt::Write as _;
use std::str::FromStr;

use serde::Serialize;

use crate::compare::{CompareMode, TensorComparison};
use crate::harness::{CaseReport, FailureKind, HarnessStage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Human,
    Short,
    Json,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human" => Ok(ReportFormat::Human),
            "short" => Ok(ReportFormat::Short),
            "json" => Ok(ReportFormat::Json),
            other => Err(format!("unknown report format `{other}` (expected human, short or json)")),
        }
    }
}

/// Serializable view of a [`CaseReport`].
#[derive(Debug, Serialize)]
pub struct CaseRecord<'a> {
    pub case: &'a str,
    pub family: &'a str,
    pub passed: bool,
    pub compare: CompareMode,
    pub reached: HarnessStage,
    pub failure_kind: Option<FailureKind>,
    pub failure: Option<String>,
    pub elapsed_ms: u128,
    pub outputs: &'a [TensorComparison],
}

impl<'a> From<&'a CaseReport> for CaseRecord<'a> {
    fn from(report: &'a CaseReport) -> Self {
        Self {
            case: &report.case,
            family: &report.family,
            passed: report.passed(),
            compare: report.compare,
            reached: report.reached,
            failure_kind: report.failure_kind(),
            failure: report.failure.as_ref().map(|e| e.to_string()),
            elapsed_ms: report.elapsed_ms,
            outputs: &report.comparisons,
        }
    }
}

pub fn render_case(report: &CaseReport, format: ReportFormat) -> String {
    match format {
        ReportFormat::Short => match report.failure_kind() {
            None => format!("PASS {}", report.case),
            Some(kind) => format!("FAIL {} {kind}", report.case),
        },
        ReportFormat::Json => serde_json::to_string(&CaseRecord::from(report)).unwrap_or_default(),
        ReportFormat::Human => render_human(report),
    }
}

fn render_human(report: &CaseReport) -> String {
    let mut out = String::new();
    match &report.failure {
        None => {
            let worst = report
                .comparisons
                .iter()
                .map(|c| c.max_abs_diff)
                .fold(0.0f64, f64::max);
            let _ = write!(
                out,
                "PASS {} ({}) [{}] {} output(s), max |diff| {:e}, {} ms",
                report.case,
                report.family,
                report.compare,
                report.comparisons.len(),
                worst,
                report.elapsed_ms
            );
        }
        Some(err) => {
            let _ = write!(
                out,
                "FAIL {} ({}) {} after stage `{}`, {} ms\n  {err}",
                report.case,
                report.family,
                err.kind(),
                report.reached,
                report.elapsed_ms
            );
            if let Some(dir) = &report.artifact_dir {
                let _ = write!(out, "\n  artifacts: {}", dir.display());
            }
        }
    }
    out
}
