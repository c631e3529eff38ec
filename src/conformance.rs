//! Suite runner: many cases through one harness.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::cases::CaseDefinition;
use crate::harness::{render_case, CaseReport, FailureKind, Harness, ReportFormat};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConformanceOptions {
    /// Worker threads; each case still runs sequentially in its own
    /// directory.
    pub jobs: usize,
}

impl Default for ConformanceOptions {
    fn default() -> Self {
        Self { jobs: 1 }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConformanceError {
    #[error("case name `{0}` appears more than once; case directories would collide")]
    DuplicateCase(String),
    #[error("no cases selected")]
    Empty,
}

/// Reports of a suite run, in case order.
#[derive(Debug, Default)]
pub struct SuiteReport {
    pub reports: Vec<CaseReport>,
}

impl SuiteReport {
    pub fn passed(&self) -> bool {
        self.reports.iter().all(CaseReport::passed)
    }

    pub fn failed(&self) -> impl Iterator<Item = &CaseReport> {
        self.reports.iter().filter(|r| !r.passed())
    }

    pub fn failures_by_kind(&self) -> BTreeMap<FailureKind, Vec<&str>> {
        let mut grouped: BTreeMap<FailureKind, Vec<&str>> = BTreeMap::new();
        for report in &self.reports {
            if let Some(kind) = report.failure_kind() {
                grouped.entry(kind).or_default().push(&report.case);
            }
        }
        grouped
    }

    pub fn render_summary(&self, format: ReportFormat) -> String {
        let failed = self.failed().count();
        let passed = self.reports.len() - failed;
        if format == ReportFormat::Json {
            let by_kind: BTreeMap<String, Vec<&str>> = self
                .failures_by_kind()
                .into_iter()
                .map(|(kind, cases)| (kind.to_string(), cases))
                .collect();
            let summary = serde_json::json!({
                "passed": passed,
                "failed": failed,
                "failures": by_kind,
            });
            return summary.to_string();
        }

        let mut out = format!("{passed} passed, {failed} failed");
        for (kind, cases) in self.failures_by_kind() {
            let _ = write!(out, "\n  {kind}: {}", cases.join(", "));
        }
        out
    }
}

/// Run `cases` through `harness`, rejecting duplicate names up front.
pub fn run_suite(
    harness: &Harness,
    cases: &[CaseDefinition],
    options: ConformanceOptions,
) -> Result<SuiteReport, ConformanceError> {
    if cases.is_empty() {
        return Err(ConformanceError::Empty);
    }
    let mut seen = BTreeSet::new();
    for case in cases {
        if !seen.insert(case.name.as_str()) {
            return Err(ConformanceError::DuplicateCase(case.name.clone()));
        }
    }

    let jobs = options.jobs.clamp(1, cases.len());
    tracing::info!(cases = cases.len(), jobs, "running suite");
    if jobs == 1 {
        return Ok(SuiteReport {
            reports: cases.iter().map(|case| harness.run_case(case)).collect(),
        });
    }

    let next = AtomicUsize::new(0);
    let slots: Mutex<Vec<Option<CaseReport>>> = Mutex::new((0..cases.len()).map(|_| None).collect());
    std::thread::scope(|scope| {
        for _ in 0..jobs {
            scope.spawn(|| loop {
                let index = next.fetch_add(1, Ordering::Relaxed);
                let Some(case) = cases.get(index) else {
                    break;
                };
                let report = harness.run_case(case);
                if let Ok(mut slots) = slots.lock() {
                    slots[index] = Some(report);
                }
            });
        }
    });

    let reports = slots
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .into_iter()
        .flatten()
        .collect();
    Ok(SuiteReport { reports })
}

/// Render every case report followed by the summary line(s).
pub fn render_suite(report: &SuiteReport, format: ReportFormat) -> String {
    let mut out = String::new();
    for case in &report.reports {
        out.push_str(&render_case(case, format));
        out.push('\n');
    }
    out.push_str(&report.render_summary(format));
    out
}
