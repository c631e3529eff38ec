use convparity::cases::{all_cases, cases_for_family, find_case};
use convparity::conformance::{render_suite, run_suite, ConformanceError, ConformanceOptions};
use convparity::harness::{FailureKind, Harness, ReportFormat};

#[test]
fn loopback_catalog_passes_in_order_with_workers() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::loopback(dir.path());
    let cases = all_cases();

    let suite = run_suite(&harness, &cases, ConformanceOptions { jobs: 4 }).expect("suite should run");
    let names: Vec<&str> = suite.reports.iter().map(|r| r.case.as_str()).collect();
    let expected: Vec<&str> = cases.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, expected);
    for report in &suite.reports {
        assert!(report.passed(), "{}: {:?}", report.case, report.failure);
    }
    assert!(suite.passed());
    assert_eq!(suite.render_summary(ReportFormat::Short), format!("{} passed, 0 failed", cases.len()));
}

#[test]
fn duplicate_names_are_rejected_before_running() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::loopback(dir.path());
    let case = find_case("abs").unwrap();
    let err = run_suite(&harness, &[case.clone(), case], ConformanceOptions::default()).unwrap_err();
    assert_eq!(err, ConformanceError::DuplicateCase("abs".to_string()));
    assert!(!dir.path().join("abs").exists());
}

#[test]
fn empty_selection_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::loopback(dir.path());
    assert_eq!(
        run_suite(&harness, &[], ConformanceOptions::default()).unwrap_err(),
        ConformanceError::Empty
    );
}

#[test]
fn failures_are_grouped_by_kind() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::loopback(dir.path());
    let mut cases = cases_for_family("clamp");
    let mut broken = find_case("abs").unwrap();
    broken.inputs.pop();
    cases.push(broken);

    let suite = run_suite(&harness, &cases, ConformanceOptions { jobs: 2 }).unwrap();
    assert!(!suite.passed());
    let grouped = suite.failures_by_kind();
    assert_eq!(grouped.get(&FailureKind::ReferenceComputation), Some(&vec!["abs"]));

    let text = render_suite(&suite, ReportFormat::Short);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "PASS clamp");
    assert_eq!(lines[1], "FAIL abs reference-computation");
    assert_eq!(lines[2], "1 passed, 1 failed");
    assert_eq!(lines[3], "  reference-computation: abs");

    let json: serde_json::Value = serde_json::from_str(&suite.render_summary(ReportFormat::Json)).unwrap();
    assert_eq!(json["failed"], 1);
    assert_eq!(json["failures"]["reference-computation"][0], "abs");
}
