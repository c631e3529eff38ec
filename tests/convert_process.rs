#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use convparity::cases::{find_case, CaseDefinition, Chain, LayerOp, ModelSpec};
use convparity::compare::CompareMode;
use convparity::convert::{
    ArtifactIntegrityError, ConversionError, Converter, ProcessConverter, ToolCommand, ToolError,
};
use convparity::eval::TensorValue;
use convparity::export::{export_case, ExportedGraph};
use convparity::harness::{FailureKind, Harness};
use convparity::runtime::{ConvertedRuntime, ProcessRuntime, RuntimeError};

const COPYING_CONVERTER: &str = r#"
trace="$1"
base="${trace%.trace.json}"
cp "$trace" "$base.ir.json"
cp "$trace" "$base.engine.json"
"#;

const ECHO_RUNTIME: &str = r#"
[ "$4" = "--seed" ] || { echo "missing --seed" >&2; exit 3; }
cp "$2" "$3"
"#;

fn script(dir: &Path, name: &str, body: &str) -> ToolCommand {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    ToolCommand::new("/bin/sh").with_args(vec![path.display().to_string()])
}

fn exported(dir: &Path, name: &str) -> ExportedGraph {
    let case = find_case(name).unwrap();
    let module = case.build_graph().unwrap();
    export_case(&case, &module, &dir.join(name)).unwrap()
}

#[test]
fn converter_artifacts_are_collected_and_hashed() {
    let dir = tempfile::tempdir().unwrap();
    let graph = exported(dir.path(), "clamp");
    let converter = ProcessConverter::new(script(dir.path(), "conv.sh", COPYING_CONVERTER));

    let artifact = converter.convert(&graph).unwrap();
    assert_eq!(artifact.case, "clamp");
    assert_eq!(artifact.ir_path, graph.artifact_dir().join("clamp.ir.json"));
    assert_eq!(artifact.engine_path, graph.artifact_dir().join("clamp.engine.json"));
    assert_eq!(artifact.ir_digest.len(), 64);
    // both are copies of the trace
    assert_eq!(artifact.ir_digest, artifact.engine_digest);
    artifact.verify().unwrap();
}

#[test]
fn converter_receives_trace_and_shape_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let graph = exported(dir.path(), "torch_transpose");
    let body = format!(
        "{COPYING_CONVERTER}\n[ \"$2\" = \"inputshape=[3,16],[5,9,11],[8,5,9,10]\" ] || exit 4\n"
    );
    let converter = ProcessConverter::new(script(dir.path(), "conv.sh", &body));
    converter.convert(&graph).unwrap();
}

#[test]
fn converter_runs_inside_the_artifact_directory() {
    let dir = tempfile::tempdir().unwrap();
    let graph = exported(dir.path(), "abs");
    let body = r#"
case "$1" in /*) ;; *) echo "trace path is not absolute: $1" >&2; exit 5 ;; esac
cp "$1" abs.ir.json
cp "$1" abs.engine.json
"#;
    let converter = ProcessConverter::new(script(dir.path(), "conv.sh", body));

    let artifact = converter.convert(&graph).unwrap();
    assert!(artifact.engine_path.is_file());
    assert!(!dir.path().join("abs.ir.json").exists());
}

#[test]
fn nonzero_exit_fails_even_with_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let graph = exported(dir.path(), "abs");
    let body = format!("{COPYING_CONVERTER}\necho 'unsupported op nn.rrelu' >&2\nexit 2\n");
    let converter = ProcessConverter::new(script(dir.path(), "conv.sh", &body));

    let err = converter.convert(&graph).unwrap_err();
    match &err {
        ConversionError::Tool(ToolError::Exit { stderr, .. }) => {
            assert!(stderr.contains("unsupported op"));
        }
        other => panic!("unexpected {other}"),
    }
    assert!(err.to_string().contains("unsupported op nn.rrelu"));
}

#[test]
fn missing_engine_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let graph = exported(dir.path(), "abs");
    let body = "base=\"${1%.trace.json}\"\ncp \"$1\" \"$base.ir.json\"\n";
    let converter = ProcessConverter::new(script(dir.path(), "conv.sh", body));

    let err = converter.convert(&graph).unwrap_err();
    let expected: PathBuf = graph.artifact_dir().join("abs.engine.json");
    assert!(matches!(err, ConversionError::MissingArtifact(ref p) if *p == expected));
}

#[test]
fn hung_converter_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let graph = exported(dir.path(), "abs");
    let tool = script(dir.path(), "conv.sh", "exec sleep 5\n").with_timeout(Duration::from_millis(200));

    let started = std::time::Instant::now();
    let err = ProcessConverter::new(tool).convert(&graph).unwrap_err();
    assert!(matches!(err, ConversionError::Tool(ToolError::TimedOut { .. })));
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[test]
fn stale_artifacts_do_not_satisfy_a_silent_converter() {
    let dir = tempfile::tempdir().unwrap();
    let graph = exported(dir.path(), "abs");
    let stale_ir = graph.artifact_dir().join("abs.ir.json");
    let stale_engine = graph.artifact_dir().join("abs.engine.json");
    fs::write(&stale_ir, "{}").unwrap();
    fs::write(&stale_engine, "{}").unwrap();

    let converter = ProcessConverter::new(script(dir.path(), "conv.sh", "exit 0\n"));
    let err = converter.convert(&graph).unwrap_err();
    assert!(matches!(err, ConversionError::MissingArtifact(_)));
    assert!(!stale_ir.exists());
}

#[test]
fn missing_program_is_a_spawn_error() {
    let dir = tempfile::tempdir().unwrap();
    let graph = exported(dir.path(), "abs");
    let converter = ProcessConverter::new(ToolCommand::new(dir.path().join("no-such-converter")));
    let err = converter.convert(&graph).unwrap_err();
    assert!(matches!(err, ConversionError::Tool(ToolError::Spawn { .. })));
}

#[test]
fn runtime_rejects_modified_engine() {
    let dir = tempfile::tempdir().unwrap();
    let graph = exported(dir.path(), "abs");
    let artifact = ProcessConverter::new(script(dir.path(), "conv.sh", COPYING_CONVERTER))
        .convert(&graph)
        .unwrap();
    fs::write(&artifact.engine_path, "tampered").unwrap();

    let runtime = ProcessRuntime::new(script(dir.path(), "rt.sh", ECHO_RUNTIME));
    let err = runtime.execute(&artifact, &[], 0).unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Integrity(ArtifactIntegrityError::Modified(_))
    ));
}

#[test]
fn runtime_exchanges_tensor_bundles() {
    let dir = tempfile::tempdir().unwrap();
    let graph = exported(dir.path(), "abs");
    let artifact = ProcessConverter::new(script(dir.path(), "conv.sh", COPYING_CONVERTER))
        .convert(&graph)
        .unwrap();

    let inputs = vec![
        TensorValue::new(vec![1, 2], vec![0.25, -1.5]).unwrap(),
        TensorValue::filled(vec![1, 2, 3], 7.0),
    ];
    let runtime = ProcessRuntime::new(script(dir.path(), "rt.sh", ECHO_RUNTIME));
    let outputs = runtime.execute(&artifact, &inputs, 42).unwrap();
    assert_eq!(outputs.len(), 2);
    assert!(outputs.tensors[0].bit_identical(&inputs[0]));
    assert!(outputs.tensors[1].bit_identical(&inputs[1]));
}

#[test]
fn silent_runtime_reports_missing_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let graph = exported(dir.path(), "abs");
    let artifact = ProcessConverter::new(script(dir.path(), "conv.sh", COPYING_CONVERTER))
        .convert(&graph)
        .unwrap();

    let runtime = ProcessRuntime::new(script(dir.path(), "rt.sh", "exit 0\n"));
    let err = runtime.execute(&artifact, &[], 1).unwrap_err();
    assert!(matches!(err, RuntimeError::MissingOutputs(_)));
}

#[test]
fn external_pipeline_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let tools = tempfile::tempdir().unwrap();
    // relu of [0, 1) inputs is the identity, so echoing inputs is a faithful engine
    let identity = CaseDefinition::new(
        "relu_identity",
        "relu",
        ModelSpec::chains(vec![
            Chain::new(0, vec![LayerOp::Relu]),
            Chain::new(1, vec![LayerOp::Relu]),
        ]),
        vec![vec![2, 3], vec![4]],
        CompareMode::Exact,
    );
    let harness = Harness::new(
        Box::new(ProcessConverter::new(script(tools.path(), "conv.sh", COPYING_CONVERTER))),
        Box::new(ProcessRuntime::new(script(tools.path(), "rt.sh", ECHO_RUNTIME))),
        dir.path(),
    );

    let report = harness.run_case(&identity);
    assert!(report.passed(), "{:?}", report.failure);

    let failing = harness.run_case(&find_case("abs").unwrap());
    assert_eq!(failing.failure_kind(), Some(FailureKind::NumericMismatch));
    assert!(failing.artifact_dir.unwrap().join("abs.outputs.json").is_file());
}
