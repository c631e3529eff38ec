use std::fs;

use convparity::cases::{find_case, CaseDefinition, Chain, LayerOp, ModelSpec};
use convparity::compare::CompareMode;
use convparity::export::{
    check_exportable, export_case, ExportError, FrozenGraph, FrozenGraphError, ShapeManifest,
};
use convparity::ir::{IRModule, Instr, ValueId};

#[test]
fn frozen_graph_loads_back_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let case = find_case("softmax2d").unwrap();
    let module = case.build_graph().unwrap();

    let exported = export_case(&case, &module, dir.path()).unwrap();
    assert_eq!(exported.trace_path, dir.path().join("softmax2d.trace.json"));
    assert_eq!(exported.manifest.to_cli_arg(), "inputshape=[1,12,24,64]");
    assert_eq!(exported.artifact_dir(), dir.path());

    let frozen = FrozenGraph::load(&exported.trace_path).unwrap();
    assert_eq!(frozen.case, "softmax2d");
    assert_eq!(frozen.inputs, case.inputs);
    assert_eq!(frozen.module, module);
}

#[test]
fn parameters_are_baked_into_the_trace() {
    let dir = tempfile::tempdir().unwrap();
    let case = find_case("conv_transpose2d").unwrap();
    let module = case.build_graph().unwrap();
    let exported = export_case(&case, &module, dir.path()).unwrap();

    let frozen = FrozenGraph::load(&exported.trace_path).unwrap();
    let ops: Vec<&str> = frozen.module.instrs.iter().map(|i| i.op_name()).collect();
    let original: Vec<&str> = module.instrs.iter().map(|i| i.op_name()).collect();
    assert_eq!(ops, original);
    assert!(frozen
        .module
        .instrs
        .iter()
        .any(|i| matches!(i, Instr::Constant { .. })));
}

#[test]
fn multi_input_manifest_lists_every_shape() {
    let case = find_case("torch_transpose").unwrap();
    let manifest = ShapeManifest::new(case.inputs.clone());
    assert_eq!(manifest.to_string(), "[3,16],[5,9,11],[8,5,9,10]");
    let parsed: ShapeManifest = manifest.to_cli_arg().parse().unwrap();
    assert_eq!(parsed, manifest);
}

#[test]
fn declared_inputs_must_match_the_trace() {
    let case = find_case("abs").unwrap();
    let module = case.build_graph().unwrap();
    let mut lying = case.clone();
    lying.inputs[1] = vec![1, 12, 65];

    let err = check_exportable(&lying, &module).unwrap_err();
    match err {
        ExportError::InputMismatch { declared, traced } => {
            assert_eq!(declared, "[1,12],[1,12,65]");
            assert_eq!(traced, "[1,12],[1,12,64]");
        }
        other => panic!("unexpected {other}"),
    }
}

#[test]
fn malformed_graph_is_not_exported() {
    let dir = tempfile::tempdir().unwrap();
    let case = CaseDefinition::new(
        "dangling",
        "abs",
        ModelSpec::chains(vec![Chain::new(0, vec![LayerOp::Abs])]),
        vec![vec![4]],
        CompareMode::TIGHT,
    );
    let mut module = IRModule::new();
    let x = module.fresh();
    module.instrs.push(Instr::Input {
        dst: x,
        index: 0,
        shape: vec![4],
    });
    module.instrs.push(Instr::Output { src: ValueId(7) });

    let err = export_case(&case, &module, dir.path()).unwrap_err();
    assert!(matches!(err, ExportError::Verify(_)));
    assert!(!dir.path().join("dangling.trace.json").exists());
}

#[test]
fn wrong_version_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let case = find_case("clamp").unwrap();
    let module = case.build_graph().unwrap();
    let exported = export_case(&case, &module, dir.path()).unwrap();

    let text = fs::read_to_string(&exported.trace_path).unwrap();
    let bumped = text.replacen("\"format_version\": 1", "\"format_version\": 9", 1);
    fs::write(&exported.trace_path, bumped).unwrap();

    let err = FrozenGraph::load(&exported.trace_path).unwrap_err();
    assert!(matches!(err, FrozenGraphError::Version(9)));
}
