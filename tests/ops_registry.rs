use convparity::cases::all_cases;
use convparity::ops::registry::{is_traceable_op, op_signature, traceable_ops, Arity};

#[test]
fn registry_names_are_unique() {
    let ops = traceable_ops();
    for (i, op) in ops.iter().enumerate() {
        assert!(ops[i + 1..].iter().all(|other| other.name != op.name), "{} listed twice", op.name);
    }
}

#[test]
fn lookup_returns_metadata() {
    let rrelu = op_signature("nn.rrelu").unwrap();
    assert!(rrelu.stochastic);
    assert!(matches!(rrelu.arity, Arity::Fixed(1)));

    let conv = op_signature("nn.conv_transpose").unwrap();
    assert!(conv.arity.accepts(3));
    assert!(!conv.arity.accepts(1));
    assert!(op_signature("nn.lstm").is_none());
}

#[test]
fn every_traced_op_is_registered() {
    for case in all_cases() {
        let module = case.build_graph().unwrap();
        for instr in &module.instrs {
            assert!(is_traceable_op(instr.op_name()), "{}: {}", case.name, instr.op_name());
        }
    }
}

#[test]
fn only_rrelu_is_stochastic() {
    let stochastic: Vec<&str> = traceable_ops().iter().filter(|op| op.stochastic).map(|op| op.name).collect();
    assert_eq!(stochastic, vec!["nn.rrelu"]);
}
