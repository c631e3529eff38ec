use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use convparity::cases::find_case;
use convparity::eval::ReferenceExecutor;
use convparity::opt::canonicalize_module;

const CASES: &[&str] = &[
    "torch_transpose",
    "rrelu",
    "conv_transpose2d",
    "max_pool2d",
    "rnn_stacks",
    "noop_resize",
];

fn bench_reference_cases(c: &mut Criterion) {
    let mut group = c.benchmark_group("reference_evaluate");
    group.sample_size(10);
    let executor = ReferenceExecutor::new();
    for name in CASES {
        let Some(case) = find_case(name) else {
            continue;
        };
        let module = case.build_graph().expect("catalog case should trace");
        let inputs = case.materialize_inputs();
        group.bench_with_input(BenchmarkId::new("case", name), &module, |b, module| {
            b.iter(|| executor.evaluate(black_box(module), black_box(&inputs), case.seed))
        });
    }
    group.finish();
}

fn bench_trace_and_canonicalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("trace_canonicalize");
    for name in ["rnn_stacks", "noop_resize"] {
        let Some(case) = find_case(name) else {
            continue;
        };
        group.bench_function(BenchmarkId::new("case", name), |b| {
            b.iter(|| {
                let mut module = case.build_graph().expect("catalog case should trace");
                canonicalize_module(&mut module)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_reference_cases, bench_trace_and_canonicalize);
criterion_main!(benches);
