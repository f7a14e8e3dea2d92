//! Generation and execution benchmarks.
//!
//! Run with: `cargo bench --bench generation`
//!
//! Generation replays the model for every drawn step, verification replays
//! it for a whole sequence, and shrinking does both per candidate. These
//! benchmarks track those three paths against a small register model.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use proptest::prelude::*;
use proptest::strategy::ValueTree;
use serde_json::{json, Value};
use stateful_check::rng::test_runner_with_seed;
use stateful_check::{
    generate_sequence, run_sequence, verifier, CommandSequenceStrategy, CommandSpec, SystemSpec,
    Term,
};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
struct Registers {
    regs: Vec<Term<Value>>,
}

fn register_spec() -> SystemSpec<Registers> {
    SystemSpec::builder()
        .command(
            "alloc",
            CommandSpec::new(|_: &[Value]| Ok(json!(0)))
                .requires(|s: &Registers| s.regs.len() < 8)
                .next_state(|s: &Registers, _: &[Term<Value>], r: &Term<Value>| {
                    let mut next = s.clone();
                    next.regs.push(r.clone());
                    next
                }),
        )
        .command(
            "store",
            CommandSpec::new(|args: &[Value]| Ok(args[1].clone()))
                .requires(|s: &Registers| !s.regs.is_empty())
                .args(|s: &Registers| {
                    (proptest::sample::select(s.regs.clone()), 0..1000i64)
                        .prop_map(|(r, v)| vec![r, Term::Value(json!(v))])
                        .boxed()
                })
                .postcondition(|_: &Registers, _: &Registers, args: &[Value], r: &Value| {
                    r == &args[1]
                }),
        )
        .build()
        .unwrap()
}

fn bench_generate(c: &mut Criterion) {
    let spec = register_spec();
    let mut group = c.benchmark_group("generate_sequence");

    for size in [10usize, 50, 200] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("size_{}", size), |b| {
            let mut runner = test_runner_with_seed(42);
            b.iter(|| generate_sequence(&spec, &mut runner, black_box(size), 100))
        });
    }

    group.finish();
}

fn bench_verify(c: &mut Criterion) {
    let spec = register_spec();
    let seq = generate_sequence(&spec, &mut test_runner_with_seed(7), 200, 100).unwrap();

    c.bench_function("verify_200", |b| b.iter(|| verifier::is_valid(&spec, black_box(&seq))));
}

fn bench_run(c: &mut Criterion) {
    let spec = register_spec();
    let seq = generate_sequence(&spec, &mut test_runner_with_seed(7), 200, 100).unwrap();

    c.bench_function("run_sequence_200", |b| b.iter(|| run_sequence(&spec, black_box(&seq))));
}

fn bench_shrink(c: &mut Criterion) {
    let spec = Arc::new(register_spec());
    let strategy = CommandSequenceStrategy::new(spec, 100);

    c.bench_function("shrink_to_empty_100", |b| {
        let mut runner = test_runner_with_seed(3);
        b.iter_batched(
            || strategy.new_tree(&mut runner).unwrap(),
            |mut tree| while tree.simplify() {},
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_generate, bench_verify, bench_run, bench_shrink);
criterion_main!(benches);
