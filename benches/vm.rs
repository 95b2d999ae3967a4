//! Benchmarks for the Lumo generator and VM.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lumo::vm::{Generator, Vm};
use std::fs;

/// Parse source into an AST.
fn parse(source: &str) -> lumo::ast::Program {
    lumo::parse(source).expect("parse error")
}

/// Compile and execute with print output captured.
fn run_vm(source: &str) {
    let module = lumo::compile(source, None).expect("compile error");
    let mut vm = Vm::new();
    vm.capture_output();
    vm.execute(&module).expect("vm runtime error");
}

fn load_program(name: &str) -> String {
    let path = format!("benches/programs/{}.lm", name);
    fs::read_to_string(&path).unwrap_or_else(|_| panic!("failed to read {}", path))
}

fn programs(c: &mut Criterion) {
    let mut group = c.benchmark_group("programs");
    for name in ["fib_recursive", "loop_sum", "coroutine", "collections"] {
        let source = load_program(name);
        group.bench_with_input(BenchmarkId::from_parameter(name), &source, |b, src| {
            b.iter(|| run_vm(black_box(src)))
        });
    }
    group.finish();
}

fn fib_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("fib_scaling");

    for n in [10, 15, 20].iter() {
        let source = format!(
            r#"
let fib = (n) => {{
    if (n <= 1) {{
        return n
    }}
    return fib(n - 1) + fib(n - 2)
}}
fib({})
"#,
            n
        );
        group.bench_with_input(BenchmarkId::new("vm", n), &source, |b, src| {
            b.iter(|| run_vm(black_box(src)))
        });
    }

    group.finish();
}

/// Benchmark compilation time alone (not execution).
fn compilation_overhead(c: &mut Criterion) {
    let mut group = c.benchmark_group("compilation_overhead");

    for name in ["fib_recursive", "loop_sum"] {
        let program = parse(&load_program(name));
        group.bench_function(name, |b| {
            b.iter(|| Generator::generate(black_box(&program), None).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, programs, fib_scaling, compilation_overhead);

criterion_main!(benches);
