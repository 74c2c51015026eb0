extern crate stackflow;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use stackflow::prelude::*;
use std::hint::black_box;

/// A straight-line method folding `len` constants.
fn straight_line(len: usize) -> MethodBody {
    let mut asm = MethodAssembler::new("Bench", "fold", "()I").unwrap();
    asm.iconst(1);
    for i in 0..len {
        asm.iconst(i as i32).ixor();
    }
    asm.ireturn();
    asm.finish().unwrap()
}

/// `depth` nested counting loops, each with a static call in its body.
fn nested_loops(depth: u16) -> MethodBody {
    let mut asm = MethodAssembler::new("Bench", "loops", "(I)I").unwrap();
    for level in 1..=depth {
        asm.iconst(0).istore(level).label(&format!("head{level}"));
    }
    asm.iconst(3)
        .iconst(4)
        .invokestatic("Util", "mix", "(II)I")
        .istore(depth + 1);
    for level in (1..=depth).rev() {
        asm.iinc(level, 1)
            .iload(level)
            .iload(0)
            .if_cmp(ValueType::Int, Condition::Lt, &format!("head{level}"));
    }
    asm.iload(depth + 1).ireturn();
    asm.finish().unwrap()
}

fn analyzer() -> Analyzer {
    let mix = MethodRef::new("Util", "mix", "(II)I").unwrap();
    Analyzer::builder()
        .static_invoke(PureMethods::new().with(mix, |args| match args {
            [ConstValue::Int(a), ConstValue::Int(b)] => Some(ConstValue::Int(a ^ b)),
            _ => None,
        }))
        .build()
        .unwrap()
}

/// Benchmark the fixed point over straight-line code of growing length
fn bench_straight_line(c: &mut Criterion) {
    let analyzer = analyzer();
    let mut group = c.benchmark_group("straight_line");
    for len in [16, 256, 4096] {
        let method = straight_line(len);
        group.throughput(Throughput::Elements(method.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &method, |b, method| {
            b.iter(|| black_box(analyzer.analyze(black_box(method)).unwrap()));
        });
    }
    group.finish();
}

/// Benchmark convergence on nested loops
fn bench_nested_loops(c: &mut Criterion) {
    let analyzer = analyzer();
    let mut group = c.benchmark_group("nested_loops");
    for depth in [1, 4, 16] {
        let method = nested_loops(depth);
        group.bench_with_input(BenchmarkId::from_parameter(depth), &method, |b, method| {
            b.iter(|| black_box(analyzer.analyze(black_box(method)).unwrap()));
        });
    }
    group.finish();
}

/// Benchmark parallel analysis of many independent methods
fn bench_analyze_all(c: &mut Criterion) {
    let analyzer = analyzer();
    let methods: Vec<MethodBody> = (0..256)
        .map(|i| if i % 2 == 0 { straight_line(64) } else { nested_loops(3) })
        .collect();

    let mut group = c.benchmark_group("analyze_all");
    group.throughput(Throughput::Elements(methods.len() as u64));
    group.bench_function("mixed_256", |b| {
        b.iter(|| black_box(analyzer.analyze_all(black_box(&methods))));
    });
    group.finish();
}

criterion_group!(benches, bench_straight_line, bench_nested_loops, bench_analyze_all);
criterion_main!(benches);
