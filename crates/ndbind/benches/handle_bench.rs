//! Benchmark: handle lifecycle and dispatch overhead against the reference engine.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndbind::prelude::*;

fn bench_create_close(c: &mut Criterion) {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    let manager = engine.new_base_manager();
    c.bench_function("create_close", |b| {
        b.iter(|| {
            let array = manager.create(black_box([16, 16]), DType::F32).unwrap();
            array.close();
        })
    });
}

fn bench_scope_close(c: &mut Criterion) {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    let mut group = c.benchmark_group("scope_close");
    for &n in &[16usize, 256, 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                let scope = engine.new_base_manager();
                for _ in 0..n {
                    scope.create([4], DType::F32).unwrap();
                }
                scope.close();
            })
        });
    }
    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    let manager = engine.new_base_manager();
    let data: Vec<f32> = (0..1024).map(|i| i as f32 * 0.5).collect();
    let a = manager.from_slice(&data, [32, 32]).unwrap();
    let b = manager.from_slice(&data, [32, 32]).unwrap();
    c.bench_function("elemwise_add_wait", |bench| {
        bench.iter(|| {
            let out = a.add(black_box(&b)).unwrap();
            out.wait_to_read().unwrap();
            out.close();
        })
    });
    c.bench_function("to_f32_vec", |bench| bench.iter(|| black_box(a.to_f32_vec().unwrap())));
}

criterion_group!(benches, bench_create_close, bench_scope_close, bench_dispatch);
criterion_main!(benches);
