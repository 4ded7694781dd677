//! Benchmarks for pool allocation and operation dispatch.
//!
//! Run with: cargo bench -p tensorplan-infer

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use tensorplan_infer::{ExecutionProvider, MemoryStore, ProviderOptions, ReferenceKernels};
use tensorplan_ir::{ops, CompactStaticGraph, DType, GraphCapacity, StaticDag, TensorRef};

/// A fill, then alternately a scalar-mul of the previous tensor and an add of the previous two.
fn create_chain(num_ops: usize, len: usize) -> CompactStaticGraph {
    let tensors: Vec<TensorRef> = (0..num_ops)
        .map(|i| TensorRef::array(i as u32, DType::F32, len).unwrap())
        .collect();
    let mut exprs = vec![ops::fill(0, &tensors[0], 1.0f32).unwrap()];
    for i in 1..num_ops {
        let expr = if i % 2 == 1 {
            ops::scalar_mul(i as u32, &tensors[i], &tensors[i - 1], 0.5f32).unwrap()
        } else {
            ops::elm_add(i as u32, &tensors[i], &[&tensors[i - 1], &tensors[i - 2]]).unwrap()
        };
        exprs.push(expr);
    }
    let capacity = GraphCapacity::exact(tensors.len(), exprs.len());
    let dag = StaticDag::build(tensors, exprs, capacity)
        .unwrap()
        .topological_sort()
        .unwrap();
    CompactStaticGraph::from_dag(&dag).unwrap()
}

fn bench_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocation");
    for num_ops in [8, 64].iter() {
        let graph = create_chain(*num_ops, 256);
        group.bench_with_input(BenchmarkId::from_parameter(num_ops), &graph, |b, g| {
            b.iter(|| MemoryStore::new(black_box(g)).unwrap())
        });
    }
    group.finish();
}

fn bench_execution(c: &mut Criterion) {
    let mut group = c.benchmark_group("execution");
    for num_ops in [8, 32, 128].iter() {
        group.throughput(Throughput::Elements(*num_ops as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(num_ops),
            num_ops,
            |b, &num_ops| {
                let graph = create_chain(num_ops, 1024);
                let mut provider =
                    ExecutionProvider::new(graph, ReferenceKernels, ProviderOptions::default())
                        .unwrap();
                b.iter(|| black_box(provider.execute().unwrap()));
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_allocation, bench_execution);
criterion_main!(benches);
