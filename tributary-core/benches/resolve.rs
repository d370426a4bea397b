//! Resolution benchmarks: cold chains, warm cache hits and branching.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use tributary_core::{Flow, FlowBuilder};

/// A chain `e0 -> e1 -> ... -> e{len-1}` where each entity adds one.
fn chain(len: usize) -> Flow {
    let mut builder = FlowBuilder::new("chain");
    builder.assign("e0", 0_u64).unwrap();
    for i in 1..len {
        let name = format!("e{i}");
        let dep = format!("e{}", i - 1);
        let dep_name = dep.clone();
        builder
            .derive(&name, &[dep.as_str()], move |args| {
                Ok(args.get::<u64>(&dep_name)? + 1)
            })
            .unwrap();
    }
    builder.build().unwrap()
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");

    for len in [10, 100, 500] {
        let last = format!("e{}", len - 1);

        group.bench_with_input(BenchmarkId::new("cold", len), &len, |b, &len| {
            b.iter_with_setup(|| chain(len), |flow| black_box(flow.get(&last).unwrap()));
        });

        let warm = chain(len);
        warm.get(&last).unwrap();
        group.bench_with_input(BenchmarkId::new("warm", len), &len, |b, _| {
            b.iter(|| black_box(warm.get(&last).unwrap()));
        });

        group.bench_with_input(BenchmarkId::new("setting_midpoint", len), &len, |b, &len| {
            let mid = format!("e{}", len / 2);
            b.iter(|| {
                let branch = warm.setting(&mid, 7_u64).unwrap();
                black_box(branch.get(&last).unwrap())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_resolve);
criterion_main!(benches);
