// Criterion benchmarks for hedra-network
//
// Run benchmarks with:
//   cargo bench -p hedra-network

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hedra_common::AccountId;
use hedra_network::{ChannelFactory, NodeAddress, NodePool, PoolConfig};
use std::sync::Arc;

fn factory() -> Arc<dyn ChannelFactory> {
    Arc::new(hedra_network::HttpChannelFactory::default())
}

fn members(count: u64) -> Vec<(AccountId, NodeAddress)> {
    (0..count)
        .map(|i| {
            let address = NodeAddress::new(format!("10.0.{}.{}", i / 250, i % 250), 50211).unwrap();
            (AccountId::from(3 + i), address)
        })
        .collect()
}

fn bench_pick_healthiest(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("pick_healthiest");

    for node_count in [5u64, 20, 100].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(node_count), node_count, |b, &count| {
            let pool = NodePool::with_members(PoolConfig::default(), factory(), members(count));
            for (i, node) in pool.nodes().iter().enumerate() {
                if i % 3 == 0 {
                    node.record_failure();
                } else {
                    node.record_success();
                }
            }
            let pool = &pool;
            b.to_async(&rt)
                .iter(|| async move { black_box(pool.pick_healthiest((count as usize).div_ceil(3)).await) });
        });
    }

    group.finish();
}

fn bench_reconcile(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("reconcile");

    group.bench_function("unchanged_50_nodes", |b| {
        let target = members(50);
        let pool = NodePool::with_members(PoolConfig::default(), factory(), target.clone());
        let (pool, target) = (&pool, &target);
        b.to_async(&rt)
            .iter(|| async move { black_box(pool.reconcile(target.clone()).await) });
    });

    group.bench_function("rotate_half_of_50_nodes", |b| {
        let first = members(50);
        let second: Vec<_> = members(75).into_iter().skip(25).collect();
        let pool = NodePool::with_members(PoolConfig::default(), factory(), first.clone());
        let mut flip = false;
        b.to_async(&rt).iter(|| {
            flip = !flip;
            let target = if flip { second.clone() } else { first.clone() };
            let pool = &pool;
            async move { black_box(pool.reconcile(target).await) }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_pick_healthiest, bench_reconcile);
criterion_main!(benches);
