//! Benchmarks for transactional id handling and recovery passes.
//!
//! The recovery benchmarks run against the in-memory broker, so they measure
//! the per-id overhead of the strategies rather than network latency.

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;
use std::time::Duration;
use txn_recovery::test_support::InMemoryBroker;
use txn_recovery::{
    AbortStrategy, RecoveryContext, RecoveryCoordinator, SubtaskPlacement, TransactionalId,
};

// =============================================================================
// IDENTITY BENCHMARKS
// =============================================================================

fn bench_identity(c: &mut Criterion) {
    let mut group = c.benchmark_group("identity");
    group.warm_up_time(Duration::from_millis(500));

    let mut rng = StdRng::seed_from_u64(7);
    let fields: Vec<(u32, u64)> = (0..1_000)
        .map(|_| (rng.random_range(0..256), rng.random_range(0..1_000_000)))
        .collect();
    let raw: Vec<String> = fields
        .iter()
        .map(|&(owner, sequence)| TransactionalId::new("orders-sink", owner, sequence).into_string())
        .collect();

    group.throughput(Throughput::Elements(fields.len() as u64));
    group.bench_function("build", |b| {
        b.iter(|| {
            for &(owner, sequence) in &fields {
                black_box(TransactionalId::new("orders-sink", owner, sequence));
            }
        })
    });
    group.bench_function("parse_fields", |b| {
        b.iter(|| {
            for name in &raw {
                black_box(txn_recovery::identity::parse_fields(name).ok());
            }
        })
    });

    group.finish();
}

// =============================================================================
// RECOVERY BENCHMARKS
// =============================================================================

/// Leaves `sequences` open transactions for each of `owners` historical subtasks.
fn crashed_broker(owners: u32, sequences: u64) -> InMemoryBroker {
    let broker = InMemoryBroker::new();
    for owner in 0..owners {
        for sequence in 0..sequences {
            broker.open_on("orders", &TransactionalId::new("orders-sink", owner, sequence));
        }
    }
    broker
}

fn run_recovery(broker: &InMemoryBroker, strategy: AbortStrategy) -> u64 {
    let placement = match SubtaskPlacement::new(0, 1) {
        Ok(placement) => placement,
        Err(err) => panic!("invalid placement: {err}"),
    };
    let context = RecoveryContext::builder(placement, broker)
        .lister(broker)
        .topics(["orders"])
        .prefix("orders-sink")
        .build();
    match context.and_then(|context| RecoveryCoordinator::new(strategy).run(&context)) {
        Ok(report) => report.fenced,
        Err(err) => panic!("recovery failed: {err}"),
    }
}

fn bench_recovery(c: &mut Criterion) {
    let mut group = c.benchmark_group("recovery");
    group.sample_size(20);
    group.warm_up_time(Duration::from_millis(500));

    for &(owners, sequences) in &[(4u32, 16u64), (16, 64), (64, 64)] {
        let total = owners as u64 * sequences;
        group.throughput(Throughput::Elements(total));
        for strategy in [AbortStrategy::Probing, AbortStrategy::Listing] {
            group.bench_with_input(
                BenchmarkId::new(strategy.as_str(), total),
                &(owners, sequences),
                |b, &(owners, sequences)| {
                    b.iter_batched(
                        || crashed_broker(owners, sequences),
                        |broker| black_box(run_recovery(&broker, strategy)),
                        BatchSize::LargeInput,
                    )
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_identity, bench_recovery);
criterion_main!(benches);
