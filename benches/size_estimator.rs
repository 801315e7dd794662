//! Benchmarks for the transaction size estimator (§4.3), the one piece of
//! the assembly hot path that runs between every pair of suspension points
//! and is invoked once per candidate strategy combination.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use cyclic_arb_executor::assembly::size_estimator::{estimate_size, SizeEstimateInputs};

fn benchmark_size_estimation(c: &mut Criterion) {
    let mut group = c.benchmark_group("size_estimator");

    group.bench_function("small_two_hop", |b| {
        b.iter(|| {
            black_box(estimate_size(SizeEstimateInputs {
                instruction_count: 4,
                total_accounts: 20,
                total_data_bytes: 200,
                alt_count: 2,
            }))
        })
    });

    group.bench_function("large_multi_hop", |b| {
        b.iter(|| {
            black_box(estimate_size(SizeEstimateInputs {
                instruction_count: 10,
                total_accounts: 60,
                total_data_bytes: 900,
                alt_count: 6,
            }))
        })
    });

    group.bench_function("strategy_combination_sweep", |b| {
        // Mirrors the Phase 2 pairwise evaluation (§4.3): three strategies
        // per leg, nine combinations estimated per opportunity.
        let candidates: Vec<SizeEstimateInputs> = (0..9)
            .map(|i| SizeEstimateInputs {
                instruction_count: 4 + i,
                total_accounts: 16 + i * 2,
                total_data_bytes: 150 + i * 40,
                alt_count: 2 + (i % 3),
            })
            .collect();

        b.iter(|| {
            for inputs in &candidates {
                black_box(estimate_size(*inputs));
            }
        })
    });

    group.finish();
}

criterion_group!(benches, benchmark_size_estimation);
criterion_main!(benches);
