//! Benchmark for compute-budget instruction merging (§4.3, I5) — runs once
//! per candidate strategy combination alongside the size estimator.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use cyclic_arb_executor::assembly::compute_budget::merge_compute_budget_instructions;
use cyclic_arb_executor::types::{AccountRef, CompiledInstruction};
use solana_sdk::compute_budget::{self, ComputeBudgetInstruction};

fn compiled(ix: solana_sdk::instruction::Instruction) -> CompiledInstruction {
    CompiledInstruction {
        program_id: ix.program_id,
        account_refs: ix
            .accounts
            .into_iter()
            .map(|a| AccountRef {
                pubkey: a.pubkey,
                is_signer: a.is_signer,
                is_writable: a.is_writable,
            })
            .collect(),
        data_bytes: ix.data,
    }
}

fn benchmark_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute_budget_merge");

    let program_id = compute_budget::id();
    let _ = program_id;

    let two_legs = vec![
        compiled(ComputeBudgetInstruction::set_compute_unit_limit(200_000)),
        compiled(ComputeBudgetInstruction::set_compute_unit_price(50_000)),
        compiled(ComputeBudgetInstruction::set_compute_unit_limit(350_000)),
        compiled(ComputeBudgetInstruction::set_compute_unit_price(75_000)),
    ];

    group.bench_function("two_legs_four_instructions", |b| {
        b.iter(|| black_box(merge_compute_budget_instructions(&two_legs)))
    });

    let bundle_partition = vec![
        compiled(ComputeBudgetInstruction::set_compute_unit_limit(200_000)),
        compiled(ComputeBudgetInstruction::set_compute_unit_price(50_000)),
    ];

    group.bench_function("single_leg_two_instructions", |b| {
        b.iter(|| black_box(merge_compute_budget_instructions(&bundle_partition)))
    });

    group.finish();
}

criterion_group!(benches, benchmark_merge);
criterion_main!(benches);
