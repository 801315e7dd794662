//! Compute-budget instruction merging (§4.3, invariant I5).
//!
//! Both legs return their own `set_compute_unit_limit`/`set_compute_unit_price`
//! instructions; this merges them into at most one of each, taking the max.
//! Discriminator byte 2 identifies a limit instruction, byte 3 a price
//! instruction — an assumption flagged as an open question in §9 and
//! isolated here behind one lookup so a future program upgrade only
//! requires editing this file (see `DESIGN.md`).

use crate::types::{AccountRef, CompiledInstruction};
use solana_sdk::compute_budget;

const DISCRIMINATOR_SET_COMPUTE_UNIT_LIMIT: u8 = 2;
const DISCRIMINATOR_SET_COMPUTE_UNIT_PRICE: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ComputeBudgetKind {
    Limit,
    Price,
    Other,
}

pub(crate) fn classify(ix: &CompiledInstruction) -> ComputeBudgetKind {
    match ix.data_bytes.first() {
        Some(&DISCRIMINATOR_SET_COMPUTE_UNIT_LIMIT) => ComputeBudgetKind::Limit,
        Some(&DISCRIMINATOR_SET_COMPUTE_UNIT_PRICE) => ComputeBudgetKind::Price,
        _ => ComputeBudgetKind::Other,
    }
}

pub(crate) fn decode_u32_arg(ix: &CompiledInstruction) -> Option<u32> {
    let bytes = ix.data_bytes.get(1..5)?;
    Some(u32::from_le_bytes(bytes.try_into().ok()?))
}

pub(crate) fn decode_u64_arg(ix: &CompiledInstruction) -> Option<u64> {
    let bytes = ix.data_bytes.get(1..9)?;
    Some(u64::from_le_bytes(bytes.try_into().ok()?))
}

/// Merge compute-budget instructions gathered from both legs into at most
/// two: one unit-limit instruction with the max of all limits seen, one
/// unit-price instruction with the max of all prices seen.
pub fn merge_compute_budget_instructions(
    instructions: &[CompiledInstruction],
) -> Vec<CompiledInstruction> {
    let program_id = compute_budget::id();
    let mut max_limit: Option<u32> = None;
    let mut max_price: Option<u64> = None;

    for ix in instructions {
        match classify(ix) {
            ComputeBudgetKind::Limit => {
                if let Some(v) = decode_u32_arg(ix) {
                    max_limit = Some(max_limit.map_or(v, |cur| cur.max(v)));
                }
            }
            ComputeBudgetKind::Price => {
                if let Some(v) = decode_u64_arg(ix) {
                    max_price = Some(max_price.map_or(v, |cur| cur.max(v)));
                }
            }
            ComputeBudgetKind::Other => {}
        }
    }

    let mut merged = Vec::with_capacity(2);
    if let Some(limit) = max_limit {
        merged.push(build_instruction(
            program_id,
            solana_sdk::compute_budget::ComputeBudgetInstruction::set_compute_unit_limit(limit),
        ));
    }
    if let Some(price) = max_price {
        merged.push(build_instruction(
            program_id,
            solana_sdk::compute_budget::ComputeBudgetInstruction::set_compute_unit_price(price),
        ));
    }
    merged
}

fn build_instruction(
    program_id: solana_sdk::pubkey::Pubkey,
    ix: solana_sdk::instruction::Instruction,
) -> CompiledInstruction {
    CompiledInstruction {
        program_id,
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

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use solana_sdk::compute_budget::ComputeBudgetInstruction;

    fn limit_ix(limit: u32) -> CompiledInstruction {
        let ix = ComputeBudgetInstruction::set_compute_unit_limit(limit);
        build_instruction(compute_budget::id(), ix)
    }

    fn price_ix(price: u64) -> CompiledInstruction {
        let ix = ComputeBudgetInstruction::set_compute_unit_price(price);
        build_instruction(compute_budget::id(), ix)
    }

    #[test]
    fn merges_to_at_most_two_instructions() {
        let merged = merge_compute_budget_instructions(&[
            limit_ix(100_000),
            price_ix(10),
            limit_ix(200_000),
            price_ix(5),
        ]);
        assert_eq!(merged.len(), 2);
    }

    proptest! {
        #[test]
        fn merged_values_equal_max_of_inputs(limits in proptest::collection::vec(1u32..2_000_000, 1..6), prices in proptest::collection::vec(0u64..100_000, 1..6)) {
            let mut instructions: Vec<CompiledInstruction> = limits.iter().map(|l| limit_ix(*l)).collect();
            instructions.extend(prices.iter().map(|p| price_ix(*p)));

            let merged = merge_compute_budget_instructions(&instructions);

            let merged_limit = merged.iter().find_map(|ix| decode_u32_arg(ix).filter(|_| classify(ix) == ComputeBudgetKind::Limit));
            let merged_price = merged.iter().find_map(|ix| decode_u64_arg(ix).filter(|_| classify(ix) == ComputeBudgetKind::Price));

            prop_assert_eq!(merged_limit, Some(*limits.iter().max().unwrap()));
            prop_assert_eq!(merged_price, Some(*prices.iter().max().unwrap()));
        }
    }
}
