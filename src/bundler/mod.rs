//! Bundle Builder (§4.5) — the two-transaction atomic fallback used when a
//! single transaction cannot fit the wire limit.
//!
//! Grounded on `src/execution/jito_bundle_builder.rs`'s `BundleTransaction`/
//! `BundleConfig` shapes, narrowed to the spec's exact 2-tx partition (that
//! file's provider-routing, MEV-shield and ShredStream plumbing has no
//! counterpart here — see the trim notes in `DESIGN.md`).

use crate::assembly::size_estimator::RAW_SIZE_LIMIT;
use crate::error::AssemblyError;
use crate::txbuild;
use crate::types::{CompiledInstruction, PricingContext, SwapInstructionBundle};
use crate::validator::{decompose_fees, ValidationResult};
use solana_sdk::{
    hash::Hash,
    message::AddressLookupTableAccount,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    transaction::VersionedTransaction,
};
use tracing::warn;

/// Two transactions sharing one blockhash, submitted as an atomic bundle.
pub struct Bundle {
    pub tx1: VersionedTransaction,
    pub tx2: VersionedTransaction,
}

pub struct BundleBuilder;

impl BundleBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Partition per §4.5: TX1 = borrow + merged compute-budget + leg-1
    /// setup + leg-1 swap; TX2 = leg-2 swap + leg-2 cleanup + repay. Both
    /// compiled as V0 messages against the combined ALT set and signed by
    /// `wallet`; both MUST serialize to ≤ 1232 bytes or the opportunity is
    /// rejected.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        &self,
        borrow_ix: &CompiledInstruction,
        repay_ix: &CompiledInstruction,
        merged_compute_budget: &[CompiledInstruction],
        leg1: &SwapInstructionBundle,
        leg2: &SwapInstructionBundle,
        alts: &[AddressLookupTableAccount],
        blockhash: Hash,
        wallet: &Keypair,
    ) -> Result<Bundle, AssemblyError> {
        let payer = wallet.pubkey();

        let mut tx1_ixs: Vec<CompiledInstruction> = vec![borrow_ix.clone()];
        tx1_ixs.extend(merged_compute_budget.iter().cloned());
        tx1_ixs.extend(leg1.setup_instructions.iter().cloned());
        tx1_ixs.extend(leg1.main_instructions.iter().cloned());

        let mut tx2_ixs: Vec<CompiledInstruction> = leg2.main_instructions.clone();
        tx2_ixs.extend(leg2.cleanup_instructions.iter().cloned());
        tx2_ixs.push(repay_ix.clone());

        let compile = |ixs: &[CompiledInstruction]| -> Result<VersionedTransaction, AssemblyError> {
            let tx = txbuild::compile_and_sign(
                payer,
                &txbuild::to_sdk_instructions(ixs),
                alts,
                blockhash,
                wallet,
            )
            .map_err(|_| AssemblyError::SizeExceeded {
                actual: 0,
                limit: RAW_SIZE_LIMIT,
            })?;
            check_size(tx)
        };

        let tx1 = compile(&tx1_ixs)?;
        let tx2 = compile(&tx2_ixs)?;

        Ok(Bundle { tx1, tx2 })
    }

    /// Re-validate economics against `2 × per-signature base_fee` (two
    /// transactions each need their own signature fee) and the re-priced
    /// output, reusing the already-estimated priority fee to avoid a
    /// redundant RPC round trip (§4.5 "Validation").
    pub fn revalidate_economics(
        &self,
        repriced_output: u64,
        borrow_principal: u64,
        flash_loan_fee: u64,
        ctx: &PricingContext,
    ) -> ValidationResult {
        let doubled_ctx = PricingContext {
            base_fee: ctx.base_fee * 2,
            ..*ctx
        };
        decompose_fees(repriced_output, borrow_principal, flash_loan_fee, &doubled_ctx)
    }
}

fn check_size(tx: VersionedTransaction) -> Result<VersionedTransaction, AssemblyError> {
    let len = bincode::serialize(&tx)
        .map(|b| b.len())
        .unwrap_or(usize::MAX);
    if len > RAW_SIZE_LIMIT {
        warn!(size = len, "bundle leg exceeds raw size limit");
        return Err(AssemblyError::SizeExceeded {
            actual: len,
            limit: RAW_SIZE_LIMIT,
        });
    }
    Ok(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AccountRef;

    fn ix(program: Pubkey, n_accounts: usize, data_len: usize) -> CompiledInstruction {
        CompiledInstruction {
            program_id: program,
            account_refs: (0..n_accounts)
                .map(|_| AccountRef {
                    pubkey: Pubkey::new_unique(),
                    is_signer: false,
                    is_writable: true,
                })
                .collect(),
            data_bytes: vec![0u8; data_len],
        }
    }

    fn empty_leg() -> SwapInstructionBundle {
        SwapInstructionBundle {
            setup_instructions: vec![],
            main_instructions: vec![ix(Pubkey::new_unique(), 3, 32)],
            cleanup_instructions: vec![],
            compute_budget_instructions: vec![],
            lookup_table_addresses: vec![],
            out_amount: 0,
        }
    }

    #[test]
    fn small_bundle_fits_within_size_limit() {
        let builder = BundleBuilder::new();
        let wallet = Keypair::new();
        let borrow = ix(Pubkey::new_unique(), 4, 16);
        let repay = ix(Pubkey::new_unique(), 3, 16);
        let leg1 = empty_leg();
        let leg2 = empty_leg();

        let bundle = builder
            .build(
                &borrow,
                &repay,
                &[],
                &leg1,
                &leg2,
                &[],
                Hash::default(),
                &wallet,
            )
            .unwrap();

        assert!(bincode::serialize(&bundle.tx1).unwrap().len() <= RAW_SIZE_LIMIT);
        assert!(bincode::serialize(&bundle.tx2).unwrap().len() <= RAW_SIZE_LIMIT);
    }

    #[test]
    fn revalidation_doubles_base_fee() {
        let builder = BundleBuilder::new();
        let ctx = PricingContext {
            base_fee: 10_000,
            priority_fee: 5_000,
            tip_percent: 30,
            slippage_buffer_bps: 15,
            enable_net_profit_check: true,
        };
        let result = builder.revalidate_economics(50_100_000, 50_000_000, 0, &ctx);
        assert_eq!(result.breakdown.fixed_cost, 20_000 + 5_000);
    }
}
