//! Assembly Engine (§4.3) — the largest component by design share.
//!
//! Given an opportunity and a chosen borrow amount, queries the aggregator
//! for swap instructions under the two-phase strategy selection scheme,
//! merges compute-budget instructions, loads ALTs, and picks the
//! highest-profit strategy combination whose estimated size fits the hard
//! limit (falling back to Bundle mode otherwise).
//!
//! Grounded on `rust-modules/src/solana/mod.rs`'s `optimize_transaction_fees`
//! (generalized from a hardcoded insert into a proper merge, see
//! `compute_budget.rs`) and on the decorator/assembly-context shape of
//! `examples/other_examples/4f18156b_Go0p-galileo__...landing-assembler.rs.rs`
//! for composing compute-budget + ALT application around a base instruction
//! set.

pub mod compute_budget;
pub mod size_estimator;

use crate::aggregator::{AggregatorClient, QuoteParams};
use crate::alt_manager::AltManager;
use crate::error::AssemblyError;
use crate::flash_loan::FlashLoanAdapter;
use crate::types::{Asset, CompiledInstruction, Opportunity, Strategy, SwapInstructionBundle};
use itertools::Itertools;
use size_estimator::{estimate_size, SizeEstimate, SizeEstimateInputs};
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct RouteComplexityLimits {
    pub max_dexes: usize,
    pub max_accounts_zero_fee: usize,
    pub max_accounts_fee: usize,
}

/// One fully-built candidate: both legs' instruction bundles under a given
/// strategy, plus its estimated size and profit.
pub struct StrategyCandidate {
    pub strategy: Strategy,
    pub leg1: SwapInstructionBundle,
    pub leg2: SwapInstructionBundle,
    pub estimated_size: SizeEstimate,
    pub estimated_profit: i128,
}

impl StrategyCandidate {
    pub fn fits(&self) -> bool {
        self.estimated_size.fits()
    }
}

pub enum AssemblyOutcome {
    /// Fits within the single-transaction size limit.
    Single(StrategyCandidate),
    /// No combination fit; the best-by-profit candidate regardless of size,
    /// to be handed to the Bundle Builder (§4.5).
    RequiresBundle(StrategyCandidate),
}

pub struct AssemblyEngine {
    aggregator: Arc<AggregatorClient>,
    alt_manager: Arc<AltManager>,
    flash_loan: Arc<FlashLoanAdapter>,
    limits: RouteComplexityLimits,
}

impl AssemblyEngine {
    pub fn new(
        aggregator: Arc<AggregatorClient>,
        alt_manager: Arc<AltManager>,
        flash_loan: Arc<FlashLoanAdapter>,
        limits: RouteComplexityLimits,
    ) -> Self {
        Self {
            aggregator,
            alt_manager,
            flash_loan,
            limits,
        }
    }

    /// Route-complexity filter (§4.3): reject a quote plan whose distinct
    /// DEX count or estimated account count exceeds the bound for the
    /// active flash-loan provider (more DEXes permitted at zero fee).
    fn check_route_complexity(
        &self,
        distinct_dexes: usize,
        estimated_accounts: usize,
        zero_fee_provider: bool,
    ) -> Result<(), AssemblyError> {
        if distinct_dexes > self.limits.max_dexes {
            return Err(AssemblyError::TooManyDexes {
                actual: distinct_dexes,
                limit: self.limits.max_dexes,
            });
        }
        let account_limit = if zero_fee_provider {
            self.limits.max_accounts_zero_fee
        } else {
            self.limits.max_accounts_fee
        };
        if estimated_accounts > account_limit {
            return Err(AssemblyError::TooManyAccounts {
                actual: estimated_accounts,
                limit: account_limit,
            });
        }
        Ok(())
    }

    /// Build both legs' `SwapInstructionBundle`s for one strategy, querying
    /// the aggregator for each leg concurrently (§4.3 Phase 1: "both legs in
    /// parallel with the flash-loan instruction build") since the outbound
    /// and return legs are independent until their results are combined in
    /// `estimate_candidate`.
    async fn build_leg_bundles(
        &self,
        opportunity: &Opportunity,
        strategy: Strategy,
        wallet: Pubkey,
    ) -> Result<(SwapInstructionBundle, SwapInstructionBundle), AssemblyError> {
        let params = QuoteParams {
            slippage_bps: 50,
            only_direct_routes: strategy.only_direct_routes,
            max_accounts: strategy.max_accounts,
            restrict_intermediate_tokens: true,
        };

        tokio::try_join!(
            self.build_one_leg(
                opportunity.input_asset,
                opportunity.bridge_asset,
                opportunity.input_amount,
                params,
                strategy,
                wallet,
            ),
            self.build_one_leg(
                opportunity.bridge_asset,
                opportunity.output_asset,
                opportunity.bridge_amount,
                params,
                strategy,
                wallet,
            ),
        )
    }

    /// Quote, route-complexity-check, and fetch swap instructions for one
    /// leg. The wire `QuoteResponse` is re-derived for the swap-instructions
    /// call; in a full deployment the aggregator client would retain the
    /// raw response alongside the parsed `Quote` rather than re-querying.
    async fn build_one_leg(
        &self,
        input: Asset,
        output: Asset,
        amount: u64,
        params: QuoteParams,
        strategy: Strategy,
        wallet: Pubkey,
    ) -> Result<SwapInstructionBundle, AssemblyError> {
        let quote = self.aggregator.quote(input, output, amount, params, None).await?;
        self.check_route_complexity(
            quote.distinct_dex_count(),
            strategy.max_accounts as usize,
            self.flash_loan.is_zero_fee(),
        )?;
        self.fetch_leg(&quote, wallet).await
    }

    async fn fetch_leg(
        &self,
        quote: &crate::types::Quote,
        wallet: Pubkey,
    ) -> Result<SwapInstructionBundle, AssemblyError> {
        let wire_quote = crate::aggregator::QuoteResponse {
            input_mint: Some(quote.input_asset.mint.to_string()),
            output_mint: Some(quote.output_asset.mint.to_string()),
            in_amount: Some(quote.input_amount.to_string()),
            out_amount: quote.output_amount.to_string(),
            route_plan: None,
            market_infos: None,
        };
        let resp = self.aggregator.swap_instructions(&wire_quote, wallet).await?;
        Ok(SwapInstructionBundle {
            setup_instructions: resp.setup_instructions,
            main_instructions: vec![resp.swap_instruction],
            cleanup_instructions: resp.cleanup_instruction.into_iter().collect(),
            compute_budget_instructions: resp.compute_budget_instructions,
            lookup_table_addresses: resp.address_lookup_table_addresses,
            out_amount: quote.output_amount,
        })
    }

    fn estimate_candidate(
        &self,
        strategy: Strategy,
        leg1: &SwapInstructionBundle,
        leg2: &SwapInstructionBundle,
        borrow_amount: u64,
    ) -> SizeEstimate {
        let all_instructions: Vec<&CompiledInstruction> = leg1
            .setup_instructions
            .iter()
            .chain(leg1.main_instructions.iter())
            .chain(leg1.cleanup_instructions.iter())
            .chain(leg2.setup_instructions.iter())
            .chain(leg2.main_instructions.iter())
            .chain(leg2.cleanup_instructions.iter())
            .collect();

        let instruction_count = all_instructions.len();
        let total_accounts: usize = all_instructions.iter().map(|ix| ix.account_refs.len()).sum();
        let total_data_bytes: usize = all_instructions.iter().map(|ix| ix.data_bytes.len()).sum();

        let alts: Vec<Pubkey> = leg1
            .lookup_table_addresses
            .iter()
            .chain(leg2.lookup_table_addresses.iter())
            .copied()
            .unique()
            .collect();

        let _ = strategy;
        let _ = borrow_amount;
        estimate_size(SizeEstimateInputs {
            instruction_count,
            total_accounts,
            total_data_bytes,
            alt_count: alts.len(),
        })
    }

    async fn try_strategy(
        &self,
        strategy: Strategy,
        opportunity: &Opportunity,
        borrow_amount: u64,
        wallet: Pubkey,
    ) -> Option<StrategyCandidate> {
        let (leg1, leg2) = match self
            .build_leg_bundles(opportunity, strategy, wallet)
            .await
        {
            Ok(pair) => pair,
            Err(e) => {
                debug!(strategy = strategy.name, error = %e, "strategy attempt failed");
                return None;
            }
        };

        let estimated_size = self.estimate_candidate(strategy, &leg1, &leg2, borrow_amount);
        let estimated_profit = leg2.out_amount as i128 - borrow_amount as i128;

        Some(StrategyCandidate {
            strategy,
            leg1,
            leg2,
            estimated_size,
            estimated_profit,
        })
    }

    /// Two-phase strategy selection (§4.3).
    pub async fn assemble(
        &self,
        opportunity: &Opportunity,
        borrow_amount: u64,
        wallet: Pubkey,
    ) -> Result<AssemblyOutcome, AssemblyError> {
        opportunity.assert_cyclic();

        let primary = Strategy::CANONICAL[0];
        let phase1 = self.try_strategy(primary, opportunity, borrow_amount, wallet).await;

        if let Some(candidate) = &phase1 {
            if candidate.estimated_profit > 0 && candidate.fits() {
                info!(strategy = primary.name, "phase 1 strategy adopted");
                return self.finalize(phase1.unwrap()).await;
            }
        }

        // Phase 2: remaining strategies in parallel.
        let remaining = &Strategy::CANONICAL[1..];
        let futures = remaining
            .iter()
            .map(|s| self.try_strategy(*s, opportunity, borrow_amount, wallet));
        let phase2_results = futures::future::join_all(futures).await;

        let mut candidates: Vec<StrategyCandidate> =
            phase2_results.into_iter().flatten().collect();
        if let Some(c) = phase1 {
            candidates.push(c);
        }

        if candidates.is_empty() {
            return Err(AssemblyError::NoFeasibleStrategy);
        }

        // Among combinations whose estimated size fits, pick the
        // highest-profit; tie-break by smallest size. If none fits, fall
        // back to the highest-profit candidate regardless of size and
        // proceed to Bundle mode.
        let best_fitting = candidates
            .iter()
            .filter(|c| c.fits())
            .max_by(|a, b| {
                a.estimated_profit
                    .cmp(&b.estimated_profit)
                    .then(b.estimated_size.raw_bytes.cmp(&a.estimated_size.raw_bytes))
            })
            .map(|c| c.strategy);

        let winner = if let Some(strategy) = best_fitting {
            candidates.into_iter().find(|c| c.strategy == strategy).unwrap()
        } else {
            warn!("no strategy combination fit the size limit; falling back to bundle mode");
            let best = candidates
                .into_iter()
                .max_by_key(|c| c.estimated_profit)
                .ok_or(AssemblyError::NoFeasibleStrategy)?;
            return Ok(AssemblyOutcome::RequiresBundle(best));
        };

        self.finalize(winner).await
    }

    async fn finalize(&self, candidate: StrategyCandidate) -> Result<AssemblyOutcome, AssemblyError> {
        if candidate.fits() {
            Ok(AssemblyOutcome::Single(candidate))
        } else {
            Ok(AssemblyOutcome::RequiresBundle(candidate))
        }
    }

    pub fn alt_manager(&self) -> &Arc<AltManager> {
        &self.alt_manager
    }
}
