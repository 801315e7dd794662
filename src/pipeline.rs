//! Orchestration (§5 data flow): Finder -> Validator (pre-filters) ->
//! Assembly -> Simulation -> Bundler (fallback) -> Executor, with the
//! circuit breaker gating every attempt and metrics/notifications/
//! persistence recording every terminal outcome.
//!
//! Grounded on `core/execution/src/lib.rs`'s `ExecutionEngine::start`/
//! `stop` cooperative-shutdown shape, generalized from its order-queue
//! model to this spec's opportunity-stream model.

use crate::alt_manager::AltManager;
use crate::assembly::compute_budget::{classify, decode_u32_arg, decode_u64_arg, ComputeBudgetKind};
use crate::assembly::{AssemblyEngine, AssemblyOutcome};
use crate::bundler::{Bundle, BundleBuilder};
use crate::config::AppConfig;
use crate::executor::{
    CompetitionLevel, ExecutionPayload, ExecutorAdapter, TipCalculator, TipHistory, Urgency,
};
use crate::finder::Finder;
use crate::flash_loan::FlashLoanAdapter;
use crate::metrics::Metrics;
use crate::notify::{Notifier, OutcomeEvent};
use crate::persistence::PersistenceSink;
use crate::rpc::RpcGateway;
use crate::simulation::SimulationGate;
use crate::txbuild;
use crate::types::{CompiledInstruction, Opportunity, PricingContext};
use crate::validator::{decompose_fees, is_abnormal_roi, size_borrow, AttemptOutcome, CircuitBreaker};
use itertools::Itertools;
use parking_lot::Mutex;
use solana_sdk::message::AddressLookupTableAccount;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

pub struct Pipeline {
    cfg: AppConfig,
    wallet: Arc<Keypair>,
    rpc: Arc<RpcGateway>,
    finder: Arc<Finder>,
    assembly: Arc<AssemblyEngine>,
    alt_manager: Arc<AltManager>,
    flash_loan: Arc<FlashLoanAdapter>,
    simulation: Arc<SimulationGate>,
    bundler: Arc<BundleBuilder>,
    executor: Arc<ExecutorAdapter>,
    circuit_breaker: Arc<CircuitBreaker>,
    tip_calculator: Arc<TipCalculator>,
    tip_history: Arc<Mutex<TipHistory>>,
    metrics: Arc<Metrics>,
    notifier: Arc<dyn Notifier>,
    persistence: Mutex<Arc<dyn PersistenceSink>>,
    running: Arc<AtomicBool>,
}

#[allow(clippy::too_many_arguments)]
impl Pipeline {
    pub fn new(
        cfg: AppConfig,
        wallet: Arc<Keypair>,
        rpc: Arc<RpcGateway>,
        finder: Arc<Finder>,
        assembly: Arc<AssemblyEngine>,
        alt_manager: Arc<AltManager>,
        flash_loan: Arc<FlashLoanAdapter>,
        simulation: Arc<SimulationGate>,
        bundler: Arc<BundleBuilder>,
        executor: Arc<ExecutorAdapter>,
        circuit_breaker: Arc<CircuitBreaker>,
        metrics: Arc<Metrics>,
        notifier: Arc<dyn Notifier>,
        persistence: Arc<dyn PersistenceSink>,
    ) -> Self {
        let tip_calculator = Arc::new(TipCalculator::new(
            cfg.execution.min_tip_lamports,
            cfg.execution.max_tip_lamports,
        ));
        Self {
            cfg,
            wallet,
            rpc,
            finder,
            assembly,
            alt_manager,
            flash_loan,
            simulation,
            bundler,
            executor,
            circuit_breaker,
            tip_calculator,
            tip_history: Arc::new(Mutex::new(TipHistory::default())),
            metrics,
            notifier,
            persistence: Mutex::new(persistence),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Swap in a new persistence sink (e.g. once an async DB connection
    /// completes after construction). The previous sink is dropped.
    pub fn set_persistence(&self, sink: Arc<dyn PersistenceSink>) {
        *self.persistence.lock() = sink;
    }

    /// Start the finder workers plus the consumer loop that fans each
    /// discovered opportunity out to its own task. Returns once shutdown has
    /// been requested and all in-flight opportunities have been dispatched.
    pub async fn run(self: Arc<Self>) {
        self.running.store(true, Ordering::SeqCst);
        let (tx, mut rx) = mpsc::unbounded_channel::<Opportunity>();
        let finder_handles = self.finder.start(tx);

        while self.running.load(Ordering::SeqCst) {
            match rx.recv().await {
                Some(opportunity) => {
                    let pipeline = Arc::clone(&self);
                    tokio::spawn(async move {
                        pipeline.handle_opportunity(opportunity).await;
                    });
                }
                None => break,
            }
        }

        self.finder.stop();
        for handle in finder_handles {
            let _ = handle.await;
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.finder.stop();
    }

    #[instrument(skip(self, opportunity), fields(input = %opportunity.input_asset, bridge = %opportunity.bridge_asset))]
    async fn handle_opportunity(&self, opportunity: Opportunity) {
        if let Err(reason) = self.pre_filter(&opportunity) {
            self.metrics.record_filtered(reason);
            return;
        }

        self.metrics.opportunities_attempted.inc();
        let borrow_amount = size_borrow(
            opportunity.input_amount,
            opportunity.profit(),
            &self.cfg.borrow_bounds,
        );

        // Assembly (aggregator round trips for both legs) and flash-loan
        // instruction synthesis (provider PDA/cache lookup) don't depend on
        // each other's output, so they run concurrently rather than back to
        // back.
        let (assembly_result, flash_loan_result) = tokio::join!(
            self.assembly.assemble(&opportunity, borrow_amount, self.wallet.pubkey()),
            self.flash_loan
                .instructions(borrow_amount, opportunity.input_asset, self.wallet.pubkey()),
        );

        let outcome = match assembly_result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "assembly failed");
                self.metrics.record_filtered("assembly_failed");
                return;
            }
        };

        let (borrow_ix, repay_ix) = match flash_loan_result {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "flash loan instruction synthesis failed");
                self.metrics.record_filtered("flash_loan_failed");
                return;
            }
        };

        let result = match outcome {
            AssemblyOutcome::Single(candidate) => {
                self.execute_single(&borrow_ix, &repay_ix, candidate).await
            }
            AssemblyOutcome::RequiresBundle(candidate) => {
                self.execute_bundle(&borrow_ix, &repay_ix, candidate).await
            }
        };

        match result {
            Ok(outcome) => self.finish(&opportunity, outcome).await,
            Err(reason) => self.metrics.record_filtered(reason),
        }
    }

    /// Pre-filters that don't need a network round trip: abnormal ROI and
    /// the circuit breaker (§4.2).
    fn pre_filter(&self, opportunity: &Opportunity) -> Result<(), &'static str> {
        if !self.circuit_breaker.can_attempt() {
            return Err("circuit_breaker_open");
        }
        if is_abnormal_roi(
            opportunity.profit(),
            opportunity.input_amount,
            self.cfg.economics.abnormal_roi_threshold_bps,
        ) {
            return Err("abnormal_roi");
        }
        Ok(())
    }

    async fn resolve_alts(&self, addresses: &[Pubkey]) -> Vec<AddressLookupTableAccount> {
        addresses
            .iter()
            .copied()
            .unique()
            .filter_map(|addr| self.alt_manager.get_alt(addr))
            .map(|table| AddressLookupTableAccount {
                key: table.address,
                addresses: table.addresses,
            })
            .collect()
    }

    /// Decodes the merged compute-budget pair into `(unit_limit, lamports)`
    /// so economics validation can use the actual priority fee rather than
    /// assuming zero.
    fn priority_fee_lamports(&self, merged: &[CompiledInstruction]) -> u64 {
        let mut limit: u64 = 0;
        let mut micro_lamports_price: u64 = 0;
        for ix in merged {
            match classify(ix) {
                ComputeBudgetKind::Limit => limit = decode_u32_arg(ix).unwrap_or(0) as u64,
                ComputeBudgetKind::Price => micro_lamports_price = decode_u64_arg(ix).unwrap_or(0),
                ComputeBudgetKind::Other => {}
            }
        }
        (micro_lamports_price * limit) / 1_000_000
    }

    async fn execute_single(
        &self,
        borrow_ix: &CompiledInstruction,
        repay_ix: &CompiledInstruction,
        candidate: crate::assembly::StrategyCandidate,
    ) -> Result<ExecutionResult, &'static str> {
        let mut compute_budget_sources = candidate.leg1.compute_budget_instructions.clone();
        compute_budget_sources.extend(candidate.leg2.compute_budget_instructions.clone());
        let merged_cb = crate::assembly::compute_budget::merge_compute_budget_instructions(
            &compute_budget_sources,
        );
        let priority_fee = self.priority_fee_lamports(&merged_cb);

        let flash_loan_fee = self.flash_loan.fee_for(borrow_amount_from(repay_ix));
        let pricing_ctx = PricingContext::from_config(&self.cfg.economics, priority_fee);
        let validation = decompose_fees(
            candidate.leg2.out_amount,
            borrow_amount_from(borrow_ix),
            flash_loan_fee,
            &pricing_ctx,
        );
        if !validation.valid {
            return Err("economics_invalid");
        }

        let tip = self.tip_calculator.compute(
            validation.net_profit,
            CompetitionLevel::Medium,
            Urgency::Flash,
            &self.tip_history.lock(),
        );
        self.tip_history.lock().recent_tips_lamports.push(tip);

        let mut alt_addrs = candidate.leg1.lookup_table_addresses.clone();
        alt_addrs.extend(candidate.leg2.lookup_table_addresses.clone());
        let alts = self.resolve_alts(&alt_addrs).await;

        let mut instructions: Vec<CompiledInstruction> = vec![borrow_ix.clone()];
        instructions.extend(merged_cb);
        instructions.extend(candidate.leg1.setup_instructions.clone());
        instructions.extend(candidate.leg1.main_instructions.clone());
        instructions.extend(candidate.leg2.main_instructions.clone());
        instructions.extend(candidate.leg2.cleanup_instructions.clone());
        instructions.push(repay_ix.clone());

        // §4.6 safety invariant (I6): `ensure_contains` only runs once the
        // size check has already passed — `candidate` only reaches this
        // function as `AssemblyOutcome::Single`, which means it does.
        if let Some(managed) = self.alt_manager.managed_address() {
            let referenced = referenced_pubkeys(&instructions);
            if let Err(e) = self.alt_manager.ensure_contains(&self.wallet, managed, &referenced).await {
                warn!(error = %e, "ALT extend failed; proceeding with uncompressed accounts");
            }
        }

        let (blockhash, _) = self
            .rpc
            .get_latest_blockhash()
            .await
            .map_err(|_| "blockhash_unavailable")?;
        let sdk_instructions = txbuild::to_sdk_instructions(&instructions);

        let sim_tx = txbuild::compile_and_sign(
            self.wallet.pubkey(),
            &sdk_instructions,
            &alts,
            blockhash,
            &self.wallet,
        )
        .map_err(|_| "compile_failed")?;
        let sim_outcome = self
            .simulation
            .simulate(sim_tx)
            .await
            .map_err(|_| "simulation_request_failed")?;
        if sim_outcome.error.is_some() {
            self.metrics.simulation_filtered.inc();
            return Err("simulation_rejected");
        }

        // Rebuild for submission: the simulated transaction object is never
        // the one sent (§4.4 safety invariant).
        let submit_tx = txbuild::compile_and_sign(
            self.wallet.pubkey(),
            &sdk_instructions,
            &alts,
            blockhash,
            &self.wallet,
        )
        .map_err(|_| "compile_failed")?;
        let serialized = bincode::serialize(&submit_tx).map_err(|_| "serialize_failed")?;
        self.simulation
            .check_final_size(&serialized)
            .map_err(|_| "final_size_exceeded")?;

        let outcome = self
            .executor
            .execute(ExecutionPayload::from(submit_tx), Urgency::Flash)
            .await
            .map_err(|_| "execution_failed")?;

        Ok(ExecutionResult {
            success: outcome.success,
            signatures: outcome.signatures.iter().map(|s| s.to_string()).collect(),
            error: outcome.error,
            net_profit: validation.net_profit,
        })
    }

    async fn execute_bundle(
        &self,
        borrow_ix: &CompiledInstruction,
        repay_ix: &CompiledInstruction,
        candidate: crate::assembly::StrategyCandidate,
    ) -> Result<ExecutionResult, &'static str> {
        let mut compute_budget_sources = candidate.leg1.compute_budget_instructions.clone();
        compute_budget_sources.extend(candidate.leg2.compute_budget_instructions.clone());
        let merged_cb = crate::assembly::compute_budget::merge_compute_budget_instructions(
            &compute_budget_sources,
        );
        let priority_fee = self.priority_fee_lamports(&merged_cb);

        let flash_loan_fee = self.flash_loan.fee_for(borrow_amount_from(repay_ix));
        let pricing_ctx = PricingContext::from_config(&self.cfg.economics, priority_fee);
        let validation = self.bundler.revalidate_economics(
            candidate.leg2.out_amount,
            borrow_amount_from(borrow_ix),
            flash_loan_fee,
            &pricing_ctx,
        );
        if !validation.valid {
            return Err("economics_invalid");
        }

        let mut alt_addrs = candidate.leg1.lookup_table_addresses.clone();
        alt_addrs.extend(candidate.leg2.lookup_table_addresses.clone());
        let alts = self.resolve_alts(&alt_addrs).await;

        let (blockhash, _) = self
            .rpc
            .get_latest_blockhash()
            .await
            .map_err(|_| "blockhash_unavailable")?;

        let build = |alts: &[AddressLookupTableAccount]| -> Result<Bundle, &'static str> {
            self.bundler
                .build(
                    borrow_ix,
                    repay_ix,
                    &merged_cb,
                    &candidate.leg1,
                    &candidate.leg2,
                    alts,
                    blockhash,
                    &self.wallet,
                )
                .map_err(|_| "bundle_size_exceeded")
        };

        let sim_bundle = build(&alts)?;

        // `build` above already enforced both legs' size limits, so the
        // size-check gate for I6 has passed at this point.
        if let Some(managed) = self.alt_manager.managed_address() {
            let mut referenced = vec![borrow_ix, repay_ix]
                .into_iter()
                .flat_map(|ix| ix.account_refs.iter().map(|r| r.pubkey))
                .collect::<Vec<_>>();
            referenced.extend(referenced_pubkeys(&candidate.leg1.setup_instructions));
            referenced.extend(referenced_pubkeys(&candidate.leg1.main_instructions));
            referenced.extend(referenced_pubkeys(&candidate.leg2.main_instructions));
            referenced.extend(referenced_pubkeys(&candidate.leg2.cleanup_instructions));
            if let Err(e) = self.alt_manager.ensure_contains(&self.wallet, managed, &referenced).await {
                warn!(error = %e, "ALT extend failed; proceeding with uncompressed accounts");
            }
        }

        let sim1 = self
            .simulation
            .simulate(sim_bundle.tx1)
            .await
            .map_err(|_| "simulation_request_failed")?;
        let sim2 = self
            .simulation
            .simulate(sim_bundle.tx2)
            .await
            .map_err(|_| "simulation_request_failed")?;
        if sim1.error.is_some() || sim2.error.is_some() {
            self.metrics.simulation_filtered.inc();
            return Err("simulation_rejected");
        }

        let submit_bundle = build(&alts)?;
        let outcome = self
            .executor
            .execute(ExecutionPayload::from(submit_bundle), Urgency::Flash)
            .await
            .map_err(|_| "execution_failed")?;

        Ok(ExecutionResult {
            success: outcome.success,
            signatures: outcome.signatures.iter().map(|s| s.to_string()).collect(),
            error: outcome.error,
            net_profit: validation.net_profit,
        })
    }

    async fn finish(&self, opportunity: &Opportunity, result: ExecutionResult) {
        self.circuit_breaker.record(AttemptOutcome {
            succeeded: result.success,
            loss_lamports: if result.success {
                0
            } else {
                self.cfg.economics.base_fee_lamports
            },
        });

        if result.success {
            self.metrics.opportunities_succeeded.inc();
            if result.net_profit > 0 {
                self.metrics.total_profit_lamports.inc_by(result.net_profit as u64);
            }
        } else {
            self.metrics.opportunities_failed.inc();
            self.metrics.total_loss_lamports.inc_by(self.cfg.economics.base_fee_lamports);
        }

        let event = OutcomeEvent {
            event_id: uuid::Uuid::new_v4(),
            opportunity_id: format!("{}-{}", opportunity.input_asset, opportunity.bridge_asset),
            success: result.success,
            profit_lamports: result.net_profit,
            signatures: result.signatures,
            error: result.error,
            resolved_at: chrono::Utc::now(),
        };
        self.notifier.notify(&event).await;
        self.persistence.lock().clone().record(&event).await;

        info!(success = result.success, net_profit = result.net_profit, "opportunity resolved");
    }
}

struct ExecutionResult {
    success: bool,
    signatures: Vec<String>,
    error: Option<String>,
    net_profit: i128,
}

fn referenced_pubkeys(instructions: &[CompiledInstruction]) -> Vec<Pubkey> {
    instructions
        .iter()
        .flat_map(|ix| ix.account_refs.iter().map(|r| r.pubkey))
        .collect()
}

/// The borrow amount is recoverable from the patched template bytes
/// `[8, 16)` rather than threaded separately through every call site.
fn borrow_amount_from(ix: &CompiledInstruction) -> u64 {
    ix.data_bytes
        .get(8..16)
        .and_then(|b| b.try_into().ok())
        .map(u64::from_le_bytes)
        .unwrap_or(0)
}
