//! Executor Adapter (§4.8).
//!
//! Submits a signed single transaction or 2-transaction bundle to the
//! block-engine, tracks confirmation, and reports an outcome. Grounded on
//! `src/execution/jito_bundle_builder.rs`'s `BundleSubmission`/
//! `BundleProvider` result shape (trimmed to one provider path — see
//! `DESIGN.md` for the dropped multi-provider ShredStream/Lil'JIT routing)
//! and on `rust-modules/src/execution/rpc_router.rs`'s urgency-keyed
//! timeout table.

use crate::bundler::Bundle;
use crate::config::ExecutionConfig;
use crate::error::ExecutorError;
use crate::rpc::RpcGateway;
use solana_sdk::{signature::Signature, transaction::VersionedTransaction};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompetitionLevel {
    Low,
    Medium,
    High,
}

/// Mirrors the teacher's `rpc_router::UrgencyLevel`, whose per-level
/// timeout table (`Flash: 2000ms .. Low: 12000ms`) is reused verbatim for
/// confirmation polling below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Urgency {
    Flash,
    High,
    Medium,
    Low,
}

impl Urgency {
    pub fn confirmation_timeout(&self) -> Duration {
        let ms = match self {
            Urgency::Flash => 2_000,
            Urgency::High => 5_000,
            Urgency::Medium => 8_000,
            Urgency::Low => 12_000,
        };
        Duration::from_millis(ms)
    }
}

/// Rolling per-competition-level tip history, used as the `historical_data`
/// input to `TipCalculator::compute`.
#[derive(Debug, Default, Clone)]
pub struct TipHistory {
    pub recent_tips_lamports: Vec<u64>,
}

impl TipHistory {
    pub fn average(&self) -> u64 {
        if self.recent_tips_lamports.is_empty() {
            return 0;
        }
        (self.recent_tips_lamports.iter().sum::<u64>() / self.recent_tips_lamports.len() as u64)
            as u64
    }
}

/// `{expected_profit, competition_level, urgency, historical_data} -> tip`,
/// bounded to `[min_tip, max_tip]` (§4.8).
pub struct TipCalculator {
    min_tip: u64,
    max_tip: u64,
}

impl TipCalculator {
    pub fn new(min_tip: u64, max_tip: u64) -> Self {
        Self { min_tip, max_tip }
    }

    pub fn compute(
        &self,
        expected_profit: i128,
        competition: CompetitionLevel,
        urgency: Urgency,
        history: &TipHistory,
    ) -> u64 {
        if expected_profit <= 0 {
            return self.min_tip;
        }

        let competition_share = match competition {
            CompetitionLevel::Low => 0.10,
            CompetitionLevel::Medium => 0.25,
            CompetitionLevel::High => 0.45,
        };
        let urgency_multiplier = match urgency {
            Urgency::Flash => 1.5,
            Urgency::High => 1.2,
            Urgency::Medium => 1.0,
            Urgency::Low => 0.8,
        };

        let base = (expected_profit as f64 * competition_share * urgency_multiplier) as u64;
        // Blend in recent history so the tip doesn't whipsaw tick-to-tick.
        let blended = if history.recent_tips_lamports.is_empty() {
            base
        } else {
            (base + history.average()) / 2
        };

        blended.clamp(self.min_tip, self.max_tip)
    }
}

#[derive(Debug, Clone)]
pub enum ExecutionPayload {
    Single(VersionedTransaction),
    Bundle { tx1: VersionedTransaction, tx2: VersionedTransaction },
}

impl From<VersionedTransaction> for ExecutionPayload {
    fn from(tx: VersionedTransaction) -> Self {
        ExecutionPayload::Single(tx)
    }
}

impl From<Bundle> for ExecutionPayload {
    fn from(bundle: Bundle) -> Self {
        ExecutionPayload::Bundle {
            tx1: bundle.tx1,
            tx2: bundle.tx2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub signatures: Vec<Signature>,
    pub error: Option<String>,
}

pub struct ExecutorAdapter {
    rpc: Arc<RpcGateway>,
    cfg: ExecutionConfig,
}

impl ExecutorAdapter {
    pub fn new(rpc: Arc<RpcGateway>, cfg: ExecutionConfig) -> Self {
        Self { rpc, cfg }
    }

    /// Submit `payload` to the block-engine, honoring the dry-run and
    /// simulate-to-bundle gates (§4.8) before anything is actually sent.
    pub async fn execute(
        &self,
        payload: ExecutionPayload,
        urgency: Urgency,
    ) -> Result<ExecutionOutcome, ExecutorError> {
        if self.cfg.dry_run {
            info!("dry_run: synthesizing success without sending");
            log_payload_hex(&payload);
            return Ok(ExecutionOutcome {
                success: true,
                signatures: vec![],
                error: None,
            });
        }
        if self.cfg.simulate_to_bundle {
            info!("simulate_to_bundle: transaction signed but not sent");
            log_payload_hex(&payload);
            return Ok(ExecutionOutcome {
                success: true,
                signatures: vec![],
                error: None,
            });
        }

        match payload {
            ExecutionPayload::Single(tx) => self.send_and_confirm_one(&tx, urgency).await,
            ExecutionPayload::Bundle { tx1, tx2 } => {
                self.send_and_confirm_bundle(&tx1, &tx2, urgency).await
            }
        }
    }

    async fn send_and_confirm_one(
        &self,
        tx: &VersionedTransaction,
        urgency: Urgency,
    ) -> Result<ExecutionOutcome, ExecutorError> {
        let signature = self.rpc.send_transaction(tx).await.map_err(|e| {
            ExecutorError::Rejected(e.to_string())
        })?;

        let confirmed = self.poll_confirmation(signature, urgency).await?;
        Ok(ExecutionOutcome {
            success: confirmed,
            signatures: vec![signature],
            error: if confirmed {
                None
            } else {
                Some("signature confirmed with error or timed out".to_string())
            },
        })
    }

    /// Submit both legs as one atomic block-engine bundle (§4.5, invariant
    /// I1) rather than two independent `sendTransaction` calls — the
    /// block-engine either lands both or neither, so a failed bundle can
    /// never leave the wallet having borrowed without repaying.
    async fn send_and_confirm_bundle(
        &self,
        tx1: &VersionedTransaction,
        tx2: &VersionedTransaction,
        urgency: Urgency,
    ) -> Result<ExecutionOutcome, ExecutorError> {
        let sig1 = *tx1.signatures.first().ok_or_else(|| ExecutorError::Rejected("tx1 unsigned".to_string()))?;
        let sig2 = *tx2.signatures.first().ok_or_else(|| ExecutorError::Rejected("tx2 unsigned".to_string()))?;

        self.rpc
            .submit_bundle(&[tx1.clone(), tx2.clone()])
            .await
            .map_err(|e| ExecutorError::Rejected(e.to_string()))?;

        let (confirmed1, confirmed2) = tokio::try_join!(
            self.poll_confirmation(sig1, urgency),
            self.poll_confirmation(sig2, urgency)
        )?;
        let success = confirmed1 && confirmed2;

        if !success {
            warn!(
                sig1 = %sig1,
                sig2 = %sig2,
                "bundle did not fully confirm"
            );
        }

        Ok(ExecutionOutcome {
            success,
            signatures: vec![sig1, sig2],
            error: if success {
                None
            } else {
                Some("bundle leg failed to confirm".to_string())
            },
        })
    }

    async fn poll_confirmation(
        &self,
        signature: Signature,
        urgency: Urgency,
    ) -> Result<bool, ExecutorError> {
        let deadline = urgency.confirmation_timeout();
        let poll_interval = Duration::from_millis(400);
        let mut elapsed = Duration::ZERO;

        loop {
            match self.rpc.get_signature_status(&signature).await {
                Ok(Some(ok)) => return Ok(ok),
                Ok(None) => {}
                Err(e) => return Err(ExecutorError::Rejected(e.to_string())),
            }
            if elapsed >= deadline {
                return Err(ExecutorError::ConfirmationTimeout(deadline));
            }
            sleep(poll_interval).await;
            elapsed += poll_interval;
        }
    }
}

/// Hex-dump the first bytes of a would-be-sent payload's wire encoding, for
/// manual inspection in `dry_run`/`simulate_to_bundle` logs.
fn log_payload_hex(payload: &ExecutionPayload) {
    let dump = |label: &str, tx: &VersionedTransaction| {
        if let Ok(bytes) = bincode::serialize(tx) {
            debug!(tx = label, wire = %hex::encode(&bytes[..bytes.len().min(64)]), "serialized transaction (truncated)");
        }
    };
    match payload {
        ExecutionPayload::Single(tx) => dump("single", tx),
        ExecutionPayload::Bundle { tx1, tx2 } => {
            dump("tx1", tx1);
            dump("tx2", tx2);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tip_is_bounded_by_min_and_max() {
        let calc = TipCalculator::new(1_000, 100_000);
        let history = TipHistory::default();
        let tip = calc.compute(1_000_000_000, CompetitionLevel::High, Urgency::Flash, &history);
        assert!(tip >= 1_000 && tip <= 100_000);
    }

    #[test]
    fn negative_expected_profit_uses_floor_tip() {
        let calc = TipCalculator::new(1_000, 100_000);
        let history = TipHistory::default();
        let tip = calc.compute(-500, CompetitionLevel::Low, Urgency::Low, &history);
        assert_eq!(tip, 1_000);
    }

    #[test]
    fn higher_competition_and_urgency_raise_the_tip() {
        let calc = TipCalculator::new(0, u64::MAX);
        let history = TipHistory::default();
        let low = calc.compute(1_000_000, CompetitionLevel::Low, Urgency::Low, &history);
        let high = calc.compute(1_000_000, CompetitionLevel::High, Urgency::Flash, &history);
        assert!(high > low);
    }

    #[test]
    fn history_dampens_a_single_spike() {
        let calc = TipCalculator::new(0, u64::MAX);
        let mut history = TipHistory::default();
        history.recent_tips_lamports = vec![1_000, 1_000, 1_000];
        let dampened = calc.compute(1_000_000_000, CompetitionLevel::High, Urgency::Flash, &history);
        let undampened = calc.compute(
            1_000_000_000,
            CompetitionLevel::High,
            Urgency::Flash,
            &TipHistory::default(),
        );
        assert!(dampened < undampened);
    }
}
