//! Simulation Gate (§4.4).
//!
//! Wraps `RpcGateway::simulate_transaction` with the component's two safety
//! invariants: the transaction used for simulation is never the one handed
//! to the executor, and a post-signing size recheck is mandatory before
//! anything is allowed to proceed.
//!
//! Grounded on `rust-modules/src/execution/flash_loan_coordinator.rs`'s
//! `simulate_transaction`, whose JSON-RPC params omitted `sigVerify: false`
//! — added here because §6 requires it explicitly.

use crate::assembly::size_estimator::{BASE64_SIZE_LIMIT, RAW_SIZE_LIMIT};
use crate::error::AssemblyError;
use crate::rpc::{RpcGateway, SimulationOutcome};
use solana_sdk::transaction::VersionedTransaction;
use std::sync::Arc;
use tracing::{info, warn};

pub struct SimulationGate {
    rpc: Arc<RpcGateway>,
}

impl SimulationGate {
    pub fn new(rpc: Arc<RpcGateway>) -> Self {
        Self { rpc }
    }

    /// Replay `tx` against the node's simulator. `tx` is consumed by value
    /// (not borrowed) so the caller cannot accidentally reuse the simulated
    /// copy as the submitted one — a fresh transaction must be built for
    /// submission after a successful simulation, per the §4.4 safety
    /// invariant.
    pub async fn simulate(&self, tx: VersionedTransaction) -> anyhow::Result<SimulationOutcome> {
        let outcome = self.rpc.simulate_transaction(&tx).await?;
        if let Some(err) = &outcome.error {
            warn!(error = %err, "simulation rejected opportunity");
        } else {
            info!(
                compute_units = outcome.compute_units_consumed,
                "simulation succeeded"
            );
        }
        Ok(outcome)
    }

    /// Size recheck (§4.4): after signing, verify raw and base64 sizes
    /// against the hard limits independent of the pre-signing estimate.
    pub fn check_final_size(&self, serialized: &[u8]) -> Result<(), AssemblyError> {
        let raw = serialized.len();
        if raw > RAW_SIZE_LIMIT {
            return Err(AssemblyError::SizeExceeded {
                actual: raw,
                limit: RAW_SIZE_LIMIT,
            });
        }
        let base64_len =
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD, serialized).len();
        if base64_len > BASE64_SIZE_LIMIT {
            return Err(AssemblyError::SizeExceeded {
                actual: base64_len,
                limit: BASE64_SIZE_LIMIT,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_oversized_raw_transaction() {
        let rpc_url = "http://localhost:8899".to_string();
        let rpc = Arc::new(RpcGateway::new(rpc_url, "http://localhost".to_string(), "confirmed", 5_000));
        let gate = SimulationGate::new(rpc);
        let oversized = vec![0u8; RAW_SIZE_LIMIT + 1];
        assert!(gate.check_final_size(&oversized).is_err());
    }

    #[test]
    fn accepts_in_bounds_transaction() {
        let rpc_url = "http://localhost:8899".to_string();
        let rpc = Arc::new(RpcGateway::new(rpc_url, "http://localhost".to_string(), "confirmed", 5_000));
        let gate = SimulationGate::new(rpc);
        let small = vec![0u8; 100];
        assert!(gate.check_final_size(&small).is_ok());
    }
}
