//! Thin RPC gateway: blockhash caching plus the handful of JSON-RPC calls
//! named in `SPEC_FULL.md` §6 (`getLatestBlockhash`, `getSlot`,
//! `getAccountInfo`, `getMultipleAccountsInfo`, `simulateTransaction`,
//! `sendTransaction`, `getSignatureStatus`).
//!
//! Grounded on `rust-modules/src/execution/rpc_router.rs`, trimmed from its
//! multi-endpoint scoring/routing system (overkill here — this spec only
//! ever talks to one RPC node) down to the calls actually named in §6, and
//! on `rust-modules/src/solana/mod.rs`'s `simulate_transaction`/
//! `get_recent_blockhash`. Retry/backoff for RPC-adjacent calls (the
//! aggregator) lives in `aggregator::quote` via the `backoff` crate, not
//! here — this gateway has no retry loop of its own.

use crate::error::SimulationError;
use anyhow::{Context, Result};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    account::Account, commitment_config::CommitmentConfig, hash::Hash, pubkey::Pubkey,
    signature::Signature, transaction::VersionedTransaction,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

const BLOCKHASH_CACHE_TTL: Duration = Duration::from_secs(30);

struct CachedBlockhash {
    hash: Hash,
    acquired_at: Instant,
}

/// Outcome of a `simulateTransaction` call, classified per §4.4/§9.
#[derive(Debug, Clone)]
pub struct SimulationOutcome {
    pub valid: bool,
    pub logs: Vec<String>,
    pub compute_units_consumed: Option<u64>,
    pub error: Option<SimulationError>,
}

pub struct RpcGateway {
    client: RpcClient,
    http: reqwest::Client,
    rpc_url: String,
    block_engine_url: String,
    commitment: CommitmentConfig,
    blockhash_cache: RwLock<Option<CachedBlockhash>>,
}

impl RpcGateway {
    pub fn new(rpc_url: String, block_engine_url: String, commitment: &str, timeout_ms: u64) -> Self {
        let commitment = match commitment {
            "finalized" => CommitmentConfig::finalized(),
            "processed" => CommitmentConfig::processed(),
            _ => CommitmentConfig::confirmed(),
        };
        let client = RpcClient::new_with_timeout_and_commitment(
            rpc_url.clone(),
            Duration::from_millis(timeout_ms),
            commitment,
        );
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .expect("failed to build http client");
        Self {
            client,
            http,
            rpc_url,
            block_engine_url,
            commitment,
            blockhash_cache: RwLock::new(None),
        }
    }

    /// Freshness contract (§4.3): cached for ≤30s, re-fetched on miss. The
    /// returned hash carries its own acquisition instant so callers can
    /// enforce I8 (blockhash freshness) at submission time.
    pub async fn get_latest_blockhash(&self) -> Result<(Hash, Instant)> {
        {
            let guard = self.blockhash_cache.read().await;
            if let Some(cached) = guard.as_ref() {
                if cached.acquired_at.elapsed() < BLOCKHASH_CACHE_TTL {
                    return Ok((cached.hash, cached.acquired_at));
                }
            }
        }
        let hash = self
            .client
            .get_latest_blockhash()
            .await
            .context("getLatestBlockhash")?;
        let now = Instant::now();
        let mut guard = self.blockhash_cache.write().await;
        *guard = Some(CachedBlockhash {
            hash,
            acquired_at: now,
        });
        Ok((hash, now))
    }

    pub async fn get_slot(&self) -> Result<u64> {
        self.client.get_slot().await.context("getSlot")
    }

    pub async fn get_account_info(&self, pubkey: &Pubkey) -> Result<Option<Account>> {
        match self.client.get_account(pubkey).await {
            Ok(account) => Ok(Some(account)),
            Err(e) if e.to_string().contains("AccountNotFound") => Ok(None),
            Err(e) => Err(e).context("getAccountInfo"),
        }
    }

    pub async fn get_multiple_accounts(&self, pubkeys: &[Pubkey]) -> Result<Vec<Option<Account>>> {
        self.client
            .get_multiple_accounts(pubkeys)
            .await
            .context("getMultipleAccountsInfo")
    }

    /// `simulateTransaction` with the exact options §6/§4.4 require:
    /// `processed` commitment, signature verification disabled, blockhash
    /// replacement enabled. The transaction passed in is a local value never
    /// forwarded to the executor (§4.4 safety invariant) — this function
    /// only reads it to build the RPC request body.
    pub async fn simulate_transaction(
        &self,
        tx: &VersionedTransaction,
    ) -> Result<SimulationOutcome> {
        let serialized = bincode::serialize(tx).context("serializing tx for simulation")?;
        let encoded = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &serialized);

        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "simulateTransaction",
            "params": [
                encoded,
                {
                    "encoding": "base64",
                    "commitment": "processed",
                    "sigVerify": false,
                    "replaceRecentBlockhash": true,
                }
            ]
        });

        let response: serde_json::Value = self
            .http
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .context("simulateTransaction request")?
            .json()
            .await
            .context("simulateTransaction response parse")?;

        let result = &response["result"]["value"];
        let logs = result["logs"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        let compute_units_consumed = result["unitsConsumed"].as_u64();

        let err_value = &result["err"];
        if err_value.is_null() {
            return Ok(SimulationOutcome {
                valid: true,
                logs,
                compute_units_consumed,
                error: None,
            });
        }

        let error = classify_simulation_error(err_value);
        Ok(SimulationOutcome {
            valid: false,
            logs,
            compute_units_consumed,
            error: Some(error),
        })
    }

    pub async fn send_transaction(&self, tx: &VersionedTransaction) -> Result<Signature> {
        self.client
            .send_transaction(tx)
            .await
            .context("sendTransaction")
    }

    /// Submit `txs` as one atomic block-engine bundle (§4.5, §6, invariant
    /// I1): a single `sendBundle` JSON-RPC POST to `block_engine_url`
    /// carrying every transaction base64-encoded in one `params` array, so
    /// the block-engine either lands all of them or none — unlike two
    /// independent `sendTransaction` calls, which leave no such guarantee.
    /// Grounded on `jito_bundle_builder.rs`'s `submit_to_endpoint`, adapted
    /// from that file's single concatenated-bytes blob to the real Jito
    /// bundle wire shape (an array of individually base64-encoded
    /// transactions).
    pub async fn submit_bundle(&self, txs: &[VersionedTransaction]) -> Result<String> {
        let encoded: Vec<String> = txs
            .iter()
            .map(|tx| {
                let bytes = bincode::serialize(tx).context("serializing bundle transaction")?;
                Ok::<_, anyhow::Error>(base64::Engine::encode(
                    &base64::engine::general_purpose::STANDARD,
                    &bytes,
                ))
            })
            .collect::<Result<_>>()?;

        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "sendBundle",
            "params": [encoded],
        });

        let url = format!("{}/api/v1/bundles", self.block_engine_url);
        let response: serde_json::Value = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("sendBundle request")?
            .json()
            .await
            .context("sendBundle response parse")?;

        if let Some(err) = response.get("error") {
            return Err(anyhow::anyhow!("block-engine rejected bundle: {err}"));
        }
        response["result"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("sendBundle response missing a bundle id"))
    }

    pub async fn get_signature_status(&self, sig: &Signature) -> Result<Option<bool>> {
        let statuses = self
            .client
            .get_signature_statuses(&[*sig])
            .await
            .context("getSignatureStatus")?;
        Ok(statuses
            .value
            .into_iter()
            .next()
            .flatten()
            .map(|s| s.err.is_none()))
    }

    pub fn block_engine_url(&self) -> &str {
        &self.block_engine_url
    }

    pub fn http_client(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn commitment(&self) -> CommitmentConfig {
        self.commitment
    }
}

fn classify_simulation_error(err_value: &serde_json::Value) -> SimulationError {
    if let Some(obj) = err_value.as_object() {
        if let Some(ix) = obj.get("InstructionError") {
            if let Some(arr) = ix.as_array() {
                let index = arr.first().and_then(|v| v.as_u64()).unwrap_or(0) as u8;
                let reason = arr.get(1).cloned().unwrap_or(serde_json::Value::Null);
                if let Some(custom) = reason.get("Custom").and_then(|v| v.as_u64()) {
                    return SimulationError::CustomCode(custom as u32);
                }
                let reason_str = reason.as_str().map(str::to_string).unwrap_or_else(|| reason.to_string());
                if reason_str.contains("InsufficientFundsForRent") {
                    return SimulationError::InsufficientFundsForRent;
                }
                if reason_str.contains("InsufficientFunds") {
                    return SimulationError::InsufficientFunds;
                }
                return SimulationError::InstructionError {
                    index,
                    reason: reason_str,
                };
            }
        }
    }
    let s = err_value.to_string();
    if s.contains("InsufficientFundsForRent") {
        SimulationError::InsufficientFundsForRent
    } else if s.contains("InsufficientFunds") {
        SimulationError::InsufficientFunds
    } else {
        SimulationError::Other(s)
    }
}

pub type SharedRpcGateway = Arc<RpcGateway>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_custom_program_error() {
        let v = serde_json::json!({"InstructionError": [3, {"Custom": 1}]});
        let err = classify_simulation_error(&v);
        assert!(matches!(err, SimulationError::CustomCode(1)));
    }

    #[test]
    fn classifies_instruction_error_with_reason_string() {
        let v = serde_json::json!({"InstructionError": [1, "InvalidAccountData"]});
        let err = classify_simulation_error(&v);
        match err {
            SimulationError::InstructionError { index, reason } => {
                assert_eq!(index, 1);
                assert_eq!(reason, "InvalidAccountData");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn classifies_insufficient_funds() {
        let v = serde_json::json!("InsufficientFundsForRent");
        let err = classify_simulation_error(&v);
        assert!(matches!(err, SimulationError::InsufficientFundsForRent));
    }

    #[tokio::test]
    async fn blockhash_cache_reuses_within_ttl() {
        // Exercised indirectly via integration tests against a mock RPC;
        // this unit test only checks the cache struct's TTL arithmetic.
        let cached = CachedBlockhash {
            hash: Hash::default(),
            acquired_at: Instant::now(),
        };
        assert!(cached.acquired_at.elapsed() < BLOCKHASH_CACHE_TTL);
    }
}
