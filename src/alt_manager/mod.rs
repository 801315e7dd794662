//! ALT Manager (§4.6).
//!
//! Maintains one or more on-chain lookup tables, exposing `get_alt` and
//! `ensure_contains`. The teacher never touched address lookup tables at
//! all; this is grounded on `examples/other_examples/d53fa3e3_Go0p-galileo__
//! src-engine-mod.rs.rs`'s `lookup_table_accounts`/`resolved_lookup_tables`
//! handling and built directly on `solana_address_lookup_table_program`.

use crate::error::AltError;
use crate::rpc::RpcGateway;
use crate::types::AddressLookupTable;
use dashmap::DashMap;
use itertools::Itertools;
use solana_sdk::{
    instruction::Instruction,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const CACHE_TTL: Duration = Duration::from_secs(300);
const EXTEND_BATCH_SIZE: usize = 20;
const WARMUP_SLOTS: u64 = 1;

struct CacheEntry {
    table: AddressLookupTable,
    cached_at: Instant,
}

pub struct AltManager {
    rpc: Arc<RpcGateway>,
    cache: DashMap<Pubkey, CacheEntry>,
    dry_run: bool,
    managed: parking_lot::Mutex<Option<Pubkey>>,
}

impl AltManager {
    pub fn new(rpc: Arc<RpcGateway>, dry_run: bool) -> Self {
        Self {
            rpc,
            cache: DashMap::new(),
            dry_run,
            managed: parking_lot::Mutex::new(None),
        }
    }

    /// The provider ALT this manager keeps extended, once `initialize` has
    /// run (or `None` in `dry_run`, or before startup has reached that
    /// step).
    pub fn managed_address(&self) -> Option<Pubkey> {
        *self.managed.lock()
    }

    /// Initialize lifecycle step: create a new ALT if one doesn't exist yet
    /// and `dry_run == false`; otherwise skip creation.
    pub async fn initialize(&self, authority: &Keypair) -> anyhow::Result<Option<Pubkey>> {
        if self.dry_run {
            info!("dry_run enabled, skipping ALT creation");
            return Ok(None);
        }

        let slot = self.rpc.get_slot().await?;
        let (create_ix, alt_address) =
            solana_address_lookup_table_program::instruction::create_lookup_table(
                authority.pubkey(),
                authority.pubkey(),
                slot,
            );
        if !self.submit_and_confirm(authority, vec![create_ix]).await? {
            return Err(anyhow::anyhow!("create_lookup_table transaction failed to confirm"));
        }

        // Warmup window: an ALT only becomes usable after it has been
        // active for at least one slot.
        tokio::time::sleep(Duration::from_millis(400 * WARMUP_SLOTS)).await;

        self.cache.insert(
            alt_address,
            CacheEntry {
                table: AddressLookupTable {
                    address: alt_address,
                    authority: Some(authority.pubkey()),
                    addresses: Vec::new(),
                    deactivation_slot: u64::MAX,
                },
                cached_at: Instant::now(),
            },
        );
        *self.managed.lock() = Some(alt_address);
        Ok(Some(alt_address))
    }

    /// Preload: best-effort batch fetch of well-known ALTs at startup.
    pub async fn preload(&self, well_known: &[Pubkey]) {
        if well_known.is_empty() {
            return;
        }
        match self.rpc.get_multiple_accounts(well_known).await {
            Ok(accounts) => {
                for (addr, account) in well_known.iter().zip(accounts) {
                    if let Some(account) = account {
                        if let Ok(table) = decode_alt_account(*addr, &account.data) {
                            self.cache.insert(
                                *addr,
                                CacheEntry {
                                    table,
                                    cached_at: Instant::now(),
                                },
                            );
                        }
                    }
                }
            }
            Err(e) => warn!(error = %e, "ALT preload batch fetch failed (best-effort)"),
        }
    }

    pub fn get_alt(&self, address: Pubkey) -> Option<AddressLookupTable> {
        let entry = self.cache.get(&address)?;
        if entry.cached_at.elapsed() < CACHE_TTL {
            Some(entry.table.clone())
        } else {
            None
        }
    }

    /// Force a cache refresh for `address`, evicting the stale entry first.
    pub async fn refresh(&self, address: Pubkey) -> anyhow::Result<AddressLookupTable> {
        self.cache.remove(&address);
        let account = self
            .rpc
            .get_account_info(&address)
            .await?
            .ok_or_else(|| AltError::NotFound(address.to_string()))?;
        let table = decode_alt_account(address, &account.data)?;
        self.cache.insert(
            address,
            CacheEntry {
                table: table.clone(),
                cached_at: Instant::now(),
            },
        );
        Ok(table)
    }

    /// Extend lifecycle step: collect pubkeys referenced by `instructions`
    /// not already present in `address`'s table, and issue
    /// `extend_lookup_table` transactions in batches of ≤20, each confirmed
    /// before the next.
    ///
    /// MUST only be called after the caller's transaction-size check has
    /// passed (§4.6 safety, invariant I6) — enforced by callers, not here,
    /// since this module has no visibility into the size-check outcome.
    pub async fn ensure_contains(
        &self,
        authority: &Keypair,
        address: Pubkey,
        referenced: &[Pubkey],
    ) -> Result<(), AltError> {
        if self.dry_run {
            return Ok(());
        }

        let existing = self
            .get_alt(address)
            .map(|t| t.addresses)
            .unwrap_or_default();
        let existing_set: std::collections::HashSet<Pubkey> = existing.iter().copied().collect();

        // `.unique()` rather than `.dedup()`: duplicates in `referenced` are
        // not guaranteed adjacent, and `Vec::dedup` only collapses runs.
        let missing: Vec<Pubkey> = referenced
            .iter()
            .copied()
            .filter(|p| !existing_set.contains(p))
            .unique()
            .collect();

        if missing.is_empty() {
            return Ok(());
        }

        if existing.len() + missing.len() > AddressLookupTable::MAX_ADDRESSES {
            return Err(AltError::TableFull);
        }

        // Each batch must confirm on-chain before the next is sent, and
        // before the in-memory cache is trusted to reflect it (§4.6): a
        // batch that fails or times out bails out of the whole call without
        // touching the cache, leaving `missing` still missing on the next
        // `ensure_contains` attempt.
        let mut extended = Vec::with_capacity(missing.len());
        for batch in missing.chunks(EXTEND_BATCH_SIZE) {
            let extend_ix = solana_address_lookup_table_program::instruction::extend_lookup_table(
                address,
                authority.pubkey(),
                Some(authority.pubkey()),
                batch.to_vec(),
            );
            let confirmed = self
                .submit_and_confirm(authority, vec![extend_ix])
                .await
                .map_err(|e| AltError::Rpc(solana_client::client_error::ClientError::from(
                    solana_client::client_error::ClientErrorKind::Custom(e.to_string()),
                )))?;
            if !confirmed {
                warn!(%address, batch_len = batch.len(), "extend_lookup_table batch failed to confirm; aborting remaining batches");
                return Err(AltError::ExtendNotConfirmed(address.to_string()));
            }
            extended.extend_from_slice(batch);
        }

        if let Some(mut entry) = self.cache.get_mut(&address) {
            entry.table.addresses.extend(extended);
            entry.cached_at = Instant::now();
        }

        Ok(())
    }

    /// Submit `instructions` as one transaction and poll for confirmation,
    /// returning whether it landed successfully (vs. a transaction error or
    /// a confirmation timeout).
    async fn submit_and_confirm(
        &self,
        authority: &Keypair,
        instructions: Vec<Instruction>,
    ) -> anyhow::Result<bool> {
        let (blockhash, _) = self.rpc.get_latest_blockhash().await?;
        let message = solana_sdk::message::Message::new_with_blockhash(
            &instructions,
            Some(&authority.pubkey()),
            &blockhash,
        );
        let tx = solana_sdk::transaction::Transaction::new(
            &[authority],
            message,
            blockhash,
        );
        let versioned = solana_sdk::transaction::VersionedTransaction::from(tx);
        let signature = self.rpc.send_transaction(&versioned).await?;

        let deadline = Duration::from_secs(20);
        let poll_interval = Duration::from_millis(400);
        let mut elapsed = Duration::ZERO;
        loop {
            if let Some(ok) = self.rpc.get_signature_status(&signature).await? {
                return Ok(ok);
            }
            if elapsed >= deadline {
                warn!(%signature, "confirmation poll timed out");
                return Ok(false);
            }
            tokio::time::sleep(poll_interval).await;
            elapsed += poll_interval;
        }
    }
}

fn decode_alt_account(address: Pubkey, data: &[u8]) -> anyhow::Result<AddressLookupTable> {
    let state = solana_address_lookup_table_program::state::AddressLookupTable::deserialize(data)
        .map_err(|e| anyhow::anyhow!("failed to decode ALT account {address}: {e}"))?;
    Ok(AddressLookupTable {
        address,
        authority: state.meta.authority,
        addresses: state.addresses.to_vec(),
        deactivation_slot: state.meta.deactivation_slot,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_lookup_table_caps_at_256() {
        let table = AddressLookupTable {
            address: Pubkey::new_unique(),
            authority: None,
            addresses: vec![Pubkey::new_unique(); 256],
            deactivation_slot: u64::MAX,
        };
        assert_eq!(table.remaining_capacity(), 0);
    }

    #[test]
    fn deactivated_table_is_detected() {
        let table = AddressLookupTable {
            address: Pubkey::new_unique(),
            authority: None,
            addresses: vec![],
            deactivation_slot: 123,
        };
        assert!(table.is_deactivated());
    }
}
