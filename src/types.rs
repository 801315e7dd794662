//! Core data model shared across the pipeline (see `SPEC_FULL.md` §3).

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::time::Instant;

/// A 32-byte token identifier with its decimals. Immutable once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Asset {
    pub mint: Pubkey,
    pub decimals: u8,
}

impl Asset {
    pub fn new(mint: Pubkey, decimals: u8) -> Self {
        Self { mint, decimals }
    }
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.mint)
    }
}

/// One hop of a route plan, as returned by the aggregator or synthesized
/// from a flat (non-`routePlan`) quote response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteStep {
    pub dex_label: String,
    pub pool_id: String,
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub in_amount: u64,
    pub out_amount: u64,
}

/// A quote for a single swap leg, stamped with acquisition time so downstream
/// stages can measure end-to-end latency or apply a staleness policy.
#[derive(Debug, Clone)]
pub struct Quote {
    pub input_asset: Asset,
    pub output_asset: Asset,
    pub input_amount: u64,
    pub output_amount: u64,
    pub route_plan: Vec<RouteStep>,
    pub acquired_at: Instant,
}

impl Quote {
    pub fn distinct_dex_count(&self) -> usize {
        self.route_plan
            .iter()
            .map(|s| s.dex_label.as_str())
            .collect::<std::collections::HashSet<_>>()
            .len()
    }
}

/// A discovered cyclic (A -> B -> A) price discrepancy.
///
/// Invariant: `output_asset == input_asset`. Owned by the pipeline task that
/// processes it; dropped after the terminal decision.
#[derive(Debug, Clone)]
pub struct Opportunity {
    pub input_asset: Asset,
    pub bridge_asset: Asset,
    pub output_asset: Asset,
    pub input_amount: u64,
    pub bridge_amount: u64,
    pub output_amount: u64,
    pub outbound_quote: Quote,
    pub return_quote: Quote,
    pub discovered_at: Instant,
    pub latency_outbound_ms: u64,
    pub latency_return_ms: u64,
}

impl Opportunity {
    /// `output_amount - input_amount`, per the data model's `profit` field.
    /// Saturating because a quote that round-trips below par must still be
    /// representable (and rejected downstream) rather than panic.
    pub fn profit(&self) -> i128 {
        self.output_amount as i128 - self.input_amount as i128
    }

    pub fn assert_cyclic(&self) {
        debug_assert_eq!(
            self.output_asset.mint, self.input_asset.mint,
            "opportunity output asset must equal input asset (cyclic)"
        );
    }
}

/// An account reference inside a `CompiledInstruction`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRef {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

/// A single instruction as returned by the aggregator, prior to compilation
/// into a `solana_sdk::instruction::Instruction`. Kept as its own type so the
/// aggregator layer can deserialize bit-exactly (base64 data preserved as-is,
/// account flags preserved) before any chain-specific type is involved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledInstruction {
    pub program_id: Pubkey,
    pub account_refs: Vec<AccountRef>,
    pub data_bytes: Vec<u8>,
}

impl CompiledInstruction {
    pub fn into_instruction(self) -> solana_sdk::instruction::Instruction {
        solana_sdk::instruction::Instruction {
            program_id: self.program_id,
            accounts: self
                .account_refs
                .into_iter()
                .map(|a| solana_sdk::instruction::AccountMeta {
                    pubkey: a.pubkey,
                    is_signer: a.is_signer,
                    is_writable: a.is_writable,
                })
                .collect(),
            data: self.data_bytes,
        }
    }
}

/// Output of the assembly engine for one swap leg.
#[derive(Debug, Clone)]
pub struct SwapInstructionBundle {
    pub setup_instructions: Vec<CompiledInstruction>,
    pub main_instructions: Vec<CompiledInstruction>,
    pub cleanup_instructions: Vec<CompiledInstruction>,
    pub compute_budget_instructions: Vec<CompiledInstruction>,
    pub lookup_table_addresses: Vec<Pubkey>,
    pub out_amount: u64,
}

/// A decoded, in-process view of an on-chain Address Lookup Table.
///
/// Owned by the ALT Manager; mutated only through its `extend` path.
#[derive(Debug, Clone)]
pub struct AddressLookupTable {
    pub address: Pubkey,
    pub authority: Option<Pubkey>,
    pub addresses: Vec<Pubkey>,
    pub deactivation_slot: u64,
}

impl AddressLookupTable {
    pub const MAX_ADDRESSES: usize = 256;

    pub fn is_deactivated(&self) -> bool {
        self.deactivation_slot != u64::MAX
    }

    pub fn remaining_capacity(&self) -> usize {
        Self::MAX_ADDRESSES.saturating_sub(self.addresses.len())
    }
}

/// Cached flash-loan instruction template, keyed by `(asset, signer)`.
///
/// `borrow_data_template`/`repay_data_template` reserve bytes `[8, 16)` for a
/// little-endian u64 amount; everything else is fixed for the key.
#[derive(Debug, Clone)]
pub struct FlashLoanTemplate {
    pub asset: Asset,
    pub signer: Pubkey,
    pub program_id: Pubkey,
    pub borrow_accounts: Vec<AccountRef>,
    pub borrow_data_template: Vec<u8>,
    pub repay_accounts: Vec<AccountRef>,
    pub repay_data_template: Vec<u8>,
    pub built_at: Instant,
}

impl FlashLoanTemplate {
    /// Byte range reserved for the little-endian u64 borrow amount.
    pub const AMOUNT_RANGE: std::ops::Range<usize> = 8..16;

    pub fn is_fresh(&self, ttl: std::time::Duration) -> bool {
        self.built_at.elapsed() < ttl
    }

    /// Clone the templates and patch in `amount`, producing assembled
    /// instructions without any RPC — the cache-hit fast path (§4.7).
    pub fn instantiate(&self, amount: u64) -> (CompiledInstruction, CompiledInstruction) {
        let mut borrow_data = self.borrow_data_template.clone();
        borrow_data[Self::AMOUNT_RANGE].copy_from_slice(&amount.to_le_bytes());
        let mut repay_data = self.repay_data_template.clone();
        repay_data[Self::AMOUNT_RANGE].copy_from_slice(&amount.to_le_bytes());

        let borrow = CompiledInstruction {
            program_id: self.program_id,
            account_refs: self.borrow_accounts.clone(),
            data_bytes: borrow_data,
        };
        let repay = CompiledInstruction {
            program_id: self.program_id,
            account_refs: self.repay_accounts.clone(),
            data_bytes: repay_data,
        };
        (borrow, repay)
    }
}

/// A constraint set handed to the aggregator, ordered from most liberal
/// (more profit, larger tx) to most restrictive (smaller tx).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Strategy {
    pub name: &'static str,
    pub max_accounts: u8,
    pub only_direct_routes: bool,
}

impl Strategy {
    /// Canonical ordered strategy set from §4.3.
    pub const CANONICAL: [Strategy; 3] = [
        Strategy {
            name: "liberal",
            max_accounts: 20,
            only_direct_routes: false,
        },
        Strategy {
            name: "balanced",
            max_accounts: 18,
            only_direct_routes: false,
        },
        Strategy {
            name: "constrained",
            max_accounts: 16,
            only_direct_routes: true,
        },
    ];
}

/// Fee-decomposition weights and toggles (§4.2), the actual parameter type
/// `validator::decompose_fees` takes instead of an `EconomicsConfig` plus a
/// separately-threaded `priority_fee`.
#[derive(Debug, Clone, Copy)]
pub struct PricingContext {
    pub base_fee: u64,
    pub priority_fee: u64,
    pub tip_percent: u8,
    pub slippage_buffer_bps: u16,
    pub enable_net_profit_check: bool,
}

impl PricingContext {
    pub fn from_config(cfg: &crate::config::EconomicsConfig, priority_fee: u64) -> Self {
        Self {
            base_fee: cfg.base_fee_lamports,
            priority_fee,
            tip_percent: cfg.tip_percent,
            slippage_buffer_bps: cfg.slippage_buffer_bps,
            enable_net_profit_check: cfg.enable_net_profit_check,
        }
    }
}
