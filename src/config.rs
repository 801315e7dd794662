//! Layered configuration surface (§6 "Configuration surface", §10.3).
//!
//! Precedence, highest first: CLI flags > environment variables > TOML file
//! > built-in defaults. The wallet keypair specifically follows the spec's
//! documented `env > config` precedence (see `WalletSource::resolve`).

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "arb-executor", about = "Cyclic flash-loan arbitrage executor")]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Do not send any transactions; log what would have been sent.
    #[arg(long)]
    pub dry_run: bool,

    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Directory for rotated daily log files; logging to stdout only if unset.
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    pub url: String,
    pub block_engine_url: String,
    pub commitment: String,
    #[serde(default = "default_rpc_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_rpc_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    pub base_url: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u8,
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u16,
}

fn default_max_retries() -> u8 {
    3
}
fn default_slippage_bps() -> u16 {
    50
}

/// Wallet source: exactly one of `keypair_path` or `secret_base58` is
/// expected to resolve; an environment variable always wins over either.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WalletConfig {
    pub keypair_path: Option<PathBuf>,
    pub secret_base58: Option<String>,
    #[serde(default = "default_wallet_env_var")]
    pub env_var: String,
}

fn default_wallet_env_var() -> String {
    "ARB_EXECUTOR_WALLET_SECRET".to_string()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BorrowBounds {
    pub min_borrow_lamports: u64,
    pub max_borrow_lamports: u64,
    pub min_multiplier: f64,
    pub max_multiplier: f64,
    pub safety_factor: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FlashLoanConfig {
    pub provider: FlashLoanProviderKind,
    pub template_ttl_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashLoanProviderKind {
    Fee,
    ZeroFee,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FinderConfig {
    pub worker_count: usize,
    pub query_interval_ms: u64,
    pub min_profit_lamports: u64,
}

/// One asset the Finder may treat as an input or bridge leg of a cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetConfig {
    pub mint: String,
    pub decimals: u8,
    /// Query-time amount used to probe round-trip quotes for this asset,
    /// before the validator's dynamic borrow-sizing policy resizes it.
    pub query_amount: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetUniverseConfig {
    pub input_assets: Vec<AssetConfig>,
    pub bridge_assets: Vec<AssetConfig>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EconomicsConfig {
    pub base_fee_lamports: u64,
    pub tip_percent: u8,
    pub slippage_buffer_bps: u16,
    pub enable_net_profit_check: bool,
    pub abnormal_roi_threshold_bps: u16,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub max_consecutive_failures: u32,
    pub max_hourly_loss_lamports: u64,
    pub min_success_rate: f64,
    pub cooldown_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub dry_run: bool,
    pub simulate_to_bundle: bool,
    pub min_tip_lamports: u64,
    pub max_tip_lamports: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    pub enabled: bool,
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub rpc: RpcConfig,
    pub aggregator: AggregatorConfig,
    pub wallet: WalletConfig,
    pub flash_loan: FlashLoanConfig,
    pub borrow_bounds: BorrowBounds,
    pub finder: FinderConfig,
    pub assets: AssetUniverseConfig,
    pub economics: EconomicsConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub execution: ExecutionConfig,
    #[serde(default = "PersistenceConfig::disabled")]
    pub persistence: PersistenceConfig,
    #[serde(default = "NotificationConfig::disabled")]
    pub notifications: NotificationConfig,
}

impl PersistenceConfig {
    fn disabled() -> Self {
        Self {
            enabled: false,
            database_url: None,
        }
    }
}

impl NotificationConfig {
    fn disabled() -> Self {
        Self {
            enabled: false,
            webhook_url: None,
        }
    }
}

impl AppConfig {
    /// Load from `dotenvy` + a TOML file at `path`, with environment
    /// variables (prefixed `ARB_EXECUTOR`) overriding file values, and CLI
    /// flags overriding both.
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let builder = config::Config::builder()
            .add_source(config::File::from(cli.config.clone()).required(false))
            .add_source(config::Environment::with_prefix("ARB_EXECUTOR").separator("__"));

        let mut cfg: AppConfig = builder.build()?.try_deserialize()?;
        if cli.dry_run {
            cfg.execution.dry_run = true;
        }
        Ok(cfg)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rpc: RpcConfig {
                url: "https://api.mainnet-beta.solana.com".to_string(),
                block_engine_url: "https://mainnet.block-engine.jito.wtf/api/v1/bundles"
                    .to_string(),
                commitment: "confirmed".to_string(),
                timeout_ms: default_rpc_timeout_ms(),
            },
            aggregator: AggregatorConfig {
                base_url: "https://quote-api.jup.ag/v6".to_string(),
                max_retries: default_max_retries(),
                slippage_bps: default_slippage_bps(),
            },
            wallet: WalletConfig::default(),
            flash_loan: FlashLoanConfig {
                provider: FlashLoanProviderKind::ZeroFee,
                template_ttl_seconds: 300,
            },
            borrow_bounds: BorrowBounds {
                min_borrow_lamports: 1_000_000_000,
                max_borrow_lamports: 100_000_000_000,
                min_multiplier: 1.0,
                max_multiplier: 4.0,
                safety_factor: 0.9,
            },
            finder: FinderConfig {
                worker_count: 3,
                query_interval_ms: 400,
                min_profit_lamports: 50_000,
            },
            assets: AssetUniverseConfig {
                input_assets: vec![AssetConfig {
                    mint: "So11111111111111111111111111111111111111112".to_string(),
                    decimals: 9,
                    query_amount: 1_000_000_000,
                }],
                bridge_assets: vec![AssetConfig {
                    mint: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".to_string(),
                    decimals: 6,
                    query_amount: 1_000_000_000,
                }],
            },
            economics: EconomicsConfig {
                base_fee_lamports: 5_000,
                tip_percent: 30,
                slippage_buffer_bps: 15,
                enable_net_profit_check: true,
                abnormal_roi_threshold_bps: 1_000,
            },
            circuit_breaker: CircuitBreakerConfig {
                max_consecutive_failures: 5,
                max_hourly_loss_lamports: 500_000_000,
                min_success_rate: 0.3,
                cooldown_seconds: 300,
            },
            execution: ExecutionConfig {
                dry_run: true,
                simulate_to_bundle: false,
                min_tip_lamports: 1_000,
                max_tip_lamports: 10_000_000,
            },
            persistence: PersistenceConfig::disabled(),
            notifications: NotificationConfig::disabled(),
        }
    }
}
