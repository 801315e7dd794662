//! Crate-wide error taxonomy.
//!
//! Module boundaries return precise, matchable `thiserror` enums; the
//! pipeline and binary entry points collapse these into `anyhow::Result`
//! since at that level the only remaining action is log-and-drop.

use thiserror::Error;

/// Classified result of replaying a transaction against the simulator.
///
/// Mirrors the tagged-variant design called for in place of a polymorphic
/// exception hierarchy: callers match on this instead of inspecting strings.
#[derive(Debug, Clone, Error)]
pub enum SimulationError {
    #[error("instruction {index} failed: {reason}")]
    InstructionError { index: u8, reason: String },

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("insufficient funds for rent")]
    InsufficientFundsForRent,

    #[error("custom program error: {0}")]
    CustomCode(u32),

    #[error("simulation error: {0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("no route available")]
    NoRoute,

    #[error("aggregator returned server error (status {0})")]
    ServerError(u16),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected response shape: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum FlashLoanError {
    #[error("no template cached for asset {asset} signer {signer}")]
    NoTemplate { asset: String, signer: String },

    #[error("provider returned layout that disagrees with cached template outside [8,16)")]
    TemplateLayoutMismatch,

    #[error("provider request failed: {0}")]
    Provider(#[from] anyhow::Error),

    #[error("requested amount exceeds provider bound")]
    AmountOutOfBounds,
}

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("route uses {actual} distinct DEXes, exceeding the limit of {limit}")]
    TooManyDexes { actual: usize, limit: usize },

    #[error("route touches {actual} accounts, exceeding the limit of {limit}")]
    TooManyAccounts { actual: usize, limit: usize },

    #[error("no strategy combination produced a usable transaction")]
    NoFeasibleStrategy,

    #[error("serialized transaction is {actual} bytes, exceeding the hard limit of {limit}")]
    SizeExceeded { actual: usize, limit: usize },

    #[error(transparent)]
    Aggregator(#[from] AggregatorError),

    #[error(transparent)]
    FlashLoan(#[from] FlashLoanError),
}

#[derive(Debug, Error)]
pub enum AltError {
    #[error("lookup table already holds the maximum of 256 addresses")]
    TableFull,

    #[error("rpc call failed: {0}")]
    Rpc(#[from] solana_client::client_error::ClientError),

    #[error("lookup table {0} was not found on-chain")]
    NotFound(String),

    #[error("extend_lookup_table batch for {0} did not confirm")]
    ExtendNotConfirmed(String),
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("block-engine rejected submission: {0}")]
    Rejected(String),

    #[error("confirmation timed out after {0:?}")]
    ConfirmationTimeout(std::time::Duration),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Fatal, process-terminating configuration/startup error.
///
/// These are distinguished from the recoverable per-opportunity errors above
/// because the only correct response is `std::process::exit` with a distinct
/// status, per the error-handling design's "fatal startup" class.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("no wallet keypair configured (checked env var and config path)")]
    MissingKeypair,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("wallet balance check failed: {0}")]
    BalanceCheckFailed(#[from] anyhow::Error),
}
