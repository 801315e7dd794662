//! Wallet keypair loading.
//!
//! Out of scope as a *feature* (no custody/key-generation logic lives here),
//! but the signing capability the rest of the system depends on has to come
//! from somewhere concrete: a file path or a base58 secret, with an
//! environment variable taking precedence over the config file (§6).

use crate::config::WalletConfig;
use crate::error::StartupError;
use solana_sdk::signature::Keypair;
use zeroize::Zeroize;

pub fn load_keypair(cfg: &WalletConfig) -> Result<Keypair, StartupError> {
    if let Ok(mut env_secret) = std::env::var(&cfg.env_var) {
        let result = decode_base58_secret(&env_secret);
        env_secret.zeroize();
        return result;
    }

    if let Some(secret) = &cfg.secret_base58 {
        return decode_base58_secret(secret);
    }

    if let Some(path) = &cfg.keypair_path {
        let bytes = std::fs::read(path)
            .map_err(|e| StartupError::InvalidConfig(format!("reading {path:?}: {e}")))?;
        let raw: Vec<u8> = serde_json::from_slice(&bytes)
            .map_err(|e| StartupError::InvalidConfig(format!("parsing {path:?}: {e}")))?;
        return Keypair::from_bytes(&raw)
            .map_err(|e| StartupError::InvalidConfig(format!("invalid keypair bytes: {e}")));
    }

    Err(StartupError::MissingKeypair)
}

fn decode_base58_secret(secret: &str) -> Result<Keypair, StartupError> {
    let mut bytes = bs58::decode(secret.trim())
        .into_vec()
        .map_err(|e| StartupError::InvalidConfig(format!("invalid base58 secret: {e}")))?;
    let result = Keypair::from_bytes(&bytes)
        .map_err(|e| StartupError::InvalidConfig(format!("invalid keypair bytes: {e}")));
    bytes.zeroize();
    result
}
