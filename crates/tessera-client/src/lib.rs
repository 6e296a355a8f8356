//! Command line client for the tessera vault coordinator.
//!
//! Wires the vault, a RocksDB-backed local ledger and the owner keyring
//! together behind the `tessera` command.

pub mod cli;
pub mod config;
pub mod keys;
pub mod locks;

use tessera_errors::{Categorized, ErrorCategory};
use thiserror::Error;

/// Client error types
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("keys error: {0}")]
    Keys(#[from] keys::KeysError),

    #[error("storage error: {0}")]
    Store(#[from] tessera_store::StoreError),

    #[error(transparent)]
    Vault(#[from] tessera_vault::VaultError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no active signing session for {0}")]
    NoActiveSession(tessera_types::ResourceRef),

    #[error("failed to initialize logging: {0}")]
    Logging(String),
}

impl Categorized for ClientError {
    fn category(&self) -> ErrorCategory {
        match self {
            ClientError::Vault(err) => err.category(),
            ClientError::InvalidInput(_) => ErrorCategory::PolicyViolation,
            ClientError::Keys(err) if err.is_user_error() => ErrorCategory::PolicyViolation,
            ClientError::NoActiveSession(_) => ErrorCategory::SessionLifecycle,
            _ => ErrorCategory::Internal,
        }
    }
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Parse an amount given in lovelace (`2500000`) or ada (`2.5ada`)
pub fn parse_lovelace(input: &str) -> Result<u64> {
    use tessera_types::LOVELACE_PER_ADA;

    let invalid = || ClientError::InvalidInput(format!("invalid amount: {input}"));
    let input = input.trim();

    let Some(ada) = input
        .strip_suffix("ada")
        .or_else(|| input.strip_suffix("ADA"))
    else {
        return input.parse().map_err(|_| invalid());
    };

    let (whole, frac) = ada.trim().split_once('.').unwrap_or((ada.trim(), ""));
    if frac.len() > 6 || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let whole: u64 = whole.parse().map_err(|_| invalid())?;
    let frac: u64 = if frac.is_empty() {
        0
    } else {
        format!("{frac:0<6}").parse().map_err(|_| invalid())?
    };

    whole
        .checked_mul(LOVELACE_PER_ADA)
        .and_then(|v| v.checked_add(frac))
        .ok_or_else(invalid)
}

/// Render lovelace as ada with six decimals
pub fn format_ada(lovelace: u64) -> String {
    use tessera_types::LOVELACE_PER_ADA;

    format!(
        "{}.{:06} ada",
        lovelace / LOVELACE_PER_ADA,
        lovelace % LOVELACE_PER_ADA
    )
}
