//! Core types for tessera
//!
//! Owner identities, account references and ledger resource references
//! shared by every other tessera crate.

pub mod address;
pub mod resource;

pub use address::{KeyAddress, Network, OwnerIdentity, IDENTITY_LEN, VERIFICATION_KEY_LEN};
pub use resource::{ResourceRef, TxId, TX_HASH_LEN};

use thiserror::Error;

/// Errors produced while parsing tessera types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypesError {
    #[error("invalid address:: {0}")]
    InvalidAddress(String),

    #[error("invalid hex:: {0}")]
    InvalidHex(String),

    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid resource reference:: {0}")]
    InvalidResourceRef(String),

    #[error("invalid network:: {0}")]
    InvalidNetwork(String),
}

/// Lovelace per ada
pub const LOVELACE_PER_ADA: u64 = 1_000_000;
