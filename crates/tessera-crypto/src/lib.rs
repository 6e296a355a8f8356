//! Cryptographic primitives for tessera
//!
//! Ed25519 keys and signatures from the RustCrypto/dalek ecosystem, plus the
//! mapping from verification keys to owner identities.

pub mod keys;
pub mod signature;

pub use self::keys::{PrivateKey, PublicKey};
pub use self::signature::{sign_message, verify_signature, SIGNATURE_LEN};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid key length:: {0}")]
    InvalidKeyLength(usize),

    #[error("invalid public key:: {0}")]
    InvalidPublicKey(String),

    #[error("verification failed")]
    VerificationFailed,
}
