//! Key management for tessera
//!
//! Owners hold ed25519 keys in a keyring. The vault coordinator never sees
//! private keys: it asks a keyring-backed credential provider for the
//! account reference and for a signature over a release body.

use async_trait::async_trait;
use tessera_crypto::PublicKey;
use tessera_types::KeyAddress;
use thiserror::Error;

pub mod backends;
pub mod file;

pub use backends::MemoryKeyring;
pub use file::FileKeyring;

#[derive(Error, Debug)]
pub enum KeyringError {
    #[error("key not found:: {0}")]
    KeyNotFound(String),

    #[error("key already exists:: {0}")]
    KeyExists(String),

    #[error("invalid key name:: {0}")]
    InvalidName(String),

    #[error("invalid private key:: {0}")]
    InvalidPrivateKey(String),

    #[error("backend error:: {0}")]
    BackendError(String),
}

/// Information about a stored key
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyInfo {
    pub name: String,
    pub pubkey: PublicKey,
    pub address: KeyAddress,
}

/// Trait for keyring implementations
#[async_trait]
pub trait Keyring: Send + Sync {
    /// Create a new key from fresh randomness
    async fn create_key(&mut self, name: &str) -> Result<KeyInfo, KeyringError>;

    /// Import a key from a hex encoded 32 byte ed25519 seed
    async fn import_private_key(
        &mut self,
        name: &str,
        private_key_hex: &str,
    ) -> Result<KeyInfo, KeyringError>;

    /// List all stored keys, sorted by name
    async fn list_keys(&self) -> Result<Vec<KeyInfo>, KeyringError>;

    /// Get a key by name
    async fn get_key(&self, name: &str) -> Result<KeyInfo, KeyringError>;

    /// Sign data with a key
    async fn sign(&self, name: &str, data: &[u8]) -> Result<Vec<u8>, KeyringError>;

    /// Delete a key
    async fn delete_key(&mut self, name: &str) -> Result<(), KeyringError>;
}

/// Key names double as file names, so keep them boring
pub(crate) fn validate_name(name: &str) -> Result<(), KeyringError> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(KeyringError::InvalidName(name.to_string()))
    }
}

/// Decode a hex seed into a private key
pub(crate) fn decode_private_key(
    private_key_hex: &str,
) -> Result<tessera_crypto::PrivateKey, KeyringError> {
    let mut bytes = hex::decode(private_key_hex.trim())
        .map_err(|e| KeyringError::InvalidPrivateKey(format!("invalid hex: {e}")))?;
    let key = tessera_crypto::PrivateKey::from_bytes(&bytes)
        .map_err(|e| KeyringError::InvalidPrivateKey(e.to_string()));
    zeroize::Zeroize::zeroize(&mut bytes);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("alice").is_ok());
        assert!(validate_name("owner_2-backup").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("../etc/passwd").is_err());
        assert!(validate_name("has space").is_err());
    }

    #[test]
    fn test_decode_private_key() {
        let key = decode_private_key(&"01".repeat(32)).unwrap();
        assert_eq!(key.to_bytes(), [1u8; 32]);
        assert!(decode_private_key("zz").is_err());
        assert!(decode_private_key(&"01".repeat(16)).is_err());
    }
}
