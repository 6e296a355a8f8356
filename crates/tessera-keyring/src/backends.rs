//! In-memory keyring backend
//!
//! Keys live only for the lifetime of the process. Used by tests and by the
//! CLI when `keyring_backend = "memory"`.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tessera_crypto::{sign_message, PrivateKey, PublicKey};
use tessera_types::{KeyAddress, Network};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{decode_private_key, validate_name, KeyInfo, Keyring, KeyringError};

/// Stored key data for backends
#[derive(Clone, Debug, Zeroize, ZeroizeOnDrop)]
pub(crate) struct StoredKey {
    #[zeroize(skip)]
    pub(crate) privkey: PrivateKey,
    #[zeroize(skip)]
    pub(crate) pubkey: PublicKey,
    #[zeroize(skip)]
    pub(crate) address: KeyAddress,
}

impl StoredKey {
    pub(crate) fn new(privkey: PrivateKey, network: Network) -> Self {
        let pubkey = privkey.public_key();
        let address = pubkey.to_address(network);
        Self {
            privkey,
            pubkey,
            address,
        }
    }

    pub(crate) fn info(&self, name: &str) -> KeyInfo {
        KeyInfo {
            name: name.to_string(),
            pubkey: self.pubkey,
            address: self.address,
        }
    }
}

/// In-memory keyring backend for testing and development
///
/// **WARNING**: This backend stores keys in plain text in memory.
#[derive(Debug)]
pub struct MemoryKeyring {
    network: Network,
    keys: BTreeMap<String, StoredKey>,
}

impl MemoryKeyring {
    /// Create a new in-memory keyring
    pub fn new(network: Network) -> Self {
        MemoryKeyring {
            network,
            keys: BTreeMap::new(),
        }
    }

    fn insert(&mut self, name: &str, privkey: PrivateKey) -> Result<KeyInfo, KeyringError> {
        validate_name(name)?;
        if self.keys.contains_key(name) {
            return Err(KeyringError::KeyExists(name.to_string()));
        }

        let stored_key = StoredKey::new(privkey, self.network);
        let info = stored_key.info(name);
        self.keys.insert(name.to_string(), stored_key);
        Ok(info)
    }
}

impl Default for MemoryKeyring {
    fn default() -> Self {
        Self::new(Network::default())
    }
}

#[async_trait]
impl Keyring for MemoryKeyring {
    async fn create_key(&mut self, name: &str) -> Result<KeyInfo, KeyringError> {
        self.insert(name, PrivateKey::generate())
    }

    async fn import_private_key(
        &mut self,
        name: &str,
        private_key_hex: &str,
    ) -> Result<KeyInfo, KeyringError> {
        let privkey = decode_private_key(private_key_hex)?;
        self.insert(name, privkey)
    }

    async fn list_keys(&self) -> Result<Vec<KeyInfo>, KeyringError> {
        Ok(self
            .keys
            .iter()
            .map(|(name, key)| key.info(name))
            .collect())
    }

    async fn get_key(&self, name: &str) -> Result<KeyInfo, KeyringError> {
        self.keys
            .get(name)
            .map(|key| key.info(name))
            .ok_or_else(|| KeyringError::KeyNotFound(name.to_string()))
    }

    async fn sign(&self, name: &str, data: &[u8]) -> Result<Vec<u8>, KeyringError> {
        let key = self
            .keys
            .get(name)
            .ok_or_else(|| KeyringError::KeyNotFound(name.to_string()))?;

        Ok(sign_message(&key.privkey, data))
    }

    async fn delete_key(&mut self, name: &str) -> Result<(), KeyringError> {
        self.keys
            .remove(name)
            .ok_or_else(|| KeyringError::KeyNotFound(name.to_string()))?;

        Ok(())
    }
}
