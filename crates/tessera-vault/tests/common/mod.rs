#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Arc;
use tessera_crypto::{sign_message, PrivateKey};
use tessera_store::MemStore;
use tessera_types::{Network, OwnerIdentity};
use tessera_vault::{CredentialError, CredentialProvider, LocalLedger, LockRecord, Vault};

pub const CUSTODY: &str = "addr_test1wqcustody";
pub const RECIPIENT: &str = "addr_test1qrecipient";

/// A wallet holding one ed25519 key
pub struct Wallet {
    key: PrivateKey,
}

impl Wallet {
    pub fn new(seed: u8) -> Self {
        Self {
            key: PrivateKey::from_bytes(&[seed; 32]).unwrap(),
        }
    }

    pub fn account_ref(&self) -> String {
        self.key
            .public_key()
            .to_address(Network::Testnet)
            .to_string()
    }

    pub fn identity(&self) -> OwnerIdentity {
        self.key.public_key().identity()
    }
}

#[async_trait]
impl CredentialProvider for Wallet {
    async fn account_ref(&self) -> Result<String, CredentialError> {
        Ok(Wallet::account_ref(self))
    }

    async fn sign(&self, payload: &[u8], _account_ref: &str) -> Result<Vec<u8>, CredentialError> {
        Ok(sign_message(&self.key, payload))
    }
}

/// Wallet that signs something other than what it was asked to
pub struct ForgingWallet(pub Wallet);

#[async_trait]
impl CredentialProvider for ForgingWallet {
    async fn account_ref(&self) -> Result<String, CredentialError> {
        Ok(self.0.account_ref())
    }

    async fn sign(&self, _payload: &[u8], _account_ref: &str) -> Result<Vec<u8>, CredentialError> {
        Ok(sign_message(&self.0.key, b"something else"))
    }
}

/// Wallet whose user declines every signing request
pub struct DecliningWallet(pub Wallet);

#[async_trait]
impl CredentialProvider for DecliningWallet {
    async fn account_ref(&self) -> Result<String, CredentialError> {
        Ok(self.0.account_ref())
    }

    async fn sign(&self, _payload: &[u8], _account_ref: &str) -> Result<Vec<u8>, CredentialError> {
        Err(CredentialError::Rejected("user declined".into()))
    }
}

pub struct Harness {
    pub ledger: Arc<LocalLedger<MemStore>>,
    pub vault: Vault,
    pub wallets: Vec<Wallet>,
}

impl Harness {
    pub fn new(owner_count: u8) -> Self {
        let ledger = Arc::new(LocalLedger::new(MemStore::new(), CUSTODY));
        let vault = Vault::new(Box::new(MemStore::new()), ledger.clone(), CUSTODY);
        let wallets = (1..=owner_count).map(Wallet::new).collect();
        Self {
            ledger,
            vault,
            wallets,
        }
    }

    pub fn owner_refs(&self) -> Vec<String> {
        self.wallets.iter().map(Wallet::account_ref).collect()
    }

    pub async fn lock(&self, threshold: u32, amount: u64) -> LockRecord {
        self.vault
            .lock_funds(&self.owner_refs(), threshold, amount)
            .await
            .unwrap()
    }
}
