//! Wallet credentials
//!
//! The coordinator never touches private keys. A [`CredentialProvider`]
//! stands for one connected wallet: it names its account and signs payloads
//! on request.

use async_trait::async_trait;
use tessera_keyring::Keyring;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("wallet unavailable:: {0}")]
    Unavailable(String),

    #[error("signing rejected:: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Account reference of the connected wallet
    async fn account_ref(&self) -> Result<String, CredentialError>;

    /// Sign `payload` with the key behind `account_ref`
    async fn sign(&self, payload: &[u8], account_ref: &str) -> Result<Vec<u8>, CredentialError>;
}

/// Credentials backed by a named keyring entry
pub struct KeyringCredentials<'a> {
    keyring: &'a dyn Keyring,
    name: String,
}

impl<'a> KeyringCredentials<'a> {
    pub fn new(keyring: &'a dyn Keyring, name: impl Into<String>) -> Self {
        Self {
            keyring,
            name: name.into(),
        }
    }
}

#[async_trait]
impl CredentialProvider for KeyringCredentials<'_> {
    async fn account_ref(&self) -> Result<String, CredentialError> {
        let info = self
            .keyring
            .get_key(&self.name)
            .await
            .map_err(|e| CredentialError::Unavailable(e.to_string()))?;
        Ok(info.address.to_string())
    }

    async fn sign(&self, payload: &[u8], account_ref: &str) -> Result<Vec<u8>, CredentialError> {
        let current = self.account_ref().await?;
        if current != account_ref {
            return Err(CredentialError::Rejected(format!(
                "key {} does not control {account_ref}",
                self.name
            )));
        }
        self.keyring
            .sign(&self.name, payload)
            .await
            .map_err(|e| CredentialError::Rejected(e.to_string()))
    }
}
