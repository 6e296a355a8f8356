//! Account reference resolution
//!
//! Maps the opaque account reference handed over by a wallet to the owner
//! identity used in lock policies. Pure and stateless.

use tessera_crypto::PublicKey;
use tessera_types::{KeyAddress, OwnerIdentity};

use crate::error::{Result, VaultError};

/// Resolve an account reference to its owner identity
pub fn resolve(account_ref: &str) -> Result<OwnerIdentity> {
    resolve_key(account_ref).map(|key| key.identity())
}

/// Resolve an account reference to the verification key it carries
///
/// Accepts `addr_vk`/`addr_test_vk` bech32 strings and bare 64 character hex
/// verification keys. The key must be a valid ed25519 point.
pub fn resolve_key(account_ref: &str) -> Result<PublicKey> {
    let invalid = |reason: String| VaultError::InvalidAccountReference {
        reference: account_ref.to_string(),
        reason,
    };

    let address = KeyAddress::parse(account_ref).map_err(|e| invalid(e.to_string()))?;
    PublicKey::try_from(&address).map_err(|e| invalid(e.to_string()))
}
