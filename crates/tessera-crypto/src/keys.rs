//! Key representations

use base64::{engine::general_purpose, Engine as _};
use ed25519_dalek::{SigningKey as Ed25519PrivKey, VerifyingKey as Ed25519PubKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tessera_types::{KeyAddress, Network, OwnerIdentity, VERIFICATION_KEY_LEN};

use crate::CryptoError;

/// Type tag used when serializing verification keys
pub const ED25519_TYPE: &str = "ed25519";

/// Ed25519 verification key
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKey(Ed25519PubKey);

/// Ed25519 signing key
#[derive(Clone)]
pub struct PrivateKey(Ed25519PrivKey);

impl PublicKey {
    /// Parse and validate a raw 32 byte verification key
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; VERIFICATION_KEY_LEN] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength(bytes.len()))?;
        let key = Ed25519PubKey::from_bytes(&array)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
        Ok(Self(key))
    }

    /// Convert to raw bytes
    pub fn to_bytes(&self) -> [u8; VERIFICATION_KEY_LEN] {
        self.0.to_bytes()
    }

    /// Owner identity hash of this key
    pub fn identity(&self) -> OwnerIdentity {
        OwnerIdentity::from_verification_key(self.0.as_bytes())
    }

    /// Account reference for this key on the given network
    pub fn to_address(&self, network: Network) -> KeyAddress {
        KeyAddress::new(network, self.to_bytes())
    }

    pub(crate) fn inner(&self) -> &Ed25519PubKey {
        &self.0
    }
}

impl TryFrom<&KeyAddress> for PublicKey {
    type Error = CryptoError;

    fn try_from(address: &KeyAddress) -> Result<Self, Self::Error> {
        Self::from_bytes(address.key_bytes())
    }
}

impl PrivateKey {
    /// Generate a fresh key from the operating system RNG
    pub fn generate() -> Self {
        Self(Ed25519PrivKey::generate(&mut OsRng))
    }

    /// Create from a 32 byte seed
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength(bytes.len()))?;
        Ok(Self(Ed25519PrivKey::from_bytes(&seed)))
    }

    /// Raw 32 byte seed
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Get the corresponding public key
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key())
    }

    pub(crate) fn inner(&self) -> &Ed25519PrivKey {
        &self.0
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PrivateKey")
            .field(&self.public_key().identity())
            .finish()
    }
}

// Custom serialization for PublicKey
impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        #[derive(Serialize)]
        struct PublicKeyData {
            #[serde(rename = "type")]
            key_type: String,
            value: String,
        }

        let data = PublicKeyData {
            key_type: ED25519_TYPE.to_string(),
            value: general_purpose::STANDARD.encode(self.to_bytes()),
        };

        data.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct PublicKeyData {
            #[serde(rename = "type")]
            key_type: String,
            value: String,
        }

        let data = PublicKeyData::deserialize(deserializer)?;
        if data.key_type != ED25519_TYPE {
            return Err(serde::de::Error::custom(format!(
                "unknown public key type: {}",
                data.key_type
            )));
        }
        let bytes = general_purpose::STANDARD
            .decode(&data.value)
            .map_err(serde::de::Error::custom)?;

        PublicKey::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_key_roundtrip_through_address() {
        let key = PrivateKey::generate().public_key();
        let address = key.to_address(Network::Testnet);
        let back = PublicKey::try_from(&address).unwrap();
        assert_eq!(back, key);
        assert_eq!(address.identity(), key.identity());
    }

    #[test]
    fn test_public_key_serde() {
        let key = PrivateKey::from_bytes(&[9u8; 32]).unwrap().public_key();
        let json = serde_json::to_string(&key).unwrap();
        assert!(json.contains("\"type\":\"ed25519\""));
        let back: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn test_invalid_key_length() {
        assert!(matches!(
            PublicKey::from_bytes(&[1u8; 31]),
            Err(CryptoError::InvalidKeyLength(31))
        ));
        assert!(PrivateKey::from_bytes(&[1u8; 33]).is_err());
    }

    #[test]
    fn test_debug_does_not_leak_seed() {
        let key = PrivateKey::from_bytes(&[0x42; 32]).unwrap();
        let debug = format!("{key:?}");
        assert!(!debug.contains(&hex::encode([0x42u8; 32])));
    }
}
