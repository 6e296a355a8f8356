//! Address and identity types for tessera

use bech32::{Bech32, Hrp};
use ripemd::Ripemd160;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::TypesError;

/// Length of an owner identity hash in bytes
pub const IDENTITY_LEN: usize = 20;

/// Length of an ed25519 verification key in bytes
pub const VERIFICATION_KEY_LEN: usize = 32;

/// Network an account reference is encoded for
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    #[default]
    Testnet,
}

impl Network {
    /// Human readable part used for verification key addresses
    pub fn key_hrp(&self) -> &'static str {
        match self {
            Network::Mainnet => "addr_vk",
            Network::Testnet => "addr_test_vk",
        }
    }

    /// Resolve the network from a verification key HRP
    pub fn from_key_hrp(hrp: &str) -> Option<Self> {
        match hrp {
            "addr_vk" => Some(Network::Mainnet),
            "addr_test_vk" => Some(Network::Testnet),
            _ => None,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Testnet => write!(f, "testnet"),
        }
    }
}

impl FromStr for Network {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" | "preprod" | "preview" => Ok(Network::Testnet),
            other => Err(TypesError::InvalidNetwork(other.to_string())),
        }
    }
}

/// Canonical owner identity - 20 bytes
///
/// Derived as ripemd160(sha256(verification_key)). Two account references
/// naming the same verification key always resolve to the same identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerIdentity([u8; IDENTITY_LEN]);

impl OwnerIdentity {
    /// Derive an identity from raw verification key bytes
    pub fn from_verification_key(key_bytes: &[u8]) -> Self {
        let sha256_hash = Sha256::digest(key_bytes);
        let ripemd160_hash = Ripemd160::digest(sha256_hash);
        let mut bytes = [0u8; IDENTITY_LEN];
        bytes.copy_from_slice(&ripemd160_hash);
        Self(bytes)
    }

    /// Wrap an already computed identity hash
    pub fn from_bytes(bytes: [u8; IDENTITY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse an identity from a byte slice of exactly [`IDENTITY_LEN`] bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypesError> {
        let array: [u8; IDENTITY_LEN] =
            bytes
                .try_into()
                .map_err(|_| TypesError::InvalidLength {
                    expected: IDENTITY_LEN,
                    actual: bytes.len(),
                })?;
        Ok(Self(array))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; IDENTITY_LEN] {
        &self.0
    }

    /// Lowercase hex encoding
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for OwnerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for OwnerIdentity {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| TypesError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl Serialize for OwnerIdentity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for OwnerIdentity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Account reference carrying an ed25519 verification key
///
/// Encoded as bech32 with an `addr_vk`/`addr_test_vk` prefix, or as a bare
/// 64 character hex string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct KeyAddress {
    network: Network,
    key: [u8; VERIFICATION_KEY_LEN],
}

impl KeyAddress {
    /// Create an address for the given network and verification key
    pub fn new(network: Network, key: [u8; VERIFICATION_KEY_LEN]) -> Self {
        Self { network, key }
    }

    /// Parse an account reference string
    pub fn parse(s: &str) -> Result<Self, TypesError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TypesError::InvalidAddress("empty account reference".into()));
        }

        if s.len() == VERIFICATION_KEY_LEN * 2 && s.chars().all(|c| c.is_ascii_hexdigit()) {
            let bytes = hex::decode(s).map_err(|e| TypesError::InvalidHex(e.to_string()))?;
            return Ok(Self::new(Network::default(), to_key_array(&bytes)?));
        }

        let (hrp, data) =
            bech32::decode(s).map_err(|e| TypesError::InvalidAddress(e.to_string()))?;
        let network = Network::from_key_hrp(hrp.as_str()).ok_or_else(|| {
            TypesError::InvalidAddress(format!("unexpected address prefix:: {hrp}"))
        })?;
        Ok(Self::new(network, to_key_array(&data)?))
    }

    /// Convert to Bech32 string for the address network
    pub fn to_bech32(&self) -> Result<String, TypesError> {
        let hrp = Hrp::parse(self.network.key_hrp())
            .map_err(|e| TypesError::InvalidAddress(e.to_string()))?;
        bech32::encode::<Bech32>(hrp, &self.key)
            .map_err(|e| TypesError::InvalidAddress(e.to_string()))
    }

    /// Network the address was encoded for
    pub fn network(&self) -> Network {
        self.network
    }

    /// Raw verification key bytes
    pub fn key_bytes(&self) -> &[u8; VERIFICATION_KEY_LEN] {
        &self.key
    }

    /// Identity hash of the carried verification key
    pub fn identity(&self) -> OwnerIdentity {
        OwnerIdentity::from_verification_key(&self.key)
    }
}

impl fmt::Display for KeyAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_bech32() {
            Ok(s) => write!(f, "{s}"),
            Err(_) => write!(f, "{}", hex::encode(self.key)),
        }
    }
}

impl FromStr for KeyAddress {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn to_key_array(bytes: &[u8]) -> Result<[u8; VERIFICATION_KEY_LEN], TypesError> {
    bytes.try_into().map_err(|_| TypesError::InvalidLength {
        expected: VERIFICATION_KEY_LEN,
        actual: bytes.len(),
    })
}
