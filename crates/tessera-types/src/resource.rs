//! Ledger resource references

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::TypesError;

/// Length of a transaction hash in bytes
pub const TX_HASH_LEN: usize = 32;

/// Transaction identifier returned by the ledger
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxId([u8; TX_HASH_LEN]);

impl TxId {
    pub fn from_bytes(bytes: [u8; TX_HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Hash of an encoded transaction body
    pub fn of_body(body: &[u8]) -> Self {
        let mut bytes = [0u8; TX_HASH_LEN];
        bytes.copy_from_slice(&Sha256::digest(body));
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; TX_HASH_LEN] {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for TxId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim()).map_err(|e| TypesError::InvalidHex(e.to_string()))?;
        let array: [u8; TX_HASH_LEN] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| TypesError::InvalidLength {
                    expected: TX_HASH_LEN,
                    actual: bytes.len(),
                })?;
        Ok(Self(array))
    }
}

/// Reference to a locked ledger output: transaction hash plus output index
///
/// Rendered as `<tx hash hex>#<output index>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceRef {
    pub tx_id: TxId,
    pub output_index: u32,
}

impl ResourceRef {
    pub fn new(tx_id: TxId, output_index: u32) -> Self {
        Self {
            tx_id,
            output_index,
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tx_id, self.output_index)
    }
}

impl FromStr for ResourceRef {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hash, index) = s
            .trim()
            .split_once('#')
            .ok_or_else(|| TypesError::InvalidResourceRef(s.to_string()))?;
        let tx_id = hash.parse()?;
        let output_index = index
            .parse()
            .map_err(|_| TypesError::InvalidResourceRef(s.to_string()))?;
        Ok(Self::new(tx_id, output_index))
    }
}

impl Serialize for ResourceRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ResourceRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for TxId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TxId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
