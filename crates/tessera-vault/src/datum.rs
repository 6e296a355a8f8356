//! Inline datum attached to locked outputs
//!
//! Layout: `version (u8 = 1) | owner_count (u8) | owners (20 bytes each) |
//! threshold (u32 BE)`.

use tessera_types::{OwnerIdentity, IDENTITY_LEN};
use thiserror::Error;

/// Current datum layout version
pub const DATUM_VERSION: u8 = 1;

/// Largest owner set the layout can describe
pub const MAX_OWNERS: usize = u8::MAX as usize;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DatumError {
    #[error("empty datum")]
    Empty,

    #[error("unsupported datum version:: {0}")]
    UnsupportedVersion(u8),

    #[error("datum length mismatch: expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("too many owners:: {0}")]
    TooManyOwners(usize),
}

/// Owner set and threshold carried on chain next to the locked value
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockDatum {
    pub owners: Vec<OwnerIdentity>,
    pub threshold: u32,
}

impl LockDatum {
    pub fn new(owners: Vec<OwnerIdentity>, threshold: u32) -> Self {
        Self { owners, threshold }
    }

    fn encoded_len(owner_count: usize) -> usize {
        2 + owner_count * IDENTITY_LEN + 4
    }

    pub fn encode(&self) -> Result<Vec<u8>, DatumError> {
        let count = u8::try_from(self.owners.len())
            .map_err(|_| DatumError::TooManyOwners(self.owners.len()))?;

        let mut out = Vec::with_capacity(Self::encoded_len(self.owners.len()));
        out.push(DATUM_VERSION);
        out.push(count);
        for owner in &self.owners {
            out.extend_from_slice(owner.as_bytes());
        }
        out.extend_from_slice(&self.threshold.to_be_bytes());
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DatumError> {
        let (&version, rest) = bytes.split_first().ok_or(DatumError::Empty)?;
        if version != DATUM_VERSION {
            return Err(DatumError::UnsupportedVersion(version));
        }
        let (&count, rest) = rest.split_first().ok_or(DatumError::Length {
            expected: 2,
            actual: bytes.len(),
        })?;

        let count = count as usize;
        let expected = Self::encoded_len(count);
        if bytes.len() != expected {
            return Err(DatumError::Length {
                expected,
                actual: bytes.len(),
            });
        }

        let (owner_bytes, threshold_bytes) = rest.split_at(count * IDENTITY_LEN);
        let owners = owner_bytes
            .chunks_exact(IDENTITY_LEN)
            .map(OwnerIdentity::from_slice)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| DatumError::Length {
                expected,
                actual: bytes.len(),
            })?;

        let mut threshold = [0u8; 4];
        threshold.copy_from_slice(threshold_bytes);

        Ok(Self {
            owners,
            threshold: u32::from_be_bytes(threshold),
        })
    }
}
