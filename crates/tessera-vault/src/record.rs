//! Lock records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tessera_types::{OwnerIdentity, ResourceRef};

use crate::datum::LockDatum;

/// Durable description of a custodied output and its release policy
///
/// Records are validated once at creation and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub resource_ref: ResourceRef,
    pub owners: Vec<OwnerIdentity>,
    pub threshold: u32,
    /// Locked quantity in lovelace
    pub amount: u64,
    pub created_at: DateTime<Utc>,
}

impl LockRecord {
    pub fn is_owner(&self, identity: &OwnerIdentity) -> bool {
        self.owners.contains(identity)
    }

    /// Owners allowed to sign a release: the first `threshold` in
    /// registration order
    pub fn required_signers(&self) -> &[OwnerIdentity] {
        let n = (self.threshold as usize).min(self.owners.len());
        &self.owners[..n]
    }

    pub fn is_required_signer(&self, identity: &OwnerIdentity) -> bool {
        self.required_signers().contains(identity)
    }

    /// Datum the locked output must carry
    pub fn datum(&self) -> LockDatum {
        LockDatum::new(self.owners.clone(), self.threshold)
    }
}
