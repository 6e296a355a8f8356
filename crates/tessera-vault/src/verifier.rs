//! Resource verification
//!
//! Confirms a lock's output is still unspent, still held at the custody
//! address, and still carries the lock's policy as its datum.

use std::sync::Arc;
use tessera_types::ResourceRef;
use tracing::debug;

use crate::datum::LockDatum;
use crate::error::{Result, VaultError};
use crate::ledger::LedgerService;
use crate::record::LockRecord;

/// Ledger view of a verified lock
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VerifiedResource {
    pub resource_ref: ResourceRef,
    pub current_amount: u64,
}

pub struct ResourceVerifier {
    ledger: Arc<dyn LedgerService>,
    custody_address: String,
}

impl ResourceVerifier {
    pub fn new(ledger: Arc<dyn LedgerService>, custody_address: impl Into<String>) -> Self {
        Self {
            ledger,
            custody_address: custody_address.into(),
        }
    }

    pub async fn verify(&self, lock: &LockRecord) -> Result<VerifiedResource> {
        let resource = lock.resource_ref;
        let output = self
            .ledger
            .fetch_unspent_output(&resource)
            .await
            .map_err(|e| VaultError::not_found(resource, format!("ledger query failed: {e}")))?
            .ok_or_else(|| VaultError::not_found(resource, "no unspent output"))?;

        if output.address != self.custody_address {
            return Err(VaultError::not_found(
                resource,
                format!("output held at {}, not the custody address", output.address),
            ));
        }

        let datum = LockDatum::decode(&output.datum)
            .map_err(|e| VaultError::not_found(resource, format!("datum: {e}")))?;
        if datum != lock.datum() {
            return Err(VaultError::not_found(
                resource,
                "datum does not match the lock policy",
            ));
        }

        debug!(resource = %resource, amount = output.amount, "Resource verified");
        Ok(VerifiedResource {
            resource_ref: resource,
            current_amount: output.amount,
        })
    }
}
