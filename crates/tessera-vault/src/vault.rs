//! Vault facade
//!
//! Bundles the registry, the coordinator and the ledger behind the
//! operations a front end needs.

use std::sync::Arc;
use tessera_store::KVStore;
use tessera_types::{OwnerIdentity, ResourceRef};
use tracing::info;

use crate::coordinator::{Coordinator, SignatureOutcome};
use crate::credentials::CredentialProvider;
use crate::datum::LockDatum;
use crate::error::{Result, VaultError};
use crate::identity;
use crate::ledger::{LedgerService, LockRequest};
use crate::record::LockRecord;
use crate::registry::VaultRegistry;
use crate::session::SessionHandle;

pub struct Vault {
    registry: Arc<VaultRegistry>,
    coordinator: Coordinator,
    ledger: Arc<dyn LedgerService>,
    custody_address: String,
}

impl Vault {
    pub fn new(
        registry_store: Box<dyn KVStore>,
        ledger: Arc<dyn LedgerService>,
        custody_address: impl Into<String>,
    ) -> Self {
        let custody_address = custody_address.into();
        let registry = Arc::new(VaultRegistry::new(registry_store));
        let coordinator = Coordinator::new(registry.clone(), ledger.clone(), custody_address.clone());
        Self {
            registry,
            coordinator,
            ledger,
            custody_address,
        }
    }

    pub fn registry(&self) -> &VaultRegistry {
        &self.registry
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn custody_address(&self) -> &str {
        &self.custody_address
    }

    /// Lock `amount` at the custody address under an M-of-N policy
    ///
    /// The policy is checked before anything reaches the ledger. The record
    /// is created from the output reference the ledger returns.
    pub async fn lock_funds(
        &self,
        owner_refs: &[String],
        threshold: u32,
        amount: u64,
    ) -> Result<LockRecord> {
        let owners = owner_refs
            .iter()
            .map(|r| identity::resolve(r))
            .collect::<Result<Vec<_>>>()?;
        let owners = VaultRegistry::validate_policy(&owners, threshold, amount)?;

        let datum = LockDatum::new(owners.clone(), threshold)
            .encode()
            .map_err(|e| VaultError::InvalidPolicy(e.to_string()))?;
        let request = LockRequest {
            custody_address: self.custody_address.clone(),
            amount,
            datum,
        };
        let resource_ref = self
            .ledger
            .submit_lock(&request)
            .await
            .map_err(|e| VaultError::SubmissionFailed(format!("lock: {e}")))?;

        info!(resource = %resource_ref, amount, threshold, "Funds locked");
        self.registry
            .create(owners, threshold, amount, resource_ref)
    }

    /// Record a lock for an output that already exists on the ledger
    pub fn create_lock(
        &self,
        owners: Vec<OwnerIdentity>,
        threshold: u32,
        amount: u64,
        resource_ref: ResourceRef,
    ) -> Result<LockRecord> {
        self.registry.create(owners, threshold, amount, resource_ref)
    }

    pub fn list_locks(&self) -> Result<Vec<LockRecord>> {
        self.registry.list()
    }

    pub async fn start_session(
        &self,
        resource_ref: &ResourceRef,
        recipient: &str,
    ) -> Result<SessionHandle> {
        self.coordinator.start_session(resource_ref, recipient).await
    }

    pub fn open_session(&self, resource_ref: &ResourceRef, recipient: &str) -> Result<SessionHandle> {
        self.coordinator.open_session(resource_ref, recipient)
    }

    pub async fn prepare_release(&self, handle: &SessionHandle) -> Result<()> {
        self.coordinator.prepare_release(handle).await
    }

    pub async fn offer_signature(
        &self,
        handle: &SessionHandle,
        credentials: &dyn CredentialProvider,
    ) -> Result<SignatureOutcome> {
        self.coordinator.offer_signature(handle, credentials).await
    }

    pub async fn abandon_session(&self, handle: &SessionHandle) -> Result<()> {
        self.coordinator.abandon_session(handle).await
    }
}
