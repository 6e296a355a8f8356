//! Vault registry
//!
//! Durable collection of [`LockRecord`]s keyed by resource reference. The
//! registry only validates and stores policies; it knows nothing about
//! signatures or the ledger.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tessera_store::KVStore;
use tessera_types::{OwnerIdentity, ResourceRef};
use tracing::{debug, info};

use crate::datum::MAX_OWNERS;
use crate::error::{Result, VaultError};
use crate::record::LockRecord;

/// Key namespace for lock records
pub const LOCK_PREFIX: &str = "lock/";

/// Minimum number of distinct owners in a policy
pub const MIN_OWNERS: usize = 2;

pub struct VaultRegistry {
    store: Mutex<Box<dyn KVStore>>,
}

impl VaultRegistry {
    pub fn new(store: Box<dyn KVStore>) -> Self {
        Self {
            store: Mutex::new(store),
        }
    }

    fn store(&self) -> MutexGuard<'_, Box<dyn KVStore>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn key(resource_ref: &ResourceRef) -> Vec<u8> {
        format!("{LOCK_PREFIX}{resource_ref}").into_bytes()
    }

    /// Check a release policy and return the owner set with duplicates removed
    ///
    /// The first occurrence of a repeated owner wins, so registration order
    /// is preserved.
    pub fn validate_policy(
        owners: &[OwnerIdentity],
        threshold: u32,
        amount: u64,
    ) -> Result<Vec<OwnerIdentity>> {
        let mut seen = HashSet::with_capacity(owners.len());
        let owners: Vec<_> = owners.iter().copied().filter(|o| seen.insert(*o)).collect();

        if owners.len() < MIN_OWNERS {
            return Err(VaultError::InvalidPolicy(format!(
                "need at least {MIN_OWNERS} distinct owners, got {}",
                owners.len()
            )));
        }
        if owners.len() > MAX_OWNERS {
            return Err(VaultError::InvalidPolicy(format!(
                "at most {MAX_OWNERS} owners are supported, got {}",
                owners.len()
            )));
        }
        if threshold == 0 || threshold as usize > owners.len() {
            return Err(VaultError::InvalidPolicy(format!(
                "threshold {threshold} outside 1..={}",
                owners.len()
            )));
        }
        if amount == 0 {
            return Err(VaultError::InvalidPolicy("amount must be positive".into()));
        }

        Ok(owners)
    }

    /// Validate and persist a new lock record
    pub fn create(
        &self,
        owners: Vec<OwnerIdentity>,
        threshold: u32,
        amount: u64,
        resource_ref: ResourceRef,
    ) -> Result<LockRecord> {
        let owners = Self::validate_policy(&owners, threshold, amount)?;

        let mut store = self.store();
        let key = Self::key(&resource_ref);
        if store.has(&key)? {
            return Err(VaultError::InvalidPolicy(format!(
                "a lock already exists for {resource_ref}"
            )));
        }

        let record = LockRecord {
            resource_ref,
            owners,
            threshold,
            amount,
            created_at: Utc::now(),
        };
        store.set(&key, &serde_json::to_vec(&record)?)?;

        info!(
            resource = %resource_ref,
            owners = record.owners.len(),
            threshold,
            amount,
            "Lock recorded"
        );
        Ok(record)
    }

    /// Snapshot of all records, oldest first
    pub fn list(&self) -> Result<Vec<LockRecord>> {
        let store = self.store();
        let mut records = store
            .prefix_iterator(LOCK_PREFIX.as_bytes())
            .map(|entry| -> Result<LockRecord> {
                let (_, value) = entry?;
                Ok(serde_json::from_slice(&value)?)
            })
            .collect::<Result<Vec<_>>>()?;

        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.resource_ref.cmp(&b.resource_ref))
        });
        Ok(records)
    }

    pub fn get(&self, resource_ref: &ResourceRef) -> Result<Option<LockRecord>> {
        let store = self.store();
        store
            .get(&Self::key(resource_ref))?
            .map(|value| serde_json::from_slice(&value).map_err(VaultError::from))
            .transpose()
    }

    /// Remove a record. Removing an absent record is a no-op.
    pub fn remove(&self, resource_ref: &ResourceRef) -> Result<()> {
        self.store().delete(&Self::key(resource_ref))?;
        debug!(resource = %resource_ref, "Lock removed");
        Ok(())
    }
}

impl std::fmt::Debug for VaultRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultRegistry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_store::MemStore;
    use tessera_types::TxId;

    fn registry() -> VaultRegistry {
        VaultRegistry::new(Box::new(MemStore::new()))
    }

    fn owner(i: u8) -> OwnerIdentity {
        OwnerIdentity::from_bytes([i; 20])
    }

    fn resource(i: u8) -> ResourceRef {
        ResourceRef::new(TxId::from_bytes([i; 32]), 0)
    }

    #[test]
    fn test_create_get_list_remove() {
        let registry = registry();
        let record = registry
            .create(vec![owner(1), owner(2), owner(3)], 2, 10, resource(1))
            .unwrap();

        assert_eq!(registry.get(&resource(1)).unwrap(), Some(record.clone()));
        assert_eq!(registry.list().unwrap(), vec![record]);

        registry.remove(&resource(1)).unwrap();
        assert!(registry.list().unwrap().is_empty());
        // Idempotent
        registry.remove(&resource(1)).unwrap();
    }

    #[test]
    fn test_duplicate_owners_collapse() {
        let registry = registry();
        let record = registry
            .create(vec![owner(2), owner(1), owner(2), owner(3)], 3, 5, resource(1))
            .unwrap();
        assert_eq!(record.owners, vec![owner(2), owner(1), owner(3)]);

        // Duplicates can leave too few distinct owners
        assert!(matches!(
            registry.create(vec![owner(1), owner(1)], 1, 5, resource(2)),
            Err(VaultError::InvalidPolicy(_))
        ));
    }

    #[test]
    fn test_policy_rejections() {
        let registry = registry();
        let owners = vec![owner(1), owner(2)];
        for (threshold, amount) in [(0, 1), (3, 1), (1, 0)] {
            assert!(matches!(
                registry.create(owners.clone(), threshold, amount, resource(1)),
                Err(VaultError::InvalidPolicy(_))
            ));
        }
        assert!(registry.list().unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_resource_rejected() {
        let registry = registry();
        registry
            .create(vec![owner(1), owner(2)], 1, 1, resource(7))
            .unwrap();
        assert!(matches!(
            registry.create(vec![owner(3), owner(4)], 1, 1, resource(7)),
            Err(VaultError::InvalidPolicy(_))
        ));
    }

    #[test]
    fn test_list_is_ordered_by_creation() {
        let registry = registry();
        for i in [9u8, 3, 5] {
            registry
                .create(vec![owner(1), owner(2)], 1, 1, resource(i))
                .unwrap();
        }
        let refs: Vec<_> = registry
            .list()
            .unwrap()
            .into_iter()
            .map(|r| r.resource_ref)
            .collect();
        // Ties on created_at fall back to the resource reference
        let mut expected = refs.clone();
        expected.sort_by_key(|r| {
            (
                registry.get(r).unwrap().map(|rec| rec.created_at),
                *r,
            )
        });
        assert_eq!(refs, expected);
        assert_eq!(refs.len(), 3);
    }

    #[test]
    fn test_list_surfaces_scan_failure() {
        let registry = VaultRegistry::new(Box::new(crate::testing::BrokenScan::default()));
        registry
            .create(vec![owner(1), owner(2)], 1, 1, resource(1))
            .unwrap();
        registry
            .create(vec![owner(1), owner(2)], 1, 1, resource(2))
            .unwrap();

        assert!(matches!(registry.list(), Err(VaultError::Storage(_))));
    }
}
