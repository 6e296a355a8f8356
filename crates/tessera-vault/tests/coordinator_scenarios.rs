mod common;

use async_trait::async_trait;
use std::sync::Arc;
use tessera_keyring::{Keyring, MemoryKeyring};
use tessera_store::{open_storage, KVPair, KVStore, MemStore, StorageConfig, StoreError};
use tessera_types::{Network, ResourceRef, TxId};
use tessera_vault::{
    KeyringCredentials, LedgerError, LedgerService, LocalLedger, LockDatum, LockRequest,
    ReleaseRequest,
    SessionState, SessionStore, SignatureOutcome, SubmittableRelease, UnspentOutput, Vault,
    VaultError,
};

use common::{DecliningWallet, ForgingWallet, Harness, Wallet, CUSTODY, RECIPIENT};

#[tokio::test]
async fn lock_is_created_and_listed() {
    tessera_log::init_tracing_test();
    let h = Harness::new(3);

    let record = h.lock(2, 10).await;
    assert_eq!(record.threshold, 2);
    assert_eq!(record.amount, 10);
    assert_eq!(
        record.owners,
        h.wallets.iter().map(Wallet::identity).collect::<Vec<_>>()
    );

    let locks = h.vault.list_locks().unwrap();
    assert_eq!(locks, vec![record.clone()]);

    let output = h
        .ledger
        .fetch_unspent_output(&record.resource_ref)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(output.address, CUSTODY);
    assert_eq!(output.amount, 10);
}

#[tokio::test]
async fn two_of_three_release_collects_then_submits() {
    let h = Harness::new(3);
    let record = h.lock(2, 10).await;
    let (o1, o2) = (&h.wallets[0], &h.wallets[1]);

    let handle = h
        .vault
        .start_session(&record.resource_ref, RECIPIENT)
        .await
        .unwrap();
    {
        let session = handle.lock().await;
        assert_eq!(session.state(), SessionState::Collecting);
        assert_eq!(session.verified_amount(), Some(10));
        assert_eq!(session.recipient(), RECIPIENT);
    }

    let outcome = h.vault.offer_signature(&handle, o1).await.unwrap();
    assert_eq!(
        outcome,
        SignatureOutcome::Collecting {
            collected: 1,
            threshold: 2
        }
    );

    assert!(matches!(
        h.vault.offer_signature(&handle, o1).await,
        Err(VaultError::AlreadySigned { identity, .. }) if identity == o1.identity()
    ));
    assert_eq!(handle.lock().await.collected().len(), 1);

    let outcome = h.vault.offer_signature(&handle, o2).await.unwrap();
    let SignatureOutcome::Submitted { tx_id } = outcome else {
        panic!("expected submission, got {outcome:?}");
    };

    let session = handle.lock().await;
    assert_eq!(session.state(), SessionState::Submitted);
    assert_eq!(session.confirmation(), Some(tx_id));
    assert_eq!(session.collected().len(), 2);
    drop(session);

    assert!(h.vault.list_locks().unwrap().is_empty());
    assert!(h.vault.coordinator().session(&record.resource_ref).is_none());
    assert_eq!(h.ledger.spent_by(&record.resource_ref).unwrap(), Some(tx_id));

    let payout = h
        .ledger
        .fetch_unspent_output(&ResourceRef::new(tx_id, 0))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payout.address, RECIPIENT);
    assert_eq!(payout.amount, 10);
}

#[tokio::test]
async fn owner_outside_required_prefix_is_rejected() {
    let h = Harness::new(3);
    let record = h.lock(2, 10).await;

    let handle = h
        .vault
        .start_session(&record.resource_ref, RECIPIENT)
        .await
        .unwrap();
    assert!(matches!(
        h.vault.offer_signature(&handle, &h.wallets[2]).await,
        Err(VaultError::NotARequiredSigner { .. })
    ));

    let session = handle.lock().await;
    assert!(session.collected().is_empty());
    assert_eq!(session.state(), SessionState::Collecting);
    assert!(session.pending_artifact().unwrap().witnesses().is_empty());
}

#[tokio::test]
async fn spent_resource_fails_verification() {
    let h = Harness::new(3);
    let record = h.lock(2, 10).await;
    h.ledger.spend_externally(&record.resource_ref).unwrap();

    let handle = h.vault.open_session(&record.resource_ref, RECIPIENT).unwrap();
    assert_eq!(handle.lock().await.state(), SessionState::Idle);
    assert!(matches!(
        h.vault.prepare_release(&handle).await,
        Err(VaultError::ResourceNotFound { .. })
    ));
    {
        let session = handle.lock().await;
        assert_eq!(session.state(), SessionState::Failed);
        assert!(session.failure().unwrap().contains("no unspent output"));
        assert!(session.pending_artifact().is_none());
    }
    assert!(h.vault.coordinator().session(&record.resource_ref).is_none());
    assert!(matches!(
        h.vault.prepare_release(&handle).await,
        Err(VaultError::SessionClosed {
            state: SessionState::Failed,
            ..
        })
    ));
    assert_eq!(h.vault.list_locks().unwrap(), vec![record.clone()]);

    // The slot was released, so a retry reaches the ledger again
    assert!(matches!(
        h.vault.start_session(&record.resource_ref, RECIPIENT).await,
        Err(VaultError::ResourceNotFound { .. })
    ));
}

#[tokio::test]
async fn three_of_three_accepts_no_extra_signature() {
    let h = Harness::new(3);
    let record = h.lock(3, 7).await;
    let handle = h
        .vault
        .start_session(&record.resource_ref, RECIPIENT)
        .await
        .unwrap();

    for (i, wallet) in h.wallets.iter().enumerate() {
        let outcome = h.vault.offer_signature(&handle, wallet).await.unwrap();
        if i < 2 {
            assert!(matches!(outcome, SignatureOutcome::Collecting { .. }));
            assert_eq!(handle.lock().await.state(), SessionState::Collecting);
        } else {
            assert!(matches!(outcome, SignatureOutcome::Submitted { .. }));
        }
    }

    assert!(matches!(
        h.vault.offer_signature(&handle, &h.wallets[0]).await,
        Err(VaultError::SessionClosed {
            state: SessionState::Submitted,
            ..
        })
    ));
    assert_eq!(handle.lock().await.collected().len(), 3);
}

#[tokio::test]
async fn non_owner_is_rejected_without_side_effects() {
    let h = Harness::new(2);
    let record = h.lock(1, 5).await;
    let handle = h
        .vault
        .start_session(&record.resource_ref, RECIPIENT)
        .await
        .unwrap();

    let stranger = Wallet::new(99);
    assert!(matches!(
        h.vault.offer_signature(&handle, &stranger).await,
        Err(VaultError::NotAnOwner { identity, .. }) if identity == stranger.identity()
    ));

    let session = handle.lock().await;
    assert!(session.collected().is_empty());
    assert_eq!(session.state(), SessionState::Collecting);
}

#[tokio::test]
async fn bad_signatures_change_nothing() {
    let h = Harness::new(2);
    let record = h.lock(2, 5).await;
    let handle = h
        .vault
        .start_session(&record.resource_ref, RECIPIENT)
        .await
        .unwrap();

    let forging = ForgingWallet(Wallet::new(1));
    assert!(matches!(
        h.vault.offer_signature(&handle, &forging).await,
        Err(VaultError::InvalidSignature { .. })
    ));

    let declining = DecliningWallet(Wallet::new(2));
    assert!(matches!(
        h.vault.offer_signature(&handle, &declining).await,
        Err(VaultError::SigningFailed(_))
    ));

    let session = handle.lock().await;
    assert!(session.collected().is_empty());
    assert!(session.pending_artifact().unwrap().witnesses().is_empty());
    drop(session);

    // The genuine wallets can still complete the release
    h.vault.offer_signature(&handle, &h.wallets[0]).await.unwrap();
    let outcome = h.vault.offer_signature(&handle, &h.wallets[1]).await.unwrap();
    assert!(matches!(outcome, SignatureOutcome::Submitted { .. }));
}

#[tokio::test]
async fn one_active_session_per_lock() {
    let h = Harness::new(3);
    let record = h.lock(2, 10).await;
    let resource = record.resource_ref;

    let (a, b) = tokio::join!(
        h.vault.start_session(&resource, RECIPIENT),
        h.vault.start_session(&resource, RECIPIENT)
    );
    let (handle, rejected) = match (a, b) {
        (Ok(handle), Err(err)) | (Err(err), Ok(handle)) => (handle, err),
        other => panic!("expected exactly one session, got {other:?}"),
    };
    assert!(matches!(rejected, VaultError::SessionAlreadyActive(r) if r == resource));

    h.vault.abandon_session(&handle).await.unwrap();
    {
        let session = handle.lock().await;
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(session.failure(), Some("abandoned"));
    }
    // Abandoning twice is harmless
    h.vault.abandon_session(&handle).await.unwrap();

    assert!(matches!(
        h.vault.offer_signature(&handle, &h.wallets[0]).await,
        Err(VaultError::SessionClosed {
            state: SessionState::Failed,
            ..
        })
    ));

    // Abandoning has no registry side effects and frees the slot
    assert_eq!(h.vault.list_locks().unwrap().len(), 1);
    h.vault.start_session(&resource, RECIPIENT).await.unwrap();
}

#[tokio::test]
async fn blank_recipient_and_unknown_lock() {
    let h = Harness::new(2);
    let record = h.lock(1, 5).await;

    assert!(matches!(
        h.vault.start_session(&record.resource_ref, "   ").await,
        Err(VaultError::InvalidRecipient(_))
    ));
    assert!(h.vault.coordinator().session(&record.resource_ref).is_none());

    let unknown = ResourceRef::new(TxId::from_bytes([0xee; 32]), 0);
    assert!(matches!(
        h.vault.start_session(&unknown, RECIPIENT).await,
        Err(VaultError::ResourceNotFound { .. })
    ));
}

#[tokio::test]
async fn lock_funds_rejects_bad_policies_before_the_ledger() {
    let h = Harness::new(3);
    let refs = h.owner_refs();

    for (threshold, amount) in [(0, 10), (4, 10), (2, 0)] {
        assert!(matches!(
            h.vault.lock_funds(&refs, threshold, amount).await,
            Err(VaultError::InvalidPolicy(_))
        ));
    }
    assert!(matches!(
        h.vault
            .lock_funds(&[refs[0].clone(), "not-an-account".into()], 1, 10)
            .await,
        Err(VaultError::InvalidAccountReference { .. })
    ));
    assert!(h.vault.list_locks().unwrap().is_empty());
}

/// Ledger that accepts locks but refuses every release
struct RejectingLedger(LocalLedger<MemStore>);

#[async_trait]
impl LedgerService for RejectingLedger {
    async fn fetch_unspent_output(
        &self,
        resource_ref: &ResourceRef,
    ) -> Result<Option<UnspentOutput>, LedgerError> {
        self.0.fetch_unspent_output(resource_ref).await
    }

    fn encode_release(&self, request: &ReleaseRequest) -> Result<Vec<u8>, LedgerError> {
        self.0.encode_release(request)
    }

    async fn submit(&self, _release: &SubmittableRelease) -> Result<TxId, LedgerError> {
        Err(LedgerError::Rejected("script evaluation failed".into()))
    }

    async fn submit_lock(&self, request: &LockRequest) -> Result<ResourceRef, LedgerError> {
        self.0.submit_lock(request).await
    }
}

#[tokio::test]
async fn rejected_submission_keeps_the_lock() {
    let ledger = Arc::new(RejectingLedger(LocalLedger::new(MemStore::new(), CUSTODY)));
    let vault = Vault::new(Box::new(MemStore::new()), ledger, CUSTODY);
    let wallets: Vec<_> = (1..=2).map(Wallet::new).collect();
    let refs: Vec<_> = wallets.iter().map(Wallet::account_ref).collect();

    let record = vault.lock_funds(&refs, 2, 10).await.unwrap();
    let handle = vault
        .start_session(&record.resource_ref, RECIPIENT)
        .await
        .unwrap();
    vault.offer_signature(&handle, &wallets[0]).await.unwrap();

    assert!(matches!(
        vault.offer_signature(&handle, &wallets[1]).await,
        Err(VaultError::SubmissionFailed(_))
    ));
    let session = handle.lock().await;
    assert_eq!(session.state(), SessionState::Failed);
    assert!(session.confirmation().is_none());
    drop(session);

    assert_eq!(vault.list_locks().unwrap(), vec![record.clone()]);
    assert!(vault.coordinator().session(&record.resource_ref).is_none());
}

#[tokio::test]
async fn keyring_backed_owners_release_funds() {
    let mut keyring = MemoryKeyring::new(Network::Testnet);
    let alice = keyring.create_key("alice").await.unwrap();
    let bob = keyring.create_key("bob").await.unwrap();

    let ledger = Arc::new(LocalLedger::new(MemStore::new(), CUSTODY));
    let vault = Vault::new(Box::new(MemStore::new()), ledger, CUSTODY);
    let record = vault
        .lock_funds(
            &[alice.address.to_string(), bob.address.to_string()],
            2,
            3_000_000,
        )
        .await
        .unwrap();

    let handle = vault
        .start_session(&record.resource_ref, RECIPIENT)
        .await
        .unwrap();
    vault
        .offer_signature(&handle, &KeyringCredentials::new(&keyring, "alice"))
        .await
        .unwrap();
    let outcome = vault
        .offer_signature(&handle, &KeyringCredentials::new(&keyring, "bob"))
        .await
        .unwrap();
    assert!(matches!(outcome, SignatureOutcome::Submitted { .. }));
}

#[tokio::test]
async fn persisted_session_resumes_after_restart() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let db = open_storage(temp_dir.path(), &StorageConfig::default()).unwrap();
    let ledger = Arc::new(LocalLedger::new(db.clone(), CUSTODY));
    let sessions = SessionStore::new(Box::new(db.clone()));
    let wallets: Vec<_> = (1..=3).map(Wallet::new).collect();
    let refs: Vec<_> = wallets.iter().map(Wallet::account_ref).collect();

    let resource = {
        let vault = Vault::new(Box::new(db.clone()), ledger.clone(), CUSTODY);
        let record = vault.lock_funds(&refs, 2, 10).await.unwrap();
        let handle = vault
            .start_session(&record.resource_ref, RECIPIENT)
            .await
            .unwrap();
        vault.offer_signature(&handle, &wallets[0]).await.unwrap();
        sessions.save(&*handle.lock().await).unwrap();
        record.resource_ref
    };

    let vault = Vault::new(Box::new(db.clone()), ledger.clone(), CUSTODY);
    let persisted = sessions.load(&resource).unwrap().unwrap();
    assert_eq!(persisted.collected().len(), 1);

    let handle = vault.coordinator().resume(persisted.clone()).unwrap();
    assert!(matches!(
        vault.coordinator().resume(persisted),
        Err(VaultError::SessionAlreadyActive(_))
    ));

    assert!(matches!(
        vault.offer_signature(&handle, &wallets[0]).await,
        Err(VaultError::AlreadySigned { .. })
    ));
    let outcome = vault.offer_signature(&handle, &wallets[1]).await.unwrap();
    assert!(matches!(outcome, SignatureOutcome::Submitted { .. }));

    let finished = handle.lock().await.clone();
    assert!(matches!(
        vault.coordinator().resume(finished),
        Err(VaultError::SessionClosed { .. })
    ));
    assert!(vault.list_locks().unwrap().is_empty());
}

/// Ledger that cannot encode any release body
struct UnencodableLedger(LocalLedger<MemStore>);

#[async_trait]
impl LedgerService for UnencodableLedger {
    async fn fetch_unspent_output(
        &self,
        resource_ref: &ResourceRef,
    ) -> Result<Option<UnspentOutput>, LedgerError> {
        self.0.fetch_unspent_output(resource_ref).await
    }

    fn encode_release(&self, _request: &ReleaseRequest) -> Result<Vec<u8>, LedgerError> {
        Err(LedgerError::Encoding("unsupported output".into()))
    }

    async fn submit(&self, release: &SubmittableRelease) -> Result<TxId, LedgerError> {
        self.0.submit(release).await
    }

    async fn submit_lock(&self, request: &LockRequest) -> Result<ResourceRef, LedgerError> {
        self.0.submit_lock(request).await
    }
}

#[tokio::test]
async fn assembly_failure_frees_the_slot_and_keeps_the_lock() {
    let ledger = Arc::new(UnencodableLedger(LocalLedger::new(MemStore::new(), CUSTODY)));
    let vault = Vault::new(Box::new(MemStore::new()), ledger, CUSTODY);
    let refs: Vec<_> = (1..=2).map(|seed| Wallet::new(seed).account_ref()).collect();
    let record = vault.lock_funds(&refs, 2, 10).await.unwrap();

    let handle = vault.open_session(&record.resource_ref, RECIPIENT).unwrap();
    assert!(matches!(
        vault.prepare_release(&handle).await,
        Err(VaultError::AssemblyFailed(_))
    ));
    {
        let session = handle.lock().await;
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(session.verified_amount(), Some(10));
        assert!(session.pending_artifact().is_none());
    }
    assert!(vault.coordinator().session(&record.resource_ref).is_none());
    assert_eq!(vault.list_locks().unwrap(), vec![record.clone()]);

    assert!(matches!(
        vault.start_session(&record.resource_ref, RECIPIENT).await,
        Err(VaultError::AssemblyFailed(_))
    ));
    assert!(vault.coordinator().session(&record.resource_ref).is_none());
}

/// Registry store that refuses every delete
#[derive(Default)]
struct UndeletableStore(MemStore);

impl KVStore for UndeletableStore {
    fn get(&self, key: &[u8]) -> tessera_store::Result<Option<Vec<u8>>> {
        self.0.get(key)
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> tessera_store::Result<()> {
        self.0.set(key, value)
    }

    fn delete(&mut self, _key: &[u8]) -> tessera_store::Result<()> {
        Err(StoreError::Backend("read-only volume".into()))
    }

    fn prefix_iterator(
        &self,
        prefix: &[u8],
    ) -> Box<dyn Iterator<Item = tessera_store::Result<KVPair>> + '_> {
        self.0.prefix_iterator(prefix)
    }
}

#[tokio::test]
async fn accepted_release_is_reported_when_the_record_cannot_be_removed() {
    let ledger = Arc::new(LocalLedger::new(MemStore::new(), CUSTODY));
    let vault = Vault::new(Box::new(UndeletableStore::default()), ledger.clone(), CUSTODY);
    let wallets: Vec<_> = (1..=2).map(Wallet::new).collect();
    let refs: Vec<_> = wallets.iter().map(Wallet::account_ref).collect();

    let record = vault.lock_funds(&refs, 2, 10).await.unwrap();
    let handle = vault
        .start_session(&record.resource_ref, RECIPIENT)
        .await
        .unwrap();
    vault.offer_signature(&handle, &wallets[0]).await.unwrap();

    let outcome = vault.offer_signature(&handle, &wallets[1]).await.unwrap();
    let SignatureOutcome::Submitted { tx_id } = outcome else {
        panic!("expected submission, got {outcome:?}");
    };
    {
        let session = handle.lock().await;
        assert_eq!(session.state(), SessionState::Submitted);
        assert_eq!(session.confirmation(), Some(tx_id));
    }
    assert_eq!(ledger.spent_by(&record.resource_ref).unwrap(), Some(tx_id));
    assert!(vault.coordinator().session(&record.resource_ref).is_none());

    // The stale record no longer verifies against the ledger
    assert_eq!(vault.list_locks().unwrap(), vec![record.clone()]);
    assert!(matches!(
        vault.start_session(&record.resource_ref, RECIPIENT).await,
        Err(VaultError::ResourceNotFound { .. })
    ));
}

#[tokio::test]
async fn existing_output_is_registered_and_released() {
    let h = Harness::new(2);
    let owners: Vec<_> = h.wallets.iter().map(Wallet::identity).collect();
    let resource_ref = ResourceRef::new(TxId::of_body(b"funded elsewhere"), 1);
    let datum = LockDatum::new(owners.clone(), 2).encode().unwrap();
    h.ledger
        .insert_output(resource_ref, CUSTODY, 25, datum)
        .unwrap();

    let record = h.vault.create_lock(owners, 2, 25, resource_ref).unwrap();
    assert_eq!(record.resource_ref, resource_ref);
    assert_eq!(h.vault.list_locks().unwrap(), vec![record.clone()]);
    assert!(matches!(
        h.vault.create_lock(record.owners.clone(), 2, 25, resource_ref),
        Err(VaultError::InvalidPolicy(_))
    ));

    let handle = h.vault.start_session(&resource_ref, RECIPIENT).await.unwrap();
    assert_eq!(handle.lock().await.verified_amount(), Some(25));
    h.vault
        .offer_signature(&handle, &h.wallets[0])
        .await
        .unwrap();
    let outcome = h
        .vault
        .offer_signature(&handle, &h.wallets[1])
        .await
        .unwrap();
    assert!(matches!(outcome, SignatureOutcome::Submitted { .. }));
    assert!(h.vault.list_locks().unwrap().is_empty());
}

#[tokio::test]
async fn registering_an_output_with_another_policy_fails_verification() {
    let h = Harness::new(3);
    let owners: Vec<_> = h.wallets.iter().map(Wallet::identity).collect();
    let resource_ref = ResourceRef::new(TxId::of_body(b"other policy"), 0);
    let datum = LockDatum::new(owners.clone(), 3).encode().unwrap();
    h.ledger
        .insert_output(resource_ref, CUSTODY, 7, datum)
        .unwrap();

    h.vault.create_lock(owners, 2, 7, resource_ref).unwrap();
    assert!(matches!(
        h.vault.start_session(&resource_ref, RECIPIENT).await,
        Err(VaultError::ResourceNotFound { .. })
    ));
    assert!(h.vault.coordinator().session(&resource_ref).is_none());
}
