//! Signing session coordinator
//!
//! Drives a release from lock selection to ledger submission:
//!
//! ```text
//! Idle -> Verifying -> Assembling -> Collecting -> Finalizing -> Submitted
//!             |            |             |             |
//!             +------------+-------------+-------------+--------> Failed
//! ```
//!
//! At most one session per lock is active. The active set is keyed by
//! resource reference and the slot is reserved before the ledger is queried,
//! so two concurrent starts for the same lock cannot both proceed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tessera_types::{ResourceRef, TxId};
use tracing::{debug, info, warn};

use crate::assembler::{ReleaseAssembler, Witness};
use crate::credentials::CredentialProvider;
use crate::error::{Result, VaultError};
use crate::identity;
use crate::ledger::LedgerService;
use crate::registry::VaultRegistry;
use crate::session::{SessionHandle, SessionState, SigningSession};
use crate::verifier::ResourceVerifier;

/// Result of an accepted signature
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureOutcome {
    /// More signatures are needed
    Collecting { collected: usize, threshold: u32 },
    /// Threshold reached and the release was accepted by the ledger
    Submitted { tx_id: TxId },
}

pub struct Coordinator {
    registry: Arc<VaultRegistry>,
    verifier: ResourceVerifier,
    assembler: ReleaseAssembler,
    ledger: Arc<dyn LedgerService>,
    active: Mutex<HashMap<ResourceRef, SessionHandle>>,
}

impl Coordinator {
    pub fn new(
        registry: Arc<VaultRegistry>,
        ledger: Arc<dyn LedgerService>,
        custody_address: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            verifier: ResourceVerifier::new(ledger.clone(), custody_address),
            assembler: ReleaseAssembler::new(ledger.clone()),
            ledger,
            active: Mutex::new(HashMap::new()),
        }
    }

    fn active(&self) -> MutexGuard<'_, HashMap<ResourceRef, SessionHandle>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve the active slot for a lock
    fn reserve(&self, resource_ref: ResourceRef, handle: &SessionHandle) -> Result<()> {
        let mut active = self.active();
        if active.contains_key(&resource_ref) {
            return Err(VaultError::SessionAlreadyActive(resource_ref));
        }
        active.insert(resource_ref, handle.clone());
        Ok(())
    }

    /// Drop a session from the active set, but only if it is still the one
    /// holding the slot
    fn release_slot(&self, resource_ref: &ResourceRef, handle: &SessionHandle) {
        let mut active = self.active();
        if active
            .get(resource_ref)
            .is_some_and(|current| Arc::ptr_eq(current, handle))
        {
            active.remove(resource_ref);
        }
    }

    fn fail(
        &self,
        session: &mut SigningSession,
        handle: &SessionHandle,
        err: VaultError,
    ) -> VaultError {
        let resource_ref = session.resource_ref();
        warn!(
            resource = %resource_ref,
            state = %session.state(),
            error = %err,
            "Signing session failed"
        );
        session.mark_failed(err.to_string());
        self.release_slot(&resource_ref, handle);
        err
    }

    /// Active session for a lock, if any
    pub fn session(&self, resource_ref: &ResourceRef) -> Option<SessionHandle> {
        self.active().get(resource_ref).cloned()
    }

    /// Start collecting signatures to release a lock to `recipient`
    ///
    /// Shorthand for [`Coordinator::open_session`] followed by
    /// [`Coordinator::prepare_release`]. On failure the session is already
    /// `Failed` and out of the active set.
    pub async fn start_session(
        &self,
        resource_ref: &ResourceRef,
        recipient: &str,
    ) -> Result<SessionHandle> {
        let handle = self.open_session(resource_ref, recipient)?;
        self.prepare_release(&handle).await?;
        Ok(handle)
    }

    /// Claim the active slot for a lock with an `Idle` session
    pub fn open_session(&self, resource_ref: &ResourceRef, recipient: &str) -> Result<SessionHandle> {
        let recipient = recipient.trim();
        if recipient.is_empty() {
            return Err(VaultError::InvalidRecipient(recipient.to_string()));
        }

        let lock = self
            .registry
            .get(resource_ref)?
            .ok_or_else(|| VaultError::not_found(*resource_ref, "no lock record"))?;

        let handle: SessionHandle = Arc::new(tokio::sync::Mutex::new(SigningSession::new(
            Arc::new(lock),
            recipient.to_string(),
        )));
        self.reserve(*resource_ref, &handle)?;
        info!(resource = %resource_ref, recipient, "Signing session opened");
        Ok(handle)
    }

    /// Verify the locked output and assemble the unsigned release
    ///
    /// Moves an `Idle` session to `Collecting`. A failed step leaves the
    /// session `Failed` and frees the slot; the handle stays readable.
    pub async fn prepare_release(&self, handle: &SessionHandle) -> Result<()> {
        let mut session = handle.lock().await;
        let resource = session.resource_ref();
        if session.state() != SessionState::Idle {
            return Err(VaultError::SessionClosed {
                resource,
                state: session.state(),
            });
        }

        let lock = session.lock().clone();
        session.set_state(SessionState::Verifying);
        let verified = match self.verifier.verify(&lock).await {
            Ok(verified) => verified,
            Err(err) => return Err(self.fail(&mut session, handle, err)),
        };
        session.set_verified_amount(verified.current_amount);
        session.set_state(SessionState::Assembling);

        let recipient = session.recipient().to_string();
        let artifact = match self
            .assembler
            .build(&lock, &recipient, verified.current_amount)
        {
            Ok(artifact) => artifact,
            Err(err) => return Err(self.fail(&mut session, handle, err)),
        };
        session.set_artifact(artifact);
        session.set_state(SessionState::Collecting);

        debug!(
            resource = %resource,
            state = %session.state(),
            threshold = lock.threshold,
            "Collecting signatures"
        );
        Ok(())
    }

    /// Offer the signature of a connected wallet
    ///
    /// Rejections leave the session exactly as it was. Reaching the threshold
    /// finalizes and submits the release in the same call.
    pub async fn offer_signature(
        &self,
        handle: &SessionHandle,
        credentials: &dyn CredentialProvider,
    ) -> Result<SignatureOutcome> {
        let mut session = handle.lock().await;
        let resource = session.resource_ref();
        if session.state() != SessionState::Collecting {
            return Err(VaultError::SessionClosed {
                resource,
                state: session.state(),
            });
        }

        let account_ref = credentials
            .account_ref()
            .await
            .map_err(|e| VaultError::SigningFailed(e.to_string()))?;
        let public_key = identity::resolve_key(&account_ref)?;
        let identity = public_key.identity();

        let lock = session.lock().clone();
        if !lock.is_owner(&identity) {
            warn!(resource = %resource, owner = %identity, "Signature from non-owner");
            return Err(VaultError::NotAnOwner { identity, resource });
        }
        if session.collected().contains(&identity) {
            return Err(VaultError::AlreadySigned { identity, resource });
        }
        if !lock.is_required_signer(&identity) {
            return Err(VaultError::NotARequiredSigner { identity, resource });
        }

        let artifact = session.pending_artifact().cloned().ok_or_else(|| {
            VaultError::AssemblyFailed(format!("no pending release for {resource}"))
        })?;
        let signature = credentials
            .sign(artifact.signing_payload(), &account_ref)
            .await
            .map_err(|e| VaultError::SigningFailed(e.to_string()))?;
        let next = self
            .assembler
            .attach(&artifact, Witness::new(public_key, signature))?;
        session.record_signature(identity, next);

        let collected = session.collected().len();
        info!(
            resource = %resource,
            owner = %identity,
            collected,
            threshold = lock.threshold,
            "Signature collected"
        );

        if !session.is_threshold_met() {
            return Ok(SignatureOutcome::Collecting {
                collected,
                threshold: lock.threshold,
            });
        }

        session.set_state(SessionState::Finalizing);
        self.finalize(&mut session, handle).await
    }

    async fn finalize(
        &self,
        session: &mut SigningSession,
        handle: &SessionHandle,
    ) -> Result<SignatureOutcome> {
        let resource = session.resource_ref();
        let finalized = session
            .pending_artifact()
            .ok_or_else(|| VaultError::AssemblyFailed(format!("no pending release for {resource}")))
            .and_then(|artifact| self.assembler.finalize(artifact));
        let release = match finalized {
            Ok(release) => release,
            Err(err) => return Err(self.fail(session, handle, err)),
        };

        let tx_id = match self.ledger.submit(&release).await {
            Ok(tx_id) => tx_id,
            Err(e) => {
                let err = VaultError::SubmissionFailed(format!("{resource}: {e}"));
                return Err(self.fail(session, handle, err));
            }
        };

        session.mark_submitted(tx_id);
        self.release_slot(&resource, handle);
        info!(resource = %resource, tx = %tx_id, state = %session.state(), "Release submitted");

        // The ledger accepted the release; a stale record must not mask that
        if let Err(err) = self.registry.remove(&resource) {
            warn!(
                resource = %resource,
                tx = %tx_id,
                error = %err,
                "Released lock is still recorded"
            );
        }
        Ok(SignatureOutcome::Submitted { tx_id })
    }

    /// Abandon a session. Terminal sessions are left alone.
    pub async fn abandon_session(&self, handle: &SessionHandle) -> Result<()> {
        let mut session = handle.lock().await;
        if session.state().is_terminal() {
            return Ok(());
        }

        let resource = session.resource_ref();
        session.mark_failed("abandoned");
        self.release_slot(&resource, handle);
        info!(resource = %resource, "Signing session abandoned");
        Ok(())
    }

    /// Re-install a persisted session into the active set
    pub fn resume(&self, session: SigningSession) -> Result<SessionHandle> {
        let resource = session.resource_ref();
        if session.state() != SessionState::Collecting {
            return Err(VaultError::SessionClosed {
                resource,
                state: session.state(),
            });
        }
        if self.registry.get(&resource)?.is_none() {
            return Err(VaultError::not_found(resource, "no lock record"));
        }

        let handle: SessionHandle = Arc::new(tokio::sync::Mutex::new(session));
        self.reserve(resource, &handle)?;
        debug!(resource = %resource, "Signing session resumed");
        Ok(handle)
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("active", &self.active().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
