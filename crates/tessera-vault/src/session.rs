//! Signing sessions
//!
//! A session tracks one attempt to release one lock. It is plain data so the
//! CLI can persist it between invocations; only the coordinator moves it
//! between states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tessera_store::KVStore;
use tessera_types::{OwnerIdentity, ResourceRef, TxId};

use crate::assembler::ReleaseArtifact;
use crate::error::Result;
use crate::record::LockRecord;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Verifying,
    Assembling,
    Collecting,
    Finalizing,
    Submitted,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Submitted | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Verifying => "verifying",
            SessionState::Assembling => "assembling",
            SessionState::Collecting => "collecting",
            SessionState::Finalizing => "finalizing",
            SessionState::Submitted => "submitted",
            SessionState::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// One signature collection run for a lock
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SigningSession {
    lock: Arc<LockRecord>,
    recipient: String,
    state: SessionState,
    collected: BTreeSet<OwnerIdentity>,
    pending_artifact: Option<ReleaseArtifact>,
    verified_amount: Option<u64>,
    confirmation: Option<TxId>,
    failure: Option<String>,
    started_at: DateTime<Utc>,
}

/// Shared handle to a session owned by the coordinator
pub type SessionHandle = Arc<tokio::sync::Mutex<SigningSession>>;

impl SigningSession {
    pub(crate) fn new(lock: Arc<LockRecord>, recipient: String) -> Self {
        Self {
            lock,
            recipient,
            state: SessionState::Idle,
            collected: BTreeSet::new(),
            pending_artifact: None,
            verified_amount: None,
            confirmation: None,
            failure: None,
            started_at: Utc::now(),
        }
    }

    pub fn lock(&self) -> &Arc<LockRecord> {
        &self.lock
    }

    pub fn resource_ref(&self) -> ResourceRef {
        self.lock.resource_ref
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn collected(&self) -> &BTreeSet<OwnerIdentity> {
        &self.collected
    }

    pub fn pending_artifact(&self) -> Option<&ReleaseArtifact> {
        self.pending_artifact.as_ref()
    }

    pub fn verified_amount(&self) -> Option<u64> {
        self.verified_amount
    }

    /// Ledger transaction id once submitted
    pub fn confirmation(&self) -> Option<TxId> {
        self.confirmation
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Required signers that have not signed yet
    pub fn outstanding_signers(&self) -> Vec<OwnerIdentity> {
        self.lock
            .required_signers()
            .iter()
            .filter(|o| !self.collected.contains(o))
            .copied()
            .collect()
    }

    pub fn is_threshold_met(&self) -> bool {
        self.collected.len() >= self.lock.threshold as usize
    }

    pub(crate) fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    pub(crate) fn set_verified_amount(&mut self, amount: u64) {
        self.verified_amount = Some(amount);
    }

    pub(crate) fn set_artifact(&mut self, artifact: ReleaseArtifact) {
        self.pending_artifact = Some(artifact);
    }

    /// Record a witness: the identity and the new artifact land together
    pub(crate) fn record_signature(&mut self, identity: OwnerIdentity, artifact: ReleaseArtifact) {
        self.collected.insert(identity);
        self.pending_artifact = Some(artifact);
    }

    pub(crate) fn mark_submitted(&mut self, tx_id: TxId) {
        self.confirmation = Some(tx_id);
        self.state = SessionState::Submitted;
    }

    pub(crate) fn mark_failed(&mut self, reason: impl Into<String>) {
        self.failure = Some(reason.into());
        self.state = SessionState::Failed;
    }
}

/// Key namespace for persisted sessions
pub const SESSION_PREFIX: &str = "session/";

/// Persists sessions between CLI invocations
pub struct SessionStore {
    store: Mutex<Box<dyn KVStore>>,
}

impl SessionStore {
    pub fn new(store: Box<dyn KVStore>) -> Self {
        Self {
            store: Mutex::new(store),
        }
    }

    fn store(&self) -> MutexGuard<'_, Box<dyn KVStore>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn key(resource_ref: &ResourceRef) -> Vec<u8> {
        format!("{SESSION_PREFIX}{resource_ref}").into_bytes()
    }

    pub fn save(&self, session: &SigningSession) -> Result<()> {
        let value = serde_json::to_vec(session)?;
        self.store().set(&Self::key(&session.resource_ref()), &value)?;
        Ok(())
    }

    pub fn load(&self, resource_ref: &ResourceRef) -> Result<Option<SigningSession>> {
        let value = self.store().get(&Self::key(resource_ref))?;
        Ok(value.map(|v| serde_json::from_slice(&v)).transpose()?)
    }

    pub fn remove(&self, resource_ref: &ResourceRef) -> Result<()> {
        self.store().delete(&Self::key(resource_ref))?;
        Ok(())
    }

    /// All persisted sessions, in resource order
    pub fn list(&self) -> Result<Vec<SigningSession>> {
        let store = self.store();
        let sessions = store
            .prefix_iterator(SESSION_PREFIX.as_bytes())
            .map(|entry| -> Result<SigningSession> {
                let (_, value) = entry?;
                Ok(serde_json::from_slice(&value)?)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(sessions)
    }
}
