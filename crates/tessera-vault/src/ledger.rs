//! Ledger collaborator port and an in-process implementation
//!
//! The coordinator reaches the ledger only through [`LedgerService`]: a read
//! of one unspent output, body encoding for a release, and submission of
//! locks and releases. [`LocalLedger`] keeps outputs in a [`KVStore`] and
//! enforces the same release rules the custody script does on chain.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tessera_crypto::verify_signature;
use tessera_store::{KVStore, PrefixStore, StoreError};
use tessera_types::{ResourceRef, TxId};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::assembler::{ReleaseRequest, SubmittableRelease};
use crate::datum::LockDatum;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger unavailable:: {0}")]
    Unavailable(String),

    #[error("transaction rejected:: {0}")]
    Rejected(String),

    #[error("encoding error:: {0}")]
    Encoding(String),

    #[error("ledger storage error:: {0}")]
    Store(#[from] StoreError),
}

/// An unspent output as reported by the ledger
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnspentOutput {
    pub resource_ref: ResourceRef,
    /// Address currently holding the output
    pub address: String,
    pub amount: u64,
    /// Inline datum bytes, empty when the output carries none
    pub datum: Vec<u8>,
}

/// Request to lock value at the custody address
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRequest {
    pub custody_address: String,
    pub amount: u64,
    #[serde(with = "crate::hex_bytes")]
    pub datum: Vec<u8>,
}

#[async_trait]
pub trait LedgerService: Send + Sync {
    /// Current unspent output at `resource_ref`, or `None` when it was spent
    /// or never existed
    async fn fetch_unspent_output(
        &self,
        resource_ref: &ResourceRef,
    ) -> Result<Option<UnspentOutput>, LedgerError>;

    /// Encode the body of a release transaction
    fn encode_release(&self, request: &ReleaseRequest) -> Result<Vec<u8>, LedgerError>;

    /// Submit a co-signed release, returning the transaction id
    async fn submit(&self, release: &SubmittableRelease) -> Result<TxId, LedgerError>;

    /// Lock value at the custody address, returning the new output reference
    async fn submit_lock(&self, request: &LockRequest) -> Result<ResourceRef, LedgerError>;
}

/// Key namespace for ledger state inside a shared store
pub const LEDGER_PREFIX: &str = "ledger/";

const OUTPUT_PREFIX: &str = "utxo/";
const NONCE_KEY: &[u8] = b"nonce";

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredOutput {
    address: String,
    amount: u64,
    #[serde(with = "crate::hex_bytes")]
    datum: Vec<u8>,
    spent_by: Option<TxId>,
}

#[derive(Serialize)]
struct LockBody<'a> {
    request: &'a LockRequest,
    nonce: u64,
}

/// Ledger kept in a local store
///
/// Outputs live under `ledger/utxo/<ref>`. Spent outputs are kept with the
/// spending transaction id so double spends can be told apart from unknown
/// references.
pub struct LocalLedger<S: KVStore> {
    store: Mutex<PrefixStore<S>>,
    custody_address: String,
}

impl<S: KVStore> LocalLedger<S> {
    pub fn new(store: S, custody_address: impl Into<String>) -> Self {
        Self {
            store: Mutex::new(PrefixStore::new(store, LEDGER_PREFIX)),
            custody_address: custody_address.into(),
        }
    }

    pub fn custody_address(&self) -> &str {
        &self.custody_address
    }

    fn store(&self) -> MutexGuard<'_, PrefixStore<S>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn output_key(resource_ref: &ResourceRef) -> Vec<u8> {
        format!("{OUTPUT_PREFIX}{resource_ref}").into_bytes()
    }

    fn load_output(
        store: &PrefixStore<S>,
        resource_ref: &ResourceRef,
    ) -> Result<Option<StoredOutput>, LedgerError> {
        store
            .get(&Self::output_key(resource_ref))?
            .map(|value| {
                serde_json::from_slice(&value).map_err(|e| LedgerError::Encoding(e.to_string()))
            })
            .transpose()
    }

    fn save_output(
        store: &mut PrefixStore<S>,
        resource_ref: &ResourceRef,
        output: &StoredOutput,
    ) -> Result<(), LedgerError> {
        let value = serde_json::to_vec(output).map_err(|e| LedgerError::Encoding(e.to_string()))?;
        store.set(&Self::output_key(resource_ref), &value)?;
        Ok(())
    }

    fn next_nonce(store: &mut PrefixStore<S>) -> Result<u64, LedgerError> {
        let current = match store.get(NONCE_KEY)? {
            Some(bytes) => {
                let array: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| LedgerError::Encoding("corrupt nonce".into()))?;
                u64::from_be_bytes(array)
            }
            None => 0,
        };
        store.set(NONCE_KEY, &(current + 1).to_be_bytes())?;
        Ok(current)
    }

    /// Add an output directly, bypassing lock validation
    ///
    /// Lets callers mirror outputs that were created elsewhere.
    pub fn insert_output(
        &self,
        resource_ref: ResourceRef,
        address: impl Into<String>,
        amount: u64,
        datum: Vec<u8>,
    ) -> Result<(), LedgerError> {
        let output = StoredOutput {
            address: address.into(),
            amount,
            datum,
            spent_by: None,
        };
        Self::save_output(&mut self.store(), &resource_ref, &output)
    }

    /// Mark an output spent by a transaction outside the vault
    pub fn spend_externally(&self, resource_ref: &ResourceRef) -> Result<TxId, LedgerError> {
        let mut store = self.store();
        let mut output = Self::load_output(&store, resource_ref)?
            .ok_or_else(|| LedgerError::Rejected(format!("unknown output {resource_ref}")))?;
        let tx_id = TxId::of_body(format!("external spend of {resource_ref}").as_bytes());
        output.spent_by = Some(tx_id);
        Self::save_output(&mut store, resource_ref, &output)?;
        Ok(tx_id)
    }

    /// Transaction that spent an output, if any
    pub fn spent_by(&self, resource_ref: &ResourceRef) -> Result<Option<TxId>, LedgerError> {
        Ok(Self::load_output(&self.store(), resource_ref)?.and_then(|o| o.spent_by))
    }

    /// Apply the custody script rules to a release of `output`
    fn validate_release(
        output: &StoredOutput,
        request: &ReleaseRequest,
        release: &SubmittableRelease,
    ) -> Result<(), LedgerError> {
        if request.amount != output.amount {
            return Err(LedgerError::Rejected(format!(
                "release moves {} but the output holds {}",
                request.amount, output.amount
            )));
        }

        let datum = LockDatum::decode(&output.datum)
            .map_err(|e| LedgerError::Rejected(format!("output datum: {e}")))?;

        let mut signers = HashSet::new();
        for witness in release.witnesses() {
            if witness.public_key.identity() != witness.signer {
                return Err(LedgerError::Rejected(format!(
                    "witness key does not hash to {}",
                    witness.signer
                )));
            }
            verify_signature(&witness.public_key, release.body(), &witness.signature).map_err(
                |_| LedgerError::Rejected(format!("bad signature from {}", witness.signer)),
            )?;
            if !request.required_signers.contains(&witness.signer) {
                return Err(LedgerError::Rejected(format!(
                    "{} is not a declared signer",
                    witness.signer
                )));
            }
            signers.insert(witness.signer);
        }

        let owner_signatures = datum.owners.iter().filter(|o| signers.contains(o)).count();
        if owner_signatures < datum.threshold as usize {
            return Err(LedgerError::Rejected(format!(
                "{owner_signatures} owner signatures, {} required",
                datum.threshold
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl<S: KVStore> LedgerService for LocalLedger<S> {
    async fn fetch_unspent_output(
        &self,
        resource_ref: &ResourceRef,
    ) -> Result<Option<UnspentOutput>, LedgerError> {
        let output = Self::load_output(&self.store(), resource_ref)?;
        Ok(output
            .filter(|o| o.spent_by.is_none())
            .map(|o| UnspentOutput {
                resource_ref: *resource_ref,
                address: o.address,
                amount: o.amount,
                datum: o.datum,
            }))
    }

    fn encode_release(&self, request: &ReleaseRequest) -> Result<Vec<u8>, LedgerError> {
        if request.recipient.trim().is_empty() {
            return Err(LedgerError::Encoding("empty recipient".into()));
        }
        serde_json::to_vec(request).map_err(|e| LedgerError::Encoding(e.to_string()))
    }

    async fn submit(&self, release: &SubmittableRelease) -> Result<TxId, LedgerError> {
        let request: ReleaseRequest = serde_json::from_slice(release.body())
            .map_err(|e| LedgerError::Rejected(format!("undecodable body: {e}")))?;
        if &request != release.request() {
            return Err(LedgerError::Rejected(
                "body does not match the release request".into(),
            ));
        }

        let resource_ref = request.resource_ref;
        let mut store = self.store();
        let mut output = Self::load_output(&store, &resource_ref)?
            .ok_or_else(|| LedgerError::Rejected(format!("unknown input {resource_ref}")))?;
        if let Some(tx_id) = output.spent_by {
            warn!(resource = %resource_ref, spent_by = %tx_id, "Release of spent output");
            return Err(LedgerError::Rejected(format!(
                "input {resource_ref} already spent by {tx_id}"
            )));
        }

        Self::validate_release(&output, &request, release)?;

        let tx_id = TxId::of_body(release.body());
        output.spent_by = Some(tx_id);
        Self::save_output(&mut store, &resource_ref, &output)?;

        // The released value lands at the recipient
        let payout = StoredOutput {
            address: request.recipient.clone(),
            amount: output.amount,
            datum: Vec::new(),
            spent_by: None,
        };
        Self::save_output(&mut store, &ResourceRef::new(tx_id, 0), &payout)?;

        info!(
            resource = %resource_ref,
            tx = %tx_id,
            recipient = %request.recipient,
            "Release accepted"
        );
        Ok(tx_id)
    }

    async fn submit_lock(&self, request: &LockRequest) -> Result<ResourceRef, LedgerError> {
        if request.custody_address != self.custody_address {
            return Err(LedgerError::Rejected(format!(
                "unknown custody address {}",
                request.custody_address
            )));
        }
        if request.amount == 0 {
            return Err(LedgerError::Rejected("cannot lock zero value".into()));
        }
        LockDatum::decode(&request.datum)
            .map_err(|e| LedgerError::Rejected(format!("lock datum: {e}")))?;

        let mut store = self.store();
        let nonce = Self::next_nonce(&mut store)?;
        let body = serde_json::to_vec(&LockBody { request, nonce })
            .map_err(|e| LedgerError::Encoding(e.to_string()))?;
        let resource_ref = ResourceRef::new(TxId::of_body(&body), 0);

        let output = StoredOutput {
            address: request.custody_address.clone(),
            amount: request.amount,
            datum: request.datum.clone(),
            spent_by: None,
        };
        Self::save_output(&mut store, &resource_ref, &output)?;

        debug!(resource = %resource_ref, amount = request.amount, "Lock output created");
        Ok(resource_ref)
    }
}
