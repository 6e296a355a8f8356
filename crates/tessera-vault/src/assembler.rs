//! Release assembly
//!
//! A release moves a locked output to a recipient. The assembler fixes the
//! required signers, delegates body encoding to the ledger, and collects
//! witnesses one at a time. Each attach produces a new artifact; an artifact
//! is never edited in place, so a rejected witness cannot corrupt the one a
//! session already holds.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tessera_crypto::{verify_signature, PublicKey};
use tessera_types::{OwnerIdentity, ResourceRef};
use tracing::debug;

use crate::error::{Result, VaultError};
use crate::ledger::LedgerService;
use crate::record::LockRecord;

/// Unsigned description of a release, handed to the ledger for encoding
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRequest {
    pub resource_ref: ResourceRef,
    pub recipient: String,
    pub amount: u64,
    pub required_signers: Vec<OwnerIdentity>,
}

/// A signature over a release body together with the key that made it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    pub signer: OwnerIdentity,
    pub public_key: PublicKey,
    #[serde(with = "crate::hex_bytes")]
    pub signature: Vec<u8>,
}

impl Witness {
    pub fn new(public_key: PublicKey, signature: Vec<u8>) -> Self {
        Self {
            signer: public_key.identity(),
            public_key,
            signature,
        }
    }
}

/// Progressively co-signed release
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseArtifact {
    request: ReleaseRequest,
    #[serde(with = "crate::hex_bytes")]
    body: Vec<u8>,
    threshold: u32,
    witnesses: Vec<Witness>,
}

impl ReleaseArtifact {
    pub fn request(&self) -> &ReleaseRequest {
        &self.request
    }

    pub fn resource_ref(&self) -> ResourceRef {
        self.request.resource_ref
    }

    /// Bytes every owner signs
    pub fn signing_payload(&self) -> &[u8] {
        &self.body
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn witnesses(&self) -> &[Witness] {
        &self.witnesses
    }

    pub fn has_signed(&self, identity: &OwnerIdentity) -> bool {
        self.witnesses.iter().any(|w| &w.signer == identity)
    }
}

/// Fully signed release, ready for submission
///
/// Only [`ReleaseAssembler::finalize`] produces one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmittableRelease {
    request: ReleaseRequest,
    body: Vec<u8>,
    witnesses: Vec<Witness>,
}

impl SubmittableRelease {
    pub fn request(&self) -> &ReleaseRequest {
        &self.request
    }

    pub fn resource_ref(&self) -> ResourceRef {
        self.request.resource_ref
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn witnesses(&self) -> &[Witness] {
        &self.witnesses
    }
}

pub struct ReleaseAssembler {
    ledger: Arc<dyn LedgerService>,
}

impl ReleaseAssembler {
    pub fn new(ledger: Arc<dyn LedgerService>) -> Self {
        Self { ledger }
    }

    /// Build the initial, unsigned artifact for a lock
    pub fn build(
        &self,
        lock: &LockRecord,
        recipient: &str,
        verified_amount: u64,
    ) -> Result<ReleaseArtifact> {
        let request = ReleaseRequest {
            resource_ref: lock.resource_ref,
            recipient: recipient.to_string(),
            amount: verified_amount,
            required_signers: lock.required_signers().to_vec(),
        };
        let body = self
            .ledger
            .encode_release(&request)
            .map_err(|e| VaultError::AssemblyFailed(e.to_string()))?;

        debug!(
            resource = %lock.resource_ref,
            body_len = body.len(),
            required = request.required_signers.len(),
            "Release assembled"
        );

        Ok(ReleaseArtifact {
            request,
            body,
            threshold: lock.threshold,
            witnesses: Vec::new(),
        })
    }

    /// Return a copy of `artifact` carrying one more witness
    pub fn attach(&self, artifact: &ReleaseArtifact, witness: Witness) -> Result<ReleaseArtifact> {
        let resource = artifact.resource_ref();
        let identity = witness.signer;

        if witness.public_key.identity() != identity {
            return Err(VaultError::InvalidSignature {
                identity,
                reason: "verification key does not match signer".into(),
            });
        }
        if !artifact.request.required_signers.contains(&identity) {
            return Err(VaultError::NotARequiredSigner { identity, resource });
        }
        if artifact.has_signed(&identity) {
            return Err(VaultError::AlreadySigned { identity, resource });
        }
        verify_signature(&witness.public_key, &artifact.body, &witness.signature).map_err(
            |e| VaultError::InvalidSignature {
                identity,
                reason: e.to_string(),
            },
        )?;

        let mut next = artifact.clone();
        next.witnesses.push(witness);
        Ok(next)
    }

    /// Seal an artifact whose witness count reached the threshold
    pub fn finalize(&self, artifact: &ReleaseArtifact) -> Result<SubmittableRelease> {
        if artifact.witnesses.len() != artifact.threshold as usize {
            return Err(VaultError::InsufficientSignatures {
                have: artifact.witnesses.len(),
                need: artifact.threshold,
            });
        }

        Ok(SubmittableRelease {
            request: artifact.request.clone(),
            body: artifact.body.clone(),
            witnesses: artifact.witnesses.clone(),
        })
    }
}
