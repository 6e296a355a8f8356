//! Threshold multi-signature vault coordinator
//!
//! Owners lock value under an M-of-N policy. Releasing it runs a signing
//! session: the locked output is verified against the ledger, a release is
//! assembled, and signatures are collected one wallet at a time from the
//! required signers until the threshold is met and the release is
//! submitted.
//!
//! Ledger access and wallet signing are collaborators behind the
//! [`LedgerService`] and [`CredentialProvider`] traits.

pub mod assembler;
pub mod coordinator;
pub mod credentials;
pub mod datum;
pub mod error;
mod hex_bytes;
pub mod identity;
pub mod ledger;
pub mod record;
pub mod registry;
pub mod session;
#[cfg(test)]
mod testing;
pub mod vault;
pub mod verifier;

pub use assembler::{ReleaseArtifact, ReleaseAssembler, ReleaseRequest, SubmittableRelease, Witness};
pub use coordinator::{Coordinator, SignatureOutcome};
pub use credentials::{CredentialError, CredentialProvider, KeyringCredentials};
pub use datum::{DatumError, LockDatum};
pub use error::{Result, VaultError};
pub use identity::{resolve, resolve_key};
pub use ledger::{LedgerError, LedgerService, LocalLedger, LockRequest, UnspentOutput};
pub use record::LockRecord;
pub use registry::VaultRegistry;
pub use session::{SessionHandle, SessionState, SessionStore, SigningSession};
pub use vault::Vault;
pub use verifier::{ResourceVerifier, VerifiedResource};
