//! Vault error types

use tessera_errors::{Categorized, ErrorCategory};
use tessera_store::StoreError;
use tessera_types::{OwnerIdentity, ResourceRef};
use thiserror::Error;

use crate::session::SessionState;

/// Result type for vault operations
pub type Result<T> = std::result::Result<T, VaultError>;

/// Errors raised by the vault coordinator and its components
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("invalid policy:: {0}")]
    InvalidPolicy(String),

    #[error("invalid recipient:: {0:?}")]
    InvalidRecipient(String),

    #[error("invalid account reference {reference:?}:: {reason}")]
    InvalidAccountReference { reference: String, reason: String },

    #[error("{identity} is not an owner of {resource}")]
    NotAnOwner {
        identity: OwnerIdentity,
        resource: ResourceRef,
    },

    #[error("{identity} already signed the release of {resource}")]
    AlreadySigned {
        identity: OwnerIdentity,
        resource: ResourceRef,
    },

    #[error("{identity} is not a required signer for {resource}")]
    NotARequiredSigner {
        identity: OwnerIdentity,
        resource: ResourceRef,
    },

    #[error("signing failed:: {0}")]
    SigningFailed(String),

    #[error("invalid signature from {identity}:: {reason}")]
    InvalidSignature {
        identity: OwnerIdentity,
        reason: String,
    },

    #[error("resource {resource} not found:: {reason}")]
    ResourceNotFound {
        resource: ResourceRef,
        reason: String,
    },

    #[error("submission failed:: {0}")]
    SubmissionFailed(String),

    #[error("assembly failed:: {0}")]
    AssemblyFailed(String),

    #[error("insufficient signatures: have {have}, need {need}")]
    InsufficientSignatures { have: usize, need: u32 },

    #[error("a signing session is already active for {0}")]
    SessionAlreadyActive(ResourceRef),

    #[error("signing session for {resource} is closed ({state})")]
    SessionClosed {
        resource: ResourceRef,
        state: SessionState,
    },

    #[error("storage error:: {0}")]
    Storage(#[from] StoreError),

    #[error("serialization error:: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VaultError {
    pub(crate) fn not_found(resource: ResourceRef, reason: impl Into<String>) -> Self {
        VaultError::ResourceNotFound {
            resource,
            reason: reason.into(),
        }
    }
}

impl Categorized for VaultError {
    fn category(&self) -> ErrorCategory {
        match self {
            VaultError::InvalidPolicy(_) | VaultError::InvalidRecipient(_) => {
                ErrorCategory::PolicyViolation
            }
            VaultError::InvalidAccountReference { .. }
            | VaultError::NotAnOwner { .. }
            | VaultError::AlreadySigned { .. }
            | VaultError::NotARequiredSigner { .. }
            | VaultError::SigningFailed(_)
            | VaultError::InvalidSignature { .. } => ErrorCategory::IdentityViolation,
            VaultError::ResourceNotFound { .. }
            | VaultError::SubmissionFailed(_)
            | VaultError::AssemblyFailed(_)
            | VaultError::InsufficientSignatures { .. } => ErrorCategory::ResourceState,
            VaultError::SessionAlreadyActive(_) | VaultError::SessionClosed { .. } => {
                ErrorCategory::SessionLifecycle
            }
            VaultError::Storage(_) | VaultError::Serialization(_) => ErrorCategory::Internal,
        }
    }
}
