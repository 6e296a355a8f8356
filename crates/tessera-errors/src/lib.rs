//! Error categories and codes for tessera.
//!
//! Every failure raised by the vault coordinator falls into one of a small
//! number of categories. Callers use the category to decide what to do next:
//! fix the input, try a different signer, re-verify against the ledger, or
//! start over with a fresh session.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Broad classification of coordinator failures
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Rejected before any side effect; correct the input and retry
    PolicyViolation,
    /// Signer was rejected; session state is unchanged
    IdentityViolation,
    /// Reflects ledger truth at a point in time; re-verify or abandon
    ResourceState,
    /// Session exclusivity or closure invariant
    SessionLifecycle,
    /// Storage or serialization failure
    Internal,
}

impl ErrorCategory {
    /// Numeric code for this category
    pub fn code(&self) -> u32 {
        match self {
            ErrorCategory::PolicyViolation => codes::POLICY_VIOLATION,
            ErrorCategory::IdentityViolation => codes::IDENTITY_VIOLATION,
            ErrorCategory::ResourceState => codes::RESOURCE_STATE,
            ErrorCategory::SessionLifecycle => codes::SESSION_LIFECYCLE,
            ErrorCategory::Internal => codes::INTERNAL,
        }
    }

    /// Whether the caller can recover by changing its input or signer
    pub fn is_caller_recoverable(&self) -> bool {
        matches!(
            self,
            ErrorCategory::PolicyViolation | ErrorCategory::IdentityViolation
        )
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::PolicyViolation => "policy violation",
            ErrorCategory::IdentityViolation => "identity violation",
            ErrorCategory::ResourceState => "resource state",
            ErrorCategory::SessionLifecycle => "session lifecycle",
            ErrorCategory::Internal => "internal",
        };
        write!(f, "{name}")
    }
}

/// Implemented by error types that can be classified
pub trait Categorized {
    fn category(&self) -> ErrorCategory;

    fn code(&self) -> u32 {
        self.category().code()
    }
}

/// Error used at process boundaries where only the category and a message survive
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{category} error {}: {message}", .category.code())]
pub struct CodedError {
    pub category: ErrorCategory,
    pub message: String,
}

impl CodedError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }

    /// Build from any categorized error
    pub fn from_categorized<E>(err: &E) -> Self
    where
        E: Categorized + fmt::Display,
    {
        Self::new(err.category(), err.to_string())
    }
}

impl Categorized for CodedError {
    fn category(&self) -> ErrorCategory {
        self.category
    }
}

/// Error codes, also used as process exit statuses by the CLI
pub mod codes {
    /// Success
    pub const OK: u32 = 0;
    /// Internal error
    pub const INTERNAL: u32 = 1;
    /// Invalid policy or recipient
    pub const POLICY_VIOLATION: u32 = 3;
    /// Signer not accepted
    pub const IDENTITY_VIOLATION: u32 = 4;
    /// Ledger state does not allow the operation
    pub const RESOURCE_STATE: u32 = 5;
    /// Session already active or already closed
    pub const SESSION_LIFECYCLE: u32 = 6;
}
