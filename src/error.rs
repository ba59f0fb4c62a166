// src/error.rs
//! Error taxonomy for the claim verification engine.
//!
//! Each component has its own error enum; [`ClaimError`] is the only one a
//! caller ever sees, and [`ClaimError::status_code`] is the single place
//! internal failures are mapped to caller-facing codes.

use crate::models::claim::{ClaimId, ClaimState};
use thiserror::Error;

/// Secret gate errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    /// The gate has not been populated yet
    #[error("Secrets are not available yet")]
    SecretsUnavailable,

    /// A different bundle was injected after the gate became ready
    #[error("Conflicting secret bundle injected after initialization")]
    ConfigurationConflict,

    /// The decrypt collaborator failed
    #[error("Secret decryption failed: {0}")]
    Decrypt(String),
}

/// Claim store errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No claim with this id
    #[error("Claim not found: {0}")]
    UnknownClaim(ClaimId),

    /// The claim is not in a state that allows the requested transition
    #[error("Invalid claim transition: {from} -> {to}")]
    InvalidTransition { from: ClaimState, to: ClaimState },

    /// Backend failure
    #[error("Storage error: {0}")]
    Backend(String),
}

/// Failures of external collaborators (email provider, social network, resolver)
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// The collaborator could not be reached or answered with an error
    #[error("Upstream unavailable: {0}")]
    Unavailable(String),

    /// The collaborator did not answer in time
    #[error("Upstream timed out after {0} ms")]
    Timeout(u64),

    /// The collaborator answered with something we could not parse
    #[error("Malformed upstream response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            UpstreamError::Malformed(err.to_string())
        } else {
            UpstreamError::Unavailable(err.to_string())
        }
    }
}

/// Caller-facing errors of the verification orchestrator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClaimError {
    /// Secret gate not ready; retry later
    #[error("Secrets unavailable")]
    SecretsUnavailable,

    /// Conflicting secret injection; operator error
    #[error("Configuration conflict")]
    ConfigurationConflict,

    /// Claim state machine violation
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: ClaimState, to: ClaimState },

    /// Proof failed validation
    #[error("Proof rejected: {0}")]
    Rejected(String),

    /// Proof source could not be reached; retry with the same claim
    #[error("Verification indeterminate, retry later")]
    Indeterminate,

    /// External dependency failed
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Lookup miss on a claim id
    #[error("Unknown claim: {0}")]
    UnknownClaim(ClaimId),

    /// Lookup miss on an identifier
    #[error("Unknown identifier: {0}")]
    UnknownIdentifier(String),

    /// Malformed request input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Anything else
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClaimError {
    /// HTTP-equivalent status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ClaimError::InvalidInput(_) | ClaimError::Rejected(_) => 400,
            ClaimError::UnknownClaim(_) | ClaimError::UnknownIdentifier(_) => 404,
            ClaimError::InvalidTransition { .. } => 409,
            ClaimError::SecretsUnavailable
            | ClaimError::Indeterminate
            | ClaimError::UpstreamUnavailable(_) => 503,
            ClaimError::ConfigurationConflict | ClaimError::Internal(_) => 500,
        }
    }

    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClaimError::SecretsUnavailable
                | ClaimError::Indeterminate
                | ClaimError::UpstreamUnavailable(_)
        )
    }
}

impl From<GateError> for ClaimError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::SecretsUnavailable | GateError::Decrypt(_) => ClaimError::SecretsUnavailable,
            GateError::ConfigurationConflict => ClaimError::ConfigurationConflict,
        }
    }
}

impl From<StoreError> for ClaimError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UnknownClaim(id) => ClaimError::UnknownClaim(id),
            StoreError::InvalidTransition { from, to } => ClaimError::InvalidTransition { from, to },
            StoreError::Backend(msg) => ClaimError::Internal(msg),
        }
    }
}

impl From<UpstreamError> for ClaimError {
    fn from(err: UpstreamError) -> Self {
        ClaimError::UpstreamUnavailable(err.to_string())
    }
}

/// Result type for orchestrator operations
pub type Result<T> = std::result::Result<T, ClaimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ClaimError::SecretsUnavailable.status_code(), 503);
        assert_eq!(ClaimError::Rejected("bad".into()).status_code(), 400);
        assert_eq!(ClaimError::UnknownClaim(ClaimId::new()).status_code(), 404);
        assert_eq!(
            ClaimError::InvalidTransition {
                from: ClaimState::Rejected,
                to: ClaimState::ProofSubmitted
            }
            .status_code(),
            409
        );
        assert_eq!(ClaimError::ConfigurationConflict.status_code(), 500);
    }

    #[test]
    fn test_retry_classes() {
        assert!(ClaimError::Indeterminate.is_retryable());
        assert!(ClaimError::UpstreamUnavailable("smtp".into()).is_retryable());
        assert!(!ClaimError::Rejected("bad".into()).is_retryable());
        assert!(!ClaimError::InvalidTransition {
            from: ClaimState::Verified,
            to: ClaimState::ProofSubmitted
        }
        .is_retryable());
    }

    #[test]
    fn test_store_errors_map_to_caller_errors() {
        let id = ClaimId::new();
        assert_eq!(ClaimError::from(StoreError::UnknownClaim(id)), ClaimError::UnknownClaim(id));
        assert_eq!(
            ClaimError::from(GateError::Decrypt("kms".into())),
            ClaimError::SecretsUnavailable
        );
    }
}
