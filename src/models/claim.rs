// src/models/claim.rs
//! Claim data model.
//!
//! A claim is one attempt to link an external identity (a social handle or an
//! email address) to a decentralized identifier. Claims move through a small
//! state machine and are never deleted: a finished claim is either kept as
//! `Verified`, or left behind as `Rejected` / `Expired` history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Stable identity of a single claim object.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ClaimId(Uuid);

impl ClaimId {
    /// Allocates a fresh random claim id.
    pub fn new() -> Self {
        ClaimId(Uuid::new_v4())
    }
}

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ClaimId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(ClaimId)
    }
}

/// The kind of external identity a claim is about.
///
/// The declaration order is the fixed total order used when rendering
/// identity documents; do not reorder variants.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdentityKind {
    SocialHandle,
    EmailAddress,
}

impl IdentityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityKind::SocialHandle => "SocialHandle",
            IdentityKind::EmailAddress => "EmailAddress",
        }
    }
}

impl fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a claim.
///
/// ```text
/// Initiated -> ProofSubmitted -> Verified -> Expired
///                   |   ^
///                   |   '-- Indeterminate (retry)
///                   '-----> Rejected
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClaimState {
    Initiated,
    ProofSubmitted,
    Verified,
    Rejected,
    Expired,
}

impl ClaimState {
    /// Claims still waiting on a verdict. These are reused by `create_or_get`.
    pub fn is_open(&self) -> bool {
        matches!(self, ClaimState::Initiated | ClaimState::ProofSubmitted)
    }
}

impl fmt::Display for ClaimState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClaimState::Initiated => "Initiated",
            ClaimState::ProofSubmitted => "ProofSubmitted",
            ClaimState::Verified => "Verified",
            ClaimState::Rejected => "Rejected",
            ClaimState::Expired => "Expired",
        };
        f.write_str(name)
    }
}

/// One (identifier, identity kind) verification attempt.
///
/// # Fields
/// - `id`: Stable claim identity, handed back to the caller on initiation
/// - `identifier`: The subject's DID, e.g. "did:example:123"
/// - `identity_kind`: Which verifier handles the proof
/// - `identity_value`: The normalised handle or address being claimed
/// - `proof_artifact`: Evidence supplied by the caller, absent until submitted.
///   Never serialized: it holds email codes and signatures
/// - `state`: Current lifecycle state
/// - `attempt`: Verification attempts started so far; a verdict must name the
///   attempt it belongs to
/// - `awaiting_retry`: Set once an attempt came back `Indeterminate`; only
///   then may a new proof replace the artifact
/// - `created_at` / `verified_at`: Lifecycle timestamps
/// - `expired_at`: When the claim was superseded or swept
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    pub id: ClaimId,
    pub identifier: String,
    pub identity_kind: IdentityKind,
    pub identity_value: String,
    #[serde(skip_serializing, default)]
    pub proof_artifact: Option<String>,
    pub state: ClaimState,
    #[serde(skip)]
    pub attempt: u32,
    #[serde(skip)]
    pub awaiting_retry: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expired_at: Option<DateTime<Utc>>,
}

impl Claim {
    /// Creates a claim in the `Initiated` state.
    pub fn new(
        identifier: String,
        identity_kind: IdentityKind,
        identity_value: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Claim {
            id: ClaimId::new(),
            identifier,
            identity_kind,
            identity_value,
            proof_artifact: None,
            state: ClaimState::Initiated,
            attempt: 0,
            awaiting_retry: false,
            created_at,
            verified_at: None,
            expired_at: None,
        }
    }
}
