// src/models/document.rs
//! Identity document data model.
//!
//! The identity document is the published artifact for one DID: the list of
//! external identities currently verified for it. It is always derived from
//! the claim store and never edited directly.

use crate::models::claim::IdentityKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One verified external identity inside a document.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedLink {
    pub identity_kind: IdentityKind,
    pub identity_value: String,
}

/// Canonical compilation of all verified links for an identifier.
///
/// # Fields
/// - `identifier`: The DID this document describes
/// - `verified_links`: One entry per identity kind, in `IdentityKind` order
/// - `version`: Revision of the identifier's verified set; 0 before any change
/// - `updated_at`: Time of the last change to the verified set, if any
///
/// # Wire Format
/// Serialised bare (no response envelope):
/// ```json
/// {"identifier":"did:example:123",
///  "verifiedLinks":[{"identityKind":"EmailAddress","identityValue":"a@example.com"}],
///  "version":1,"updatedAt":"2024-01-01T00:00:00Z"}
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IdentityDocument {
    pub identifier: String,
    pub verified_links: Vec<VerifiedLink>,
    pub version: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
impl IdentityDocument {
    /// A document with no verified links. Not an error: "nothing verified yet"
    /// is a valid state for any identifier.
    pub fn empty(identifier: &str) -> Self {
        IdentityDocument {
            identifier: identifier.to_string(),
            verified_links: Vec::new(),
            version: 0,
            updated_at: None,
        }
    }

    /// Looks up the verified value for one identity kind.
    pub fn link(&self, kind: IdentityKind) -> Option<&str> {
        self.verified_links
            .iter()
            .find(|link| link.identity_kind == kind)
            .map(|link| link.identity_value.as_str())
    }
}
