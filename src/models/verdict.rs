// src/models/verdict.rs
//! Tri-state outcome of proof validation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of checking a proof artifact against its claimed identity.
///
/// `Indeterminate` means the proof source could not be reached right now;
/// the claim stays open and the caller may retry with the same claim.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "verdict", content = "reason")]
pub enum Verdict {
    Verified,
    Rejected(String),
    Indeterminate,
}

impl Verdict {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Verdict::Rejected(reason.into())
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Verified => f.write_str("Verified"),
            Verdict::Rejected(reason) => write!(f, "Rejected({})", reason),
            Verdict::Indeterminate => f.write_str("Indeterminate"),
        }
    }
}
