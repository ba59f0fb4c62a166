// src/services/email_verifier.rs
//! Email-address proof verification.
//!
//! Codes are local state: the orchestrator issues one when a new email claim
//! is initiated, and the verifier redeems it. Because nothing has to be
//! fetched, every submission resolves to `Verified` or `Rejected`, never
//! `Indeterminate`.

use crate::models::verdict::Verdict;
use crate::utils::crypto::{codes_match, generate_email_code};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct IssuedCode {
    code: String,
    expires_at: DateTime<Utc>,
    consumed: bool,
    superseded: bool,
}

/// Issued verification codes, keyed by (identifier, email address).
pub struct EmailCodeBook {
    ttl: Duration,
    codes: Mutex<HashMap<(String, String), Vec<IssuedCode>>>,
}

impl EmailCodeBook {
    /// # Arguments
    /// * `ttl` - How long an issued code stays redeemable
    pub fn new(ttl: Duration) -> Self {
        EmailCodeBook {
            ttl,
            codes: Mutex::new(HashMap::new()),
        }
    }

    fn key(identifier: &str, email: &str) -> (String, String) {
        (identifier.to_string(), email.to_string())
    }

    /// Issues a fresh code for the pair. Older unredeemed codes for the same
    /// pair stop being accepted.
    pub fn issue(&self, identifier: &str, email: &str, now: DateTime<Utc>) -> String {
        self.issue_code(identifier, email, generate_email_code(), now)
    }

    fn issue_code(&self, identifier: &str, email: &str, code: String, now: DateTime<Utc>) -> String {
        let mut codes = self.codes.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let entries = codes.entry(Self::key(identifier, email)).or_default();
        for entry in entries.iter_mut().filter(|e| !e.consumed) {
            entry.superseded = true;
        }
        entries.push(IssuedCode {
            code: code.clone(),
            expires_at: now + self.ttl,
            consumed: false,
            superseded: false,
        });
        code
    }

    /// Checks a submitted code and consumes it on success.
    ///
    /// # Returns
    /// - `Verified` for a live code issued to this pair (now consumed)
    /// - `Rejected` for an unknown, consumed, superseded or expired code
    pub fn redeem(&self, identifier: &str, email: &str, submitted: &str, now: DateTime<Utc>) -> Verdict {
        let mut codes = self.codes.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let entry = codes
            .get_mut(&Self::key(identifier, email))
            .and_then(|entries| entries.iter_mut().rev().find(|e| codes_match(&e.code, submitted)));

        match entry {
            None => Verdict::rejected("unknown code"),
            Some(entry) if entry.consumed => Verdict::rejected("code already used"),
            Some(entry) if entry.superseded => Verdict::rejected("code superseded by a newer code"),
            Some(entry) if entry.expires_at <= now => Verdict::rejected("code expired"),
            Some(entry) => {
                entry.consumed = true;
                Verdict::Verified
            }
        }
    }

    /// Drops codes that expired before `now`.
    ///
    /// # Returns
    /// Number of codes removed
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let mut codes = self.codes.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut removed = 0;
        codes.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|e| e.expires_at > now);
            removed += before - entries.len();
            !entries.is_empty()
        });
        removed
    }
}

/// Verifier for `EmailAddress` claims.
pub struct EmailCodeVerifier {
    codes: std::sync::Arc<EmailCodeBook>,
}

impl EmailCodeVerifier {
    pub fn new(codes: std::sync::Arc<EmailCodeBook>) -> Self {
        EmailCodeVerifier { codes }
    }

    /// Redeems `code` for (identifier, email) at the current time.
    pub fn verify(&self, identifier: &str, email: &str, code: &str) -> Verdict {
        self.codes.redeem(identifier, email, code, Utc::now())
    }
}

#[cfg(test)]
impl EmailCodeBook {
    /// Issues a known code, for tests that need to submit it.
    pub(crate) fn issue_known(&self, identifier: &str, email: &str, code: &str, now: DateTime<Utc>) {
        self.issue_code(identifier, email, code.to_string(), now);
    }
}
