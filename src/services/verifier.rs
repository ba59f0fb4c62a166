// src/services/verifier.rs
//! Proof verifier selection.
//!
//! The set of identity kinds is closed, so verifiers are a closed enum with
//! one variant per kind, and the orchestrator picks one by looking the claim's
//! kind up in a [`VerifierSet`]. Verifiers never touch the claim store; they
//! only turn (identity, artifact) into a [`Verdict`].

use crate::models::claim::IdentityKind;
use crate::models::verdict::Verdict;
use crate::services::email_verifier::EmailCodeVerifier;
use crate::services::social_verifier::SocialHandleVerifier;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Input handed to a verifier.
#[derive(Debug, Clone)]
pub struct ProofSubject {
    pub identifier: String,
    pub identity_value: String,
    pub proof_artifact: String,
}

/// One verifier per identity kind.
pub enum ProofVerifier {
    SocialHandle(SocialHandleVerifier),
    EmailAddress(EmailCodeVerifier),
}

impl ProofVerifier {
    /// The identity kind this verifier handles.
    pub fn kind(&self) -> IdentityKind {
        match self {
            ProofVerifier::SocialHandle(_) => IdentityKind::SocialHandle,
            ProofVerifier::EmailAddress(_) => IdentityKind::EmailAddress,
        }
    }

    /// Produces a verdict for `subject`.
    ///
    /// Collaborator outages are already folded into `Indeterminate` by the
    /// per-kind verifiers, so there is no error channel here.
    pub async fn verify(&self, subject: &ProofSubject) -> Verdict {
        match self {
            ProofVerifier::SocialHandle(verifier) => {
                verifier
                    .verify(&subject.identifier, &subject.identity_value, &subject.proof_artifact)
                    .await
            }
            ProofVerifier::EmailAddress(verifier) => verifier.verify(
                &subject.identifier,
                &subject.identity_value,
                &subject.proof_artifact,
            ),
        }
    }
}

/// Lookup table from identity kind to verifier.
#[derive(Default, Clone)]
pub struct VerifierSet {
    verifiers: BTreeMap<IdentityKind, Arc<ProofVerifier>>,
}

impl VerifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a verifier under its own kind, replacing any previous one.
    pub fn with(mut self, verifier: ProofVerifier) -> Self {
        self.verifiers.insert(verifier.kind(), Arc::new(verifier));
        self
    }

    pub fn get(&self, kind: IdentityKind) -> Option<Arc<ProofVerifier>> {
        self.verifiers.get(&kind).cloned()
    }
}
