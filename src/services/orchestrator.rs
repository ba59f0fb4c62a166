// src/services/orchestrator.rs
//! Verification orchestrator.
//!
//! Sequences every claim operation:
//! 1. Check the secret gate (fail fast, before any store mutation)
//! 2. Create or look up the claim
//! 3. Run the verifier for the claim's kind under a bounded timeout
//! 4. Apply the verdict to the claim store
//! 5. Invalidate the identifier's cached document
//!
//! This is the only component that maps internal failures to caller-facing
//! [`ClaimError`]s. Verifier panics and timeouts always resolve to an
//! explicit `Indeterminate` verdict.

use crate::error::{ClaimError, Result, StoreError, UpstreamError};
use crate::integrations::analytics::{AnalyticsEvent, AnalyticsSink, EventKind};
use crate::integrations::email_dispatch::EmailDispatcher;
use crate::models::claim::{Claim, ClaimId, ClaimState, IdentityKind};
use crate::models::document::IdentityDocument;
use crate::models::verdict::Verdict;
use crate::services::assembler::DocumentAssembler;
use crate::services::email_verifier::EmailCodeBook;
use crate::services::secret_gate::SecretGate;
use crate::services::verifier::{ProofSubject, ProofVerifier, VerifierSet};
use crate::settings::Settings;
use crate::storage::claim_store::ClaimStore;
use crate::utils::serialization::serialize;
use crate::utils::validation::{mask_email, normalize_identity_value, validate_identifier};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Timeouts and expiry policy.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub verifier_timeout: Duration,
    pub dispatch_timeout: Duration,
    /// Verified claims older than this are expired by `sweep_expired`
    pub verified_claim_ttl: Option<chrono::Duration>,
}

impl From<&Settings> for OrchestratorConfig {
    fn from(settings: &Settings) -> Self {
        OrchestratorConfig {
            verifier_timeout: settings.verifier_timeout(),
            dispatch_timeout: settings.dispatch_timeout(),
            verified_claim_ttl: settings.verified_claim_ttl(),
        }
    }
}

/// Maps a verdict to the caller-facing outcome.
///
/// `Verified` is success; `Rejected` is a non-retryable caller error and
/// `Indeterminate` a retryable one.
pub fn verdict_outcome(verdict: &Verdict) -> Result<()> {
    match verdict {
        Verdict::Verified => Ok(()),
        Verdict::Rejected(reason) => Err(ClaimError::Rejected(reason.clone())),
        Verdict::Indeterminate => Err(ClaimError::Indeterminate),
    }
}

pub struct Orchestrator {
    gate: Arc<SecretGate>,
    store: Arc<dyn ClaimStore>,
    verifiers: VerifierSet,
    assembler: DocumentAssembler,
    codes: Arc<EmailCodeBook>,
    dispatcher: Arc<dyn EmailDispatcher>,
    analytics: Arc<dyn AnalyticsSink>,
    /// Email claims whose code never reached the provider; re-sent on the next initiate
    undelivered: Mutex<HashSet<ClaimId>>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Wires the orchestrator to its collaborators.
    ///
    /// # Arguments
    /// * `gate` - Process-wide secret gate
    /// * `store` - Claim store; also backs the document assembler
    /// * `verifiers` - One verifier per supported identity kind
    /// * `codes` - Email code book shared with the email verifier
    /// * `dispatcher` - Sends email codes
    /// * `analytics` - Fire-and-forget event sink
    /// * `config` - Timeouts and expiry policy
    pub fn new(
        gate: Arc<SecretGate>,
        store: Arc<dyn ClaimStore>,
        verifiers: VerifierSet,
        codes: Arc<EmailCodeBook>,
        dispatcher: Arc<dyn EmailDispatcher>,
        analytics: Arc<dyn AnalyticsSink>,
        config: OrchestratorConfig,
    ) -> Self {
        Orchestrator {
            gate,
            assembler: DocumentAssembler::new(store.clone()),
            store,
            verifiers,
            codes,
            dispatcher,
            analytics,
            undelivered: Mutex::new(HashSet::new()),
            config,
        }
    }

    pub fn gate(&self) -> &Arc<SecretGate> {
        &self.gate
    }

    fn require_secrets(&self) -> Result<()> {
        if self.gate.is_ready() {
            Ok(())
        } else {
            Err(ClaimError::SecretsUnavailable)
        }
    }

    fn track(&self, event: EventKind, claim: &Claim) {
        self.analytics.track(AnalyticsEvent {
            event,
            identifier: claim.identifier.clone(),
            identity_kind: claim.identity_kind,
            claim_id: claim.id,
            at: Utc::now(),
        });
    }

    fn undelivered(&self) -> std::sync::MutexGuard<'_, HashSet<ClaimId>> {
        self.undelivered.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Starts (or resumes) a claim.
    ///
    /// For a new email claim a code is issued and dispatched exactly once; a
    /// reused open claim does not trigger another email unless its first
    /// dispatch failed.
    ///
    /// # Errors
    /// - `SecretsUnavailable` if the gate is empty (nothing is written)
    /// - `InvalidInput` for a malformed identifier or identity value
    /// - `UpstreamUnavailable` if the code could not be dispatched
    pub async fn initiate(&self, identifier: &str, kind: IdentityKind, value: &str) -> Result<Claim> {
        self.require_secrets()?;
        validate_identifier(identifier)?;
        let value = normalize_identity_value(kind, value)?;

        let started = self.store.create_or_get(identifier, kind, &value, Utc::now()).await?;
        let claim = started.claim;
        if started.created {
            info!("Claim {} initiated: {} {}", claim.id, identifier, kind);
            self.track(EventKind::ClaimInitiated, &claim);
        }

        // Taken out of the set so concurrent initiates resend at most once.
        let resend = !started.created && self.undelivered().remove(&claim.id);
        if kind == IdentityKind::EmailAddress && (started.created || resend) {
            self.dispatch_code(&claim).await?;
        }
        Ok(claim)
    }

    async fn dispatch_code(&self, claim: &Claim) -> Result<()> {
        let code = self.codes.issue(&claim.identifier, &claim.identity_value, Utc::now());
        let send = self.dispatcher.send_code(&claim.identity_value, &code);

        let failure = match tokio::time::timeout(self.config.dispatch_timeout, send).await {
            Ok(Ok(())) => {
                info!("Verification code sent to {}", mask_email(&claim.identity_value));
                return Ok(());
            }
            Ok(Err(e)) => e,
            Err(_) => UpstreamError::Timeout(self.config.dispatch_timeout.as_millis() as u64),
        };

        error!(
            "Dispatch to {} for claim {} failed: {}",
            mask_email(&claim.identity_value),
            claim.id,
            failure
        );
        self.undelivered().insert(claim.id);
        Err(ClaimError::UpstreamUnavailable(format!("email dispatch failed: {}", failure)))
    }

    /// Submits a proof for a claim and applies the verifier's verdict.
    ///
    /// A claim left in `ProofSubmitted` by an `Indeterminate` verdict accepts
    /// a new submission (retry). Any other non-`Initiated` claim, including
    /// one whose verification is still running, fails with
    /// `InvalidTransition`.
    ///
    /// Verification and the verdict run on a detached task, so a caller that
    /// goes away mid-verification still leaves the claim settled.
    ///
    /// # Returns
    /// The verdict. `Rejected` and `Indeterminate` are returned as values;
    /// use [`verdict_outcome`] to turn them into caller errors.
    pub async fn submit_proof(&self, claim_id: ClaimId, artifact: &str) -> Result<Verdict> {
        self.require_secrets()?;
        let artifact = artifact.trim();
        if artifact.is_empty() {
            return Err(ClaimError::InvalidInput("proof artifact is empty".to_string()));
        }

        let claim = self.store.get(claim_id).await?;
        let claim = match claim.state {
            ClaimState::Initiated => self.store.record_proof(claim_id, artifact).await?,
            ClaimState::ProofSubmitted => {
                let claim = self.store.resubmit_proof(claim_id, artifact).await?;
                info!("Retrying verification of claim {} (attempt {})", claim_id, claim.attempt);
                claim
            }
            from => {
                return Err(ClaimError::InvalidTransition {
                    from,
                    to: ClaimState::ProofSubmitted,
                })
            }
        };

        let verifier = self.verifiers.get(claim.identity_kind).ok_or_else(|| {
            ClaimError::Internal(format!("no verifier registered for {}", claim.identity_kind))
        })?;
        let subject = ProofSubject {
            identifier: claim.identifier.clone(),
            identity_value: claim.identity_value.clone(),
            proof_artifact: artifact.to_string(),
        };
        let store = self.store.clone();
        let timeout = self.config.verifier_timeout;
        let attempt = claim.attempt;
        let settle = tokio::spawn(async move {
            let verdict = run_verifier(verifier, subject, timeout).await;
            store
                .apply_verdict(claim_id, attempt, &verdict, Utc::now())
                .await
                .map(|claim| (claim, verdict))
        });
        let (claim, verdict) = settle
            .await
            .map_err(|e| ClaimError::Internal(format!("verification of claim {} failed: {}", claim_id, e)))??;

        match &verdict {
            Verdict::Verified => {
                self.assembler.invalidate(&claim.identifier);
                info!("Claim {} verified: {} {}", claim.id, claim.identifier, claim.identity_kind);
                self.track(EventKind::ClaimVerified, &claim);
            }
            Verdict::Rejected(reason) => {
                info!("Claim {} rejected: {}", claim.id, reason);
                self.track(EventKind::ClaimRejected, &claim);
            }
            Verdict::Indeterminate => {
                warn!("Claim {} indeterminate, left open for retry", claim.id);
            }
        }
        Ok(verdict)
    }

    /// Submits a proof against the claim for (identifier, kind, value).
    ///
    /// The open claim is used if there is one; otherwise the most recent claim
    /// for the value, which then fails with `InvalidTransition`.
    ///
    /// # Returns
    /// The id of the claim the proof was applied to, and the verdict
    ///
    /// # Errors
    /// `UnknownIdentifier` when no claim exists for the value at all.
    pub async fn submit_for(
        &self,
        identifier: &str,
        kind: IdentityKind,
        value: &str,
        artifact: &str,
    ) -> Result<(ClaimId, Verdict)> {
        self.require_secrets()?;
        validate_identifier(identifier)?;
        let value = normalize_identity_value(kind, value)?;

        let claim = match self.store.find_open(identifier, kind, &value).await? {
            Some(claim) => claim,
            None => self
                .store
                .claims_for(identifier)
                .await?
                .into_iter()
                .filter(|c| c.identity_kind == kind && c.identity_value == value)
                .last()
                .ok_or_else(|| ClaimError::UnknownIdentifier(identifier.to_string()))?,
        };
        let verdict = self.submit_proof(claim.id, artifact).await?;
        Ok((claim.id, verdict))
    }

    /// Current identity document. An identifier without verified claims gets
    /// an empty document, not an error.
    pub async fn document(&self, identifier: &str) -> Result<Arc<IdentityDocument>> {
        validate_identifier(identifier)?;
        self.assembler.assemble(identifier).await
    }

    /// Canonical JSON form of [`Orchestrator::document`].
    pub async fn document_json(&self, identifier: &str) -> Result<String> {
        let document = self.document(identifier).await?;
        serialize(document.as_ref()).map_err(|e| ClaimError::Internal(e.to_string()))
    }

    /// Looks up one claim.
    pub async fn claim(&self, claim_id: ClaimId) -> Result<Claim> {
        Ok(self.store.get(claim_id).await?)
    }

    /// Full claim history of an identifier, oldest first.
    pub async fn claims(&self, identifier: &str) -> Result<Vec<Claim>> {
        validate_identifier(identifier)?;
        let claims = self.store.claims_for(identifier).await?;
        if claims.is_empty() {
            return Err(ClaimError::UnknownIdentifier(identifier.to_string()));
        }
        Ok(claims)
    }

    /// Applies the time-based expiry policy and drops stale email codes and
    /// undelivered markers of claims that are no longer waiting for a code.
    ///
    /// # Returns
    /// Number of verified claims expired by this sweep
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let pruned = self.codes.prune(now);
        self.prune_undelivered().await?;
        let ttl = match self.config.verified_claim_ttl {
            Some(ttl) => ttl,
            None => return Ok(0),
        };

        let expired = self.store.expire_verified_before(now - ttl, now).await?;
        for claim in &expired {
            self.assembler.invalidate(&claim.identifier);
            info!("Claim {} expired by policy", claim.id);
        }
        if !expired.is_empty() || pruned > 0 {
            info!("Expiry sweep: {} claims expired, {} codes pruned", expired.len(), pruned);
        }
        Ok(expired.len())
    }

    async fn prune_undelivered(&self) -> Result<()> {
        let pending: Vec<ClaimId> = self.undelivered().iter().copied().collect();
        for id in pending {
            let waiting = match self.store.get(id).await {
                Ok(claim) => claim.state == ClaimState::Initiated,
                Err(StoreError::UnknownClaim(_)) => false,
                Err(e) => return Err(e.into()),
            };
            if !waiting {
                self.undelivered().remove(&id);
            }
        }
        Ok(())
    }
}

/// Runs a verifier on its own task so that a hang or a panic comes back as
/// `Indeterminate`.
async fn run_verifier(verifier: Arc<ProofVerifier>, subject: ProofSubject, timeout: Duration) -> Verdict {
    let claim_kind = verifier.kind();
    let mut task = tokio::spawn(async move { verifier.verify(&subject).await });

    match tokio::time::timeout(timeout, &mut task).await {
        Ok(Ok(verdict)) => verdict,
        Ok(Err(join_error)) => {
            error!("{} verifier task aborted: {}", claim_kind, join_error);
            Verdict::Indeterminate
        }
        Err(_) => {
            task.abort();
            warn!("{} verifier timed out after {:?}", claim_kind, timeout);
            Verdict::Indeterminate
        }
    }
}
