// src/storage/claim_store.rs
//! Claim persistence and lifecycle enforcement.
//!
//! The store is the only component that mutates claims. Every transition is
//! checked against the claim state machine, and all transitions touching the
//! same (identifier, identity kind) pair are serialised so that superseding a
//! previously verified claim can never race into two `Verified` claims.
//!
//! [`ClaimStore`] abstracts the backend so the orchestrator can run against a
//! durable store in production and [`MemoryClaimStore`] in tests and
//! single-process deployments.

use crate::error::StoreError;
use crate::models::claim::{Claim, ClaimId, ClaimState, IdentityKind};
use crate::models::verdict::Verdict;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

/// Result type for claim store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Snapshot of the currently verified claims for one identifier.
///
/// `revision` increases every time the verified set of the identifier
/// changes (a claim verified, superseded, or swept); `updated_at` is the
/// time of that change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedSet {
    pub identifier: String,
    pub revision: u64,
    pub updated_at: Option<DateTime<Utc>>,
    pub claims: BTreeMap<IdentityKind, Claim>,
}

/// Outcome of `create_or_get`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Started {
    pub claim: Claim,
    /// `false` when an open claim for the same value was reused
    pub created: bool,
}

/// Storage interface for claims.
#[async_trait]
pub trait ClaimStore: Send + Sync {
    /// Returns the open claim for (identifier, kind, value), creating an
    /// `Initiated` one if none exists.
    async fn create_or_get(
        &self,
        identifier: &str,
        kind: IdentityKind,
        value: &str,
        now: DateTime<Utc>,
    ) -> Result<Started>;

    /// Looks up a claim by id.
    async fn get(&self, id: ClaimId) -> Result<Claim>;

    /// Finds the open (`Initiated` or `ProofSubmitted`) claim for a value, if any.
    async fn find_open(
        &self,
        identifier: &str,
        kind: IdentityKind,
        value: &str,
    ) -> Result<Option<Claim>>;

    /// `Initiated -> ProofSubmitted`, storing the artifact and starting
    /// attempt 1.
    ///
    /// # Returns
    /// The claim; its `attempt` is the token the verdict must carry.
    async fn record_proof(&self, id: ClaimId, artifact: &str) -> Result<Claim>;

    /// `ProofSubmitted -> ProofSubmitted`, replacing the artifact and starting
    /// the next attempt.
    ///
    /// # Errors
    /// `InvalidTransition` unless the previous attempt was settled as
    /// `Indeterminate`. A claim whose verification is still running accepts
    /// no second proof.
    async fn resubmit_proof(&self, id: ClaimId, artifact: &str) -> Result<Claim>;

    /// Settles `attempt` of a `ProofSubmitted` claim with a verifier verdict.
    ///
    /// - `Verified`: the claim becomes `Verified` and any other verified claim
    ///   of the same (identifier, kind) becomes `Expired`, atomically.
    /// - `Rejected`: the claim becomes `Rejected`.
    /// - `Indeterminate`: the claim stays in `ProofSubmitted` and accepts a
    ///   resubmission.
    ///
    /// # Errors
    /// `InvalidTransition` if the claim is not running `attempt`, including
    /// an attempt that was already settled.
    async fn apply_verdict(
        &self,
        id: ClaimId,
        attempt: u32,
        verdict: &Verdict,
        now: DateTime<Utc>,
    ) -> Result<Claim>;

    /// Exactly the claims currently in `Verified` for an identifier.
    async fn current_verified(&self, identifier: &str) -> Result<VerifiedSet>;

    /// Every claim ever created for an identifier, oldest first.
    async fn claims_for(&self, identifier: &str) -> Result<Vec<Claim>>;

    /// Marks every claim verified before `cutoff` as `Expired`.
    ///
    /// # Returns
    /// The claims that were expired by this sweep.
    async fn expire_verified_before(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Claim>>;
}

#[derive(Debug, Clone, Copy, Default)]
struct Revision {
    version: u64,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Inner {
    claims: HashMap<ClaimId, Claim>,
    /// Claim ids per identifier, in creation order
    by_identifier: HashMap<String, Vec<ClaimId>>,
    revisions: HashMap<String, Revision>,
}

impl Inner {
    fn claim_mut(&mut self, id: ClaimId) -> Result<&mut Claim> {
        self.claims.get_mut(&id).ok_or(StoreError::UnknownClaim(id))
    }

    fn ids_for(&self, identifier: &str) -> &[ClaimId] {
        self.by_identifier
            .get(identifier)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn bump_revision(&mut self, identifier: &str, now: DateTime<Utc>) {
        let revision = self.revisions.entry(identifier.to_string()).or_default();
        revision.version += 1;
        revision.updated_at = Some(now);
    }
}

/// In-memory claim store.
///
/// A single lock guards all claims, so transitions on the same pair are
/// trivially serialised. Claims are never removed.
#[derive(Default)]
pub struct MemoryClaimStore {
    inner: RwLock<Inner>,
}

impl MemoryClaimStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| StoreError::Backend("claim store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend("claim store lock poisoned".to_string()))
    }
}

fn invalid(from: ClaimState, to: ClaimState) -> StoreError {
    StoreError::InvalidTransition { from, to }
}

#[async_trait]
impl ClaimStore for MemoryClaimStore {
    async fn create_or_get(
        &self,
        identifier: &str,
        kind: IdentityKind,
        value: &str,
        now: DateTime<Utc>,
    ) -> Result<Started> {
        let mut inner = self.write()?;

        let existing = inner.ids_for(identifier).iter().find_map(|id| {
            inner.claims.get(id).filter(|claim| {
                claim.identity_kind == kind && claim.identity_value == value && claim.state.is_open()
            })
        });
        if let Some(claim) = existing {
            debug!("Reusing open claim {} for {} {}", claim.id, identifier, kind);
            return Ok(Started {
                claim: claim.clone(),
                created: false,
            });
        }

        let claim = Claim::new(identifier.to_string(), kind, value.to_string(), now);
        inner
            .by_identifier
            .entry(identifier.to_string())
            .or_default()
            .push(claim.id);
        inner.claims.insert(claim.id, claim.clone());
        Ok(Started {
            claim,
            created: true,
        })
    }

    async fn get(&self, id: ClaimId) -> Result<Claim> {
        self.read()?
            .claims
            .get(&id)
            .cloned()
            .ok_or(StoreError::UnknownClaim(id))
    }

    async fn find_open(
        &self,
        identifier: &str,
        kind: IdentityKind,
        value: &str,
    ) -> Result<Option<Claim>> {
        let inner = self.read()?;
        Ok(inner
            .ids_for(identifier)
            .iter()
            .filter_map(|id| inner.claims.get(id))
            .find(|claim| {
                claim.identity_kind == kind && claim.identity_value == value && claim.state.is_open()
            })
            .cloned())
    }

    async fn record_proof(&self, id: ClaimId, artifact: &str) -> Result<Claim> {
        let mut inner = self.write()?;
        let claim = inner.claim_mut(id)?;
        if claim.state != ClaimState::Initiated {
            return Err(invalid(claim.state, ClaimState::ProofSubmitted));
        }
        claim.state = ClaimState::ProofSubmitted;
        claim.proof_artifact = Some(artifact.to_string());
        claim.attempt += 1;
        claim.awaiting_retry = false;
        Ok(claim.clone())
    }

    async fn resubmit_proof(&self, id: ClaimId, artifact: &str) -> Result<Claim> {
        let mut inner = self.write()?;
        let claim = inner.claim_mut(id)?;
        if claim.state != ClaimState::ProofSubmitted || !claim.awaiting_retry {
            return Err(invalid(claim.state, ClaimState::ProofSubmitted));
        }
        claim.proof_artifact = Some(artifact.to_string());
        claim.attempt += 1;
        claim.awaiting_retry = false;
        Ok(claim.clone())
    }

    async fn apply_verdict(
        &self,
        id: ClaimId,
        attempt: u32,
        verdict: &Verdict,
        now: DateTime<Utc>,
    ) -> Result<Claim> {
        let mut inner = self.write()?;
        let claim = inner.claim_mut(id)?;
        let target = match verdict {
            Verdict::Verified => ClaimState::Verified,
            Verdict::Rejected(_) => ClaimState::Rejected,
            Verdict::Indeterminate => ClaimState::ProofSubmitted,
        };
        let running = claim.state == ClaimState::ProofSubmitted
            && !claim.awaiting_retry
            && claim.attempt == attempt;
        if !running {
            debug!(
                "Dropping {} verdict for attempt {} of claim {} (at attempt {}, {})",
                target, attempt, id, claim.attempt, claim.state
            );
            return Err(invalid(claim.state, target));
        }

        match verdict {
            Verdict::Indeterminate => {
                claim.awaiting_retry = true;
                Ok(claim.clone())
            }
            Verdict::Rejected(_) => {
                claim.state = ClaimState::Rejected;
                Ok(claim.clone())
            }
            Verdict::Verified => {
                claim.state = ClaimState::Verified;
                claim.verified_at = Some(now);
                let verified = claim.clone();

                // Supersede in the same critical section: no gap, no double-Verified.
                let superseded: Vec<ClaimId> = inner
                    .ids_for(&verified.identifier)
                    .iter()
                    .copied()
                    .filter(|other| *other != id)
                    .collect();
                for other in superseded {
                    if let Some(previous) = inner.claims.get_mut(&other) {
                        if previous.identity_kind == verified.identity_kind
                            && previous.state == ClaimState::Verified
                        {
                            previous.state = ClaimState::Expired;
                            previous.expired_at = Some(now);
                            info!(
                                "Claim {} superseded by {} for {} {}",
                                previous.id, id, verified.identifier, verified.identity_kind
                            );
                        }
                    }
                }
                inner.bump_revision(&verified.identifier, now);
                Ok(verified)
            }
        }
    }

    async fn current_verified(&self, identifier: &str) -> Result<VerifiedSet> {
        let inner = self.read()?;
        let claims = inner
            .ids_for(identifier)
            .iter()
            .filter_map(|id| inner.claims.get(id))
            .filter(|claim| claim.state == ClaimState::Verified)
            .map(|claim| (claim.identity_kind, claim.clone()))
            .collect();
        let revision = inner.revisions.get(identifier).copied().unwrap_or_default();
        Ok(VerifiedSet {
            identifier: identifier.to_string(),
            revision: revision.version,
            updated_at: revision.updated_at,
            claims,
        })
    }

    async fn claims_for(&self, identifier: &str) -> Result<Vec<Claim>> {
        let inner = self.read()?;
        Ok(inner
            .ids_for(identifier)
            .iter()
            .filter_map(|id| inner.claims.get(id))
            .cloned()
            .collect())
    }

    async fn expire_verified_before(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Claim>> {
        let mut inner = self.write()?;
        let mut expired = Vec::new();
        for claim in inner.claims.values_mut() {
            let stale = claim.state == ClaimState::Verified
                && claim.verified_at.map_or(false, |at| at < cutoff);
            if stale {
                claim.state = ClaimState::Expired;
                claim.expired_at = Some(now);
                expired.push(claim.clone());
            }
        }

        let mut identifiers: Vec<&str> = expired.iter().map(|c| c.identifier.as_str()).collect();
        identifiers.sort_unstable();
        identifiers.dedup();
        for identifier in identifiers {
            inner.bump_revision(identifier, now);
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    const DID: &str = "did:example:123";

    async fn submitted(store: &MemoryClaimStore, value: &str) -> Claim {
        let started = store
            .create_or_get(DID, IdentityKind::EmailAddress, value, Utc::now())
            .await
            .unwrap();
        store.record_proof(started.claim.id, "123456").await.unwrap()
    }

    #[tokio::test]
    async fn test_create_or_get_reuses_open_claim() {
        let store = MemoryClaimStore::new();
        let first = store
            .create_or_get(DID, IdentityKind::EmailAddress, "a@example.com", Utc::now())
            .await
            .unwrap();
        let second = store
            .create_or_get(DID, IdentityKind::EmailAddress, "a@example.com", Utc::now())
            .await
            .unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.claim.id, second.claim.id);
        assert_eq!(first.claim.state, ClaimState::Initiated);
    }

    #[tokio::test]
    async fn test_record_proof_only_from_initiated() {
        let store = MemoryClaimStore::new();
        let claim = submitted(&store, "a@example.com").await;
        assert_eq!(claim.state, ClaimState::ProofSubmitted);
        assert_eq!(claim.proof_artifact.as_deref(), Some("123456"));

        let err = store.record_proof(claim.id, "654321").await.unwrap_err();
        assert_eq!(
            err,
            StoreError::InvalidTransition {
                from: ClaimState::ProofSubmitted,
                to: ClaimState::ProofSubmitted
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_claim() {
        let store = MemoryClaimStore::new();
        let id = ClaimId::new();
        assert_eq!(store.get(id).await.unwrap_err(), StoreError::UnknownClaim(id));
        assert_err!(store.record_proof(id, "x").await);
    }

    #[tokio::test]
    async fn test_indeterminate_keeps_claim_open_for_resubmission() {
        let store = MemoryClaimStore::new();
        let claim = submitted(&store, "a@example.com").await;

        let after = store
            .apply_verdict(claim.id, claim.attempt, &Verdict::Indeterminate, Utc::now())
            .await
            .unwrap();
        assert_eq!(after.state, ClaimState::ProofSubmitted);

        let resubmitted = assert_ok!(store.resubmit_proof(claim.id, "999999").await);
        assert_eq!(resubmitted.proof_artifact.as_deref(), Some("999999"));
        assert_eq!(resubmitted.attempt, 2);

        // The settled attempt cannot be settled again.
        assert_err!(
            store
                .apply_verdict(claim.id, claim.attempt, &Verdict::Verified, Utc::now())
                .await
        );
        let verified = assert_ok!(
            store
                .apply_verdict(claim.id, resubmitted.attempt, &Verdict::Verified, Utc::now())
                .await
        );
        assert_eq!(verified.state, ClaimState::Verified);
    }

    #[tokio::test]
    async fn test_no_second_proof_while_attempt_is_running() {
        let store = MemoryClaimStore::new();
        let claim = submitted(&store, "a@example.com").await;
        assert_eq!(claim.attempt, 1);

        let err = store.resubmit_proof(claim.id, "654321").await.unwrap_err();
        assert_eq!(
            err,
            StoreError::InvalidTransition {
                from: ClaimState::ProofSubmitted,
                to: ClaimState::ProofSubmitted
            }
        );
        let stored = store.get(claim.id).await.unwrap();
        assert_eq!(stored.proof_artifact.as_deref(), Some("123456"));
        assert_eq!(stored.attempt, 1);
    }

    #[tokio::test]
    async fn test_verdict_for_another_attempt_is_refused() {
        let store = MemoryClaimStore::new();
        let claim = submitted(&store, "a@example.com").await;

        let err = store
            .apply_verdict(claim.id, claim.attempt + 1, &Verdict::Verified, Utc::now())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::InvalidTransition {
                from: ClaimState::ProofSubmitted,
                to: ClaimState::Verified
            }
        );
        assert_eq!(store.get(claim.id).await.unwrap().state, ClaimState::ProofSubmitted);
        assert_eq!(store.current_verified(DID).await.unwrap().revision, 0);
    }

    #[tokio::test]
    async fn test_rejected_is_terminal_and_new_claim_is_fresh() {
        let store = MemoryClaimStore::new();
        let claim = submitted(&store, "a@example.com").await;
        let rejected = store
            .apply_verdict(claim.id, claim.attempt, &Verdict::rejected("bad code"), Utc::now())
            .await
            .unwrap();
        assert_eq!(rejected.state, ClaimState::Rejected);
        assert_err!(store.resubmit_proof(claim.id, "1").await);
        assert_err!(store.apply_verdict(claim.id, claim.attempt, &Verdict::Verified, Utc::now()).await);

        let retry = store
            .create_or_get(DID, IdentityKind::EmailAddress, "a@example.com", Utc::now())
            .await
            .unwrap();
        assert!(retry.created);
        assert_ne!(retry.claim.id, claim.id);
    }

    #[tokio::test]
    async fn test_rejection_does_not_touch_verified_set() {
        let store = MemoryClaimStore::new();
        let good = submitted(&store, "a@example.com").await;
        store.apply_verdict(good.id, good.attempt, &Verdict::Verified, Utc::now()).await.unwrap();
        let before = store.current_verified(DID).await.unwrap();

        let bad = submitted(&store, "b@example.com").await;
        store
            .apply_verdict(bad.id, bad.attempt, &Verdict::rejected("nope"), Utc::now())
            .await
            .unwrap();

        assert_eq!(store.current_verified(DID).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_new_verification_supersedes_previous() {
        let store = MemoryClaimStore::new();
        let first = submitted(&store, "a@example.com").await;
        store.apply_verdict(first.id, first.attempt, &Verdict::Verified, Utc::now()).await.unwrap();
        let second = submitted(&store, "b@example.com").await;

        // Until the new claim is verified the old one stays current.
        let set = store.current_verified(DID).await.unwrap();
        assert_eq!(set.claims[&IdentityKind::EmailAddress].id, first.id);
        assert_eq!(set.revision, 1);

        store.apply_verdict(second.id, second.attempt, &Verdict::Verified, Utc::now()).await.unwrap();
        let set = store.current_verified(DID).await.unwrap();
        assert_eq!(set.claims.len(), 1);
        assert_eq!(set.claims[&IdentityKind::EmailAddress].identity_value, "b@example.com");
        assert_eq!(set.revision, 2);
        assert_eq!(store.get(first.id).await.unwrap().state, ClaimState::Expired);
    }

    #[tokio::test]
    async fn test_concurrent_verifications_leave_one_verified() {
        let store = Arc::new(MemoryClaimStore::new());
        let mut ids = Vec::new();
        for i in 0..8 {
            ids.push(submitted(&store, &format!("user{}@example.com", i)).await.id);
        }

        let tasks = ids.into_iter().map(|id| {
            let store = store.clone();
            tokio::spawn(async move { store.apply_verdict(id, 1, &Verdict::Verified, Utc::now()).await })
        });
        for result in futures::future::join_all(tasks).await {
            assert!(result.unwrap().is_ok());
        }

        let verified = store
            .claims_for(DID)
            .await
            .unwrap()
            .into_iter()
            .filter(|c| c.state == ClaimState::Verified)
            .count();
        assert_eq!(verified, 1);
        assert_eq!(store.current_verified(DID).await.unwrap().revision, 8);
    }

    #[tokio::test]
    async fn test_expiry_sweep() {
        let store = MemoryClaimStore::new();
        let claim = submitted(&store, "a@example.com").await;
        let verified_at = Utc::now() - Duration::hours(2);
        store.apply_verdict(claim.id, claim.attempt, &Verdict::Verified, verified_at).await.unwrap();

        let now = Utc::now();
        let none = store
            .expire_verified_before(now - Duration::hours(3), now)
            .await
            .unwrap();
        assert!(none.is_empty());

        let expired = store
            .expire_verified_before(now - Duration::hours(1), now)
            .await
            .unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].state, ClaimState::Expired);

        let set = store.current_verified(DID).await.unwrap();
        assert!(set.claims.is_empty());
        assert_eq!(set.revision, 2);
        assert_eq!(set.updated_at, Some(now));
    }

    #[tokio::test]
    async fn test_claims_for_lists_history_in_order() {
        let store = MemoryClaimStore::new();
        let a = submitted(&store, "a@example.com").await;
        let b = submitted(&store, "b@example.com").await;
        let ids: Vec<ClaimId> = store.claims_for(DID).await.unwrap().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
        assert!(store.claims_for("did:example:none").await.unwrap().is_empty());
    }
}
