// src/services/social_verifier.rs
//! Social-handle proof verification.
//!
//! # Proof Format
//! The DID controller signs the statement
//! ```text
//! {identifier} controls @{handle}
//! ```
//! with its secp256k1 key and publishes a post from `@handle` containing the
//! identifier and the base64 signature. The signature is the proof artifact.
//!
//! # Verdicts
//! - `Rejected`: malformed signature, no controller key, signature mismatch,
//!   no such post, or a post that does not name the identifier
//! - `Indeterminate`: the resolver or the social network could not be reached

use crate::integrations::key_resolver::KeyResolver;
use crate::integrations::social_source::SocialProofSource;
use crate::models::verdict::Verdict;
use crate::utils::crypto::{decode_signature, social_statement, verify_signature};
use log::{debug, warn};
use std::sync::Arc;

/// Verifier for `SocialHandle` claims.
pub struct SocialHandleVerifier {
    resolver: Arc<dyn KeyResolver>,
    source: Arc<dyn SocialProofSource>,
}

impl SocialHandleVerifier {
    /// # Arguments
    /// * `resolver` - Finds the DID's controlling key
    /// * `source` - Fetches public posts
    pub fn new(resolver: Arc<dyn KeyResolver>, source: Arc<dyn SocialProofSource>) -> Self {
        SocialHandleVerifier { resolver, source }
    }

    /// Checks that `artifact` is the controller's signature over the handle
    /// statement and that `@handle` has published it.
    pub async fn verify(&self, identifier: &str, handle: &str, artifact: &str) -> Verdict {
        let artifact = artifact.trim();
        let signature = match decode_signature(artifact) {
            Some(signature) => signature,
            None => return Verdict::rejected("malformed signature"),
        };

        // The signature is checked before any post is fetched.
        let key = match self.resolver.controller_key(identifier).await {
            Ok(Some(key)) => key,
            Ok(None) => return Verdict::rejected("identifier has no controller key"),
            Err(e) => {
                warn!("Controller key lookup for {} failed: {}", identifier, e);
                return Verdict::Indeterminate;
            }
        };
        let statement = social_statement(identifier, handle);
        if !verify_signature(&key, statement.as_bytes(), &signature) {
            return Verdict::rejected("signature does not match controller key");
        }

        match self.source.find_post(handle, artifact).await {
            Ok(Some(post)) if post.contains(identifier) => {
                debug!("Found proof post for @{}", handle);
                Verdict::Verified
            }
            Ok(Some(_)) => Verdict::rejected("proof post does not name the identifier"),
            Ok(None) => Verdict::rejected("proof post not found"),
            Err(e) => {
                warn!("Fetching posts of @{} failed: {}", handle, e);
                Verdict::Indeterminate
            }
        }
    }
}
