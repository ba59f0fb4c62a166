// src/services/assembler.rs
//! Identity document assembly.
//!
//! A document is a pure function of the identifier's verified set in the
//! claim store: links are emitted in `IdentityKind` order, `version` is the
//! store's revision of that set, and `updated_at` the time of its last change.
//! Assembling twice with no verdict in between yields byte-identical JSON.

use crate::error::ClaimError;
use crate::models::document::{IdentityDocument, VerifiedLink};
use crate::storage::claim_store::{ClaimStore, VerifiedSet};
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Builds identity documents, caching the last rendering per identifier.
///
/// Cache entries are tagged with the store revision they were built from and
/// are only served while the store still reports that revision.
pub struct DocumentAssembler {
    store: Arc<dyn ClaimStore>,
    cache: Mutex<HashMap<String, Arc<IdentityDocument>>>,
}

impl DocumentAssembler {
    pub fn new(store: Arc<dyn ClaimStore>) -> Self {
        DocumentAssembler {
            store,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Renders a verified set. Never fails; an empty set gives an empty document.
    pub fn render(set: &VerifiedSet) -> IdentityDocument {
        IdentityDocument {
            identifier: set.identifier.clone(),
            verified_links: set
                .claims
                .iter()
                .map(|(kind, claim)| VerifiedLink {
                    identity_kind: *kind,
                    identity_value: claim.identity_value.clone(),
                })
                .collect(),
            version: set.revision,
            updated_at: set.updated_at,
        }
    }

    /// Current document for `identifier`.
    ///
    /// # Errors
    /// Only storage failures; an unknown identifier yields an empty document.
    pub async fn assemble(&self, identifier: &str) -> Result<Arc<IdentityDocument>, ClaimError> {
        let set = self.store.current_verified(identifier).await?;

        let mut cache = self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(cached) = cache.get(identifier) {
            if cached.version == set.revision {
                return Ok(cached.clone());
            }
        }

        debug!("Rendering document for {} at version {}", identifier, set.revision);
        let document = Arc::new(Self::render(&set));
        cache.insert(identifier.to_string(), document.clone());
        Ok(document)
    }

    /// Drops the cached document; called after any verdict touching `identifier`.
    pub fn invalidate(&self, identifier: &str) {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(identifier);
    }
}
