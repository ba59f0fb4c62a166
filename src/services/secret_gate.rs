// src/services/secret_gate.rs
//! Process-wide secret gate.
//!
//! Holds the decrypted [`SecretBundle`] for the lifetime of the process.
//! The gate starts empty at cold start, is populated exactly once, and is
//! read-only afterwards. Components that need credentials ask the gate and
//! fail fast with `SecretsUnavailable` instead of waiting.
//!
//! Concurrent first requests are coalesced: however many callers race on an
//! empty gate, the decrypt collaborator runs once and everyone observes the
//! same bundle.

use crate::error::GateError;
use crate::integrations::secret_source::SecretSource;
use crate::models::secrets::SecretBundle;
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

#[derive(Default)]
pub struct SecretGate {
    bundle: OnceCell<Arc<SecretBundle>>,
    /// Held while a decrypt is in flight
    decrypting: Mutex<()>,
}

impl SecretGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a bundle has been injected.
    pub fn is_ready(&self) -> bool {
        self.bundle.initialized()
    }

    /// The injected bundle, or `SecretsUnavailable` if the gate is still empty.
    pub fn bundle(&self) -> Result<Arc<SecretBundle>, GateError> {
        self.bundle.get().cloned().ok_or(GateError::SecretsUnavailable)
    }

    /// Injects a bundle.
    ///
    /// # Behavior
    /// - Empty gate: the bundle is stored
    /// - Same content already stored: no-op
    /// - Different content already stored: `ConfigurationConflict`
    pub async fn inject(&self, bundle: SecretBundle) -> Result<(), GateError> {
        let candidate = Arc::new(bundle);
        let stored = self
            .bundle
            .get_or_init(|| {
                let candidate = candidate.clone();
                async move { candidate }
            })
            .await;

        if **stored == *candidate {
            Ok(())
        } else {
            warn!("Rejected conflicting secret bundle injection");
            Err(GateError::ConfigurationConflict)
        }
    }

    /// Populates the gate from `source` unless it is already populated.
    ///
    /// Single-flight: concurrent callers wait for one decrypt call, and the
    /// decrypted bundle is stored through [`SecretGate::inject`]. A failed
    /// decrypt leaves the gate empty so a later request can try again.
    ///
    /// # Errors
    /// - `Decrypt` if the source fails
    /// - `ConfigurationConflict` if a different bundle was injected while
    ///   decrypting
    pub async fn initialize(&self, source: &dyn SecretSource) -> Result<Arc<SecretBundle>, GateError> {
        if let Ok(bundle) = self.bundle() {
            return Ok(bundle);
        }

        let _flight = self.decrypting.lock().await;
        if let Ok(bundle) = self.bundle() {
            return Ok(bundle);
        }

        let bundle = source
            .decrypt()
            .await
            .map_err(|e| GateError::Decrypt(e.to_string()))?;
        self.inject(bundle).await?;
        info!("Secret bundle decrypted and injected");
        self.bundle()
    }
}
