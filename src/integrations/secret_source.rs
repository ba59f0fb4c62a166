// src/integrations/secret_source.rs
//! Secret decryption collaborator.
//!
//! The deployment hands the process an opaque encrypted blob through an
//! environment variable; a key-management service turns it into the JSON
//! credential bundle. The secret gate calls [`SecretSource::decrypt`] at most
//! once per process lifetime (per successful call).

use crate::error::UpstreamError;
use crate::models::secrets::SecretBundle;
use crate::utils::serialization::deserialize_base64_json;
use async_trait::async_trait;

/// Produces the decrypted credential bundle.
#[async_trait]
pub trait SecretSource: Send + Sync {
    async fn decrypt(&self) -> Result<SecretBundle, UpstreamError>;
}

/// Reads a base64-encoded JSON bundle from an environment variable.
///
/// Used where the platform has already decrypted the blob (local runs,
/// sidecar-injected secrets).
pub struct EnvSecretSource {
    var_name: String,
}

impl EnvSecretSource {
    /// # Arguments
    /// * `var_name` - Environment variable holding the base64 bundle, e.g. "SECRETS"
    pub fn new(var_name: impl Into<String>) -> Self {
        EnvSecretSource {
            var_name: var_name.into(),
        }
    }
}

#[async_trait]
impl SecretSource for EnvSecretSource {
    async fn decrypt(&self) -> Result<SecretBundle, UpstreamError> {
        let blob = std::env::var(&self.var_name)
            .map_err(|_| UpstreamError::Unavailable(format!("{} is not set", self.var_name)))?;
        deserialize_base64_json(&blob).map_err(UpstreamError::Malformed)
    }
}
