// src/integrations/key_resolver.rs
//! Resolution of a DID's controlling key.
//!
//! Social proofs must be signed by the key that controls the claiming DID.
//! [`KeyResolver`] hides how that key is found: a DID resolver over HTTP in
//! production, a fixed table in tests.

use crate::error::UpstreamError;
use crate::utils::crypto::parse_public_key_hex;
use async_trait::async_trait;
use k256::ecdsa::VerifyingKey;
use reqwest::StatusCode;
use serde::Deserialize;
#[cfg(test)]
use std::collections::HashMap;

/// Finds the secp256k1 key controlling a DID.
///
/// # Returns
/// - `Ok(Some(key))` when the DID resolves to a usable key
/// - `Ok(None)` when the DID does not exist or has no secp256k1 key
/// - `Err(_)` when resolution could not be performed
#[async_trait]
pub trait KeyResolver: Send + Sync {
    async fn controller_key(&self, identifier: &str) -> Result<Option<VerifyingKey>, UpstreamError>;
}

/// Fixed identifier -> key table.
#[cfg(test)]
#[derive(Default, Clone)]
pub struct StaticKeyResolver {
    keys: HashMap<String, VerifyingKey>,
}

#[cfg(test)]
impl StaticKeyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, identifier: impl Into<String>, key: VerifyingKey) -> Self {
        self.keys.insert(identifier.into(), key);
        self
    }
}

#[cfg(test)]
#[async_trait]
impl KeyResolver for StaticKeyResolver {
    async fn controller_key(&self, identifier: &str) -> Result<Option<VerifyingKey>, UpstreamError> {
        Ok(self.keys.get(identifier).copied())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolutionResult {
    did_document: Option<DidDocument>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DidDocument {
    #[serde(default)]
    verification_method: Vec<VerificationMethod>,
    /// Pre-1.0 documents list keys under `publicKey`
    #[serde(default)]
    public_key: Vec<VerificationMethod>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerificationMethod {
    public_key_hex: Option<String>,
}

/// DIF universal-resolver client (`GET {base}/{did}`).
pub struct UniversalResolver {
    client: reqwest::Client,
    base_url: String,
}

impl UniversalResolver {
    /// # Arguments
    /// * `base_url` - Resolver identifiers endpoint, e.g. "https://dev.uniresolver.io/1.0/identifiers"
    pub fn new(base_url: impl Into<String>) -> Self {
        UniversalResolver {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl KeyResolver for UniversalResolver {
    async fn controller_key(&self, identifier: &str) -> Result<Option<VerifyingKey>, UpstreamError> {
        let response = self
            .client
            .get(format!("{}/{}", self.base_url, identifier))
            .header("accept", "application/json")
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => return Ok(None),
            status if !status.is_success() => {
                return Err(UpstreamError::Unavailable(format!("resolver answered {}", status)))
            }
            _ => {}
        }

        let result: ResolutionResult = response.json().await?;
        let key = result.did_document.and_then(|document| {
            document
                .verification_method
                .iter()
                .chain(document.public_key.iter())
                .filter_map(|method| method.public_key_hex.as_deref())
                .find_map(parse_public_key_hex)
        });
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::crypto::test_keys::controller;
    use mockito::mock;

    #[tokio::test]
    async fn test_static_resolver() {
        let (_, key) = controller();
        let resolver = StaticKeyResolver::new().with_key("did:example:123", key);
        assert_eq!(resolver.controller_key("did:example:123").await.unwrap(), Some(key));
        assert_eq!(resolver.controller_key("did:example:456").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_universal_resolver_reads_public_key_hex() {
        let (_, key) = controller();
        let key_hex = hex::encode(key.to_encoded_point(true).as_bytes());
        let body = format!(
            r##"{{"didDocument":{{"id":"did:example:123","verificationMethod":[{{"id":"#k1","type":"Other"}},{{"id":"#k2","publicKeyHex":"{}"}}]}}}}"##,
            key_hex
        );
        let _m = mock("GET", "/resolver-ok/did:example:123")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create();

        let resolver = UniversalResolver::new(format!("{}/resolver-ok", mockito::server_url()));
        assert_eq!(resolver.controller_key("did:example:123").await.unwrap(), Some(key));
    }

    #[tokio::test]
    async fn test_universal_resolver_not_found_and_failure() {
        let _missing = mock("GET", "/resolver-misc/did:example:missing")
            .with_status(404)
            .create();
        let _broken = mock("GET", "/resolver-misc/did:example:broken")
            .with_status(502)
            .create();

        let resolver = UniversalResolver::new(format!("{}/resolver-misc", mockito::server_url()));
        assert_eq!(resolver.controller_key("did:example:missing").await.unwrap(), None);
        assert!(matches!(
            resolver.controller_key("did:example:broken").await.unwrap_err(),
            UpstreamError::Unavailable(_)
        ));
    }
}
