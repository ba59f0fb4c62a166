// src/integrations/email_dispatch.rs
//! Email dispatch collaborator.
//!
//! Sends the one-time verification code to the claimed address. Delivery
//! failures surface as [`UpstreamError`] and become `UpstreamUnavailable`
//! for the caller.

use crate::error::UpstreamError;
use crate::services::secret_gate::SecretGate;
use async_trait::async_trait;
use log::debug;
use serde_json::json;
use std::sync::Arc;

/// Delivers verification codes.
#[async_trait]
pub trait EmailDispatcher: Send + Sync {
    async fn send_code(&self, email: &str, code: &str) -> Result<(), UpstreamError>;
}

/// SendGrid v3 mail-send client.
///
/// The API key and sender address come from the secret bundle at call time.
pub struct SendGridDispatcher {
    client: reqwest::Client,
    api_url: String,
    gate: Arc<SecretGate>,
}

impl SendGridDispatcher {
    /// # Arguments
    /// * `api_url` - Full mail-send endpoint, e.g. "https://api.sendgrid.com/v3/mail/send"
    /// * `gate` - Secret gate holding the API key
    pub fn new(api_url: impl Into<String>, gate: Arc<SecretGate>) -> Self {
        SendGridDispatcher {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
            gate,
        }
    }
}

#[async_trait]
impl EmailDispatcher for SendGridDispatcher {
    async fn send_code(&self, email: &str, code: &str) -> Result<(), UpstreamError> {
        let secrets = self
            .gate
            .bundle()
            .map_err(|e| UpstreamError::Unavailable(e.to_string()))?;

        let body = json!({
            "personalizations": [{ "to": [{ "email": email }] }],
            "from": { "email": secrets.email_sender },
            "subject": "Your verification code",
            "content": [{
                "type": "text/plain",
                "value": format!("Your verification code is {}", code),
            }],
        });

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&secrets.email_api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Unavailable(format!(
                "mail provider answered {}",
                status
            )));
        }
        debug!("Verification email accepted by provider ({})", status);
        Ok(())
    }
}
