// src/models/secrets.rs
//! Process-wide credential material.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Decrypted credential bundle shared by every collaborator.
///
/// Populated once per process by the secret gate and read-only afterwards.
/// `Debug` never prints key material.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SecretBundle {
    /// Bearer token for the social network's search API
    pub twitter_bearer_token: String,
    /// API key for the transactional email provider
    pub email_api_key: String,
    /// Sender address used for verification emails
    pub email_sender: String,
    /// Write key for the analytics endpoint, if analytics are enabled
    #[serde(default)]
    pub analytics_key: Option<String>,
}

impl fmt::Debug for SecretBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretBundle")
            .field("twitter_bearer_token", &"<redacted>")
            .field("email_api_key", &"<redacted>")
            .field("email_sender", &self.email_sender)
            .field("analytics_key", &self.analytics_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_keys() {
        let bundle = SecretBundle {
            twitter_bearer_token: "tw-secret".into(),
            email_api_key: "mail-secret".into(),
            email_sender: "noreply@example.com".into(),
            analytics_key: Some("an-secret".into()),
        };
        let printed = format!("{:?}", bundle);
        assert!(!printed.contains("tw-secret"));
        assert!(!printed.contains("mail-secret"));
        assert!(!printed.contains("an-secret"));
        assert!(printed.contains("noreply@example.com"));
    }

    #[test]
    fn test_analytics_key_is_optional() {
        let bundle: SecretBundle = serde_json::from_str(
            r#"{"twitter_bearer_token":"a","email_api_key":"b","email_sender":"c@d.e"}"#,
        )
        .unwrap();
        assert!(bundle.analytics_key.is_none());
    }
}
