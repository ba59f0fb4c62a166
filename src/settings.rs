// src/settings.rs
//! Runtime configuration.
//!
//! Settings are layered: built-in defaults, then an optional `verifier.toml`
//! (or any format the `config` crate recognises under that base name), then
//! `VERIFIER__*` environment variables.
//!
//! ## Environment Variables
//! - `VERIFIER__BIND_ADDRESS`: Socket address for the HTTP adapter
//! - `VERIFIER__VERIFIER_TIMEOUT_MS`: Bound on each proof verification
//! - `VERIFIER__DISPATCH_TIMEOUT_MS`: Bound on each verification email send
//! - `VERIFIER__EMAIL_CODE_TTL_SECS`: Lifetime of an issued email code
//! - `VERIFIER__VERIFIED_CLAIM_TTL_SECS`: (Optional) expire verified claims after this long
//! - `VERIFIER__SWEEP_INTERVAL_SECS`: Period of the expiry sweep
//! - `VERIFIER__SECRETS_ENV_VAR`: Name of the variable holding the encrypted bundle
//! - `VERIFIER__TWITTER_API_URL`, `VERIFIER__EMAIL_API_URL`, `VERIFIER__RESOLVER_URL`
//! - `VERIFIER__ANALYTICS_URL`: (Optional) analytics collector

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

/// Service settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub bind_address: SocketAddr,
    pub verifier_timeout_ms: u64,
    pub dispatch_timeout_ms: u64,
    pub email_code_ttl_secs: u64,
    #[serde(default)]
    pub verified_claim_ttl_secs: Option<u64>,
    pub sweep_interval_secs: u64,
    pub secrets_env_var: String,
    pub twitter_api_url: String,
    pub email_api_url: String,
    pub resolver_url: String,
    #[serde(default)]
    pub analytics_url: Option<String>,
}

impl Settings {
    /// Loads settings from defaults, `verifier.*` and the environment.
    ///
    /// # Errors
    /// Returns `ConfigError` if a source cannot be parsed or a value has the
    /// wrong type (e.g. a non-numeric timeout).
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder()?
            .add_source(File::with_name("verifier").required(false))
            .add_source(Environment::with_prefix("VERIFIER").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Defaults only; used by `load` and by tests.
    fn builder() -> Result<config::builder::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("bind_address", "127.0.0.1:3000")?
            .set_default("verifier_timeout_ms", 5000_i64)?
            .set_default("dispatch_timeout_ms", 5000_i64)?
            .set_default("email_code_ttl_secs", 900_i64)?
            .set_default("sweep_interval_secs", 300_i64)?
            .set_default("secrets_env_var", "SECRETS")?
            .set_default("twitter_api_url", "https://api.twitter.com/2")?
            .set_default("email_api_url", "https://api.sendgrid.com/v3/mail/send")?
            .set_default("resolver_url", "https://dev.uniresolver.io/1.0/identifiers")
    }

    pub fn verifier_timeout(&self) -> Duration {
        Duration::from_millis(self.verifier_timeout_ms)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    pub fn email_code_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.email_code_ttl_secs as i64)
    }

    pub fn verified_claim_ttl(&self) -> Option<chrono::Duration> {
        self.verified_claim_ttl_secs
            .map(|secs| chrono::Duration::seconds(secs as i64))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 3000)),
            verifier_timeout_ms: 5000,
            dispatch_timeout_ms: 5000,
            email_code_ttl_secs: 900,
            verified_claim_ttl_secs: None,
            sweep_interval_secs: 300,
            secrets_env_var: "SECRETS".to_string(),
            twitter_api_url: "https://api.twitter.com/2".to_string(),
            email_api_url: "https://api.sendgrid.com/v3/mail/send".to_string(),
            resolver_url: "https://dev.uniresolver.io/1.0/identifiers".to_string(),
            analytics_url: None,
        }
    }
}
