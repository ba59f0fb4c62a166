// src/main.rs

//! # DID Claim Verifier - Main Entry Point
//!
//! Links decentralized identifiers to external identities (social handles,
//! email addresses) once a proof of control has been verified, and serves the
//! resulting identity documents.
//!
//! ## Architecture Overview
//! 1. **Services Layer**: Secret gate, proof verifiers, orchestrator, document
//!    assembler and the HTTP adapter
//! 2. **Storage Layer**: Claim store with the per-identifier verified set
//! 3. **Integrations Layer**: Secret decryption, email provider, social network,
//!    DID resolver and analytics collaborators
//!
//! ## Environment Variables
//! - `SECRETS` (or the name in `VERIFIER__SECRETS_ENV_VAR`): base64 secret bundle
//! - `VERIFIER__*`: any key of [`settings::Settings`]
//! - `RUST_LOG`: log filter (default `info`)

use crate::integrations::analytics::{AnalyticsSink, HttpAnalytics, LogAnalytics};
use crate::integrations::email_dispatch::SendGridDispatcher;
use crate::integrations::key_resolver::UniversalResolver;
use crate::integrations::secret_source::EnvSecretSource;
use crate::integrations::social_source::TwitterClient;
use crate::services::api_server::ApiServer;
use crate::services::email_verifier::{EmailCodeBook, EmailCodeVerifier};
use crate::services::orchestrator::{Orchestrator, OrchestratorConfig};
use crate::services::secret_gate::SecretGate;
use crate::services::social_verifier::SocialHandleVerifier;
use crate::services::verifier::{ProofVerifier, VerifierSet};
use crate::settings::Settings;
use crate::storage::claim_store::MemoryClaimStore;
use anyhow::Context;
use dotenv::dotenv;
use log::{error, info};
use std::sync::Arc;

// Module declarations (organized by functional domain)
mod error;          // Error taxonomy
mod integrations;   // External collaborators
mod models;         // Data structures
mod services;       // Business logic and API
mod settings;       // Runtime configuration
mod storage;        // Claim persistence
mod utils;          // Helper functions

/// Main application entry point
///
/// # Initialization Sequence
/// 1. Load `.env`, logging and settings
/// 2. Build collaborators around an empty secret gate
/// 3. Start the periodic expiry sweep
/// 4. Start API server
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::load().context("Failed to load settings")?;
    info!("Starting with settings: {:?}", settings);

    // The gate starts empty; the first request populates it.
    let gate = Arc::new(SecretGate::new());
    let store = Arc::new(MemoryClaimStore::new());
    let codes = Arc::new(EmailCodeBook::new(settings.email_code_ttl()));

    let verifiers = VerifierSet::new()
        .with(ProofVerifier::SocialHandle(SocialHandleVerifier::new(
            Arc::new(UniversalResolver::new(settings.resolver_url.clone())),
            Arc::new(TwitterClient::new(settings.twitter_api_url.clone(), gate.clone())),
        )))
        .with(ProofVerifier::EmailAddress(EmailCodeVerifier::new(codes.clone())));

    let analytics: Arc<dyn AnalyticsSink> = match &settings.analytics_url {
        Some(url) => Arc::new(HttpAnalytics::new(url.clone(), gate.clone())),
        None => Arc::new(LogAnalytics),
    };

    let orchestrator = Arc::new(Orchestrator::new(
        gate.clone(),
        store,
        verifiers,
        codes,
        Arc::new(SendGridDispatcher::new(settings.email_api_url.clone(), gate)),
        analytics,
        OrchestratorConfig::from(&settings),
    ));

    spawn_expiry_sweep(orchestrator.clone(), settings.sweep_interval());

    let api_server = ApiServer::new(
        orchestrator,
        Arc::new(EnvSecretSource::new(settings.secrets_env_var.clone())),
    );

    info!("Available endpoints:");
    info!("- POST /claims");
    info!("- POST /claims/:claim_id/proof");
    info!("- GET  /claims/:claim_id");
    info!("- GET  /identifiers/:identifier/claims");
    info!("- GET  /identifiers/:identifier/document");
    info!("- POST /twitter");
    info!("- POST /email/send");
    info!("- POST /email/verify");

    api_server
        .run(settings.bind_address)
        .await
        .with_context(|| format!("API server on {} failed", settings.bind_address))
}

/// Runs `sweep_expired` every `period` for the lifetime of the process.
fn spawn_expiry_sweep(orchestrator: Arc<Orchestrator>, period: std::time::Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period.max(std::time::Duration::from_secs(1)));
        loop {
            ticker.tick().await;
            if let Err(e) = orchestrator.sweep_expired(chrono::Utc::now()).await {
                error!("Expiry sweep failed: {}", e);
            }
        }
    });
}
