// src/integrations/analytics.rs
//! Usage analytics sink.
//!
//! Fire-and-forget: `track` returns immediately and a failing collector can
//! never slow down or fail a verification.

use crate::models::claim::{ClaimId, IdentityKind};
use crate::services::secret_gate::SecretGate;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ClaimInitiated,
    ClaimVerified,
    ClaimRejected,
}

/// One analytics notification.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    pub event: EventKind,
    pub identifier: String,
    pub identity_kind: IdentityKind,
    pub claim_id: ClaimId,
    pub at: DateTime<Utc>,
}

pub trait AnalyticsSink: Send + Sync {
    /// Records an event without waiting for delivery.
    fn track(&self, event: AnalyticsEvent);
}

/// Writes events to the log.
pub struct LogAnalytics;

impl AnalyticsSink for LogAnalytics {
    fn track(&self, event: AnalyticsEvent) {
        info!(
            "analytics: {:?} {} {} claim={}",
            event.event, event.identifier, event.identity_kind, event.claim_id
        );
    }
}

/// Posts events to an HTTP collector on a background task.
///
/// Events are dropped (with a debug line) while the secret gate is empty or
/// the bundle carries no analytics key.
pub struct HttpAnalytics {
    client: reqwest::Client,
    url: String,
    gate: Arc<SecretGate>,
}

impl HttpAnalytics {
    pub fn new(url: impl Into<String>, gate: Arc<SecretGate>) -> Self {
        HttpAnalytics {
            client: reqwest::Client::new(),
            url: url.into(),
            gate,
        }
    }
}

impl AnalyticsSink for HttpAnalytics {
    fn track(&self, event: AnalyticsEvent) {
        let key = match self.gate.bundle().ok().and_then(|b| b.analytics_key.clone()) {
            Some(key) => key,
            None => {
                debug!("analytics disabled, dropping {:?}", event.event);
                return;
            }
        };
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                debug!("no runtime, dropping {:?}", event.event);
                return;
            }
        };

        let request = self.client.post(&self.url).bearer_auth(key).json(&event);
        runtime.spawn(async move {
            match request.send().await {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => warn!("analytics collector answered {}", response.status()),
                Err(e) => warn!("analytics delivery failed: {}", e),
            }
        });
    }
}
