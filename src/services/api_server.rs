// src/services/api_server.rs
//! HTTP request adapter for the claim verification engine.
//!
//! Translates JSON requests into orchestrator calls and orchestrator results
//! into responses. Every route declares its [`ResponseShape`]:
//! - `Enveloped`: `{"status":"success","data":...}` or
//!   `{"status":"error","message":...}` with the error's status code
//! - `Raw`: the bare payload; used only for identity documents, which
//!   resolvers consume as-is
//!
//! A middleware runs the single-flight secret initialisation before each
//! request, and every response carries permissive CORS headers. Errors the
//! caller may retry unchanged also carry `Retry-After`.

use crate::error::ClaimError;
use crate::integrations::secret_source::SecretSource;
use crate::models::claim::{Claim, ClaimId, IdentityKind};
use crate::services::orchestrator::{verdict_outcome, Orchestrator};
use crate::utils::serialization::serialize;
use axum::{
    extract::{rejection::JsonRejection, Json, Path, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::set_header::SetResponseHeaderLayer;

/// Seconds advertised in `Retry-After` on retryable errors
const RETRY_AFTER_SECS: &str = "1";

/// How a route wraps its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    Enveloped,
    Raw,
}

#[derive(Serialize)]
struct ErrorEnvelope {
    status: &'static str,
    message: String,
}

/// A handler outcome together with the shape it is rendered in.
///
/// Successful payloads are held as JSON text so a raw document goes out
/// byte-for-byte as the assembler rendered it.
pub struct ApiReply {
    shape: ResponseShape,
    outcome: Result<String, ClaimError>,
}

impl ApiReply {
    /// Serializes a handler result for the given shape.
    pub fn new<T: Serialize>(shape: ResponseShape, outcome: Result<T, ClaimError>) -> Self {
        let outcome = outcome
            .and_then(|data| serialize(&data).map_err(|e| ClaimError::Internal(e.to_string())));
        ApiReply { shape, outcome }
    }

    /// Wraps a payload that is already JSON text.
    pub fn json(shape: ResponseShape, outcome: Result<String, ClaimError>) -> Self {
        ApiReply { shape, outcome }
    }

    fn enveloped<T: Serialize>(outcome: Result<T, ClaimError>) -> Self {
        Self::new(ResponseShape::Enveloped, outcome)
    }
}

impl IntoResponse for ApiReply {
    fn into_response(self) -> Response {
        let json = [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))];
        match (self.shape, self.outcome) {
            (ResponseShape::Raw, Ok(payload)) => (StatusCode::OK, json, payload).into_response(),
            (ResponseShape::Enveloped, Ok(payload)) => (
                StatusCode::OK,
                json,
                format!(r#"{{"status":"success","data":{}}}"#, payload),
            )
                .into_response(),
            (_, Err(e)) => {
                let status =
                    StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                if status.is_server_error() {
                    warn!("Request failed with {}: {}", status, e);
                }
                let body = ErrorEnvelope {
                    status: "error",
                    message: e.to_string(),
                };
                let mut response = (status, Json(body)).into_response();
                if e.is_retryable() {
                    response
                        .headers_mut()
                        .insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
                }
                response
            }
        }
    }
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ClaimError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ClaimError::InvalidInput(rejection.body_text()))
}

fn claim_id(raw: &str) -> Result<ClaimId, ClaimError> {
    raw.parse()
        .map_err(|_| ClaimError::InvalidInput(format!("malformed claim id: {}", raw)))
}

// API request structures

/// Request payload for starting a claim
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitiateRequest {
    identifier: String,
    identity_kind: IdentityKind,
    identity_value: String,
}

/// Request payload for submitting a proof against a claim id
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProofRequest {
    proof_artifact: String,
}

/// Request payload for the one-shot social handle check
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TwitterRequest {
    identifier: String,
    handle: String,
    proof_artifact: String,
}

/// Request payload for sending an email code
#[derive(Deserialize)]
struct EmailSendRequest {
    identifier: String,
    email: String,
}

/// Request payload for redeeming an email code
#[derive(Deserialize)]
struct EmailVerifyRequest {
    identifier: String,
    email: String,
    code: String,
}

/// Main API server structure holding the orchestrator and the secret source
#[derive(Clone)]
pub struct ApiServer {
    orchestrator: Arc<Orchestrator>,
    secrets: Arc<dyn SecretSource>,
}

impl ApiServer {
    /// Creates a new instance of the API server
    ///
    /// # Arguments
    /// * `orchestrator` - Verification orchestrator all routes delegate to
    /// * `secrets` - Decrypt collaborator used to populate the secret gate
    pub fn new(orchestrator: Arc<Orchestrator>, secrets: Arc<dyn SecretSource>) -> Self {
        ApiServer {
            orchestrator,
            secrets,
        }
    }

    /// Builds the router with all routes, the secret middleware and CORS headers.
    pub fn router(self) -> Router {
        let state = Arc::new(self);
        Router::new()
            .route("/claims", post(Self::initiate_handler))
            .route("/claims/:claim_id", get(Self::claim_handler))
            .route("/claims/:claim_id/proof", post(Self::proof_handler))
            .route("/identifiers/:identifier/claims", get(Self::history_handler))
            .route("/identifiers/:identifier/document", get(Self::document_handler))
            .route("/twitter", post(Self::twitter_handler))
            .route("/email/send", post(Self::email_send_handler))
            .route("/email/verify", post(Self::email_verify_handler))
            .layer(middleware::from_fn_with_state(state.clone(), Self::secrets_middleware))
            .layer(SetResponseHeaderLayer::overriding(
                header::ACCESS_CONTROL_ALLOW_ORIGIN,
                HeaderValue::from_static("*"),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            ))
            .with_state(state)
    }

    /// Starts the API server and begins listening for requests
    ///
    /// # Arguments
    /// * `addr` - Socket address to bind to (e.g., "127.0.0.1:3000")
    pub async fn run(self, addr: SocketAddr) -> std::io::Result<()> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("API server listening on http://{}", addr);
        axum::serve(listener, app).await
    }

    /// Populates the secret gate before the request reaches its handler.
    ///
    /// A failed decrypt is logged and the request continues; handlers that
    /// need credentials then answer `SecretsUnavailable`.
    async fn secrets_middleware(
        State(state): State<Arc<ApiServer>>,
        request: Request,
        next: Next,
    ) -> Response {
        let gate = state.orchestrator.gate();
        if !gate.is_ready() {
            if let Err(e) = gate.initialize(state.secrets.as_ref()).await {
                warn!("Secret initialisation failed: {}", e);
            }
        }
        next.run(request).await
    }

    // =====================
    // Claim Handlers
    // =====================

    /// Starts a claim or returns the open one
    ///
    /// # Endpoint
    /// POST /claims
    ///
    /// # Responses
    /// - 200 OK: The claim
    /// - 400 Bad Request: Malformed identifier, kind or value
    /// - 503 Service Unavailable: Secrets not ready or email dispatch failed
    async fn initiate_handler(
        State(state): State<Arc<ApiServer>>,
        payload: Result<Json<InitiateRequest>, JsonRejection>,
    ) -> ApiReply {
        let outcome = async {
            let request = body(payload)?;
            state
                .orchestrator
                .initiate(&request.identifier, request.identity_kind, &request.identity_value)
                .await
        }
        .await;
        ApiReply::enveloped(outcome)
    }

    /// Submits a proof for a claim
    ///
    /// # Endpoint
    /// POST /claims/:claim_id/proof
    ///
    /// # Responses
    /// - 200 OK: The verified claim
    /// - 400 Bad Request: Proof rejected
    /// - 404 Not Found: Unknown claim
    /// - 409 Conflict: Claim no longer accepts proofs
    /// - 503 Service Unavailable: Verdict indeterminate, retry
    async fn proof_handler(
        State(state): State<Arc<ApiServer>>,
        Path(raw_id): Path<String>,
        payload: Result<Json<ProofRequest>, JsonRejection>,
    ) -> ApiReply {
        let outcome = async {
            let id = claim_id(&raw_id)?;
            let request = body(payload)?;
            let verdict = state.orchestrator.submit_proof(id, &request.proof_artifact).await?;
            verdict_outcome(&verdict)?;
            state.orchestrator.claim(id).await
        }
        .await;
        ApiReply::enveloped(outcome)
    }

    /// GET /claims/:claim_id
    async fn claim_handler(State(state): State<Arc<ApiServer>>, Path(raw_id): Path<String>) -> ApiReply {
        let outcome = async { state.orchestrator.claim(claim_id(&raw_id)?).await }.await;
        ApiReply::enveloped(outcome)
    }

    /// GET /identifiers/:identifier/claims
    async fn history_handler(
        State(state): State<Arc<ApiServer>>,
        Path(identifier): Path<String>,
    ) -> ApiReply {
        ApiReply::enveloped(state.orchestrator.claims(&identifier).await)
    }

    /// Returns the identity document in raw form
    ///
    /// # Endpoint
    /// GET /identifiers/:identifier/document
    ///
    /// An identifier with no verified claims gets an empty document.
    async fn document_handler(
        State(state): State<Arc<ApiServer>>,
        Path(identifier): Path<String>,
    ) -> ApiReply {
        ApiReply::json(
            ResponseShape::Raw,
            state.orchestrator.document_json(&identifier).await,
        )
    }

    // =====================
    // Per-Kind Handlers
    // =====================

    /// Links a social handle in one call: starts (or resumes) the claim and
    /// submits the signature
    ///
    /// # Endpoint
    /// POST /twitter
    async fn twitter_handler(
        State(state): State<Arc<ApiServer>>,
        payload: Result<Json<TwitterRequest>, JsonRejection>,
    ) -> ApiReply {
        let outcome: Result<Claim, ClaimError> = async {
            let request = body(payload)?;
            let claim = state
                .orchestrator
                .initiate(&request.identifier, IdentityKind::SocialHandle, &request.handle)
                .await?;
            let verdict = state.orchestrator.submit_proof(claim.id, &request.proof_artifact).await?;
            verdict_outcome(&verdict)?;
            state.orchestrator.claim(claim.id).await
        }
        .await;
        ApiReply::enveloped(outcome)
    }

    /// Starts an email claim; the code goes out by email
    ///
    /// # Endpoint
    /// POST /email/send
    async fn email_send_handler(
        State(state): State<Arc<ApiServer>>,
        payload: Result<Json<EmailSendRequest>, JsonRejection>,
    ) -> ApiReply {
        let outcome = async {
            let request = body(payload)?;
            state
                .orchestrator
                .initiate(&request.identifier, IdentityKind::EmailAddress, &request.email)
                .await
        }
        .await;
        ApiReply::enveloped(outcome)
    }

    /// Redeems an email code against the pair's open claim
    ///
    /// # Endpoint
    /// POST /email/verify
    async fn email_verify_handler(
        State(state): State<Arc<ApiServer>>,
        payload: Result<Json<EmailVerifyRequest>, JsonRejection>,
    ) -> ApiReply {
        let outcome = async {
            let request = body(payload)?;
            let (id, verdict) = state
                .orchestrator
                .submit_for(
                    &request.identifier,
                    IdentityKind::EmailAddress,
                    &request.email,
                    &request.code,
                )
                .await?;
            verdict_outcome(&verdict)?;
            state.orchestrator.claim(id).await
        }
        .await;
        ApiReply::enveloped(outcome)
    }
}
