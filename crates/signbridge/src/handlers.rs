// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP request handlers.
//!
//! Synchronous paths (auth, export) turn every failure into an HTTP error with
//! a machine-readable `error` code. The webhook path only parses and enqueues;
//! what happens to the event afterwards is invisible to the sender.

use std::collections::HashSet;
use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::export::{ExportError, ExportPoller};
use crate::oauth::OAuthClient;
use crate::queue::{QueueError, WebhookQueue};
use crate::session::{AuthError, AuthStatus, Platform, TokenCoordinator};
use crate::webhook::{CommitmentMetadata, WebhookEvent, WebhookParseError};

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session coordinator
    pub coordinator: Arc<TokenCoordinator>,
    /// Construction platform OAuth client (login redirect)
    pub oauth: Arc<OAuthClient>,
    /// PDF export poller
    pub exporter: Arc<ExportPoller>,
    /// Producer side of the webhook queue
    pub queue: WebhookQueue,
    /// OAuth `state` values issued by `/api/auth/login` and not yet used
    pub pending_logins: Arc<Mutex<HashSet<String>>>,
    /// Browser redirect after a completed login
    pub post_login_redirect: Option<String>,
}

/// Error response for synchronous endpoints.
#[derive(Debug, thiserror::Error)]
pub enum ApiFailure {
    /// Missing or unrefreshable session.
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// PDF export failed.
    #[error(transparent)]
    Export(#[from] ExportError),
    /// Webhook body could not be parsed.
    #[error(transparent)]
    Webhook(#[from] WebhookParseError),
    /// Webhook queue no longer accepts events.
    #[error(transparent)]
    Queue(#[from] QueueError),
    /// Request was invalid.
    #[error("{0}")]
    BadRequest(String),
    /// Internal error.
    #[error("{0}")]
    Internal(String),
}

impl ApiFailure {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Auth(AuthError::RefreshFailed { .. }) => {
                (StatusCode::UNAUTHORIZED, "REFRESH_FAILED")
            }
            Self::Auth(_) => (StatusCode::UNAUTHORIZED, "AUTH_REQUIRED"),
            Self::Export(ExportError::StartFailed(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "EXPORT_START_FAILED")
            }
            Self::Export(ExportError::TimedOut { .. }) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "EXPORT_TIMED_OUT")
            }
            Self::Export(ExportError::Cancelled) => {
                (StatusCode::SERVICE_UNAVAILABLE, "EXPORT_CANCELLED")
            }
            Self::Export(_) => (StatusCode::INTERNAL_SERVER_ERROR, "EXPORT_FAILED"),
            Self::Webhook(_) => (StatusCode::INTERNAL_SERVER_ERROR, "WEBHOOK_PARSE_FAILED"),
            Self::Queue(_) => (StatusCode::INTERNAL_SERVER_ERROR, "QUEUE_CLOSED"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        }
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            error!(error = %self, code, "Request failed");
        } else {
            warn!(error = %self, code, "Request rejected");
        }
        let body = json!({
            "success": false,
            "error": code,
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "queueDepth": state.queue.depth(),
    }))
}

/// `GET /api/auth/status`
pub async fn auth_status(State(state): State<AppState>) -> Json<AuthStatus> {
    Json(state.coordinator.status(Platform::Construction).await)
}

/// Body of `POST /api/auth/refresh`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    /// Whether a new access token was obtained
    pub refreshed: bool,
    /// Whether the user has to go through the login flow
    pub login_required: bool,
    /// Session state after the attempt
    pub auth: AuthStatus,
    /// Failure description, when not refreshed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `POST /api/auth/refresh`
///
/// Always answers 200; failures are reported as `loginRequired: true`.
pub async fn auth_refresh(State(state): State<AppState>) -> Json<RefreshResponse> {
    let result = state.coordinator.force_refresh(Platform::Construction).await;
    let auth = state.coordinator.status(Platform::Construction).await;

    Json(match result {
        Ok(_) => RefreshResponse {
            refreshed: true,
            login_required: false,
            auth,
            error: None,
        },
        Err(e) => RefreshResponse {
            refreshed: false,
            login_required: true,
            auth,
            error: Some(e.to_string()),
        },
    })
}

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// `GET /api/auth/login`
pub async fn auth_login(State(state): State<AppState>) -> Result<Response, ApiFailure> {
    let login_state = uuid::Uuid::new_v4().simple().to_string();
    let url = state.oauth.authorization_url(&login_state).ok_or_else(|| {
        ApiFailure::Internal("authorization endpoint is not configured".to_string())
    })?;

    state.pending_logins.lock().await.insert(login_state);
    Ok(found(url.as_str()))
}

/// Query parameters of the OAuth callback.
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// `GET /api/auth/callback`
pub async fn auth_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Response, ApiFailure> {
    if let Some(error) = params.error {
        return Err(ApiFailure::BadRequest(format!(
            "authorization was denied: {error}"
        )));
    }

    let login_state = params
        .state
        .ok_or_else(|| ApiFailure::BadRequest("missing state".to_string()))?;
    if !state.pending_logins.lock().await.remove(&login_state) {
        return Err(ApiFailure::BadRequest("unknown or reused state".to_string()));
    }

    let code = params
        .code
        .ok_or_else(|| ApiFailure::BadRequest("missing code".to_string()))?;

    let status = state.coordinator.complete_authorization(&code).await?;

    Ok(match &state.post_login_redirect {
        Some(target) => found(target),
        None => Json(status).into_response(),
    })
}

/// Body of `POST /api/send`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    /// Always `true` on the success path
    pub success: bool,
    /// Size of the exported PDF in bytes
    pub pdf_size: usize,
}

/// `POST /api/send`
///
/// Exports the commitment contract PDF. The export poll loop is cancelled if
/// the client disconnects.
///
/// The body is decoded by hand so that malformed input is reported as
/// `BAD_REQUEST` in the usual error envelope.
pub async fn send(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SendResponse>, ApiFailure> {
    let target: CommitmentMetadata = serde_json::from_slice(&body)
        .map_err(|e| ApiFailure::BadRequest(format!("invalid request body: {e}")))?;
    if target.company_id.is_empty()
        || target.project_id.is_empty()
        || target.commitment_id.is_empty()
    {
        return Err(ApiFailure::BadRequest(
            "companyId, projectId and commitmentId are required".to_string(),
        ));
    }

    let token = state.coordinator.ensure_valid(Platform::Construction).await?;

    let cancel = tokio_util::sync::CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let pdf = state.exporter.export_pdf(&token, &target, &cancel).await?;

    info!(
        commitment_id = %target.commitment_id,
        pdf_size = pdf.len(),
        "Commitment PDF exported"
    );
    Ok(Json(SendResponse {
        success: true,
        pdf_size: pdf.len(),
    }))
}

/// `POST /api/webhooks/signature`
pub async fn receive_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiFailure> {
    let event = WebhookEvent::from_json(&body)?;
    let doc_id = event.doc_id.clone();
    let event_type = event.event_type.clone();

    state.queue.enqueue(event)?;
    info!(
        doc_id = %doc_id,
        event_type = %event_type,
        queue_depth = state.queue.depth(),
        "Webhook queued"
    );
    Ok(Json(json!({ "status": "received" })))
}
