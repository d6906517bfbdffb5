//! HTTP API.
//!
//! - `POST /api/messages`              submit a message
//! - `GET  /api/presence/{participant}` is a participant online
//! - `GET  /health`                     liveness + counters
//! - `GET  /socket`                     WebSocket transport (see `ws`)
//!
//! Every `4xx`/`5xx` body is `{"error": "..."}`.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use relay_core::{ParticipantId, RelayError};
use relay_protocol::wire_types::{
    ErrorBody, HealthResponse, PresenceResponse, SubmitRequest, SubmitResponse, WireMessage,
};
use tracing::debug;

use crate::types::AppState;
use crate::ws::ws_upgrade;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/messages", post(submit_message))
        .route("/api/presence/{participant}", get(presence))
        .route("/health", get(health))
        .route("/socket", get(ws_upgrade))
        .with_state(state)
}

/// Error response: status + `{"error": ...}` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: message.into(),
        }
    }
}

impl From<RelayError> for ApiError {
    fn from(e: RelayError) -> Self {
        ApiError::bad_request(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody::new(self.message))).into_response()
    }
}

async fn submit_message(
    State(state): State<AppState>,
    body: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let Json(req) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let report = state
        .relay
        .submit(&req.sender, req.recipient.as_deref(), &req.text)
        .await
        .map_err(|e| {
            debug!(sender = %req.sender, error = %e, "submission rejected");
            ApiError::from(e)
        })?;

    let response = SubmitResponse {
        success: true,
        message: WireMessage::from(report.message.as_ref()),
        delivered: report.delivered_to.len(),
        recipient_online: report.recipient_online,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

async fn presence(
    State(state): State<AppState>,
    Path(participant): Path<String>,
) -> Result<Json<PresenceResponse>, ApiError> {
    let id = ParticipantId::parse(&participant)
        .map_err(|e| ApiError::bad_request(format!("invalid participant: {}", e)))?;
    let connections = state.relay.registry().resolve(&id).len();

    Ok(Json(PresenceResponse {
        participant,
        online: connections > 0,
        connections,
    }))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let registry = state.relay.registry();
    Json(HealthResponse {
        status: "ok".to_string(),
        connections: registry.connection_count(),
        participants: registry.participants().len(),
        messages: state.relay.log().len(),
    })
}
