use super::state::AppState;
use crate::api::{error_message, CredentialRequest, KeyValidation};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Deserialize)]
pub struct ValidateKeyRequest {
    pub api_key: Option<String>,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: error.into() })).into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// GET|POST /api/realtime-token
/// Create an upstream realtime session and return its ephemeral secret
pub async fn realtime_token(State(state): State<AppState>, body: Bytes) -> Response {
    let request: CredentialRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CredentialRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(e) => {
                warn!("Rejecting malformed token request: {}", e);
                return error_response(StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e));
            }
        }
    };

    let Some(api_key) = request
        .api_key
        .filter(|k| !k.trim().is_empty())
        .or_else(|| state.realtime.api_key.clone())
    else {
        error!("Token requested but no API key is configured");
        return error_response(StatusCode::BAD_REQUEST, "API key is not set");
    };

    let vad = request.turn_detection.unwrap_or_default();
    let session = json!({
        "model": state.realtime.model,
        "turn_detection": {
            "type": "server_vad",
            "threshold": vad.threshold,
            "prefix_padding_ms": vad.prefix_padding_ms,
            "silence_duration_ms": vad.silence_duration_ms,
            "create_response": false
        },
        "input_audio_transcription": { "model": state.realtime.transcription_model },
        "instructions": &*state.instructions,
        "modalities": ["text"]
    });

    info!("Creating upstream realtime session ({})", state.realtime.model);

    let resp = match state
        .http
        .post(&state.realtime.sessions_url)
        .bearer_auth(&api_key)
        .json(&session)
        .send()
        .await
    {
        Ok(resp) => resp,
        Err(e) => {
            error!("Upstream session request failed: {}", e);
            return error_response(StatusCode::BAD_GATEWAY, format!("Upstream unreachable: {}", e));
        }
    };

    let status = resp.status();
    let body = match resp.text().await {
        Ok(body) => body,
        Err(e) => {
            error!("Failed to read upstream response: {}", e);
            return error_response(StatusCode::BAD_GATEWAY, format!("Upstream read failed: {}", e));
        }
    };

    if !status.is_success() {
        let message = error_message(&body).unwrap_or_else(|| format!("Upstream error {}", status.as_u16()));
        warn!("Upstream session creation returned {}: {}", status, message);
        return error_response(status, message);
    }

    info!("Upstream realtime session created");
    (StatusCode::OK, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}

/// POST /api/validate-key
/// Check a key against the upstream models endpoint
pub async fn validate_key(
    State(state): State<AppState>,
    Json(req): Json<ValidateKeyRequest>,
) -> Response {
    let Some(api_key) = req.api_key.filter(|k| !k.trim().is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(KeyValidation {
                valid: false,
                error: Some("api_key is required".to_string()),
            }),
        )
            .into_response();
    };

    let resp = match state
        .http
        .get(&state.realtime.models_url)
        .bearer_auth(&api_key)
        .send()
        .await
    {
        Ok(resp) => resp,
        Err(e) => {
            error!("Key validation request failed: {}", e);
            return (
                StatusCode::BAD_GATEWAY,
                Json(KeyValidation {
                    valid: false,
                    error: Some(format!("Upstream unreachable: {}", e)),
                }),
            )
                .into_response();
        }
    };

    let status = resp.status();
    if status.is_success() {
        info!("API key validated");
        return Json(KeyValidation {
            valid: true,
            error: None,
        })
        .into_response();
    }

    let body = resp.text().await.unwrap_or_default();
    let message = error_message(&body).unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    info!("API key rejected: {}", message);
    Json(KeyValidation {
        valid: false,
        error: Some(message),
    })
    .into_response()
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
