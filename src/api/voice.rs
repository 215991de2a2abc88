//! Speech-to-text endpoint

use std::sync::Arc;

use axum::{body::Bytes, extract::State, routing::post, Json, Router};
use serde::Serialize;

use super::{json_body, ApiError, ApiState};

/// Build voice router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/transcribe", post(transcribe))
        .with_state(state)
}

/// Transcription response
#[derive(Debug, Serialize)]
pub struct TranscribeResponse {
    pub text: String,
}

/// Transcribe base64-encoded audio to text
///
/// Expects `{"audio": "<base64>"}`.
async fn transcribe(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<Json<TranscribeResponse>, ApiError> {
    let body = json_body(&body)?;
    let audio = body
        .get("audio")
        .and_then(serde_json::Value::as_str)
        .filter(|audio| !audio.is_empty())
        .ok_or(ApiError::Validation("Audio data is required"))?;

    let text = state.scaleway.transcribe(audio).await.map_err(|e| {
        tracing::error!(error = %e, "transcription error");
        ApiError::Upstream {
            error: "Transcription failed",
            details: upstream_details(&e),
        }
    })?;

    Ok(Json(TranscribeResponse { text }))
}

/// Detail string for an upstream failure, without the error-kind prefix
pub(super) fn upstream_details(error: &crate::Error) -> String {
    match error {
        crate::Error::Upstream { message, .. } => message.clone(),
        other => other.to_string(),
    }
}
