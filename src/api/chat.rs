//! Chat completion endpoint

use std::sync::Arc;

use axum::{body::Bytes, extract::State, routing::post, Json, Router};
use serde::Serialize;

use super::voice::upstream_details;
use super::{json_body, ApiError, ApiState};
use crate::message::{ChatMessage, Role};
use crate::persona::Persona;

/// Build chat router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .with_state(state)
}

/// Chat response
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub message: String,
}

/// Answer a conversation with the selected persona
///
/// Expects `{"messages": [{"role", "content"}...], "persona": "<id>"}`. The
/// gateway is stateless: callers send the full history every time.
async fn chat(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<Json<ChatResponse>, ApiError> {
    let body = json_body(&body)?;
    let messages = body
        .get("messages")
        .filter(|m| m.is_array())
        .cloned()
        .ok_or(ApiError::Validation("Messages array is required"))?;

    let conversation = parse_conversation(messages)?;
    let persona = Persona::resolve(body.get("persona").and_then(serde_json::Value::as_str));

    let upstream_messages = with_system_prompt(persona, conversation);
    tracing::debug!(persona = %persona, messages = upstream_messages.len(), "forwarding chat");

    let message = state.scaleway.chat(&upstream_messages).await.map_err(|e| {
        tracing::error!(error = %e, "chat error");
        ApiError::Upstream {
            error: "Chat request failed",
            details: upstream_details(&e),
        }
    })?;

    Ok(Json(ChatResponse { message }))
}

/// Parse caller messages; only user and assistant turns are accepted
fn parse_conversation(messages: serde_json::Value) -> Result<Vec<ChatMessage>, ApiError> {
    let conversation: Vec<ChatMessage> =
        serde_json::from_value(messages).map_err(|_| ApiError::Validation("Invalid message format"))?;

    if conversation.iter().any(|m| m.role == Role::System) {
        return Err(ApiError::Validation("Invalid message format"));
    }
    Ok(conversation)
}

/// Prepend the persona's system prompt as the single system message
fn with_system_prompt(persona: Persona, conversation: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(conversation.len() + 1);
    messages.push(persona.system_message());
    messages.extend(conversation);
    messages
}
