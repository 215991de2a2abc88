//! Client for the Scaleway speech-to-text and chat completion APIs
//!
//! The credential is attached here and nowhere else; callers of the gateway
//! never see it.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::UpstreamConfig;
use crate::message::ChatMessage;
use crate::{Error, Result};

/// Reply substituted when the provider returns no completion choice
pub const NO_RESPONSE: &str = "No response";

/// Maximum tokens requested per chat completion
const CHAT_MAX_TOKENS: u32 = 500;

/// Sampling temperature for chat completions
const CHAT_TEMPERATURE: f32 = 0.7;

/// Speech and chat provider client
#[derive(Clone)]
pub struct ScalewayClient {
    client: reqwest::Client,
    api_key: SecretString,
    stt_endpoint: String,
    chat_endpoint: String,
    stt_model: String,
    chat_model: String,
}

#[derive(Serialize)]
struct TranscriptionRequest<'a> {
    model: &'a str,
    audio: &'a str,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl ScalewayClient {
    /// Create a client from upstream settings
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            stt_endpoint: config.stt_endpoint.clone(),
            chat_endpoint: config.chat_endpoint.clone(),
            stt_model: config.stt_model.clone(),
            chat_model: config.chat_model.clone(),
        })
    }

    /// Transcribe base64-encoded audio to text
    ///
    /// # Errors
    ///
    /// Returns [`Error::Upstream`] if the request fails, the provider answers
    /// with a non-success status, or the body cannot be parsed
    pub async fn transcribe(&self, audio: &str) -> Result<String> {
        tracing::debug!(audio_len = audio.len(), model = %self.stt_model, "starting transcription");

        let request = TranscriptionRequest {
            model: &self.stt_model,
            audio,
        };
        let response = self.post(&self.stt_endpoint, &request).await?;

        let result: TranscriptionResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse transcription response");
            Error::upstream(format!("invalid transcription response: {e}"))
        })?;

        tracing::info!(chars = result.text.len(), "transcription complete");
        Ok(result.text)
    }

    /// Request a chat completion for the given messages
    ///
    /// Returns the first choice's content, or [`NO_RESPONSE`] when the
    /// provider returns no usable choice.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Upstream`] if the request fails, the provider answers
    /// with a non-success status, or the body cannot be parsed
    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        tracing::debug!(messages = messages.len(), model = %self.chat_model, "starting chat completion");

        let request = ChatCompletionRequest {
            model: &self.chat_model,
            messages,
            max_tokens: CHAT_MAX_TOKENS,
            temperature: CHAT_TEMPERATURE,
        };
        let response = self.post(&self.chat_endpoint, &request).await?;

        let result: ChatCompletionResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse chat response");
            Error::upstream(format!("invalid chat response: {e}"))
        })?;

        let reply = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|content| !content.is_empty())
            .unwrap_or_else(|| NO_RESPONSE.to_string());

        tracing::info!(chars = reply.len(), "chat completion complete");
        Ok(reply)
    }

    /// POST a JSON body with the credential attached, rejecting non-success statuses
    async fn post<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(url)
            .bearer_auth(self.api_key.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "upstream request failed");
                Error::upstream(format!("Scaleway request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Scaleway API error");
            return Err(Error::Upstream {
                status: Some(status.as_u16()),
                message: format!(
                    "Scaleway API error: {}",
                    status.canonical_reason().unwrap_or("unknown status")
                ),
            });
        }

        Ok(response)
    }
}
