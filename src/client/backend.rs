//! Client for the gateway's HTTP API

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::json;

use super::rate_limits::RateLimitState;
use super::ClientError;
use crate::message::ChatMessage;
use crate::persona::Persona;

/// Result of one backend call plus the quota the server reported with it
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange<T> {
    pub outcome: Result<T, ClientError>,
    pub quota: Option<RateLimitState>,
}

impl<T> Exchange<T> {
    #[must_use]
    pub const fn new(outcome: Result<T, ClientError>, quota: Option<RateLimitState>) -> Self {
        Self { outcome, quota }
    }

    /// A failure that never reached the server
    #[must_use]
    pub const fn failed(error: ClientError) -> Self {
        Self {
            outcome: Err(error),
            quota: None,
        }
    }
}

/// Gateway health report
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(rename = "capabilityConfigured", alias = "apiConfigured", default)]
    pub capability_configured: bool,
    #[serde(default)]
    pub version: Option<String>,
}

/// Operations the client core needs from the gateway
#[async_trait]
pub trait Backend: Send + Sync {
    /// Query liveness and whether the provider credential is configured
    async fn health(&self) -> Result<HealthReport, ClientError>;

    /// Transcribe base64-encoded audio
    async fn transcribe(&self, audio: &str) -> Exchange<String>;

    /// Request an assistant reply for the given history
    async fn chat(&self, messages: &[ChatMessage], persona: Persona) -> Exchange<String>;
}

/// Error body returned by the gateway
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    details: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscribeBody {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatBody {
    message: Option<String>,
}

/// [`Backend`] over HTTP
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    /// Create a backend for `base_url` (an origin such as `http://localhost:3000`)
    ///
    /// # Errors
    ///
    /// Returns error if `base_url` is not an absolute http(s) URL
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let trimmed = base_url.trim().trim_end_matches('/');
        let parsed = url::Url::parse(trimmed)
            .map_err(|e| ClientError::Validation(format!("invalid backend URL {trimmed:?}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClientError::Validation(format!(
                "unsupported backend URL scheme: {}",
                parsed.scheme()
            )));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: trimmed.to_string(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// POST a JSON body, returning the decoded success body and reported quota
    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Exchange<T> {
        let response = match self.client.post(self.url(path)).json(&body).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(path, error = %e, "backend request failed");
                return Exchange::failed(e.into());
            }
        };

        let quota = quota_from(response.headers());
        let status = response.status();

        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or("request failed");
            let body = response.json::<ErrorBody>().await.ok();
            let message = body
                .and_then(|b| match (b.error, b.details) {
                    (Some(error), Some(details)) => Some(format!("{error}: {details}")),
                    (error, _) => error,
                })
                .unwrap_or_else(|| reason.to_string());

            tracing::warn!(path, status = status.as_u16(), %message, "backend returned error");
            let error = if status == reqwest::StatusCode::BAD_REQUEST {
                ClientError::Validation(message)
            } else {
                ClientError::Upstream {
                    status: status.as_u16(),
                    message,
                }
            };
            return Exchange::new(Err(error), quota);
        }

        Exchange::new(response.json::<T>().await.map_err(ClientError::from), quota)
    }
}

/// Builds a [`Backend`] for an endpoint origin
pub type BackendFactory =
    Box<dyn Fn(&str) -> Result<Box<dyn Backend>, ClientError> + Send + Sync>;

/// Factory producing an [`HttpBackend`] per origin
#[must_use]
pub fn http_backend_factory() -> BackendFactory {
    Box::new(|origin| Ok(Box::new(HttpBackend::new(origin)?) as Box<dyn Backend>))
}

fn quota_from(headers: &HeaderMap) -> Option<RateLimitState> {
    RateLimitState::from_headers(headers)
}

/// Missing or empty result text is an upstream failure
fn require_text(text: Option<String>, what: &str) -> Result<String, ClientError> {
    text.filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ClientError::Upstream {
            status: 200,
            message: format!("empty {what}"),
        })
}

#[async_trait]
impl Backend for HttpBackend {
    async fn health(&self) -> Result<HealthReport, ClientError> {
        let response = self.client.get(self.url("/api/health")).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Upstream {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("health check failed")
                    .to_string(),
            });
        }
        Ok(response.json().await?)
    }

    async fn transcribe(&self, audio: &str) -> Exchange<String> {
        let exchange = self
            .post::<TranscribeBody>("/api/transcribe", json!({ "audio": audio }))
            .await;
        Exchange::new(
            exchange
                .outcome
                .and_then(|b| require_text(b.text, "transcription")),
            exchange.quota,
        )
    }

    async fn chat(&self, messages: &[ChatMessage], persona: Persona) -> Exchange<String> {
        let exchange = self
            .post::<ChatBody>(
                "/api/chat",
                json!({ "messages": messages, "persona": persona.id() }),
            )
            .await;
        Exchange::new(
            exchange.outcome.and_then(|b| require_text(b.message, "reply")),
            exchange.quota,
        )
    }
}
