//! Shared test utilities

#![allow(dead_code)]

use std::path::PathBuf;

use axum::body::Body;
use axum::http::Response;
use euaitalk::api::{ApiServer, ApiServerBuilder};
use euaitalk::config::{RateLimitConfig, UpstreamConfig};
use wiremock::MockServer;

/// Upstream settings pointing at a mock provider
#[must_use]
pub fn upstream_for(server: &MockServer) -> UpstreamConfig {
    UpstreamConfig::new(
        "test-key",
        &format!("{}/v1/audio/transcriptions", server.uri()),
        &format!("{}/v1/chat/completions", server.uri()),
    )
}

/// Gateway against a mock provider with default limits and no static files
pub fn test_server(server: &MockServer) -> ApiServer {
    server_with(upstream_for(server), RateLimitConfig::default(), None)
}

/// Gateway with explicit settings
pub fn server_with(
    upstream: UpstreamConfig,
    limits: RateLimitConfig,
    static_dir: Option<PathBuf>,
) -> ApiServer {
    ApiServerBuilder::new(upstream)
        .rate_limits(limits)
        .static_dir(static_dir)
        .build()
        .expect("failed to build test server")
}

/// Read a response body as JSON
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read body");
    serde_json::from_slice(&bytes).expect("body is not JSON")
}

/// Chat completion body as returned by the provider
#[must_use]
pub fn completion(content: &str) -> serde_json::Value {
    serde_json::json!({
        "choices": [{"message": {"role": "assistant", "content": content}}]
    })
}
