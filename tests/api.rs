//! API endpoint integration tests

use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use euaitalk::config::{RateLimitConfig, UpstreamConfig};
use euaitalk::Persona;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::{body_json, completion, server_with, test_server, upstream_for};

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_reports_configuration_and_version() {
    let upstream = MockServer::start().await;
    let app = test_server(&upstream).router();

    let response = app.oneshot(get("/api/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["capabilityConfigured"], true);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_health_placeholder_key_is_not_configured() {
    let upstream = MockServer::start().await;
    let config = UpstreamConfig::new(
        "your_scaleway_api_key_here",
        &format!("{}/stt", upstream.uri()),
        &format!("{}/chat", upstream.uri()),
    );
    let app = server_with(config, RateLimitConfig::default(), None).router();

    let body = body_json(app.oneshot(get("/api/health")).await.unwrap()).await;
    assert_eq!(body["capabilityConfigured"], false);
}

#[tokio::test]
async fn test_transcribe_empty_body_is_rejected() {
    let upstream = MockServer::start().await;
    let app = test_server(&upstream).router();

    let request = Request::builder()
        .method("POST")
        .uri("/api/transcribe")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        json!({"error": "Audio data is required"})
    );
    assert!(upstream.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_transcribe_rejects_missing_or_invalid_audio() {
    let upstream = MockServer::start().await;
    let server = test_server(&upstream);

    for body in [json!({}), json!({"audio": ""}), json!({"audio": 42})] {
        let response = server
            .router()
            .oneshot(post_json("/api/transcribe", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
        assert_eq!(body_json(response).await["error"], "Audio data is required");
    }
}

#[tokio::test]
async fn test_transcribe_forwards_audio_with_credential() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/transcriptions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "whisper-large-v3",
            "audio": "UklGRg=="
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "Hallo Welt"})))
        .expect(1)
        .mount(&upstream)
        .await;

    let app = test_server(&upstream).router();
    let response = app
        .oneshot(post_json("/api/transcribe", &json!({"audio": "UklGRg=="})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"text": "Hallo Welt"}));
}

#[tokio::test]
async fn test_transcribe_upstream_failure_is_500() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/transcriptions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&upstream)
        .await;

    let app = test_server(&upstream).router();
    let response = app
        .oneshot(post_json("/api/transcribe", &json!({"audio": "AAAA"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Transcription failed");
    assert!(body["details"].is_string());
}

#[tokio::test]
async fn test_chat_injects_single_persona_prompt() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "model": "mistral-nemo-instruct-2407",
            "max_tokens": 500
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Es war einmal...")))
        .expect(1)
        .mount(&upstream)
        .await;

    let app = test_server(&upstream).router();
    let response = app
        .oneshot(post_json(
            "/api/chat",
            &json!({"messages": [], "persona": "storyteller"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"message": "Es war einmal..."})
    );

    let requests = upstream.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let messages = sent["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["role"], "system");
    assert_eq!(
        messages[0]["content"],
        Persona::Storyteller.system_prompt()
    );
    let temperature = sent["temperature"].as_f64().unwrap();
    assert!((temperature - 0.7).abs() < 1e-6);
}

#[tokio::test]
async fn test_chat_unknown_persona_uses_general_prompt() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Hallo!")))
        .mount(&upstream)
        .await;

    let app = test_server(&upstream).router();
    let response = app
        .oneshot(post_json(
            "/api/chat",
            &json!({
                "messages": [{"role": "user", "content": "Hi"}],
                "persona": "pirate"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let requests = upstream.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(
        sent["messages"],
        json!([
            {"role": "system", "content": Persona::General.system_prompt()},
            {"role": "user", "content": "Hi"}
        ])
    );
}

#[tokio::test]
async fn test_chat_requires_messages_array() {
    let upstream = MockServer::start().await;
    let server = test_server(&upstream);

    for body in [json!({}), json!({"messages": "Hallo"})] {
        let response = server
            .router()
            .oneshot(post_json("/api/chat", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({"error": "Messages array is required"})
        );
    }

    let response = server
        .router()
        .oneshot(post_json(
            "/api/chat",
            &json!({"messages": [{"role": "system", "content": "x"}]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Invalid message format");
}

#[tokio::test]
async fn test_chat_empty_choices_yield_placeholder() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&upstream)
        .await;

    let app = test_server(&upstream).router();
    let response = app
        .oneshot(post_json("/api/chat", &json!({"messages": []})))
        .await
        .unwrap();
    assert_eq!(body_json(response).await, json!({"message": "No response"}));
}

#[tokio::test]
async fn test_chat_upstream_error_is_500_with_details() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&upstream)
        .await;

    let app = test_server(&upstream).router();
    let response = app
        .oneshot(post_json("/api/chat", &json!({"messages": []})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(response).await,
        json!({
            "error": "Chat request failed",
            "details": "Scaleway API error: Unauthorized"
        })
    );
}

#[tokio::test]
async fn test_api_rate_limit_headers_and_429() {
    let upstream = MockServer::start().await;
    let limits = RateLimitConfig {
        window: Duration::from_secs(60),
        api_max: 2,
        static_max: 10,
    };
    let server = server_with(upstream_for(&upstream), limits, None);

    let first = server.router().oneshot(get("/api/health")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()["ratelimit-limit"], "2");
    assert_eq!(first.headers()["ratelimit-remaining"], "1");
    assert!(first.headers().contains_key("ratelimit-reset"));

    let second = server.router().oneshot(get("/api/health")).await.unwrap();
    assert_eq!(second.headers()["ratelimit-remaining"], "0");

    let third = server.router().oneshot(get("/api/health")).await.unwrap();
    assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(third.headers().contains_key("retry-after"));
    assert_eq!(
        body_json(third).await,
        json!({"error": "Too many requests from this IP, please try again later."})
    );
}

#[tokio::test]
async fn test_rate_limit_is_per_client() {
    let upstream = MockServer::start().await;
    let limits = RateLimitConfig {
        window: Duration::from_secs(60),
        api_max: 1,
        static_max: 10,
    };
    let server = server_with(upstream_for(&upstream), limits, None);

    let from = |ip: &str| {
        Request::builder()
            .uri("/api/health")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    };

    let a = server.router().oneshot(from("10.0.0.1")).await.unwrap();
    assert_eq!(a.status(), StatusCode::OK);
    let a_again = server.router().oneshot(from("10.0.0.1")).await.unwrap();
    assert_eq!(a_again.status(), StatusCode::TOO_MANY_REQUESTS);
    let b = server.router().oneshot(from("10.0.0.2")).await.unwrap();
    assert_eq!(b.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_static_files_with_index_fallback() {
    let upstream = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<h1>EuAiTalk</h1>").unwrap();
    std::fs::write(dir.path().join("app.js"), "console.log('hi');").unwrap();

    let server = server_with(
        upstream_for(&upstream),
        RateLimitConfig::default(),
        Some(dir.path().to_path_buf()),
    );

    let asset = server.router().oneshot(get("/app.js")).await.unwrap();
    assert_eq!(asset.status(), StatusCode::OK);
    assert_eq!(asset.headers()["ratelimit-limit"], "1000");
    let bytes = axum::body::to_bytes(asset.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"console.log('hi');");

    let spa = server
        .router()
        .oneshot(get("/some/client/route"))
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(spa.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"<h1>EuAiTalk</h1>");

    let api = server.router().oneshot(get("/api/health")).await.unwrap();
    assert_eq!(api.headers()["ratelimit-limit"], "100");
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let upstream = MockServer::start().await;
    let app = test_server(&upstream).router();

    let request = Request::builder()
        .uri("/api/health")
        .header("origin", "http://10.0.2.2:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.headers()["access-control-allow-origin"], "*");
}
