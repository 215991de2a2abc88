//! HTTP API server for the EuAiTalk gateway
//!
//! Routes:
//! - `GET /api/health`: liveness plus whether the provider credential is usable
//! - `POST /api/transcribe`: speech-to-text proxy
//! - `POST /api/chat`: chat completion proxy with persona system prompt
//! - `GET /*`: web app shell from the static directory
//!
//! Every `/api/*` route shares one per-client rate limiter; static routes
//! use a second, more permissive one.

pub mod chat;
pub mod error;
pub mod health;
pub mod rate_limit;
pub mod voice;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Bytes;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use rate_limit::ClientLimiter;

use crate::config::{Config, RateLimitConfig, UpstreamConfig};
use crate::upstream::ScalewayClient;
use crate::Result;

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub scaleway: ScalewayClient,
    pub capability_configured: bool,
}

/// Configuration for building an API server
pub struct ApiServerBuilder {
    upstream: UpstreamConfig,
    port: u16,
    static_dir: Option<PathBuf>,
    rate_limits: RateLimitConfig,
}

impl ApiServerBuilder {
    /// Create a new API server builder
    #[must_use]
    pub fn new(upstream: UpstreamConfig) -> Self {
        Self {
            upstream,
            port: crate::config::DEFAULT_PORT,
            static_dir: None,
            rate_limits: RateLimitConfig::default(),
        }
    }

    /// Create a builder from a validated configuration
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self {
            upstream: config.upstream,
            port: config.port,
            static_dir: config.static_dir,
            rate_limits: config.rate_limits,
        }
    }

    /// Set the listening port
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the static files directory for serving the web UI
    #[must_use]
    pub fn static_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.static_dir = dir;
        self
    }

    /// Set the per-client request ceilings
    #[must_use]
    pub const fn rate_limits(mut self, limits: RateLimitConfig) -> Self {
        self.rate_limits = limits;
        self
    }

    /// Build the API server
    ///
    /// # Errors
    ///
    /// Returns error if the upstream HTTP client cannot be created
    pub fn build(self) -> Result<ApiServer> {
        let state = Arc::new(ApiState {
            capability_configured: self.upstream.capability_configured(),
            scaleway: ScalewayClient::new(&self.upstream)?,
        });

        let window = self.rate_limits.window;
        Ok(ApiServer {
            state,
            port: self.port,
            static_dir: self.static_dir,
            api_limiter: ClientLimiter::new(self.rate_limits.api_max, window)
                .with_message(rate_limit::API_LIMIT_MESSAGE),
            static_limiter: ClientLimiter::new(self.rate_limits.static_max, window),
        })
    }
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
    static_dir: Option<PathBuf>,
    api_limiter: ClientLimiter,
    static_limiter: ClientLimiter,
}

impl ApiServer {
    /// Build the router with all routes
    #[must_use]
    pub fn router(&self) -> Router {
        let api = Router::new()
            .merge(health::router(self.state.clone()))
            .merge(voice::router(self.state.clone()))
            .merge(chat::router(self.state.clone()))
            .layer(axum::middleware::from_fn_with_state(
                self.api_limiter.clone(),
                rate_limit::rate_limit_middleware,
            ));

        let router = if let Some(static_dir) = &self.static_dir {
            let index_file = static_dir.join("index.html");
            let serve_dir = ServeDir::new(static_dir).fallback(ServeFile::new(&index_file));
            tracing::info!(path = %static_dir.display(), "serving static files");

            let assets = Router::new().fallback_service(serve_dir).layer(
                axum::middleware::from_fn_with_state(
                    self.static_limiter.clone(),
                    rate_limit::rate_limit_middleware,
                ),
            );
            api.merge(assets)
        } else {
            api
        };

        // CORS layer for cross-origin requests from the mobile shell and dev servers
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers(Any);

        router.layer(cors).layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(
            port = self.port,
            capability_configured = self.state.capability_configured,
            "EuAiTalk server listening"
        );

        self.serve(listener).await
    }

    /// Serve on an already bound listener
    ///
    /// # Errors
    ///
    /// Returns error if the server fails while running
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();
        let pruner = tokio::spawn(rate_limit::prune_periodically(vec![
            self.api_limiter.clone(),
            self.static_limiter.clone(),
        ]));

        let result = axum::serve(listener, app)
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")));
        pruner.abort();
        result
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

/// Parse a request body as JSON, treating an empty body as `null`
///
/// Field validation is left to each handler.
pub(crate) fn json_body(body: &Bytes) -> std::result::Result<serde_json::Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(error = %e, "rejecting malformed JSON body");
        ApiError::Validation("Invalid JSON body")
    })
}
