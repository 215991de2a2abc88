//! Per-client rate limiting
//!
//! Each limiter allows `ceiling` requests per client address within a
//! rolling window (GCRA via `governor`). Responses carry the standard
//! `RateLimit-Limit`, `RateLimit-Remaining` and `RateLimit-Reset` headers.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use governor::{
    clock::{Clock, DefaultClock},
    middleware::StateInformationMiddleware,
    state::keyed::DefaultKeyedStateStore,
    Quota, RateLimiter,
};

/// Maximum requests in the window
pub const LIMIT_HEADER: HeaderName = HeaderName::from_static("ratelimit-limit");

/// Requests left in the current window
pub const REMAINING_HEADER: HeaderName = HeaderName::from_static("ratelimit-remaining");

/// Seconds until the quota is fully replenished
pub const RESET_HEADER: HeaderName = HeaderName::from_static("ratelimit-reset");

/// Body of the 429 response for API routes
pub const API_LIMIT_MESSAGE: &str = "Too many requests from this IP, please try again later.";

const DEFAULT_LIMIT_MESSAGE: &str = "Too many requests, please try again later.";

/// How often idle client entries are dropped
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

type KeyedLimiter =
    RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock, StateInformationMiddleware>;

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Request admitted
    Allowed { remaining: u32, reset: Duration },
    /// Ceiling reached; retry after the given delay
    Limited { retry_after: Duration },
}

/// Rate limiter keyed by client address
#[derive(Clone)]
pub struct ClientLimiter {
    limiter: Arc<KeyedLimiter>,
    clock: DefaultClock,
    ceiling: u32,
    replenish: Duration,
    message: &'static str,
}

impl ClientLimiter {
    /// Allow `ceiling` requests per client within `window`
    #[must_use]
    pub fn new(ceiling: u32, window: Duration) -> Self {
        let burst = NonZeroU32::new(ceiling).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(window / burst.get())
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst);

        Self {
            limiter: Arc::new(RateLimiter::keyed(quota).with_middleware::<StateInformationMiddleware>()),
            clock: DefaultClock::default(),
            ceiling: burst.get(),
            replenish: quota.replenish_interval(),
            message: DEFAULT_LIMIT_MESSAGE,
        }
    }

    /// Set the message returned with 429 responses
    #[must_use]
    pub const fn with_message(mut self, message: &'static str) -> Self {
        self.message = message;
        self
    }

    /// Maximum requests per window
    #[must_use]
    pub const fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Record one request from `client`
    #[must_use]
    pub fn check(&self, client: IpAddr) -> Decision {
        match self.limiter.check_key(&client) {
            Ok(snapshot) => {
                let remaining = snapshot.remaining_burst_capacity();
                let used = self.ceiling.saturating_sub(remaining);
                Decision::Allowed {
                    remaining,
                    reset: self.replenish * used,
                }
            }
            Err(not_until) => Decision::Limited {
                retry_after: not_until.wait_time_from(self.clock.now()),
            },
        }
    }

    /// Number of client addresses currently tracked
    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.limiter.len()
    }

    /// Forget clients whose quota has fully replenished
    pub fn prune(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    fn headers(&self, remaining: u32, reset: Duration) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(LIMIT_HEADER, HeaderValue::from(self.ceiling));
        headers.insert(REMAINING_HEADER, HeaderValue::from(remaining));
        headers.insert(RESET_HEADER, HeaderValue::from(ceil_secs(reset)));
        headers
    }
}

/// Prune `limiters` every [`PRUNE_INTERVAL`] until the task is aborted
pub async fn prune_periodically(limiters: Vec<ClientLimiter>) {
    let mut interval = tokio::time::interval(PRUNE_INTERVAL);
    // First tick completes immediately
    interval.tick().await;
    loop {
        interval.tick().await;
        for limiter in &limiters {
            limiter.prune();
        }
        tracing::trace!(
            clients = limiters.iter().map(ClientLimiter::tracked_clients).sum::<usize>(),
            "pruned rate limiter state"
        );
    }
}

/// Whole seconds, rounded up
fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

/// Client address from the connection, falling back to `X-Forwarded-For`
fn client_addr(req: &Request) -> IpAddr {
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip();
    }
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(limiter): State<ClientLimiter>,
    req: Request,
    next: Next,
) -> Response {
    let client = client_addr(&req);

    match limiter.check(client) {
        Decision::Allowed { remaining, reset } => {
            let mut response = next.run(req).await;
            response
                .headers_mut()
                .extend(limiter.headers(remaining, reset));
            response
        }
        Decision::Limited { retry_after } => {
            tracing::warn!(client = %client, path = %req.uri().path(), "rate limit exceeded");
            let mut headers = limiter.headers(0, retry_after);
            headers.insert(header::RETRY_AFTER, HeaderValue::from(ceil_secs(retry_after)));
            (
                StatusCode::TOO_MANY_REQUESTS,
                headers,
                Json(serde_json::json!({ "error": limiter.message })),
            )
                .into_response()
        }
    }
}
