//! Tracking of the backend's rate limit headers
//!
//! State is only ever taken from what the server reports; the client never
//! predicts usage on its own.

use std::collections::BTreeMap;
use std::fmt;

use reqwest::header::HeaderMap;
use serde::Serialize;

/// Header carrying the request ceiling
pub const LIMIT_HEADER: &str = "ratelimit-limit";

/// Header carrying the requests left in the window
pub const REMAINING_HEADER: &str = "ratelimit-remaining";

/// Header carrying seconds until the window resets
pub const RESET_HEADER: &str = "ratelimit-reset";

/// Backend endpoint whose quota is tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Endpoint {
    Transcribe,
    Chat,
}

impl Endpoint {
    pub const ALL: [Self; 2] = [Self::Transcribe, Self::Chat];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Transcribe => "transcribe",
            Self::Chat => "chat",
        }
    }

    /// Short label for indicators
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Transcribe => "STT",
            Self::Chat => "Chat",
        }
    }
}

/// Usage severity derived from the consumed share of the quota
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageTier {
    /// Below 70% used
    Nominal,
    /// 70% up to (excluding) 90% used
    Warning,
    /// 90% or more used
    Critical,
}

impl UsageTier {
    /// Classify a usage percentage; boundaries belong to the higher tier
    #[must_use]
    pub fn from_percent(percent: f64) -> Self {
        if percent >= 90.0 {
            Self::Critical
        } else if percent >= 70.0 {
            Self::Warning
        } else {
            Self::Nominal
        }
    }

    /// Indicator color
    #[must_use]
    pub const fn color(self) -> &'static str {
        match self {
            Self::Nominal => "#4caf50",
            Self::Warning => "#ffc107",
            Self::Critical => "#f44336",
        }
    }
}

/// Quota reported for one endpoint; all zero means "no data"
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RateLimitState {
    pub limit: u32,
    pub remaining: u32,
    pub reset: u64,
}

impl RateLimitState {
    /// Parse the quota headers; `None` unless both limit and remaining parse
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        fn number<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
        }

        Some(Self {
            limit: number(headers, LIMIT_HEADER)?,
            remaining: number(headers, REMAINING_HEADER)?,
            reset: number(headers, RESET_HEADER).unwrap_or(0),
        })
    }

    #[must_use]
    pub const fn has_data(&self) -> bool {
        self.limit > 0
    }

    /// Consumed share of the quota in percent
    #[must_use]
    pub fn usage_percent(&self) -> Option<f64> {
        if !self.has_data() {
            return None;
        }
        let used = self.limit.saturating_sub(self.remaining);
        Some(f64::from(used) / f64::from(self.limit) * 100.0)
    }

    #[must_use]
    pub fn tier(&self) -> Option<UsageTier> {
        self.usage_percent().map(UsageTier::from_percent)
    }
}

/// Display data for one endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Indicator {
    pub endpoint: Endpoint,
    pub tier: UsageTier,
    pub remaining: u32,
    pub limit: u32,
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}/{}",
            self.endpoint.label(),
            self.remaining,
            self.limit
        )
    }
}

/// Latest quota per endpoint
#[derive(Debug, Clone, Default)]
pub struct RateLimitTracker {
    states: BTreeMap<Endpoint, RateLimitState>,
}

impl RateLimitTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the state for `endpoint`
    pub fn record(&mut self, endpoint: Endpoint, state: RateLimitState) {
        tracing::debug!(
            endpoint = endpoint.name(),
            limit = state.limit,
            remaining = state.remaining,
            "rate limit updated"
        );
        self.states.insert(endpoint, state);
    }

    /// Update from response headers; absent headers leave prior state untouched
    pub fn update_from_headers(&mut self, endpoint: Endpoint, headers: &HeaderMap) -> bool {
        match RateLimitState::from_headers(headers) {
            Some(state) => {
                self.record(endpoint, state);
                true
            }
            None => false,
        }
    }

    /// State for `endpoint`, zero if nothing was reported yet
    #[must_use]
    pub fn get(&self, endpoint: Endpoint) -> RateLimitState {
        self.states.get(&endpoint).copied().unwrap_or_default()
    }

    /// Indicators for endpoints with data
    #[must_use]
    pub fn indicators(&self) -> Vec<Indicator> {
        Endpoint::ALL
            .into_iter()
            .filter_map(|endpoint| {
                let state = self.get(endpoint);
                state.tier().map(|tier| Indicator {
                    endpoint,
                    tier,
                    remaining: state.remaining,
                    limit: state.limit,
                })
            })
            .collect()
    }

    /// Forget all reported state
    pub fn clear(&mut self) {
        self.states.clear();
    }
}
