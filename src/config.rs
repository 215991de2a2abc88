//! Deployment configuration for the EuAiTalk gateway
//!
//! All settings come from the process environment. The three upstream
//! settings are mandatory: the gateway refuses to start when any of them is
//! missing or still carries the value shipped in `.env.example`.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::Result;

/// Service credential for the upstream provider
pub const API_KEY_VAR: &str = "SCALEWAY_API_KEY";

/// Speech-to-text endpoint URL
pub const STT_ENDPOINT_VAR: &str = "SCALEWAY_STT_ENDPOINT";

/// Chat completion endpoint URL
pub const CHAT_ENDPOINT_VAR: &str = "SCALEWAY_CHAT_ENDPOINT";

/// Variables that must be set before the gateway starts
pub const REQUIRED_VARS: [&str; 3] = [API_KEY_VAR, STT_ENDPOINT_VAR, CHAT_ENDPOINT_VAR];

/// Value of `SCALEWAY_API_KEY` in `.env.example`
pub const API_KEY_PLACEHOLDER: &str = "your_scaleway_api_key_here";

/// Default speech-to-text model
pub const DEFAULT_STT_MODEL: &str = "whisper-large-v3";

/// Default chat completion model
pub const DEFAULT_CHAT_MODEL: &str = "mistral-nemo-instruct-2407";

/// Default listening port
pub const DEFAULT_PORT: u16 = 3000;

/// Timeout applied to every upstream request
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Known placeholder value for a required variable
fn placeholder_for(var: &str) -> Option<&'static str> {
    match var {
        API_KEY_VAR => Some(API_KEY_PLACEHOLDER),
        _ => None,
    }
}

/// Whether a credential can actually be used against the provider
#[must_use]
pub fn is_capability_configured(api_key: Option<&str>) -> bool {
    api_key.is_some_and(|key| !key.is_empty() && key != API_KEY_PLACEHOLDER)
}

/// Required variables that are absent or still placeholders
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissingSettings {
    pub missing: Vec<String>,
    pub placeholder: Vec<String>,
}

impl MissingSettings {
    /// True when nothing is missing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.placeholder.is_empty()
    }
}

impl fmt::Display for MissingSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "required environment variables are not properly configured")?;
        if !self.missing.is_empty() {
            writeln!(f, "missing variables:")?;
            for name in &self.missing {
                writeln!(f, "  - {name}")?;
            }
        }
        if !self.placeholder.is_empty() {
            writeln!(f, "placeholder values detected (need real values):")?;
            for name in &self.placeholder {
                writeln!(f, "  - {name}")?;
            }
        }
        write!(
            f,
            "copy .env.example to .env and configure all required variables"
        )
    }
}

impl std::error::Error for MissingSettings {}

/// Check every required variable and report all problems at once
///
/// # Errors
///
/// Returns [`MissingSettings`] naming each absent, empty, or placeholder variable
pub fn validate_required_settings<F>(lookup: F) -> std::result::Result<(), MissingSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let mut report = MissingSettings::default();

    for var in REQUIRED_VARS {
        match lookup(var) {
            None => report.missing.push(var.to_string()),
            Some(value) if value.is_empty() => report.missing.push(var.to_string()),
            Some(value) if placeholder_for(var) == Some(value.as_str()) => {
                report.placeholder.push(var.to_string());
            }
            Some(_) => {}
        }
    }

    if report.is_empty() {
        Ok(())
    } else {
        Err(report)
    }
}

/// Upstream provider settings
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Bearer credential, never exposed to callers
    pub api_key: SecretString,

    /// Speech-to-text endpoint URL
    pub stt_endpoint: String,

    /// Chat completion endpoint URL
    pub chat_endpoint: String,

    /// Speech-to-text model identifier
    pub stt_model: String,

    /// Chat completion model identifier
    pub chat_model: String,

    /// Per-request timeout
    pub timeout: Duration,
}

impl UpstreamConfig {
    /// Build upstream settings with default models and timeout
    #[must_use]
    pub fn new(api_key: &str, stt_endpoint: &str, chat_endpoint: &str) -> Self {
        Self {
            api_key: SecretString::from(api_key.to_string()),
            stt_endpoint: stt_endpoint.to_string(),
            chat_endpoint: chat_endpoint.to_string(),
            stt_model: DEFAULT_STT_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            timeout: UPSTREAM_TIMEOUT,
        }
    }

    /// Whether the credential is real (not absent, not the placeholder)
    #[must_use]
    pub fn capability_configured(&self) -> bool {
        is_capability_configured(Some(self.api_key.expose_secret()))
    }
}

/// Request ceilings per client address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Rolling window length
    pub window: Duration,

    /// Ceiling for `/api/*` routes
    pub api_max: u32,

    /// Ceiling for static routes
    pub static_max: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(15 * 60),
            api_max: 100,
            static_max: 1000,
        }
    }
}

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Upstream provider settings
    pub upstream: UpstreamConfig,

    /// Port to listen on
    pub port: u16,

    /// Directory holding the web app shell (`index.html` and assets)
    pub static_dir: Option<PathBuf>,

    /// Per-client request ceilings
    pub rate_limits: RateLimitConfig,
}

impl Config {
    /// Load configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns error if required variables are missing or placeholders, or
    /// if an optional variable is malformed
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// # Errors
    ///
    /// Returns error if required variables are missing or placeholders, or
    /// if an optional variable is malformed
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        validate_required_settings(&lookup)?;

        let required = |name: &str| lookup(name).unwrap_or_default();
        let mut upstream = UpstreamConfig::new(
            &required(API_KEY_VAR),
            &required(STT_ENDPOINT_VAR),
            &required(CHAT_ENDPOINT_VAR),
        );
        if let Some(model) = lookup("SCALEWAY_STT_MODEL").filter(|m| !m.is_empty()) {
            upstream.stt_model = model;
        }
        if let Some(model) = lookup("SCALEWAY_CHAT_MODEL").filter(|m| !m.is_empty()) {
            upstream.chat_model = model;
        }

        let port = match lookup("PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|e| crate::Error::Config(format!("invalid PORT {raw:?}: {e}")))?,
            None => DEFAULT_PORT,
        };

        let static_dir = lookup("EUAITALK_STATIC_DIR")
            .map(PathBuf::from)
            .or_else(|| Some(PathBuf::from("public")).filter(|p| p.is_dir()));

        tracing::info!("all required environment variables are configured");

        Ok(Self {
            upstream,
            port,
            static_dir,
            rate_limits: RateLimitConfig::default(),
        })
    }
}
