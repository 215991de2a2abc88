//! Client core for voice conversations
//!
//! Everything a front end needs to run conversation turns against the
//! gateway:
//! - [`settings`]: persisted user preferences
//! - [`rate_limits`]: quota reported by the gateway, per endpoint
//! - [`health`]: reachability and whether capture is possible
//! - [`orchestrator`]: the capture, transcribe, chat and speak pipeline
//!
//! Platform services (microphone, speech output, the HTTP transport) sit
//! behind the [`AudioSource`], [`SpeechSynthesizer`] and [`Backend`] traits.

pub mod audio;
pub mod backend;
mod error;
pub mod health;
pub mod log;
#[cfg(feature = "microphone")]
pub mod microphone;
pub mod orchestrator;
pub mod rate_limits;
pub mod settings;

pub use audio::{AudioSource, FileAudioSource, NoAudio, NoSpeech, SpeechSynthesizer, Utterance};
pub use backend::{
    http_backend_factory, Backend, BackendFactory, Exchange, HealthReport, HttpBackend,
};
pub use error::ClientError;
pub use health::{Availability, Connectivity, HealthMonitor, HealthStatus};
pub use log::{LogBuffer, LogEntry, LogLevel};
#[cfg(feature = "microphone")]
pub use microphone::Microphone;
pub use orchestrator::{AppState, Orchestrator, Status, StatusKind, Turn, TurnState};
pub use rate_limits::{Endpoint, RateLimitState, RateLimitTracker, UsageTier};
pub use settings::{FileStorage, MemoryStorage, Settings, SettingsStorage, SettingsStore};

/// Backend origin used when no override is configured
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:3000";
