//! Conversation turn pipeline
//!
//! A turn runs capture, transcribe, chat and speak in order. The user message
//! is appended speculatively before the chat request and removed again if
//! the request fails, so a failed turn never leaves an unanswered user
//! message in the history.

use std::future::Future;
use std::time::Duration;

use super::audio::{encode_payload, AudioSource, SpeechSynthesizer, Utterance};
use super::backend::{http_backend_factory, Backend, BackendFactory, Exchange};
use super::health::{Availability, Connectivity, HealthMonitor, HealthStatus};
use super::log::LogBuffer;
use super::rate_limits::{Endpoint, RateLimitTracker};
use super::settings::{Settings, SettingsStore};
use super::{ClientError, DEFAULT_BACKEND_URL};
use crate::message::ChatMessage;
use crate::persona::Persona;

/// Deadline for transcribe and chat requests
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Where the current turn is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Capturing,
    Processing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Info,
    Error,
}

/// User-visible status line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub message: String,
    pub kind: StatusKind,
}

impl Status {
    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: StatusKind::Info,
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: StatusKind::Error,
        }
    }
}

/// A completed turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub transcript: String,
    pub reply: String,
    /// Whether the reply was spoken aloud
    pub spoken: bool,
}

/// Everything the client keeps between turns
pub struct AppState {
    pub settings: SettingsStore,
    pub history: Vec<ChatMessage>,
    pub rate_limits: RateLimitTracker,
    pub logs: LogBuffer,
}

impl AppState {
    #[must_use]
    pub fn new(settings: SettingsStore) -> Self {
        Self {
            settings,
            history: Vec::new(),
            rate_limits: RateLimitTracker::new(),
            logs: LogBuffer::new(),
        }
    }

    /// Drop session state; persisted settings are kept
    pub fn reset(&mut self) {
        self.history.clear();
        self.rate_limits.clear();
        self.logs.clear();
    }
}

/// Drives conversation turns against a [`Backend`]
pub struct Orchestrator {
    state: AppState,
    backend: Box<dyn Backend>,
    connect: BackendFactory,
    monitor: HealthMonitor,
    microphone_denied: bool,
    audio: Box<dyn AudioSource>,
    speech: Box<dyn SpeechSynthesizer>,
    turn_state: TurnState,
    status: Status,
    request_timeout: Duration,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        state: AppState,
        backend: Box<dyn Backend>,
        audio: Box<dyn AudioSource>,
        speech: Box<dyn SpeechSynthesizer>,
    ) -> Self {
        Self {
            state,
            backend,
            connect: http_backend_factory(),
            monitor: HealthMonitor::new(),
            microphone_denied: false,
            audio,
            speech,
            turn_state: TurnState::Idle,
            status: Status::info(""),
            request_timeout: REQUEST_TIMEOUT,
        }
    }

    /// Override the transcribe/chat deadline
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Override how a backend is built when the endpoint setting changes
    #[must_use]
    pub fn with_backend_factory(mut self, connect: BackendFactory) -> Self {
        self.connect = connect;
        self
    }

    /// Probe the backend once at startup
    pub async fn startup(&mut self) -> Availability {
        self.state.logs.info("App started");
        self.probe().await;
        self.availability()
    }

    /// Re-probe the backend and refresh the status line
    pub async fn probe(&mut self) -> HealthStatus {
        let status = self.monitor.probe(self.backend.as_ref()).await;
        self.refresh_availability_status();
        status
    }

    /// Wait for `done`, re-probing the backend every `every` meanwhile
    ///
    /// The status line only changes when the availability does.
    pub async fn probe_while<F: Future>(&mut self, every: Duration, done: F) -> F::Output {
        tokio::pin!(done);
        let mut ticks = tokio::time::interval(every);
        ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticks.tick().await;

        loop {
            tokio::select! {
                output = &mut done => return output,
                _ = ticks.tick() => {
                    let before = self.availability();
                    self.monitor.probe(self.backend.as_ref()).await;
                    if self.availability() != before {
                        self.refresh_availability_status();
                    }
                }
            }
        }
    }

    /// Begin recording a turn
    ///
    /// # Errors
    ///
    /// Returns `Busy` if a turn is in progress, `Unavailable` if capture is
    /// disabled and `Permission` if the microphone is or was denied
    pub async fn start_capture(&mut self) -> Result<(), ClientError> {
        if self.turn_state != TurnState::Idle {
            return Err(ClientError::Busy);
        }
        if self.microphone_denied {
            self.status = Status::error("Mikrofon-Zugriff verweigert");
            return Err(ClientError::Permission(
                "microphone access was denied".to_string(),
            ));
        }
        if let Some(e) = self.monitor.unavailable_reason() {
            self.status = Status::error(self.availability().label());
            return Err(e);
        }

        if let Err(e) = self.audio.acquire().await {
            self.audio.release();
            let headline = if matches!(e, ClientError::Permission(_)) {
                self.microphone_denied = true;
                "Mikrofon-Zugriff verweigert"
            } else {
                "Fehler beim Aufnehmen"
            };
            return Err(self.fail(headline, e));
        }

        self.turn_state = TurnState::Capturing;
        self.status = Status::info("Aufnahme läuft...");
        self.state.logs.info("Recording started");
        Ok(())
    }

    /// Finish recording and run the rest of the turn
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error; the history is left as it was
    /// before the turn
    pub async fn stop_capture(&mut self) -> Result<Turn, ClientError> {
        if self.turn_state != TurnState::Capturing {
            return Err(ClientError::NotCapturing);
        }

        let audio = match self.audio.finish().await {
            Ok(audio) => audio,
            Err(e) => {
                self.audio.release();
                return Err(self.fail("Verarbeitungsfehler", e));
            }
        };
        self.turn_state = TurnState::Processing;
        self.status = Status::info("Verarbeite Audio...");
        self.state.logs.info(format!("Recording finished ({} bytes)", audio.len()));

        let transcript = self.transcribe(&encode_payload(&audio)).await?;
        let persona = self.state.settings.get().persona;
        let reply = self.request_reply(&transcript, persona).await?;
        let spoken = self.speak(&reply).await;

        self.turn_state = TurnState::Idle;
        self.status = Status::info("Bereit");
        Ok(Turn {
            transcript,
            reply,
            spoken,
        })
    }

    /// Transcribe an encoded recording
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails or returns no text
    pub async fn transcribe(&mut self, payload: &str) -> Result<String, ClientError> {
        self.status = Status::info("Transkribiere...");
        let exchange = with_timeout(self.request_timeout, self.backend.transcribe(payload)).await;
        self.record_quota(Endpoint::Transcribe, &exchange);

        match exchange.outcome {
            Ok(text) => {
                self.state.logs.info(format!("Transcription: {text}"));
                Ok(text)
            }
            Err(e) => Err(self.fail("Transkription fehlgeschlagen", e)),
        }
    }

    /// Ask for a reply to `text`, growing the history by one exchange
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails; the user message is rolled back
    pub async fn request_reply(
        &mut self,
        text: &str,
        persona: Persona,
    ) -> Result<String, ClientError> {
        if text.trim().is_empty() {
            return Err(self.fail(
                "Chat fehlgeschlagen",
                ClientError::Validation("empty message".to_string()),
            ));
        }

        self.status = Status::info("KI antwortet...");
        self.state.history.push(ChatMessage::user(text));

        let exchange = with_timeout(
            self.request_timeout,
            self.backend.chat(&self.state.history, persona),
        )
        .await;
        self.record_quota(Endpoint::Chat, &exchange);

        match exchange.outcome {
            Ok(reply) => {
                self.state.history.push(ChatMessage::assistant(reply.clone()));
                self.state.logs.info(format!("AI response: {reply}"));
                Ok(reply)
            }
            Err(e) => {
                self.state.history.pop();
                Err(self.fail("Chat fehlgeschlagen", e))
            }
        }
    }

    /// Speak a reply if autoplay is on; returns whether it was spoken
    ///
    /// Never fails: synthesis problems are logged and skipped.
    pub async fn speak(&mut self, text: &str) -> bool {
        let settings = self.state.settings.get();
        if !settings.autoplay_reply {
            return false;
        }
        if !self.speech.is_available() {
            self.state.logs.warn("Speech synthesis not available");
            return false;
        }

        let utterance = Utterance::new(text, settings.speech_rate, settings.speech_pitch);
        self.status = Status::info("Spreche Antwort...");
        match self.speech.speak(&utterance).await {
            Ok(()) => true,
            Err(e) => {
                self.state.logs.warn(format!("Speech synthesis failed: {e}"));
                false
            }
        }
    }

    /// Apply an online/offline event
    pub async fn on_connectivity(&mut self, connectivity: Connectivity) -> Availability {
        let probe_due = self.monitor.set_connectivity(connectivity);
        match connectivity {
            Connectivity::Offline => {
                self.state.logs.warn("Network offline");
                if self.turn_state == TurnState::Capturing {
                    self.audio.release();
                    self.turn_state = TurnState::Idle;
                }
            }
            Connectivity::Online => self.state.logs.info("Network online"),
        }

        if probe_due {
            self.probe().await;
        } else {
            self.refresh_availability_status();
        }
        self.availability()
    }

    /// Allow capture again after the user re-granted microphone access
    pub fn retry_microphone(&mut self) {
        if self.microphone_denied {
            self.microphone_denied = false;
            self.state.logs.info("Microphone retry requested");
            self.refresh_availability_status();
        }
    }

    /// Persist new settings; returns whether the backend endpoint changed
    ///
    /// A changed endpoint replaces the backend in use and probes it.
    ///
    /// # Errors
    ///
    /// Returns error if the new endpoint is invalid or the settings cannot be
    /// written; nothing is changed in either case
    pub async fn save_settings(&mut self, settings: Settings) -> Result<bool, ClientError> {
        let settings = settings.normalized();
        let origin = settings.backend_url(DEFAULT_BACKEND_URL).to_string();
        let changed = origin != self.state.settings.get().backend_url(DEFAULT_BACKEND_URL);

        let backend = if changed {
            match (self.connect)(&origin) {
                Ok(backend) => Some(backend),
                Err(e) => {
                    self.state.logs.error("Invalid backend URL", e.to_string());
                    self.status = Status::error("Ungültige Server-URL");
                    return Err(e);
                }
            }
        } else {
            None
        };

        if let Err(e) = self.state.settings.save(settings) {
            self.state.logs.error("Failed to save settings", e.to_string());
            self.status = Status::error("Fehler beim Speichern der Einstellungen");
            return Err(e);
        }

        match backend {
            Some(backend) => {
                self.switch_backend(backend, &origin).await;
            }
            None => self.status = Status::info("Einstellungen gespeichert"),
        }
        Ok(changed)
    }

    /// Restore default settings; returns whether the backend endpoint changed
    ///
    /// # Errors
    ///
    /// Returns error if the settings cannot be written
    pub async fn reset_settings(&mut self) -> Result<bool, ClientError> {
        let changed = self.save_settings(Settings::default()).await?;
        self.status = Status::info("Einstellungen zurückgesetzt");
        Ok(changed)
    }

    pub fn clear_history(&mut self) {
        self.state.history.clear();
        self.state.logs.info("Chat cleared");
        self.status = Status::info("Chat gelöscht");
    }

    #[must_use]
    pub const fn state(&self) -> &AppState {
        &self.state
    }

    #[must_use]
    pub fn history(&self) -> &[ChatMessage] {
        &self.state.history
    }

    #[must_use]
    pub const fn status(&self) -> &Status {
        &self.status
    }

    #[must_use]
    pub const fn turn_state(&self) -> TurnState {
        self.turn_state
    }

    #[must_use]
    pub const fn availability(&self) -> Availability {
        self.monitor.availability()
    }

    /// Capture needs an available backend and a microphone not denied
    #[must_use]
    pub const fn capture_enabled(&self) -> bool {
        self.monitor.capture_enabled() && !self.microphone_denied
    }

    /// Point at a different backend and re-probe it
    async fn switch_backend(&mut self, backend: Box<dyn Backend>, origin: &str) -> HealthStatus {
        self.backend = backend;
        self.state.rate_limits.clear();
        self.state.logs.info(format!("Backend changed to {origin}"));
        self.probe().await
    }

    fn record_quota<T>(&mut self, endpoint: Endpoint, exchange: &Exchange<T>) {
        if let Some(quota) = exchange.quota {
            self.state.rate_limits.record(endpoint, quota);
        }
    }

    fn refresh_availability_status(&mut self) {
        self.status = match self.availability() {
            Availability::Ready => Status::info("Bereit zum Aufnehmen"),
            other => Status::error(other.label()),
        };
    }

    /// Record a failure, return to idle and hand the error back
    fn fail(&mut self, headline: &str, error: ClientError) -> ClientError {
        self.state.logs.error(headline, error.to_string());
        if error.affects_availability() {
            self.monitor.mark_unreachable();
        }
        self.status = Status::error(headline);
        self.turn_state = TurnState::Idle;
        error
    }
}

async fn with_timeout<T>(
    timeout: Duration,
    request: impl Future<Output = Exchange<T>>,
) -> Exchange<T> {
    tokio::time::timeout(timeout, request)
        .await
        .unwrap_or_else(|_| Exchange::failed(ClientError::Timeout(timeout)))
}
