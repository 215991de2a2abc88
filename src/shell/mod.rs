//! Mobile shell host logic
//!
//! The shell wraps the web front end in a platform web renderer. This module
//! holds its decisions: which URL to load, which permission prompts to
//! grant, and when to replace a failed load with the fallback page. The
//! renderer itself is reached through [`WebRenderer`].

mod page;

use std::fmt;

pub use page::{escape_html, render_fallback_page, FallbackCause};

use crate::client::{ClientError, LogBuffer, SettingsStorage};

/// Content length inside the app container at or below which a page is blank
pub const MIN_PAGE_CONTENT_LENGTH: usize = 100;

/// Build variant; selects troubleshooting detail on the fallback page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildFlavor {
    Debug,
    Release,
}

/// Build-time shell configuration
#[derive(Debug, Clone)]
pub struct ShellConfig {
    /// Backend origin used without an override
    pub default_url: String,
    pub flavor: BuildFlavor,
    pub version: String,
}

impl ShellConfig {
    #[must_use]
    pub fn new(default_url: impl Into<String>, flavor: BuildFlavor) -> Self {
        Self {
            default_url: default_url.into(),
            flavor,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Main-frame network failure reported by the renderer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    HostLookup,
    Connect,
    Timeout,
    Other { description: String },
}

impl LoadError {
    /// Renderer error code for a failed host lookup
    pub const HOST_LOOKUP_CODE: i32 = -2;
    /// Renderer error code for a refused or failed connection
    pub const CONNECT_CODE: i32 = -6;
    /// Renderer error code for a timed out connection
    pub const TIMEOUT_CODE: i32 = -8;

    /// Classify a renderer error code
    #[must_use]
    pub fn from_code(code: i32, description: impl Into<String>) -> Self {
        match code {
            Self::HOST_LOOKUP_CODE => Self::HostLookup,
            Self::CONNECT_CODE => Self::Connect,
            Self::TIMEOUT_CODE => Self::Timeout,
            _ => Self::Other {
                description: description.into(),
            },
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HostLookup => f.write_str("host lookup failed"),
            Self::Connect => f.write_str("connection failed"),
            Self::Timeout => f.write_str("connection timed out"),
            Self::Other { description } if description.is_empty() => {
                f.write_str("Unbekannter Fehler")
            }
            Self::Other { description } => f.write_str(description),
        }
    }
}

/// Resource a page asks permission for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    AudioCapture,
    VideoCapture,
    ProtectedMedia,
    Midi,
}

/// Answer to a page permission request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionDecision {
    /// Grant every requested resource
    Grant,
    /// Deny and tell the user why
    Deny { notice: &'static str },
    /// Not ours to decide; leave the request untouched
    Ignore,
}

/// Notice shown when the page wants the microphone but the app lacks it
pub const MICROPHONE_REQUIRED: &str = "Mikrofon-Berechtigung erforderlich";

/// Platform web renderer
pub trait WebRenderer {
    fn load_url(&mut self, url: &str);

    fn load_html(&mut self, html: &str);

    fn reload(&mut self);
}

/// Shell state around a [`WebRenderer`]
pub struct WebShell<R: WebRenderer> {
    config: ShellConfig,
    renderer: R,
    preferences: Box<dyn SettingsStorage>,
    logs: LogBuffer,
}

impl<R: WebRenderer> WebShell<R> {
    pub fn new(config: ShellConfig, renderer: R, preferences: Box<dyn SettingsStorage>) -> Self {
        Self {
            config,
            renderer,
            preferences,
            logs: LogBuffer::new(),
        }
    }

    /// Stored override (trimmed) or the build default
    #[must_use]
    pub fn server_url(&self) -> String {
        match self.preferences.read() {
            Ok(Some(url)) if !url.trim().is_empty() => url.trim().to_string(),
            Ok(_) => self.config.default_url.clone(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read backend URL preference");
                self.config.default_url.clone()
            }
        }
    }

    /// Load the front end from the server URL
    pub fn load_app(&mut self) {
        let url = self.server_url();
        self.log_load(&url);
        self.renderer.load_url(&url);
    }

    /// Decide a page permission request
    pub fn on_permission_request(
        &mut self,
        resources: &[Resource],
        microphone_granted: bool,
    ) -> PermissionDecision {
        if !resources.contains(&Resource::AudioCapture) {
            return PermissionDecision::Ignore;
        }
        if microphone_granted {
            self.logs.info("Microphone permission granted to page");
            PermissionDecision::Grant
        } else {
            self.logs.warn("Microphone permission denied to page");
            PermissionDecision::Deny {
                notice: MICROPHONE_REQUIRED,
            }
        }
    }

    /// Handle a network failure; sub-resource failures are ignored
    pub fn on_load_error(&mut self, error: LoadError, main_frame: bool) -> bool {
        if !main_frame {
            return false;
        }
        let url = self.server_url();
        match self.config.flavor {
            BuildFlavor::Debug => self.logs.error(format!("Error loading {url}"), error.to_string()),
            BuildFlavor::Release => self.logs.error("Error loading server", error.to_string()),
        }
        self.show_fallback(&FallbackCause::Network(error));
        true
    }

    /// Handle an HTTP error status; sub-resource failures are ignored
    pub fn on_http_error(&mut self, status: u16, reason: &str, main_frame: bool) -> bool {
        if !main_frame {
            return false;
        }
        let details = format!("{status} {reason}");
        match self.config.flavor {
            BuildFlavor::Debug => {
                let url = self.server_url();
                self.logs.error(format!("HTTP error loading {url}"), details);
            }
            BuildFlavor::Release => self.logs.error("HTTP error loading server", details),
        }
        self.show_fallback(&FallbackCause::Http {
            status,
            reason: reason.to_string(),
        });
        true
    }

    /// Check a finished load for blank content
    ///
    /// `container_len` is the trimmed length of the app container's content,
    /// `None` if the container is missing. Only loads of the server URL are
    /// checked, so the fallback page itself never triggers this.
    pub fn on_page_finished(&mut self, url: &str, container_len: Option<usize>) -> bool {
        if url != self.server_url() {
            return false;
        }
        if container_len.is_some_and(|len| len > MIN_PAGE_CONTENT_LENGTH) {
            self.logs.info("Page loaded");
            return false;
        }
        self.logs.warn("Page loaded but appears blank or incomplete");
        self.show_fallback(&FallbackCause::Blank);
        true
    }

    /// Store a backend URL override and reload
    ///
    /// # Errors
    ///
    /// Returns error if the preference cannot be written
    pub fn save_backend_url(&mut self, url: &str) -> Result<(), ClientError> {
        let url = url.trim();
        if !url.is_empty() {
            url::Url::parse(url)
                .map_err(|e| ClientError::Validation(format!("invalid backend URL: {e}")))?;
        }
        self.preferences.write(url)?;
        self.logs.info("Backend URL changed");
        self.load_app();
        Ok(())
    }

    /// Clear the override and reload from the default URL
    ///
    /// # Errors
    ///
    /// Returns error if the preference cannot be written
    pub fn reset_backend_url(&mut self) -> Result<(), ClientError> {
        self.save_backend_url("")
    }

    /// Retry the last load
    pub fn reload(&mut self) {
        self.renderer.reload();
    }

    #[must_use]
    pub const fn logs(&self) -> &LogBuffer {
        &self.logs
    }

    pub fn clear_logs(&mut self) {
        self.logs.clear();
    }

    #[must_use]
    pub const fn renderer(&self) -> &R {
        &self.renderer
    }

    fn log_load(&mut self, url: &str) {
        match self.config.flavor {
            BuildFlavor::Debug => self.logs.info(format!("Loading {url}")),
            BuildFlavor::Release => self.logs.info("Loading server"),
        }
    }

    fn show_fallback(&mut self, cause: &FallbackCause) {
        let html = render_fallback_page(
            cause,
            self.config.flavor,
            &self.server_url(),
            &self.config.version,
        );
        self.renderer.load_html(&html);
    }
}
