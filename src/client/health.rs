//! Backend reachability and capture availability

use std::fmt;
use std::time::Duration;

use super::backend::Backend;
use super::ClientError;

/// Deadline for a single health probe
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Re-probe cadence while a session is open
pub const HEALTH_PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Network connectivity reported by the environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    Offline,
}

/// Result of the last probe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthStatus {
    pub reachable: bool,
    pub capability_configured: bool,
}

/// What the user can do right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// The environment has no network
    Offline,
    /// The backend did not answer the last probe
    ServerUnreachable,
    /// The backend answers but has no provider credential
    DemoMode,
    /// Capture is enabled
    Ready,
}

impl Availability {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Offline => "Offline",
            Self::ServerUnreachable => "Server nicht erreichbar",
            Self::DemoMode => "Demo-Modus (API-Schlüssel nicht konfiguriert)",
            Self::Ready => "API konfiguriert",
        }
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Tracks connectivity and the last probe outcome
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    connectivity: Connectivity,
    status: HealthStatus,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthMonitor {
    /// Start online with nothing probed yet
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connectivity: Connectivity::Online,
            status: HealthStatus {
                reachable: false,
                capability_configured: false,
            },
        }
    }

    /// Probe the backend and record the result
    ///
    /// Any failure, including a timeout, classifies the backend as unreachable.
    pub async fn probe(&mut self, backend: &dyn Backend) -> HealthStatus {
        let status = match tokio::time::timeout(HEALTH_TIMEOUT, backend.health()).await {
            Ok(Ok(report)) => HealthStatus {
                reachable: true,
                capability_configured: report.capability_configured,
            },
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "health probe failed");
                HealthStatus::default()
            }
            Err(_) => {
                tracing::warn!(timeout = ?HEALTH_TIMEOUT, "health probe timed out");
                HealthStatus::default()
            }
        };

        if status != self.status {
            tracing::info!(
                reachable = status.reachable,
                capability_configured = status.capability_configured,
                "backend health changed"
            );
        }
        self.status = status;
        status
    }

    /// Apply a connectivity event; returns whether a probe is now due
    ///
    /// Going offline disables capture at once without contacting the backend.
    pub fn set_connectivity(&mut self, connectivity: Connectivity) -> bool {
        self.connectivity = connectivity;
        match connectivity {
            Connectivity::Offline => {
                tracing::info!("connectivity lost");
                false
            }
            Connectivity::Online => {
                tracing::info!("connectivity restored");
                true
            }
        }
    }

    /// Record a failed request as unreachable without probing
    pub fn mark_unreachable(&mut self) {
        self.status.reachable = false;
    }

    #[must_use]
    pub const fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    #[must_use]
    pub const fn status(&self) -> HealthStatus {
        self.status
    }

    #[must_use]
    pub const fn availability(&self) -> Availability {
        match self.connectivity {
            Connectivity::Offline => Availability::Offline,
            Connectivity::Online if !self.status.reachable => Availability::ServerUnreachable,
            Connectivity::Online if !self.status.capability_configured => Availability::DemoMode,
            Connectivity::Online => Availability::Ready,
        }
    }

    /// Capture requires online, reachable and configured
    #[must_use]
    pub const fn capture_enabled(&self) -> bool {
        matches!(self.availability(), Availability::Ready)
    }

    /// Error describing why capture is disabled, if it is
    #[must_use]
    pub fn unavailable_reason(&self) -> Option<ClientError> {
        match self.availability() {
            Availability::Ready => None,
            other => Some(ClientError::Unavailable(other.label().to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::client::backend::{Exchange, HealthReport};
    use crate::message::ChatMessage;
    use crate::persona::Persona;

    struct StaticHealth(Result<HealthReport, ClientError>);

    #[async_trait]
    impl Backend for StaticHealth {
        async fn health(&self) -> Result<HealthReport, ClientError> {
            self.0.clone()
        }

        async fn transcribe(&self, _audio: &str) -> Exchange<String> {
            Exchange::failed(ClientError::Network("unused".to_string()))
        }

        async fn chat(&self, _messages: &[ChatMessage], _persona: Persona) -> Exchange<String> {
            Exchange::failed(ClientError::Network("unused".to_string()))
        }
    }

    fn report(configured: bool) -> Result<HealthReport, ClientError> {
        Ok(HealthReport {
            status: "ok".to_string(),
            capability_configured: configured,
            version: None,
        })
    }

    #[tokio::test]
    async fn configured_backend_enables_capture() {
        let mut monitor = HealthMonitor::new();
        assert!(!monitor.capture_enabled());

        monitor.probe(&StaticHealth(report(true))).await;
        assert_eq!(monitor.availability(), Availability::Ready);
        assert!(monitor.capture_enabled());
        assert!(monitor.unavailable_reason().is_none());
    }

    #[tokio::test]
    async fn unconfigured_backend_is_demo_mode() {
        let mut monitor = HealthMonitor::new();
        monitor.probe(&StaticHealth(report(false))).await;
        assert_eq!(monitor.availability(), Availability::DemoMode);
        assert!(!monitor.capture_enabled());
    }

    #[tokio::test]
    async fn failed_probe_is_unreachable() {
        let mut monitor = HealthMonitor::new();
        let status = monitor
            .probe(&StaticHealth(Err(ClientError::Network("refused".to_string()))))
            .await;
        assert_eq!(status, HealthStatus::default());
        assert_eq!(monitor.availability(), Availability::ServerUnreachable);
    }

    #[tokio::test]
    async fn repeated_probes_are_idempotent() {
        let mut monitor = HealthMonitor::new();
        let backend = StaticHealth(report(true));
        let first = monitor.probe(&backend).await;
        let second = monitor.probe(&backend).await;
        assert_eq!(first, second);
        assert_eq!(monitor.availability(), Availability::Ready);
    }

    #[tokio::test]
    async fn offline_disables_capture_until_online() {
        let mut monitor = HealthMonitor::new();
        monitor.probe(&StaticHealth(report(true))).await;

        assert!(!monitor.set_connectivity(Connectivity::Offline));
        assert_eq!(monitor.availability(), Availability::Offline);
        assert!(matches!(
            monitor.unavailable_reason(),
            Some(ClientError::Unavailable(_))
        ));

        assert!(monitor.set_connectivity(Connectivity::Online));
        assert!(monitor.capture_enabled());
    }

    #[tokio::test]
    async fn mark_unreachable_keeps_configuration_flag() {
        let mut monitor = HealthMonitor::new();
        monitor.probe(&StaticHealth(report(true))).await;
        monitor.mark_unreachable();
        assert_eq!(monitor.availability(), Availability::ServerUnreachable);
        assert!(monitor.status().capability_configured);
    }
}
