//! In-app log buffer
//!
//! Keeps the most recent entries for display in a log viewer. Every entry
//! is also emitted through `tracing`.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Local, Utc};
use serde::Serialize;

/// Default number of retained entries
pub const LOG_CAPACITY: usize = 100;

/// Severity of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        })
    }
}

/// A single log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Bounded ring of log entries; the oldest entry is evicted on overflow
#[derive(Debug, Clone)]
pub struct LogBuffer {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LogBuffer {
    /// Create a buffer holding [`LOG_CAPACITY`] entries
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(LOG_CAPACITY)
    }

    /// Create a buffer holding `capacity` entries (at least one)
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry
    pub fn push(&mut self, level: LogLevel, message: impl Into<String>, details: Option<String>) {
        let message = message.into();
        match level {
            LogLevel::Info => tracing::info!(details = ?details, "{message}"),
            LogLevel::Warn => tracing::warn!(details = ?details, "{message}"),
            LogLevel::Error => tracing::error!(details = ?details, "{message}"),
        }

        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry {
            timestamp: Utc::now(),
            level,
            message,
            details,
        });
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Info, message, None);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Warn, message, None);
    }

    pub fn error(&mut self, message: impl Into<String>, details: impl Into<String>) {
        self.push(LogLevel::Error, message, Some(details.into()));
    }

    /// Entries from oldest to newest
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Render as `[HH:MM:SS] LEVEL: message` lines in local time
    #[must_use]
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|entry| {
                let time = entry.timestamp.with_timezone(&Local).format("%H:%M:%S");
                match &entry.details {
                    Some(details) => {
                        format!("[{time}] {}: {} ({details})\n", entry.level, entry.message)
                    }
                    None => format!("[{time}] {}: {}\n", entry.level, entry.message),
                }
            })
            .collect()
    }
}
