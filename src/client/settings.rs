//! User preferences and their persistence
//!
//! Settings are stored as one JSON record. Loading merges stored values over
//! the defaults field by field: a missing or unreadable field keeps its
//! default without discarding the others.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ClientError;
use crate::persona::Persona;

/// Slowest and lowest speech rate/pitch
pub const SPEECH_MIN: f32 = 0.5;

/// Fastest and highest speech rate/pitch
pub const SPEECH_MAX: f32 = 2.0;

/// User preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Speech synthesis rate multiplier
    #[serde(rename = "ttsSpeed")]
    pub speech_rate: f32,

    /// Speech synthesis pitch multiplier
    #[serde(rename = "ttsPitch")]
    pub speech_pitch: f32,

    /// Persona used for new turns
    #[serde(rename = "defaultPersona")]
    pub persona: Persona,

    /// Speak replies automatically
    #[serde(rename = "autoPlayTTS")]
    pub autoplay_reply: bool,

    /// Backend origin override; empty means the default origin
    #[serde(rename = "backendUrl")]
    pub backend_endpoint: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            speech_rate: 1.0,
            speech_pitch: 1.0,
            persona: Persona::General,
            autoplay_reply: true,
            backend_endpoint: String::new(),
        }
    }
}

impl Settings {
    /// Merge a stored record over the defaults, field by field
    #[must_use]
    pub fn merged_over_defaults(stored: &Map<String, Value>) -> Self {
        fn field<T: serde::de::DeserializeOwned>(stored: &Map<String, Value>, key: &str) -> Option<T> {
            stored
                .get(key)
                .and_then(|v| serde_json::from_value(v.clone()).ok())
        }

        let defaults = Self::default();
        Self {
            speech_rate: field(stored, "ttsSpeed").unwrap_or(defaults.speech_rate),
            speech_pitch: field(stored, "ttsPitch").unwrap_or(defaults.speech_pitch),
            persona: field(stored, "defaultPersona").unwrap_or(defaults.persona),
            autoplay_reply: field(stored, "autoPlayTTS").unwrap_or(defaults.autoplay_reply),
            backend_endpoint: field(stored, "backendUrl").unwrap_or(defaults.backend_endpoint),
        }
        .normalized()
    }

    /// Clamp rate and pitch into range and trim the endpoint
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.speech_rate = clamp_speech(self.speech_rate, 1.0);
        self.speech_pitch = clamp_speech(self.speech_pitch, 1.0);
        self.backend_endpoint = self.backend_endpoint.trim().to_string();
        self
    }

    /// Backend origin to use: the override if set, else `default_origin`
    #[must_use]
    pub fn backend_url<'a>(&'a self, default_origin: &'a str) -> &'a str {
        if self.backend_endpoint.is_empty() {
            default_origin
        } else {
            &self.backend_endpoint
        }
    }
}

fn clamp_speech(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(SPEECH_MIN, SPEECH_MAX)
    } else {
        fallback
    }
}

/// Durable storage for the settings record
pub trait SettingsStorage: Send + Sync {
    /// Read the raw record, `None` if nothing was stored yet
    ///
    /// # Errors
    ///
    /// Returns error if the storage cannot be read
    fn read(&self) -> Result<Option<String>, ClientError>;

    /// Replace the stored record
    ///
    /// # Errors
    ///
    /// Returns error if the storage cannot be written
    fn write(&self, record: &str) -> Result<(), ClientError>;
}

/// Settings stored in a JSON file
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location: `<config dir>/euaitalk/settings.json`
    #[must_use]
    pub fn default_path() -> PathBuf {
        directories::BaseDirs::new().map_or_else(
            || PathBuf::from(".config/euaitalk/settings.json"),
            |d| d.config_dir().join("euaitalk").join("settings.json"),
        )
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStorage for FileStorage {
    fn read(&self) -> Result<Option<String>, ClientError> {
        match std::fs::read_to_string(&self.path) {
            Ok(record) => Ok(Some(record)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ClientError::Storage(format!(
                "failed to read {}: {e}",
                self.path.display()
            ))),
        }
    }

    fn write(&self, record: &str) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ClientError::Storage(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        std::fs::write(&self.path, record).map_err(|e| {
            ClientError::Storage(format!("failed to write {}: {e}", self.path.display()))
        })
    }
}

/// Settings held in memory only
#[derive(Debug, Default)]
pub struct MemoryStorage {
    record: Mutex<Option<String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing raw record
    #[must_use]
    pub fn with_record(record: impl Into<String>) -> Self {
        Self {
            record: Mutex::new(Some(record.into())),
        }
    }
}

impl SettingsStorage for MemoryStorage {
    fn read(&self) -> Result<Option<String>, ClientError> {
        self.record
            .lock()
            .map(|r| r.clone())
            .map_err(|_| ClientError::Storage("settings lock poisoned".to_string()))
    }

    fn write(&self, record: &str) -> Result<(), ClientError> {
        let mut slot = self
            .record
            .lock()
            .map_err(|_| ClientError::Storage("settings lock poisoned".to_string()))?;
        *slot = Some(record.to_string());
        Ok(())
    }
}

/// Current settings plus the storage they persist to
pub struct SettingsStore {
    storage: Box<dyn SettingsStorage>,
    current: Settings,
}

impl SettingsStore {
    /// Load settings, falling back to defaults on unreadable storage
    #[must_use]
    pub fn load(storage: Box<dyn SettingsStorage>) -> Self {
        let current = match storage.read() {
            Ok(Some(record)) => match serde_json::from_str::<Value>(&record) {
                Ok(Value::Object(stored)) => Settings::merged_over_defaults(&stored),
                Ok(_) => {
                    tracing::warn!("stored settings are not an object, using defaults");
                    Settings::default()
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to parse stored settings, using defaults");
                    Settings::default()
                }
            },
            Ok(None) => Settings::default(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to load settings, using defaults");
                Settings::default()
            }
        };

        Self { storage, current }
    }

    /// Current settings
    #[must_use]
    pub const fn get(&self) -> &Settings {
        &self.current
    }

    /// Normalize, persist and adopt new settings
    ///
    /// # Errors
    ///
    /// Returns error if the record cannot be written; current settings are
    /// left unchanged in that case
    pub fn save(&mut self, settings: Settings) -> Result<(), ClientError> {
        let settings = settings.normalized();
        let record = serde_json::to_string(&settings)
            .map_err(|e| ClientError::Storage(format!("failed to encode settings: {e}")))?;
        self.storage.write(&record)?;
        tracing::debug!(?settings, "settings saved");
        self.current = settings;
        Ok(())
    }

    /// Restore and persist the defaults
    ///
    /// # Errors
    ///
    /// Returns error if the record cannot be written
    pub fn reset(&mut self) -> Result<(), ClientError> {
        self.save(Settings::default())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn object(value: &Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let merged = Settings::merged_over_defaults(&object(&json!({"ttsSpeed": 1.5})));
        assert!((merged.speech_rate - 1.5).abs() < f32::EPSILON);
        assert!((merged.speech_pitch - 1.0).abs() < f32::EPSILON);
        assert_eq!(merged.persona, Persona::General);
        assert!(merged.autoplay_reply);
        assert!(merged.backend_endpoint.is_empty());
    }

    #[test]
    fn invalid_field_does_not_discard_others() {
        let merged = Settings::merged_over_defaults(&object(&json!({
            "ttsSpeed": "fast",
            "defaultPersona": "pirate",
            "autoPlayTTS": false,
            "backendUrl": "  http://192.168.1.100:3000  "
        })));
        assert!((merged.speech_rate - 1.0).abs() < f32::EPSILON);
        assert_eq!(merged.persona, Persona::General);
        assert!(!merged.autoplay_reply);
        assert_eq!(merged.backend_endpoint, "http://192.168.1.100:3000");
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let settings = Settings {
            speech_rate: 5.0,
            speech_pitch: 0.1,
            ..Settings::default()
        }
        .normalized();
        assert!((settings.speech_rate - SPEECH_MAX).abs() < f32::EPSILON);
        assert!((settings.speech_pitch - SPEECH_MIN).abs() < f32::EPSILON);
    }

    #[test]
    fn backend_url_prefers_override() {
        let mut settings = Settings::default();
        assert_eq!(settings.backend_url("http://localhost:3000"), "http://localhost:3000");
        settings.backend_endpoint = "http://192.168.1.100:3000".to_string();
        assert_eq!(
            settings.backend_url("http://localhost:3000"),
            "http://192.168.1.100:3000"
        );
    }

    #[test]
    fn save_then_load_round_trips() {
        let storage = std::sync::Arc::new(MemoryStorage::new());
        let mut store = SettingsStore::load(Box::new(SharedStorage(storage.clone())));
        let custom = Settings {
            speech_rate: 1.3,
            speech_pitch: 0.8,
            persona: Persona::Bible,
            autoplay_reply: false,
            backend_endpoint: "http://10.0.2.2:3000".to_string(),
        };
        store.save(custom.clone()).unwrap();

        let reloaded = SettingsStore::load(Box::new(SharedStorage(storage)));
        assert_eq!(reloaded.get(), &custom);
    }

    #[test]
    fn reset_persists_defaults() {
        let storage = std::sync::Arc::new(MemoryStorage::with_record(
            r#"{"ttsSpeed":1.8,"defaultPersona":"comedian"}"#,
        ));
        let mut store = SettingsStore::load(Box::new(SharedStorage(storage.clone())));
        assert_eq!(store.get().persona, Persona::Comedian);

        store.reset().unwrap();
        assert_eq!(store.get(), &Settings::default());
        let reloaded = SettingsStore::load(Box::new(SharedStorage(storage)));
        assert_eq!(reloaded.get(), &Settings::default());
    }

    #[test]
    fn corrupt_record_loads_defaults() {
        let store = SettingsStore::load(Box::new(MemoryStorage::with_record("{oops")));
        assert_eq!(store.get(), &Settings::default());
        let store = SettingsStore::load(Box::new(MemoryStorage::with_record("[1,2]")));
        assert_eq!(store.get(), &Settings::default());
    }

    #[test]
    fn persisted_record_uses_camel_case_keys() {
        let record = serde_json::to_value(Settings::default()).unwrap();
        for key in ["ttsSpeed", "ttsPitch", "defaultPersona", "autoPlayTTS", "backendUrl"] {
            assert!(record.get(key).is_some(), "missing {key}");
        }
        assert_eq!(record["defaultPersona"], "general");
    }

    /// Storage shared between two stores, standing in for a process restart
    struct SharedStorage(std::sync::Arc<MemoryStorage>);

    impl SettingsStorage for SharedStorage {
        fn read(&self) -> Result<Option<String>, ClientError> {
            self.0.read()
        }

        fn write(&self, record: &str) -> Result<(), ClientError> {
            self.0.write(record)
        }
    }
}
