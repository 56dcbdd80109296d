//! Chat settings: the API key and sampling temperature, persisted as one
//! record under a fixed key.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

pub const SETTINGS_KEY: &str = "chatSettings";
pub const DEFAULT_TEMPERATURE: f64 = 1.3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub api_key: String,
    pub temperature: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !self.temperature.is_finite() || self.temperature <= 0.0 {
            return Err(SettingsError::InvalidTemperature(self.temperature));
        }
        Ok(())
    }

    pub fn has_credential(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("temperature must be a positive number, got {0}")]
    InvalidTemperature(f64),

    #[error("settings io error: {0}")]
    Io(String),

    #[error("settings record is corrupt: {0}")]
    Corrupt(String),
}

impl From<std::io::Error> for SettingsError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// One persistence slot for the settings record.
#[async_trait]
pub trait SettingsBackend: Send + Sync {
    async fn read(&self) -> Result<Option<Settings>, SettingsError>;
    async fn write(&self, settings: &Settings) -> Result<(), SettingsError>;
}

/// JSON key-value file; the record sits under [`SETTINGS_KEY`] and other keys
/// are left untouched.
pub struct FileSettingsBackend {
    path: PathBuf,
}

impl FileSettingsBackend {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    async fn read_map(
        &self,
    ) -> Result<Option<serde_json::Map<String, serde_json::Value>>, SettingsError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let value: serde_json::Value = serde_json::from_str(&contents)
            .map_err(|e| SettingsError::Corrupt(format!("{}: {e}", self.path.display())))?;
        match value {
            serde_json::Value::Object(map) => Ok(Some(map)),
            other => Err(SettingsError::Corrupt(format!(
                "{}: expected a JSON object, got {other}",
                self.path.display()
            ))),
        }
    }
}

#[async_trait]
impl SettingsBackend for FileSettingsBackend {
    #[tracing::instrument(level = "debug", skip_all, fields(path = %self.path.display()))]
    async fn read(&self) -> Result<Option<Settings>, SettingsError> {
        let Some(map) = self.read_map().await? else {
            return Ok(None);
        };
        decode_record(map.get(SETTINGS_KEY))
    }

    #[tracing::instrument(level = "debug", skip_all, fields(path = %self.path.display()))]
    async fn write(&self, settings: &Settings) -> Result<(), SettingsError> {
        let mut map = match self.read_map().await {
            Ok(map) => map.unwrap_or_default(),
            Err(SettingsError::Corrupt(e)) => {
                tracing::warn!(error = %e, "replacing corrupt settings file");
                serde_json::Map::new()
            }
            Err(e) => return Err(e),
        };
        map.insert(SETTINGS_KEY.to_string(), encode_record(settings)?);

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(&serde_json::Value::Object(map))
            .map_err(|e| SettingsError::Io(e.to_string()))?;
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }
}

/// Process-local slot. Stores the encoded JSON so reads go through the same
/// decoding path as the file backend.
#[derive(Default)]
pub struct MemorySettingsBackend {
    slot: Mutex<Option<serde_json::Value>>,
}

impl MemorySettingsBackend {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with_raw(value: serde_json::Value) -> Self {
        Self {
            slot: Mutex::new(Some(value)),
        }
    }
}

#[async_trait]
impl SettingsBackend for MemorySettingsBackend {
    async fn read(&self) -> Result<Option<Settings>, SettingsError> {
        let slot = self.slot.lock().await;
        decode_record(slot.as_ref())
    }

    async fn write(&self, settings: &Settings) -> Result<(), SettingsError> {
        let encoded = encode_record(settings)?;
        *self.slot.lock().await = Some(encoded);
        Ok(())
    }
}

fn encode_record(settings: &Settings) -> Result<serde_json::Value, SettingsError> {
    serde_json::to_value(settings).map_err(|e| SettingsError::Io(e.to_string()))
}

fn decode_record(value: Option<&serde_json::Value>) -> Result<Option<Settings>, SettingsError> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => serde_json::from_value(v.clone())
            .map(Some)
            .map_err(|e| SettingsError::Corrupt(e.to_string())),
    }
}

/// In-memory snapshot of the settings plus the slot it is persisted to.
pub struct SettingsStore {
    backend: Arc<dyn SettingsBackend>,
    current: Settings,
}

impl SettingsStore {
    pub fn new(backend: Arc<dyn SettingsBackend>) -> Self {
        Self {
            backend,
            current: Settings::default(),
        }
    }

    /// Read the persisted record. Anything unreadable falls back to defaults;
    /// an invalid temperature alone is reset to [`DEFAULT_TEMPERATURE`].
    pub async fn load(&mut self) -> Settings {
        let loaded = match self.backend.read().await {
            Ok(Some(settings)) => match settings.validate() {
                Ok(()) => settings,
                Err(e) => {
                    tracing::warn!(error = %e, "stored temperature is invalid; using default");
                    Settings {
                        temperature: DEFAULT_TEMPERATURE,
                        ..settings
                    }
                }
            },
            Ok(None) => Settings::default(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to load settings; using defaults");
                Settings::default()
            }
        };
        tracing::debug!(
            has_credential = loaded.has_credential(),
            temperature = loaded.temperature,
            "settings loaded"
        );
        self.current = loaded.clone();
        loaded
    }

    /// Overwrite the persisted record wholesale.
    pub async fn save(&mut self, settings: Settings) -> Result<(), SettingsError> {
        settings.validate()?;
        self.backend.write(&settings).await?;
        self.current = settings;
        Ok(())
    }

    pub fn current(&self) -> &Settings {
        &self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("deepnovel-{name}-{}", Uuid::new_v4()))
            .join("settings.json")
    }

    #[tokio::test]
    async fn empty_store_loads_defaults() {
        let mut store = SettingsStore::new(Arc::new(MemorySettingsBackend::new()));
        let loaded = store.load().await;
        assert_eq!(loaded, Settings::default());
        assert_eq!(loaded.api_key, "");
        assert_eq!(loaded.temperature, 1.3);
        assert!(!loaded.has_credential());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let backend = Arc::new(MemorySettingsBackend::new());
        let saved = Settings {
            api_key: "sk-novel".to_string(),
            temperature: 0.7,
        };
        let mut store = SettingsStore::new(backend.clone());
        store.save(saved.clone()).await.expect("save ok");
        assert_eq!(store.current(), &saved);

        let mut fresh = SettingsStore::new(backend);
        assert_eq!(fresh.load().await, saved);
    }

    #[tokio::test]
    async fn save_rejects_non_positive_temperature() {
        let mut store = SettingsStore::new(Arc::new(MemorySettingsBackend::new()));
        for bad in [0.0, -1.0, f64::NAN] {
            let err = store
                .save(Settings {
                    api_key: "k".to_string(),
                    temperature: bad,
                })
                .await
                .expect_err("invalid temperature");
            assert!(matches!(err, SettingsError::InvalidTemperature(_)));
        }
        assert_eq!(store.current(), &Settings::default());
    }

    #[tokio::test]
    async fn corrupt_record_loads_defaults() {
        let backend = MemorySettingsBackend::with_raw(json!({ "apiKey": 42 }));
        let mut store = SettingsStore::new(Arc::new(backend));
        assert_eq!(store.load().await, Settings::default());
    }

    #[tokio::test]
    async fn invalid_temperature_keeps_stored_key() {
        let backend =
            MemorySettingsBackend::with_raw(json!({ "apiKey": "sk-kept", "temperature": -0.5 }));
        let mut store = SettingsStore::new(Arc::new(backend));
        let loaded = store.load().await;
        assert_eq!(loaded.api_key, "sk-kept");
        assert_eq!(loaded.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(store.current(), &loaded);
    }

    #[tokio::test]
    async fn file_backend_round_trips_and_keeps_other_keys() {
        let path = temp_path("settings");
        let dir = path.parent().expect("parent").to_path_buf();
        tokio::fs::create_dir_all(&dir).await.expect("mkdir");
        tokio::fs::write(&path, r#"{"theme":"dark"}"#)
            .await
            .expect("seed file");

        let backend = Arc::new(FileSettingsBackend::new(path.clone()));
        let mut store = SettingsStore::new(backend.clone());
        let saved = Settings {
            api_key: "sk-file".to_string(),
            temperature: 1.3,
        };
        store.save(saved.clone()).await.expect("save ok");

        let raw: serde_json::Value = serde_json::from_str(
            &tokio::fs::read_to_string(&path).await.expect("read file"),
        )
        .expect("file is json");
        assert_eq!(raw["theme"], "dark");
        assert_eq!(raw[SETTINGS_KEY], json!({ "apiKey": "sk-file", "temperature": 1.3 }));

        let mut fresh = SettingsStore::new(backend);
        assert_eq!(fresh.load().await, saved);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn unreadable_file_loads_defaults_and_save_recovers() {
        let path = temp_path("corrupt");
        let dir = path.parent().expect("parent").to_path_buf();
        tokio::fs::create_dir_all(&dir).await.expect("mkdir");
        tokio::fs::write(&path, "{not json").await.expect("seed file");

        let mut store = SettingsStore::new(Arc::new(FileSettingsBackend::new(path.clone())));
        assert_eq!(store.load().await, Settings::default());

        store
            .save(Settings {
                api_key: "sk-new".to_string(),
                temperature: 1.0,
            })
            .await
            .expect("save replaces corrupt file");
        assert_eq!(store.load().await.api_key, "sk-new");

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn missing_file_loads_defaults() {
        let path = temp_path("missing");
        let mut store = SettingsStore::new(Arc::new(FileSettingsBackend::new(path)));
        assert_eq!(store.load().await, Settings::default());
    }
}
