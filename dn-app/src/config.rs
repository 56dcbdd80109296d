//! DeepNovel configuration loader.
//!
//! `~/.deepnovel/config.toml`, every section optional, with environment
//! overrides applied on top.

use dn_llm::Endpoint;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";
pub const DEFAULT_MODEL: &str = "deepseek-chat";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeepNovelConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiMode {
    /// Call the completion API directly with the stored key.
    Direct,
    /// Send requests through a DeepNovel relay; the key travels per request.
    Proxied,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_mode")]
    pub mode: ApiMode,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_relay_url")]
    pub relay_url: String,
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    /// Ask the model for the JSON reply envelope.
    #[serde(default = "default_structured_output")]
    pub structured_output: bool,
}

fn default_api_mode() -> ApiMode {
    ApiMode::Direct
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_relay_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_request_timeout_seconds() -> u64 {
    120
}

fn default_structured_output() -> bool {
    true
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            mode: default_api_mode(),
            base_url: default_base_url(),
            model: default_model(),
            relay_url: default_relay_url(),
            request_timeout_seconds: default_request_timeout_seconds(),
            structured_output: default_structured_output(),
        }
    }
}

impl ApiConfig {
    pub fn endpoint(&self) -> Endpoint {
        match self.mode {
            ApiMode::Direct => Endpoint::Direct {
                base_url: self.base_url.clone(),
                model: self.model.clone(),
            },
            ApiMode::Proxied => Endpoint::Relay {
                base_url: self.relay_url.clone(),
            },
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_base_url")]
    pub upstream_base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_relay_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_request_timeout_seconds")]
    pub http_timeout_seconds: u64,
    #[serde(default = "default_http_max_in_flight")]
    pub http_max_in_flight: usize,
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_relay_system_prompt() -> String {
    "You are a helpful assistant.".to_string()
}

fn default_http_max_in_flight() -> usize {
    64
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            upstream_base_url: default_base_url(),
            model: default_model(),
            system_prompt: default_relay_system_prompt(),
            http_timeout_seconds: default_request_timeout_seconds(),
            http_max_in_flight: default_http_max_in_flight(),
        }
    }
}

impl RelayConfig {
    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        self.bind_addr
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("relay.bind_addr {:?} is invalid: {e}", self.bind_addr))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_data_dir() -> String {
    "~/.deepnovel/data".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl StorageConfig {
    pub fn data_dir_path(&self) -> anyhow::Result<PathBuf> {
        expand_home(&self.data_dir)
    }

    pub fn settings_path(&self) -> anyhow::Result<PathBuf> {
        Ok(self.data_dir_path()?.join("settings.json"))
    }
}

impl DeepNovelConfig {
    /// Load from `path`, or from the default location. A missing default file
    /// yields the built-in defaults; a missing explicit file is an error.
    pub async fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let explicit = path.is_some();
        let path = match path {
            Some(p) => p,
            None => default_config_path()?,
        };

        let mut cfg = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => toml::from_str::<DeepNovelConfig>(&contents)
                .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?,
            Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(config_path = %path.display(), "no config file; using defaults");
                DeepNovelConfig::default()
            }
            Err(e) => return Err(anyhow::anyhow!("read config {}: {e}", path.display())),
        };

        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("DEEPNOVEL_MODEL") {
            self.api.model = v.clone();
            self.relay.model = v;
        }
        if let Some(v) = get("DEEPNOVEL_BASE_URL") {
            self.api.base_url = v.clone();
            self.relay.upstream_base_url = v;
        }
        if let Some(v) = get("DEEPNOVEL_API_MODE") {
            match v.trim().to_ascii_lowercase().as_str() {
                "direct" => self.api.mode = ApiMode::Direct,
                "proxied" => self.api.mode = ApiMode::Proxied,
                other => tracing::warn!(value = %other, "ignoring unknown DEEPNOVEL_API_MODE"),
            }
        }
        if let Some(v) = get("DEEPNOVEL_RELAY_URL") {
            self.api.relay_url = v;
        }
        if let Some(v) = get("DEEPNOVEL_DATA_DIR") {
            self.storage.data_dir = v;
        }
        if let Some(v) = get("PORT") {
            match (v.trim().parse::<u16>(), self.relay.bind_addr()) {
                (Ok(port), Ok(mut addr)) => {
                    addr.set_port(port);
                    self.relay.bind_addr = addr.to_string();
                }
                (Err(e), _) => tracing::warn!(value = %v, error = %e, "ignoring invalid PORT"),
                (_, Err(_)) => self.relay.bind_addr = format!("127.0.0.1:{}", v.trim()),
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api.model.trim().is_empty() {
            return Err(anyhow::anyhow!("api.model is required"));
        }
        match self.api.mode {
            ApiMode::Direct if self.api.base_url.trim().is_empty() => {
                return Err(anyhow::anyhow!("api.base_url is required in direct mode"));
            }
            ApiMode::Proxied if self.api.relay_url.trim().is_empty() => {
                return Err(anyhow::anyhow!("api.relay_url is required in proxied mode"));
            }
            _ => {}
        }
        if self.api.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("api.request_timeout_seconds must be > 0"));
        }
        self.relay.bind_addr()?;
        if self.relay.upstream_base_url.trim().is_empty() {
            return Err(anyhow::anyhow!("relay.upstream_base_url is required"));
        }
        if self.relay.model.trim().is_empty() {
            return Err(anyhow::anyhow!("relay.model is required"));
        }
        if self.relay.http_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("relay.http_timeout_seconds must be > 0"));
        }
        if self.relay.http_max_in_flight == 0 {
            return Err(anyhow::anyhow!("relay.http_max_in_flight must be > 0"));
        }
        if self.storage.data_dir.trim().is_empty() {
            return Err(anyhow::anyhow!("storage.data_dir is required"));
        }
        Ok(())
    }
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME").map_err(|_| anyhow::anyhow!("HOME is not set"))?;
    Ok(Path::new(&home).join(".deepnovel").join("config.toml"))
}

pub fn expand_home(path: &str) -> anyhow::Result<PathBuf> {
    let trimmed = path.trim().to_string();
    if !trimmed.starts_with("~/") {
        return Ok(PathBuf::from(trimmed));
    }
    let home = std::env::var("HOME").map_err(|_| anyhow::anyhow!("HOME is not set"))?;
    Ok(PathBuf::from(trimmed.replacen("~", &home, 1)))
}
