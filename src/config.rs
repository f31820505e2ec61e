//! Persistent configuration handling for Snip2Excel.
//!
//! Persists configuration in a JSON file (see [`crate::paths::config_file`]). The API key is
//! stored encrypted by [`KeyCipher`]; every other field is plain JSON. The loaded [`Config`] is
//! passed around explicitly; nothing here keeps process-wide state.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::DEFAULT_MODEL;
use crate::prompt::{OutputMode, DEFAULT_PROMPT_DOCS, DEFAULT_PROMPT_EXCEL};
use crate::secret::KeyCipher;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("No config directory available on this platform")]
    NoConfigDir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ERROR" => Some(Self::Error),
            "WARN" | "WARNING" => Some(Self::Warn),
            "INFO" => Some(Self::Info),
            "DEBUG" => Some(Self::Debug),
            "TRACE" => Some(Self::Trace),
            _ => None,
        }
    }

    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

/// User preferences and credential, decrypted and ready to use.
#[derive(Clone, PartialEq)]
pub struct Config {
    pub api_key: String,
    pub selected_model: String,
    pub output_mode: OutputMode,
    pub auto_process_enabled: bool,
    pub prompt_excel: String,
    pub prompt_docs: String,
    pub log_level: LogLevel,
    pub api_base_url: Option<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &format_args!("<{} chars>", self.api_key.len()))
            .field("selected_model", &self.selected_model)
            .field("output_mode", &self.output_mode)
            .field("auto_process_enabled", &self.auto_process_enabled)
            .field("log_level", &self.log_level)
            .field("api_base_url", &self.api_base_url)
            .finish_non_exhaustive()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            selected_model: DEFAULT_MODEL.to_string(),
            output_mode: OutputMode::Excel,
            auto_process_enabled: false,
            prompt_excel: DEFAULT_PROMPT_EXCEL.to_string(),
            prompt_docs: DEFAULT_PROMPT_DOCS.to_string(),
            log_level: LogLevel::Info,
            api_base_url: None,
        }
    }
}

impl Config {
    /// Instruction text for the given mode.
    pub fn prompt_for(&self, mode: OutputMode) -> &str {
        match mode {
            OutputMode::Excel => &self.prompt_excel,
            OutputMode::Docs => &self.prompt_docs,
        }
    }

    pub fn set_prompt_for(&mut self, mode: OutputMode, prompt: String) {
        match mode {
            OutputMode::Excel => self.prompt_excel = prompt,
            OutputMode::Docs => self.prompt_docs = prompt,
        }
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

/// On-disk shape. Every field is optional so older or hand-edited files still load.
#[derive(Debug, Serialize, Deserialize, Default)]
struct RawConfig {
    #[serde(rename = "OPENROUTER_API_KEY", default)]
    api_key: Option<String>,
    #[serde(default)]
    selected_model: Option<String>,
    #[serde(default)]
    output_mode: Option<String>,
    #[serde(default)]
    auto_process_enabled: Option<bool>,
    #[serde(default)]
    prompt_excel: Option<String>,
    #[serde(default)]
    prompt_docs: Option<String>,
    #[serde(default)]
    log_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_base_url: Option<String>,
}

/// Reads and writes [`Config`] at a fixed path.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    cipher: KeyCipher,
}

impl ConfigStore {
    pub fn new(path: PathBuf, cipher: KeyCipher) -> Self {
        Self { path, cipher }
    }

    /// Store at the platform config location, keyed to this machine.
    pub fn at_default_location() -> Result<Self, ConfigError> {
        let path = crate::paths::config_file().ok_or(ConfigError::NoConfigDir)?;
        Ok(Self::new(path, KeyCipher::for_this_machine()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the config. A missing file is created with defaults; a broken one yields defaults.
    pub fn load(&self) -> Config {
        match self.try_load() {
            Ok(Some(cfg)) => cfg,
            Ok(None) => {
                debug!(path = ?self.path, "Config file does not exist, writing defaults");
                let cfg = Config::default();
                if let Err(err) = self.save(&cfg) {
                    warn!(error = %err, "Failed to write default config");
                }
                cfg
            }
            Err(err) => {
                warn!(error = %err, path = ?self.path, "Failed to load config, using defaults");
                Config::default()
            }
        }
    }

    fn try_load(&self) -> Result<Option<Config>, ConfigError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(&self.path)?;
        let raw: RawConfig = serde_json::from_str(&data)?;
        debug!(path = ?self.path, "Config loaded");
        Ok(Some(self.from_raw(raw)))
    }

    /// Writes the config, encrypting the API key.
    pub fn save(&self, cfg: &Config) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(&self.to_raw(cfg))?;
        fs::write(&self.path, data)?;
        debug!(path = ?self.path, "Config saved");
        Ok(())
    }

    /// Applies `change` to `cfg` and persists the result.
    pub fn update<F>(&self, cfg: &mut Config, change: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut Config),
    {
        change(cfg);
        self.save(cfg)
    }

    fn from_raw(&self, raw: RawConfig) -> Config {
        let defaults = Config::default();
        let api_key = raw
            .api_key
            .as_deref()
            .map(|token| {
                self.cipher.decrypt(token).unwrap_or_else(|err| {
                    warn!(error = %err, "Failed to decrypt stored API key, ignoring it");
                    String::new()
                })
            })
            .unwrap_or_default();
        let output_mode = raw
            .output_mode
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.output_mode);

        Config {
            api_key,
            selected_model: raw
                .selected_model
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.selected_model),
            output_mode,
            auto_process_enabled: raw
                .auto_process_enabled
                .unwrap_or(defaults.auto_process_enabled),
            prompt_excel: raw
                .prompt_excel
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.prompt_excel),
            prompt_docs: raw
                .prompt_docs
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.prompt_docs),
            log_level: raw
                .log_level
                .as_deref()
                .and_then(LogLevel::from_str)
                .unwrap_or_default(),
            api_base_url: raw.api_base_url.filter(|s| !s.trim().is_empty()),
        }
    }

    fn to_raw(&self, cfg: &Config) -> RawConfig {
        RawConfig {
            api_key: Some(self.cipher.encrypt(cfg.api_key.trim())),
            selected_model: Some(cfg.selected_model.clone()),
            output_mode: Some(cfg.output_mode.as_str().to_string()),
            auto_process_enabled: Some(cfg.auto_process_enabled),
            prompt_excel: Some(cfg.prompt_excel.clone()),
            prompt_docs: Some(cfg.prompt_docs.clone()),
            log_level: Some(cfg.log_level.as_filter().to_string()),
            api_base_url: cfg.api_base_url.clone().filter(|s| !s.is_empty()),
        }
    }
}

/// Reads only the log level, before logging is set up. Never fails.
pub fn peek_log_level(path: &Path) -> LogLevel {
    fs::read_to_string(path)
        .ok()
        .and_then(|data| serde_json::from_str::<RawConfig>(&data).ok())
        .and_then(|raw| raw.log_level)
        .as_deref()
        .and_then(LogLevel::from_str)
        .unwrap_or_default()
}
