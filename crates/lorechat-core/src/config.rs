use crate::ai::claude::DEFAULT_BASE_URL;
use crate::ai::CompletionSettings;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8501";
pub const LOREBOOK_FILE: &str = "lorebook.json";
pub const MESSAGES_FILE: &str = "messages.json";

/// Optional settings file; every field falls back to a built-in default
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub bind_addr: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub api_base_url: Option<String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    /// Apply `LORECHAT_BIND` / `LORECHAT_DATA_DIR` from the environment
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(
            std::env::var("LORECHAT_BIND").ok(),
            std::env::var("LORECHAT_DATA_DIR").ok(),
        )
    }

    pub fn with_overrides(mut self, bind_addr: Option<String>, data_dir: Option<String>) -> Self {
        if let Some(bind) = bind_addr.filter(|b| !b.trim().is_empty()) {
            self.bind_addr = Some(bind.trim().to_string());
        }
        if let Some(dir) = data_dir.filter(|d| !d.trim().is_empty()) {
            self.data_dir = Some(PathBuf::from(dir.trim()));
        }
        self
    }

    pub fn bind_addr(&self) -> &str {
        self.bind_addr.as_deref().unwrap_or(DEFAULT_BIND_ADDR)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn api_base_url(&self) -> &str {
        self.api_base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn data_paths(&self) -> DataPaths {
        DataPaths::in_dir(&self.data_dir())
    }

    pub fn completion_settings(&self) -> CompletionSettings {
        let defaults = CompletionSettings::default();
        CompletionSettings {
            model: self.model.clone().unwrap_or(defaults.model),
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
            temperature: self.temperature.unwrap_or(defaults.temperature),
        }
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("lorechat").join("config.json"))
    }
}

/// Locations of the two persisted documents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    pub lorebook: PathBuf,
    pub messages: PathBuf,
}

impl DataPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            lorebook: dir.join(LOREBOOK_FILE),
            messages: dir.join(MESSAGES_FILE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::new();
        assert_eq!(config.bind_addr(), "127.0.0.1:8501");
        assert_eq!(config.data_paths().messages, PathBuf::from("./messages.json"));

        let settings = config.completion_settings();
        assert_eq!(settings.model, "claude-3-5-haiku-20241022");
        assert_eq!(settings.max_tokens, 4000);
        assert!((settings.temperature - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::new());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"model": "claude-3-5-sonnet-20241022", "max_tokens": 1024}"#,
        )
        .unwrap();

        let loaded = Config::load_from(&path).unwrap();
        let settings = loaded.completion_settings();
        assert_eq!(settings.model, "claude-3-5-sonnet-20241022");
        assert_eq!(settings.max_tokens, 1024);
        assert!((settings.temperature - 0.8).abs() < f32::EPSILON);
        assert_eq!(loaded.bind_addr(), DEFAULT_BIND_ADDR);
    }

    #[test]
    fn test_overrides_win_over_file_values() {
        let config = Config {
            bind_addr: Some("0.0.0.0:80".to_string()),
            ..Config::new()
        }
        .with_overrides(Some(" 127.0.0.1:9000 ".to_string()), Some("/srv/chat".to_string()));

        assert_eq!(config.bind_addr(), "127.0.0.1:9000");
        assert_eq!(
            config.data_paths().lorebook,
            PathBuf::from("/srv/chat/lorebook.json")
        );
    }

    #[test]
    fn test_blank_overrides_are_ignored() {
        let config = Config::new().with_overrides(Some("  ".to_string()), None);
        assert_eq!(config.bind_addr(), DEFAULT_BIND_ADDR);
    }
}
