use std::path::PathBuf;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub playback: PlaybackConfig,
}

/// Where the metadata collaborator lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Selectors removed from the embedded document after it loads.
    #[serde(default)]
    pub ad_markers: Vec<String>,
}

impl AppConfig {
    /// Load config: user file (if exists) replaces the built-in defaults.
    pub fn load() -> Result<Self, CoreError> {
        let user_path = Self::config_path();
        if user_path.exists() {
            let user_str = std::fs::read_to_string(&user_path)
                .map_err(|e| CoreError::Config(e.to_string()))?;
            Self::from_toml(&user_str)
        } else {
            Self::from_toml(DEFAULT_CONFIG)
        }
    }

    /// Parse a config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, CoreError> {
        toml::from_str(toml_str).map_err(|e| CoreError::Config(e.to_string()))
    }

    /// Path to user config file (XDG on Linux, AppData on Windows).
    pub fn config_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Path to the user provider registry, merged over the built-in one.
    pub fn providers_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.config_dir().join("providers.toml"))
            .unwrap_or_else(|| PathBuf::from("providers.toml"))
    }

    /// Path to the database file.
    pub fn db_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.data_dir().join("reelgate.db"))
            .unwrap_or_else(|| PathBuf::from("reelgate.db"))
    }

    /// Ensure the data directory exists and return the DB path.
    pub fn ensure_db_path() -> Result<PathBuf, CoreError> {
        let path = Self::db_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(path)
    }

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", "reelgate")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("built-in default config is valid TOML")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config = AppConfig::default();
        assert_eq!(config.api.timeout_secs, 15);
        assert!(config.api.base_url.starts_with("http"));
        assert_eq!(config.playback.ad_markers, vec![".ad-class", "#ad-id"]);
    }

    #[test]
    fn test_roundtrip() {
        let config = AppConfig::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized = AppConfig::from_toml(&serialized).unwrap();
        assert_eq!(deserialized.api.base_url, config.api.base_url);
    }

    #[test]
    fn test_missing_ad_markers_default_to_empty() {
        let config = AppConfig::from_toml(
            "[api]\nbase_url = \"https://meta.example\"\ntimeout_secs = 5\n\n[playback]\n",
        )
        .unwrap();
        assert!(config.playback.ad_markers.is_empty());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = AppConfig::from_toml("[api\n").unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }
}
