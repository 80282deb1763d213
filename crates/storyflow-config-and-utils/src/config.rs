//! Host settings for the task sync client.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use task_progress_sync::SyncConfig;
use url::Url;

/// Default API base URL (can be overridden at compile time via STORYFLOW_API_URL).
pub const DEFAULT_API_BASE_URL: &str = match option_env!("STORYFLOW_API_URL") {
    Some(url) => url,
    None => "http://localhost:8000",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const ENV_LOG_LEVEL: &str = "STORYFLOW_LOG_LEVEL";
const ENV_API_URL: &str = "STORYFLOW_API_URL";

/// Host configuration, persisted as JSON in `~/.storyflow/config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// API base URL; `http(s)` is mapped to `ws(s)` for the task socket.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Heartbeat interval in milliseconds.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Reconnect attempts before the client gives up.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_heartbeat_interval_ms() -> u64 {
    SyncConfig::default().heartbeat_interval_ms
}

fn default_max_reconnect_attempts() -> u32 {
    SyncConfig::default().max_reconnect_attempts
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            api_base_url: default_api_base_url(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }
}

impl Config {
    /// Create a Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Load configuration from `paths`, falling back to defaults when the
    /// file does not exist. Environment variables win over the file.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(level) = non_empty(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        if let Some(url) = non_empty(ENV_API_URL) {
            self.api_base_url = url;
        }
    }

    /// Get the API base URL as a parsed URL.
    pub fn api_base_url(&self) -> CoreResult<Url> {
        Url::parse(&self.api_base_url).map_err(CoreError::from)
    }

    /// Build the sync client configuration from these settings.
    pub fn sync_config(&self) -> CoreResult<SyncConfig> {
        let url = self.api_base_url()?;
        if !matches!(url.scheme(), "http" | "https" | "ws" | "wss") {
            return Err(CoreError::InvalidSettings(format!(
                "unsupported API scheme: {}",
                url.scheme()
            )));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(CoreError::InvalidSettings(
                "heartbeat_interval_ms must be positive".to_string(),
            ));
        }

        Ok(SyncConfig {
            api_base_url: self.api_base_url.clone(),
            heartbeat_interval_ms: self.heartbeat_interval_ms,
            max_reconnect_attempts: self.max_reconnect_attempts,
            ..SyncConfig::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.heartbeat_interval_ms, 30_000);
        assert_eq!(config.max_reconnect_attempts, 5);
    }

    #[test]
    fn test_config_load_from_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(&config_path, r#"{ "log_level": "debug" }"#).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.heartbeat_interval_ms, 30_000);
    }

    #[test]
    fn test_config_save_and_load_file() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config {
            log_level: "trace".to_string(),
            api_base_url: "https://api.storyflow.dev".to_string(),
            heartbeat_interval_ms: 15_000,
            max_reconnect_attempts: 8,
        };
        config.save(&paths).unwrap();

        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded.log_level, "trace");
        assert_eq!(loaded.api_base_url, "https://api.storyflow.dev");
        assert_eq!(loaded.heartbeat_interval_ms, 15_000);
        assert_eq!(loaded.max_reconnect_attempts, 8);
    }

    #[test]
    fn test_config_load_from_missing_file_errors() {
        let result = Config::load_from_file(&PathBuf::from("/nonexistent/storyflow.json"));
        assert!(matches!(result, Err(CoreError::Io(_))));
    }

    #[test]
    fn test_config_load_rejects_malformed_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(&config_path, "log_level = debug").unwrap();

        let result = Config::load_from_file(&config_path);
        assert!(matches!(result, Err(CoreError::SettingsFormat(_))));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_LOG_LEVEL, "warn"),
            (ENV_API_URL, "wss://push.storyflow.dev"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.log_level, "warn");
        assert_eq!(config.api_base_url, "wss://push.storyflow.dev");
    }

    #[test]
    fn test_blank_env_values_are_ignored() {
        let mut config = Config::default();
        config.apply_env(|_| Some("   ".to_string()));

        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
    }

    #[test]
    fn test_sync_config_carries_settings() {
        let config = Config {
            api_base_url: "https://api.storyflow.dev".to_string(),
            heartbeat_interval_ms: 10_000,
            max_reconnect_attempts: 3,
            ..Config::default()
        };

        let sync = config.sync_config().unwrap();
        assert_eq!(sync.api_base_url, "https://api.storyflow.dev");
        assert_eq!(sync.heartbeat_interval_ms, 10_000);
        assert_eq!(sync.max_reconnect_attempts, 3);
        assert_eq!(sync.reconnect_base_delay_ms, 1_000);
        assert_eq!(sync.reconnect_max_delay_ms, 30_000);
    }

    #[test]
    fn test_sync_config_rejects_bad_settings() {
        let mut config = Config::default();
        config.api_base_url = "not a valid url".to_string();
        assert!(matches!(config.sync_config(), Err(CoreError::InvalidApiUrl(_))));

        config.api_base_url = "ftp://files.storyflow.dev".to_string();
        assert!(matches!(config.sync_config(), Err(CoreError::InvalidSettings(_))));

        config.api_base_url = "https://api.storyflow.dev".to_string();
        config.heartbeat_interval_ms = 0;
        assert!(matches!(config.sync_config(), Err(CoreError::InvalidSettings(_))));
    }
}
