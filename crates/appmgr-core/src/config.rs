//! Config - 設定ファイル（TOML）
//!
//! ```toml
//! [lifecycle]
//! transition_timeout_ms = 10000
//! fullscreen_window_types = ["_WEBOS_WINDOW_TYPE_CARD", "fullscreen"]
//! keep_alive_apps = ["com.example.music"]
//!
//! [launch_points]
//! db_path = "/var/lib/appmgr/launchpoints.json"
//! bookmark_attempt_limit = 64
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppMgrConfig {
    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    #[serde(default)]
    pub launch_points: LaunchPointConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// 遷移中状態の watchdog
    #[serde(default = "default_transition_timeout_ms")]
    pub transition_timeout_ms: u64,

    /// 前面にあればフルスクリーンのオーナーとみなすウィンドウ種別
    #[serde(default = "default_fullscreen_window_types")]
    pub fullscreen_window_types: Vec<String>,

    /// keepAlive で起動するアプリ
    #[serde(default)]
    pub keep_alive_apps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchPointConfig {
    /// 未設定ならメモリ上のストアを使う
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    #[serde(default = "default_bookmark_attempt_limit")]
    pub bookmark_attempt_limit: u32,
}

fn default_transition_timeout_ms() -> u64 {
    10_000
}

fn default_fullscreen_window_types() -> Vec<String> {
    vec!["_WEBOS_WINDOW_TYPE_CARD".to_string(), "fullscreen".to_string()]
}

fn default_bookmark_attempt_limit() -> u32 {
    64
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            transition_timeout_ms: default_transition_timeout_ms(),
            fullscreen_window_types: default_fullscreen_window_types(),
            keep_alive_apps: Vec::new(),
        }
    }
}

impl Default for LaunchPointConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            bookmark_attempt_limit: default_bookmark_attempt_limit(),
        }
    }
}

impl LifecycleConfig {
    pub fn transition_timeout(&self) -> Duration {
        Duration::from_millis(self.transition_timeout_ms)
    }

    pub fn is_fullscreen_type(&self, window_type: &str) -> bool {
        self.fullscreen_window_types.iter().any(|t| t == window_type)
    }

    pub fn is_keep_alive(&self, app_id: &str) -> bool {
        self.keep_alive_apps.iter().any(|a| a == app_id)
    }
}

impl AppMgrConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lifecycle.transition_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "lifecycle.transition_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.launch_points.bookmark_attempt_limit == 0 {
            return Err(ConfigError::Validation(
                "launch_points.bookmark_attempt_limit must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("configuration validation failed: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = AppMgrConfig::from_toml("").unwrap();
        assert_eq!(config, AppMgrConfig::default());
        assert_eq!(config.lifecycle.transition_timeout(), Duration::from_secs(10));
        assert!(config.lifecycle.is_fullscreen_type("fullscreen"));
        assert!(config.launch_points.db_path.is_none());
    }

    #[test]
    fn sections_override_defaults() {
        let config = AppMgrConfig::from_toml(
            r#"
            [lifecycle]
            transition_timeout_ms = 2500
            keep_alive_apps = ["com.music"]

            [launch_points]
            db_path = "/tmp/lp.json"
            "#,
        )
        .unwrap();

        assert_eq!(config.lifecycle.transition_timeout_ms, 2500);
        assert!(config.lifecycle.is_keep_alive("com.music"));
        assert!(!config.lifecycle.is_keep_alive("com.video"));
        // 指定しなかったフィールドはデフォルトのまま
        assert_eq!(config.lifecycle.fullscreen_window_types.len(), 2);
        assert_eq!(config.launch_points.bookmark_attempt_limit, 64);
        assert_eq!(
            config.launch_points.db_path.as_deref(),
            Some(Path::new("/tmp/lp.json"))
        );
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let result = AppMgrConfig::from_toml("[lifecycle]\ntransition_timeout_ms = 0\n");
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let result = AppMgrConfig::from_toml("[lifecycle\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
