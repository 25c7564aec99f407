//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/hypo/config.toml)
//! 3. Environment variables (HYPO_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix
const ENV_PREFIX: &str = "HYPO";

/// Default remote table holding entry rows
const DEFAULT_REMOTE_TABLE: &str = "entries";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for data storage (SQLite db)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Base URL of the remote row store (PostgREST / Supabase project URL)
    #[serde(default)]
    pub remote_url: Option<String>,

    /// Project API key sent as `apikey`
    #[serde(default)]
    pub remote_api_key: Option<String>,

    /// Bearer token of the signed-in user (falls back to the API key)
    #[serde(default)]
    pub access_token: Option<String>,

    /// Owner whose rows are synced
    #[serde(default)]
    pub owner_id: Option<String>,

    /// Remote table name
    #[serde(default = "default_remote_table")]
    pub remote_table: String,

    /// Whether sync is enabled
    #[serde(default)]
    pub sync_enabled: bool,

    /// Write logs to this file instead of stderr
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Log level for hypo crates (error, warn, info, debug, trace)
    #[serde(default)]
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            remote_url: None,
            remote_api_key: None,
            access_token: None,
            owner_id: None,
            remote_table: default_remote_table(),
            sync_enabled: false,
            log_file: None,
            log_level: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (HYPO_DATA_DIR, HYPO_REMOTE_URL, ...)
    /// 2. Config file (~/.config/hypo/config.toml or HYPO_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring a path given on the command line
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(p) => Self::load_from_path(p),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        override_optional(&mut self.remote_url, "REMOTE_URL");
        override_optional(&mut self.remote_api_key, "REMOTE_API_KEY");
        override_optional(&mut self.access_token, "ACCESS_TOKEN");
        override_optional(&mut self.owner_id, "OWNER_ID");
        override_optional(&mut self.log_level, "LOG_LEVEL");

        if let Ok(val) = std::env::var(format!("{}_SYNC_ENABLED", ENV_PREFIX)) {
            self.sync_enabled = val.eq_ignore_ascii_case("true") || val == "1";
        }
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with HYPO_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hypo")
            .join("config.toml")
    }

    /// Get the path to the SQLite database
    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join("hypo.db")
    }

    /// Whether enough is configured to talk to the remote store
    pub fn remote_configured(&self) -> bool {
        self.sync_enabled && self.remote_url.is_some() && self.owner_id.is_some()
    }

    /// Effective log level, defaulting to `info`
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }
}

/// Override an optional setting from `HYPO_<suffix>`; empty clears it
fn override_optional(target: &mut Option<String>, suffix: &str) {
    if let Ok(val) = std::env::var(format!("{}_{}", ENV_PREFIX, suffix)) {
        *target = if val.is_empty() { None } else { Some(val) };
    }
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hypo")
}

fn default_remote_table() -> String {
    DEFAULT_REMOTE_TABLE.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "HYPO_DATA_DIR",
        "HYPO_REMOTE_URL",
        "HYPO_REMOTE_API_KEY",
        "HYPO_ACCESS_TOKEN",
        "HYPO_OWNER_ID",
        "HYPO_LOG_LEVEL",
        "HYPO_SYNC_ENABLED",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.sync_enabled);
        assert!(config.remote_url.is_none());
        assert_eq!(config.remote_table, "entries");
        assert!(config.data_dir.ends_with("hypo"));
        assert_eq!(config.log_level(), "info");
        assert!(!config.remote_configured());
    }

    #[test]
    fn test_file_paths() {
        let config = Config::default();
        assert!(config.sqlite_path().ends_with("hypo.db"));
    }

    #[test]
    fn test_env_override_data_dir() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("HYPO_DATA_DIR", "/tmp/hypo-test");
        config.apply_env_overrides();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/hypo-test"));
    }

    #[test]
    fn test_env_override_sync_enabled() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        assert!(!config.sync_enabled);

        env::set_var("HYPO_SYNC_ENABLED", "true");
        config.apply_env_overrides();
        assert!(config.sync_enabled);

        env::set_var("HYPO_SYNC_ENABLED", "1");
        config.sync_enabled = false;
        config.apply_env_overrides();
        assert!(config.sync_enabled);

        env::set_var("HYPO_SYNC_ENABLED", "false");
        config.apply_env_overrides();
        assert!(!config.sync_enabled);
    }

    #[test]
    fn test_env_override_remote() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("HYPO_REMOTE_URL", "https://project.supabase.co");
        env::set_var("HYPO_OWNER_ID", "user-1");
        env::set_var("HYPO_SYNC_ENABLED", "1");
        config.apply_env_overrides();
        assert_eq!(
            config.remote_url.as_deref(),
            Some("https://project.supabase.co")
        );
        assert!(config.remote_configured());

        // Empty string clears it
        env::set_var("HYPO_REMOTE_URL", "");
        config.apply_env_overrides();
        assert!(config.remote_url.is_none());
        assert!(!config.remote_configured());
    }

    #[test]
    fn test_serialization() {
        let _guard = EnvGuard::new(ENV_VARS);

        let config = Config {
            data_dir: PathBuf::from("/data/hypo"),
            remote_url: Some("https://example.supabase.co".to_string()),
            owner_id: Some("owner".to_string()),
            sync_enabled: true,
            ..Config::default()
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("data_dir"));
        assert!(toml_str.contains("remote_url"));
        assert!(toml_str.contains("sync_enabled"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.data_dir, config.data_dir);
        assert_eq!(parsed.remote_url, config.remote_url);
        assert_eq!(parsed.owner_id, config.owner_id);
        assert_eq!(parsed.sync_enabled, config.sync_enabled);
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            data_dir = "/custom/data"
            remote_url = "https://example.supabase.co"
            remote_table = "quotes"
            sync_enabled = true
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.remote_table, "quotes");
        assert!(config.sync_enabled);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("config").join("config.toml");

        let config = Config {
            data_dir: temp_dir.path().join("data"),
            owner_id: Some("owner-7".to_string()),
            ..Config::default()
        };
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.owner_id.as_deref(), Some("owner-7"));
        assert!(loaded.data_dir.exists());
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = tempfile::TempDir::new().unwrap();
        env::set_var("HYPO_DATA_DIR", temp_dir.path().join("data"));

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        assert!(!config.sync_enabled);
        assert!(config.remote_url.is_none());
    }
}
