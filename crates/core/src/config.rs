//! TOML-based configuration for the branchview client.
//!
//! Every section is optional; a missing file yields the defaults, which point
//! at a service on `localhost:8080`. The service URL can be overridden at
//! runtime through `BRANCHVIEW_API_URL`, see
//! [`ClientConfig::resolve_env_overrides`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;

/// Environment variable overriding `service.base_url`.
pub const API_URL_ENV: &str = "BRANCHVIEW_API_URL";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level client configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Remote service settings.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Where the last selection is persisted.
    #[serde(default)]
    pub session: SessionConfig,

    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Connection settings for the version-control service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// API root, e.g. `http://localhost:8080/api`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// User-Agent header sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_base_url() -> String {
    "http://localhost:8080/api".into()
}
fn default_user_agent() -> String {
    concat!("branchview/", env!("CARGO_PKG_VERSION")).into()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Session persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Directory holding `branchview.db`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Well-known key the selection record is stored under.
    #[serde(default = "default_state_key")]
    pub state_key: String,
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("branchview"))
        .unwrap_or_else(|| PathBuf::from(".branchview"))
}
fn default_state_key() -> String {
    "appState".into()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            state_key: default_state_key(),
        }
    }
}

impl SessionConfig {
    /// Path of the SQLite file inside `data_dir`.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("branchview.db")
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".into()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl ClientConfig {
    /// Load a [`ClientConfig`] from a TOML file at the given path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: ClientConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Like [`load_from_file`](Self::load_from_file), but a missing file
    /// yields the defaults instead of an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match Self::load_from_file(path) {
            Err(ConfigError::FileNotFound(p)) => {
                debug!(path = %p, "no configuration file, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Apply environment overrides. Unset or empty variables are ignored.
    pub fn resolve_env_overrides(&mut self) {
        match std::env::var(API_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => {
                debug!(env = API_URL_ENV, "service URL overridden from environment");
                self.service.base_url = url.trim().to_string();
            }
            Ok(_) => warn!(env = API_URL_ENV, "env var is set but empty"),
            Err(_) => {}
        }
    }

    /// Validate that all fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.service.base_url.trim();
        if url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "service.base_url".into(),
                detail: "service URL must not be empty".into(),
            });
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                field: "service.base_url".into(),
                detail: "service URL must start with http:// or https://".into(),
            });
        }
        if self.session.state_key.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "session.state_key".into(),
                detail: "state key must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Convenience: load (or default), apply overrides, and validate.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_or_default(path)?;
        config.resolve_env_overrides();
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
[service]
base_url = "http://vcs.example.com:8080/api"
user_agent = "branchview-test"

[session]
data_dir = "/tmp/branchview"
state_key = "appState"

[log]
level = "debug"
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: ClientConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.service.base_url, "http://vcs.example.com:8080/api");
        assert_eq!(config.session.data_dir, PathBuf::from("/tmp/branchview"));
        assert_eq!(
            config.session.database_path(),
            PathBuf::from("/tmp/branchview/branchview.db")
        );
        assert_eq!(config.log.level, "debug");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(sample_toml().as_bytes()).unwrap();

        let config = ClientConfig::load_from_file(&path).expect("load_from_file failed");
        assert_eq!(config.service.user_agent, "branchview-test");
    }

    #[test]
    fn test_file_not_found() {
        let result = ClientConfig::load_from_file("/nonexistent/branchview.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));

        let config = ClientConfig::load_or_default("/nonexistent/branchview.toml").unwrap();
        assert_eq!(config.service.base_url, "http://localhost:8080/api");
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut config = ClientConfig::default();
        config.service.base_url = "ftp://example.com".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "service.base_url"
        ));

        config.service.base_url = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_state_key() {
        let mut config = ClientConfig::default();
        config.session.state_key = String::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "session.state_key"
        ));
    }

    #[test]
    fn test_defaults() {
        let config: ClientConfig = toml::from_str("").unwrap();
        assert_eq!(config.service.base_url, "http://localhost:8080/api");
        assert_eq!(config.session.state_key, "appState");
        assert_eq!(config.log.level, "warn");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resolve_env_overrides() {
        std::env::set_var(API_URL_ENV, "https://override.example.com/api");
        let mut config = ClientConfig::default();
        config.resolve_env_overrides();
        assert_eq!(config.service.base_url, "https://override.example.com/api");
        std::env::remove_var(API_URL_ENV);
    }
}
