//! Service configuration.
//!
//! Built-in defaults, overlaid by a TOML file, overlaid by `DISCUSS_*`
//! environment variables (a `.env` file is honoured).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::RetryPolicy;
use crate::server::RequestTimeouts;

pub const DEFAULT_CONFIG_FILE: &str = "discuss.toml";

/// Written by `discuss init`
pub const DEFAULT_CONFIG_TOML: &str = r#"[server]
host = "0.0.0.0"
port = 3000

[storage]
data_dir = ".dx/discuss"
busy_timeout_ms = 2000
cache_capacity = 1024

[requests]
default_timeout_ms = 5000
max_timeout_ms = 30000

[requests.read_retry]
max_attempts = 3
initial_delay = 20
backoff_multiplier = 2.0
max_delay = 500

[auth]
actor_header = "x-user-id"

[directory]
path = ".dx/discuss/directory.json"

[logging]
filter = "info"
"#;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub requests: RequestConfig,
    pub auth: AuthConfig,
    pub directory: DirectoryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub busy_timeout_ms: u64,
    /// Maximum number of discussion aggregates kept in the read cache
    pub cache_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".dx/discuss"),
            busy_timeout_ms: 2000,
            cache_capacity: 1024,
        }
    }
}

impl StorageConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    pub default_timeout_ms: u64,
    pub max_timeout_ms: u64,
    /// Applied to reads only
    pub read_retry: RetryPolicy,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 5000,
            max_timeout_ms: 30_000,
            read_retry: RetryPolicy::default(),
        }
    }
}

impl RequestConfig {
    pub fn timeouts(&self) -> RequestTimeouts {
        let default = Duration::from_millis(self.default_timeout_ms.max(1));
        RequestTimeouts {
            default,
            max: Duration::from_millis(self.max_timeout_ms).max(default),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Header carrying the authenticated user id
    pub actor_header: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            actor_header: "x-user-id".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// JSON seed with courses and users
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` wins when set
    pub filter: String,
    /// When set, logs go to a daily rolling file in this directory
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            directory: None,
        }
    }
}

impl AppConfig {
    /// Load `path`, or `discuss.toml` in the working directory if present,
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = lookup("DISCUSS_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("DISCUSS_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("DISCUSS_PORT is not a valid port: {port}"))?;
        }
        if let Some(dir) = lookup("DISCUSS_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup("DISCUSS_DIRECTORY") {
            self.directory.path = Some(PathBuf::from(path));
        }
        if let Some(filter) = lookup("DISCUSS_LOG") {
            self.logging.filter = filter;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_toml_parses() {
        let config = AppConfig::from_toml(DEFAULT_CONFIG_TOML).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.auth.actor_header, "x-user-id");
        assert_eq!(config.requests.read_retry.max_attempts, 3);
        assert_eq!(
            config.requests.read_retry.initial_delay,
            Duration::from_millis(20)
        );
        assert!(config.directory.path.is_some());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = AppConfig::from_toml("[server]\nport = 8080\n").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.storage.cache_capacity, 1024);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [("DISCUSS_PORT", "9100"), ("DISCUSS_LOG", "debug")]
            .into_iter()
            .collect();
        let mut config = AppConfig::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.logging.filter, "debug");

        let mut config = AppConfig::default();
        assert!(config
            .apply_env(|key| (key == "DISCUSS_PORT").then(|| "not-a-port".to_string()))
            .is_err());
    }

    #[test]
    fn test_timeouts_never_below_default() {
        let requests = RequestConfig {
            default_timeout_ms: 5000,
            max_timeout_ms: 100,
            ..Default::default()
        };
        let timeouts = requests.timeouts();
        assert_eq!(timeouts.max, timeouts.default);
    }
}
