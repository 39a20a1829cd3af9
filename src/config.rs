//! Configuration module for nimbus.

use serde::Deserialize;
use std::path::Path;

use crate::{NimbusError, Result};

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/nimbus.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Blob storage and upload configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root directory for committed blobs and partial uploads.
    #[serde(default = "default_storage_root")]
    pub root: String,
    /// Quota assigned to newly created users, in bytes.
    #[serde(default = "default_quota_bytes")]
    pub default_quota_bytes: i64,
    /// Largest request body accepted by the chunk and single-shot endpoints.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size_mb: u64,
    /// Idle time after which unfinished uploads are reaped. 0 disables the reaper.
    #[serde(default)]
    pub stale_upload_hours: u64,
}

fn default_storage_root() -> String {
    "data/storage".to_string()
}

fn default_quota_bytes() -> i64 {
    10 * 1024 * 1024 * 1024
}

fn default_max_chunk_size() -> u64 {
    64
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            default_quota_bytes: default_quota_bytes(),
            max_chunk_size_mb: default_max_chunk_size(),
            stale_upload_hours: 0,
        }
    }
}

impl StorageConfig {
    /// Body limit in bytes for upload endpoints.
    pub fn max_chunk_bytes(&self) -> usize {
        (self.max_chunk_size_mb as usize).saturating_mul(1024 * 1024)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/nimbus.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Web API configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebConfig {
    /// Allowed CORS origins. Empty means any origin, without credentials.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Web API configuration.
    #[serde(default)]
    pub web: WebConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(NimbusError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| NimbusError::Validation(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `NIMBUS_DATABASE_PATH`: Override the database file path
    /// - `NIMBUS_STORAGE_ROOT`: Override the storage root
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("NIMBUS_DATABASE_PATH") {
            if !path.is_empty() {
                self.database.path = path;
            }
        }
        if let Ok(root) = std::env::var("NIMBUS_STORAGE_ROOT") {
            if !root.is_empty() {
                self.storage.root = root;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.storage.root.trim().is_empty() {
            return Err(NimbusError::Config("storage.root must not be empty".to_string()));
        }
        if self.storage.default_quota_bytes < 0 {
            return Err(NimbusError::Config(
                "storage.default_quota_bytes must not be negative".to_string(),
            ));
        }
        if self.storage.max_chunk_size_mb == 0 {
            return Err(NimbusError::Config(
                "storage.max_chunk_size_mb must be at least 1".to_string(),
            ));
        }
        for origin in &self.web.cors_origins {
            url::Url::parse(origin)
                .map_err(|e| NimbusError::Config(format!("invalid CORS origin {origin}: {e}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);

        assert_eq!(config.database.path, "data/nimbus.db");

        assert_eq!(config.storage.root, "data/storage");
        assert_eq!(config.storage.default_quota_bytes, 10 * 1024 * 1024 * 1024);
        assert_eq!(config.storage.max_chunk_size_mb, 64);
        assert_eq!(config.storage.stale_upload_hours, 0);
        assert_eq!(config.storage.max_chunk_bytes(), 64 * 1024 * 1024);

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.file, "logs/nimbus.log");

        assert!(config.web.cors_origins.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 3000

[database]
path = "custom/db.sqlite"

[storage]
root = "/srv/nimbus"
default_quota_bytes = 1048576
max_chunk_size_mb = 8
stale_upload_hours = 48

[logging]
level = "debug"
file = "custom/logs/app.log"

[web]
cors_origins = ["http://localhost:3000", "http://localhost:5173"]
"#;

        let config = Config::parse(toml).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.database.path, "custom/db.sqlite");
        assert_eq!(config.storage.root, "/srv/nimbus");
        assert_eq!(config.storage.default_quota_bytes, 1048576);
        assert_eq!(config.storage.max_chunk_size_mb, 8);
        assert_eq!(config.storage.stale_upload_hours, 48);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.file, "custom/logs/app.log");
        assert_eq!(config.web.cors_origins.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
[storage]
root = "elsewhere"
"#;

        let config = Config::parse(toml).unwrap();

        // Specified values
        assert_eq!(config.storage.root, "elsewhere");

        // Default values
        assert_eq!(config.storage.max_chunk_size_mb, 64);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.path, "data/nimbus.db");
    }

    #[test]
    fn test_parse_empty_config() {
        let config = Config::parse("").unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.storage.root, "data/storage");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_invalid_config() {
        let toml = "this is not valid toml [[[";
        let result = Config::parse(toml);

        assert!(result.is_err());
        if let Err(NimbusError::Validation(msg)) = result {
            assert!(msg.contains("config parse error"));
        } else {
            panic!("Expected Validation error");
        }
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Config::load("nonexistent.toml");

        assert!(matches!(result, Err(NimbusError::Io(_))));
    }

    #[test]
    fn test_apply_env_overrides() {
        let original = std::env::var("NIMBUS_STORAGE_ROOT").ok();

        std::env::set_var("NIMBUS_STORAGE_ROOT", "/tmp/nimbus-env-root");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.storage.root, "/tmp/nimbus-env-root");

        if let Some(val) = original {
            std::env::set_var("NIMBUS_STORAGE_ROOT", val);
        } else {
            std::env::remove_var("NIMBUS_STORAGE_ROOT");
        }
    }

    #[test]
    fn test_validate_rejects_zero_chunk_size() {
        let mut config = Config::default();
        config.storage.max_chunk_size_mb = 0;

        let result = config.validate();
        assert!(matches!(result, Err(NimbusError::Config(msg)) if msg.contains("max_chunk_size_mb")));
    }

    #[test]
    fn test_validate_rejects_bad_origin() {
        let mut config = Config::default();
        config.web.cors_origins = vec!["not a url".to_string()];

        assert!(matches!(config.validate(), Err(NimbusError::Config(_))));
    }
}
