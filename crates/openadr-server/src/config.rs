//! Overlay host settings: a TOML file, then `OPENADR_*` variables on top.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Everything the overlay host reads at startup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Listen address.
    #[serde(default)]
    pub server: ServerConfig,

    /// Event index storage.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Contract schema selection.
    #[serde(default)]
    pub contract: ContractConfig,

    /// Tracing output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the HTTP listener binds.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Interface address, `127.0.0.1` unless overridden.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// TCP port.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// SQLite index settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// File holding the event index; created if missing.
    #[serde(default = "default_db_path")]
    pub path: String,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Contract schema selection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContractConfig {
    /// Path to a compiled contract artifact; the built-in schema is used
    /// when unset.
    #[serde(default)]
    pub artifact_path: Option<String>,
}

/// Tracing subscriber settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, such as `openadr_overlay=debug,info`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit one JSON object per log line.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_db_path() -> String {
    "openadr.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Why the configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// The file is not valid TOML for [`Config`].
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Reads `path` when it exists, otherwise starts from defaults, then
/// applies environment overrides.
///
/// Recognised variables:
/// - `OPENADR_HOST` overrides `server.host`
/// - `OPENADR_PORT` overrides `server.port`
/// - `OPENADR_DB_PATH` overrides `database.path`
/// - `OPENADR_ARTIFACT_PATH` overrides `contract.artifact_path`
/// - `OPENADR_LOG_LEVEL` overrides `logging.level`
/// - `OPENADR_LOG_JSON` overrides `logging.json` (`true` enables it)
///
/// # Errors
///
/// A present file that cannot be read or parsed is an error; a missing
/// one is not.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    if let Ok(host) = std::env::var("OPENADR_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Ok(port) = std::env::var("OPENADR_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Ok(db_path) = std::env::var("OPENADR_DB_PATH") {
        config.database.path = db_path;
    }
    if let Ok(artifact) = std::env::var("OPENADR_ARTIFACT_PATH") {
        if !artifact.trim().is_empty() {
            config.contract.artifact_path = Some(artifact);
        }
    }
    if let Ok(level) = std::env::var("OPENADR_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("OPENADR_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = load_config(path.to_str()).unwrap();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.database.pool_max_size, 8);
        assert!(config.contract.artifact_path.is_none());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = 4100\n\n[database]\npath = \"/var/lib/openadr/events.db\"").unwrap();

        let config = load_config(file.path().to_str()).unwrap();
        assert_eq!(config.server.port, 4100);
        assert_eq!(config.server.host, default_host());
        assert_eq!(config.database.path, "/var/lib/openadr/events.db");
        assert_eq!(config.database.busy_timeout_ms, 5_000);
        assert_eq!(config.logging.level, "info");
    }
}
