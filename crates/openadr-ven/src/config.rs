//! VEN configuration loading from file and environment variables.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::http::RetryPolicy;

/// Top-level VEN configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VenConfig {
    #[serde(default)]
    pub ven: VenSection,

    /// Where the VTN, overlay, ledger node and wallet live.
    #[serde(default)]
    pub endpoints: EndpointsConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub contract: ContractConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Identity and polling behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct VenSection {
    /// VEN identity, used as `venName` and `clientName`.
    #[serde(default)]
    pub ven_id: String,

    /// Program the VEN subscribes to.
    #[serde(default)]
    pub program_id: String,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Width of the timestamp bucket used to match report entries without a
    /// report id.
    #[serde(default = "default_report_bucket_secs")]
    pub report_bucket_secs: u64,

    /// Maximum number of dispatched events remembered.
    #[serde(default = "default_recency_capacity")]
    pub recency_capacity: usize,

    #[serde(default = "default_min_retention_secs")]
    pub min_retention_secs: i64,

    /// Ledger updates given up after this many failed reconciliations.
    #[serde(default = "default_max_reconcile_attempts")]
    pub max_reconcile_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointsConfig {
    #[serde(default = "default_vtn_url")]
    pub vtn_url: String,

    #[serde(default = "default_overlay_url")]
    pub overlay_url: String,

    #[serde(default = "default_node_url")]
    pub node_url: String,

    #[serde(default = "default_wallet_url")]
    pub wallet_url: String,
}

/// Outbound HTTP behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

/// Contract schema selection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContractConfig {
    /// Path to a compiled contract artifact; the built-in schema is used
    /// when unset.
    #[serde(default)]
    pub artifact_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "openadr_ven=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_report_bucket_secs() -> u64 {
    60
}

fn default_recency_capacity() -> usize {
    1024
}

fn default_min_retention_secs() -> i64 {
    300
}

fn default_max_reconcile_attempts() -> u32 {
    5
}

fn default_vtn_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_overlay_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_node_url() -> String {
    "http://127.0.0.1:3001".to_string()
}

fn default_wallet_url() -> String {
    "http://127.0.0.1:3321".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    2000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for VenSection {
    fn default() -> Self {
        Self {
            ven_id: String::new(),
            program_id: String::new(),
            poll_interval_secs: default_poll_interval_secs(),
            report_bucket_secs: default_report_bucket_secs(),
            recency_capacity: default_recency_capacity(),
            min_retention_secs: default_min_retention_secs(),
            max_reconcile_attempts: default_max_reconcile_attempts(),
        }
    }
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            vtn_url: default_vtn_url(),
            overlay_url: default_overlay_url(),
            node_url: default_node_url(),
            wallet_url: default_wallet_url(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
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

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `OPENADR_VEN_ID` overrides `ven.ven_id`
/// - `OPENADR_PROGRAM_ID` overrides `ven.program_id`
/// - `OPENADR_POLL_INTERVAL_SECS` overrides `ven.poll_interval_secs`
/// - `OPENADR_VTN_URL`, `OPENADR_OVERLAY_URL`, `OPENADR_NODE_URL` and
///   `OPENADR_WALLET_URL` override the matching `endpoints` entries
/// - `OPENADR_LOG_LEVEL` overrides `logging.level`
/// - `OPENADR_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed, or
/// if the VEN id or program id is missing after overrides.
pub fn load_config(path: Option<&str>) -> Result<VenConfig, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                VenConfig::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => VenConfig::default(),
    };

    if let Ok(ven_id) = std::env::var("OPENADR_VEN_ID") {
        config.ven.ven_id = ven_id;
    }
    if let Ok(program_id) = std::env::var("OPENADR_PROGRAM_ID") {
        config.ven.program_id = program_id;
    }
    if let Ok(secs) = std::env::var("OPENADR_POLL_INTERVAL_SECS") {
        if let Ok(parsed) = secs.parse() {
            config.ven.poll_interval_secs = parsed;
        }
    }
    if let Ok(url) = std::env::var("OPENADR_VTN_URL") {
        config.endpoints.vtn_url = url;
    }
    if let Ok(url) = std::env::var("OPENADR_OVERLAY_URL") {
        config.endpoints.overlay_url = url;
    }
    if let Ok(url) = std::env::var("OPENADR_NODE_URL") {
        config.endpoints.node_url = url;
    }
    if let Ok(url) = std::env::var("OPENADR_WALLET_URL") {
        config.endpoints.wallet_url = url;
    }
    if let Ok(level) = std::env::var("OPENADR_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("OPENADR_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &VenConfig) -> Result<(), ConfigError> {
    if config.ven.ven_id.trim().is_empty() {
        return Err(ConfigError::Invalid("ven.ven_id must be set".to_string()));
    }
    if config.ven.program_id.trim().is_empty() {
        return Err(ConfigError::Invalid("ven.program_id must be set".to_string()));
    }
    if config.ven.poll_interval_secs == 0 {
        return Err(ConfigError::Invalid(
            "ven.poll_interval_secs must be positive".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("should create temp file");
        file.write_all(contents.as_bytes()).expect("should write config");
        file
    }

    #[test]
    fn parses_full_file() {
        let file = write_config(
            r#"
            [ven]
            ven_id = "VEN-1"
            program_id = "residential-demand-response"
            poll_interval_secs = 30

            [endpoints]
            vtn_url = "https://vtn.example"

            [http]
            max_attempts = 5

            [contract]
            artifact_path = "artifacts/OpenADR.json"

            [logging]
            level = "debug"
            json = true
            "#,
        );

        let config = load_config(file.path().to_str()).expect("config should load");
        assert_eq!(config.ven.ven_id, "VEN-1");
        assert_eq!(config.ven.program_id, "residential-demand-response");
        assert_eq!(config.ven.poll_interval_secs, 30);
        assert_eq!(config.ven.report_bucket_secs, 60);
        assert_eq!(config.endpoints.vtn_url, "https://vtn.example");
        assert_eq!(config.endpoints.overlay_url, default_overlay_url());
        assert_eq!(config.http.retry_policy().max_attempts, 5);
        assert_eq!(config.http.timeout(), Duration::from_secs(10));
        assert_eq!(
            config.contract.artifact_path.as_deref(),
            Some("artifacts/OpenADR.json")
        );
        assert!(config.logging.json);
    }

    #[test]
    fn missing_identity_is_rejected() {
        let file = write_config("[ven]\nprogram_id = \"prog\"\n");
        let err = load_config(file.path().to_str()).expect_err("ven_id is required");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let file = write_config("[ven\nven_id = ");
        let err = load_config(file.path().to_str()).expect_err("should not parse");
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn default_http_policy_matches_retry_defaults() {
        assert_eq!(HttpConfig::default().retry_policy(), RetryPolicy::default());
    }
}
