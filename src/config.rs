//! TOML configuration types for dlpgate.
//!
//! The top-level [`AppConfig`] is deserialized from `dlpgate.toml`. Only the
//! `[nightfall]` section is required; every other section falls back to
//! defaults suitable for a single-host deployment.
//!
//! # Example `dlpgate.toml`
//!
//! ```toml
//! [server]
//! listen = "127.0.0.1:8080"
//!
//! [nightfall]
//! api_key = "${NIGHTFALL_API_KEY}"
//! signing_secret = "${NIGHTFALL_SIGNING_SECRET}"
//! policy_uuid = "${NIGHTFALL_POLICY_UUID}"
//! detection_rules = ["6c4b3a6e-0000-0000-0000-000000000000"]
//!
//! [storage]
//! root = "objects"
//! database = "dlpgate.db"
//! correlation_table = "uploads"
//! ```
//!
//! When no file exists, [`AppConfig::from_env`] builds the same structure from
//! the `NIGHTFALL_*` and `DYNAMODB_TABLE_NAME` environment variables.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{DlpGateError, Result};

/// Matches `${VAR}` or bare `$VAR` (upper-case only, to avoid false positives).
static ENV_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Z_][A-Z0-9_]*)").expect("valid regex")
});

pub const DEFAULT_BASE_URL: &str = "https://api.nightfall.ai";

/// HTTP server settings (`[server]` section).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., `"127.0.0.1:8080"`).
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

/// Scanning API credentials and scan parameters (`[nightfall]` section).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NightfallConfig {
    /// API key sent as a bearer token.
    pub api_key: String,
    /// Shared secret used to sign webhook callbacks.
    pub signing_secret: String,
    /// Policy applied to uploaded files. Required for file scans.
    #[serde(default)]
    pub policy_uuid: Option<String>,
    /// Detection rules applied by the redaction filter. Empty falls back to
    /// `NIGHTFALL_DETECTION_RULES`.
    #[serde(default)]
    pub detection_rules: Vec<String>,
    /// API base URL, without a trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

/// Object storage and local database (`[storage]` section).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Root directory; each bucket is a subdirectory.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// SQLite file holding tags, correlation records and metrics.
    #[serde(default = "default_database")]
    pub database: PathBuf,
    /// Table holding upload-id → object correlation records.
    #[serde(default = "default_correlation_table")]
    pub correlation_table: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            database: default_database(),
            correlation_table: default_correlation_table(),
        }
    }
}

/// File-system watcher settings (`[watcher]` section).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatcherConfig {
    /// Directory watched recursively.
    #[serde(default = "default_watch_path")]
    pub path: PathBuf,
    /// Regexes of paths to ignore, matched case-insensitively.
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,
    /// Newly created files must be strictly larger than this to be scanned.
    #[serde(default = "default_min_file_size")]
    pub min_file_size: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            path: default_watch_path(),
            ignore: default_ignore(),
            min_file_size: default_min_file_size(),
        }
    }
}

/// Metric emission settings (`[metrics]` section).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Dimension value reported by the host webhook.
    #[serde(default = "default_instance_name")]
    pub instance_name: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            instance_name: default_instance_name(),
        }
    }
}

/// Webhook verification settings (`[webhook]` section).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WebhookConfig {
    /// Reject callbacks whose timestamp is further than this from now.
    /// Disabled when unset.
    #[serde(default)]
    pub max_timestamp_skew_secs: Option<u64>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging settings (`[logging]` section).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::Text,
        }
    }
}

/// Top-level application configuration deserialized from `dlpgate.toml`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub nightfall: NightfallConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load and parse the configuration from a TOML file at the given path.
    ///
    /// Before parsing, `${VAR}` and `$VAR` placeholders in the TOML text are
    /// replaced with the corresponding environment variable values. An error is
    /// returned if a referenced variable is not set.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration text, substituting environment placeholders first.
    pub fn from_toml(content: &str) -> Result<Self> {
        let content = substitute_env_vars(content)?;
        let mut config: AppConfig = toml::from_str(&content)?;
        config.fill_detection_rules(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Take detection rules from `NIGHTFALL_DETECTION_RULES` when the file
    /// lists none, so a file and the environment resolve the same rules.
    fn fill_detection_rules(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if !self.nightfall.detection_rules.is_empty() {
            return;
        }
        if let Some(rules) = lookup("NIGHTFALL_DETECTION_RULES") {
            self.nightfall.detection_rules = parse_rule_list(&rules);
        }
    }

    /// Build a configuration from environment variables alone.
    ///
    /// `NIGHTFALL_API_KEY` and `NIGHTFALL_SIGNING_SECRET` are required;
    /// `NIGHTFALL_POLICY_UUID`, `NIGHTFALL_DETECTION_RULES` (comma-separated)
    /// and `DYNAMODB_TABLE_NAME` are optional.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |name: &str| {
            lookup(name).ok_or_else(|| DlpGateError::ConfigEnvVar(name.to_string()))
        };

        let detection_rules = lookup("NIGHTFALL_DETECTION_RULES")
            .map(|rules| parse_rule_list(&rules))
            .unwrap_or_default();

        let mut storage = StorageConfig::default();
        if let Some(table) = lookup("DYNAMODB_TABLE_NAME") {
            storage.correlation_table = table;
        }

        let config = AppConfig {
            server: ServerConfig::default(),
            nightfall: NightfallConfig {
                api_key: required("NIGHTFALL_API_KEY")?,
                signing_secret: required("NIGHTFALL_SIGNING_SECRET")?,
                policy_uuid: lookup("NIGHTFALL_POLICY_UUID"),
                detection_rules,
                base_url: default_base_url(),
            },
            storage,
            watcher: WatcherConfig::default(),
            metrics: MetricsConfig::default(),
            webhook: WebhookConfig::default(),
            logging: LoggingConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when it exists, otherwise fall back to [`from_env`](Self::from_env).
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_path(path)
        } else {
            Self::from_env()
        }
    }

    /// Check values the type system cannot.
    pub fn validate(&self) -> Result<()> {
        if !crate::store::is_valid_table_name(&self.storage.correlation_table) {
            return Err(DlpGateError::Config(format!(
                "correlation_table '{}' is not a valid table name",
                self.storage.correlation_table
            )));
        }
        for pattern in &self.watcher.ignore {
            Regex::new(pattern).map_err(|e| {
                DlpGateError::Config(format!("invalid ignore pattern '{}': {}", pattern, e))
            })?;
        }
        Ok(())
    }
}

/// Split a comma-separated rule list, dropping blanks.
pub fn parse_rule_list(rules: &str) -> Vec<String> {
    rules
        .split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect()
}

/// Replace `${VAR_NAME}` and `$VAR_NAME` placeholders with environment variable values.
///
/// Returns an error containing the variable name if the variable is not set.
fn substitute_env_vars(input: &str) -> Result<String> {
    let mut result = String::with_capacity(input.len());
    let mut last = 0;
    for cap in ENV_PLACEHOLDER.captures_iter(input) {
        let Some(whole) = cap.get(0) else { continue };
        let var_name = cap
            .get(1)
            .or_else(|| cap.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        let value = std::env::var(var_name)
            .map_err(|_| DlpGateError::ConfigEnvVar(var_name.to_string()))?;
        result.push_str(&input[last..whole.start()]);
        result.push_str(&value);
        last = whole.end();
    }
    result.push_str(&input[last..]);
    Ok(result)
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_root() -> PathBuf {
    PathBuf::from("objects")
}

fn default_database() -> PathBuf {
    PathBuf::from("dlpgate.db")
}

fn default_correlation_table() -> String {
    "uploads".to_string()
}

fn default_watch_path() -> PathBuf {
    PathBuf::from("/home")
}

fn default_ignore() -> Vec<String> {
    vec![r".*\.swp$".to_string(), r".*\.swx".to_string()]
}

fn default_min_file_size() -> u64 {
    8
}

fn default_namespace() -> String {
    "DLP".to_string()
}

fn default_instance_name() -> String {
    "Public VM".to_string()
}

fn default_level() -> String {
    "info".to_string()
}
