//! Configuration management
//!
//! This module provides YAML-based configuration management with support for:
//! - Environment variable overrides
//! - Multiple configuration file locations
//! - Default values for all settings

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::services::backoff::ExponentialBackoff;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub signer: SignerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Signer identity and CA location
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SignerConfig {
    /// Signer name requests must carry to be handled
    #[serde(default = "default_signer_name")]
    pub name: String,
    /// Namespace of the secret holding the CA material
    #[serde(default = "default_ca_secret_namespace")]
    pub ca_secret_namespace: String,
    /// Name of the secret holding the CA material
    #[serde(default = "default_ca_secret_name")]
    pub ca_secret_name: String,
    /// Lifetime of issued certificates in hours
    #[serde(default = "default_certificate_validity_hours")]
    pub certificate_validity_hours: u64,
}

fn default_signer_name() -> String {
    "network.openshift.io/signer".to_string()
}

fn default_ca_secret_namespace() -> String {
    "openshift-ovn-kubernetes".to_string()
}

fn default_ca_secret_name() -> String {
    "signer-ca".to_string()
}

fn default_certificate_validity_hours() -> u64 {
    720
}

/// Upper bound on issued certificate lifetime (ten years)
pub const MAX_CERTIFICATE_VALIDITY_HOURS: u64 = 87_600;

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            name: default_signer_name(),
            ca_secret_namespace: default_ca_secret_namespace(),
            ca_secret_name: default_ca_secret_name(),
            certificate_validity_hours: default_certificate_validity_hours(),
        }
    }
}

/// Object store location
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_root")]
    pub root_dir: PathBuf,
}

fn default_store_root() -> PathBuf {
    PathBuf::from("/var/lib/peer-cert-signer")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root_dir: default_store_root(),
        }
    }
}

/// Worker pool, watch and retry settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControllerConfig {
    /// Number of concurrent reconcile workers
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Seconds between store scans
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Delay before the first retry, in milliseconds
    #[serde(default = "default_backoff_min_ms")]
    pub backoff_min_ms: u64,
    /// Upper bound on the retry delay, in seconds
    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,
    /// Fraction of the delay added as random jitter
    #[serde(default = "default_backoff_jitter")]
    pub backoff_jitter: f64,
}

fn default_workers() -> usize {
    2
}

fn default_poll_interval() -> u64 {
    5
}

fn default_backoff_min_ms() -> u64 {
    500
}

fn default_backoff_max_secs() -> u64 {
    300
}

fn default_backoff_jitter() -> f64 {
    0.1
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            poll_interval_secs: default_poll_interval(),
            backoff_min_ms: default_backoff_min_ms(),
            backoff_max_secs: default_backoff_max_secs(),
            backoff_jitter: default_backoff_jitter(),
        }
    }
}

/// Aggregate health reporting
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StatusConfig {
    /// File the component health is mirrored to (optional)
    #[serde(default)]
    pub status_file: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Log output target (console, file or both)
    #[serde(default)]
    pub target: LogTarget,
    /// Directory for log files (used when target is "file" or "both")
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Log file name prefix
    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,
    /// Enable daily log rotation
    #[serde(default = "default_log_rotation")]
    pub daily_rotation: bool,
    /// Maximum number of log files to keep (0 = unlimited)
    #[serde(default = "default_max_log_files")]
    pub max_log_files: usize,
}

/// Log output target
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    #[default]
    Console,
    File,
    Both,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/peer-cert-signer")
}

fn default_log_prefix() -> String {
    "peer-cert-signer".to_string()
}

fn default_log_rotation() -> bool {
    true
}

fn default_max_log_files() -> usize {
    14
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            target: LogTarget::default(),
            log_dir: default_log_dir(),
            log_prefix: default_log_prefix(),
            daily_rotation: default_log_rotation(),
            max_log_files: default_max_log_files(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values
    /// 2. Configuration file (YAML)
    /// 3. Environment variables
    pub fn load() -> Result<Self> {
        // Try to load .env file if it exists
        let _ = dotenvy::dotenv();

        let config_path = std::env::var("SIGNER_CONFIG")
            .map(PathBuf::from)
            .ok()
            .or_else(Self::find_config_file);

        let mut config = match config_path {
            Some(ref path) if path.exists() => {
                eprintln!("[CONFIG] Loading configuration from: {:?}", path);
                Self::from_file(path)?
            }
            Some(ref path) => {
                eprintln!("[CONFIG] Config file not found: {:?}, using defaults", path);
                AppConfig::default()
            }
            None => {
                eprintln!("[CONFIG] No config file found, using defaults");
                AppConfig::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parse a YAML configuration file without environment overrides
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        serde_norway::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Find the configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let paths = [
            PathBuf::from("config.yaml"),
            PathBuf::from("config/config.yaml"),
            PathBuf::from("/etc/peer-cert-signer/config.yaml"),
            dirs::config_dir()
                .map(|p| p.join("peer-cert-signer/config.yaml"))
                .unwrap_or_default(),
        ];

        paths.into_iter().find(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Signer overrides
        if let Some(name) = var("SIGNER_NAME") {
            self.signer.name = name;
        }
        if let Some(namespace) = var("SIGNER_CA_NAMESPACE") {
            self.signer.ca_secret_namespace = namespace;
        }
        if let Some(name) = var("SIGNER_CA_NAME") {
            self.signer.ca_secret_name = name;
        }

        if let Some(root) = var("SIGNER_STORE_ROOT") {
            self.store.root_dir = PathBuf::from(root);
        }

        // Controller overrides
        if let Some(workers) = var("SIGNER_WORKERS") {
            if let Ok(w) = workers.parse() {
                self.controller.workers = w;
            }
        }
        if let Some(interval) = var("SIGNER_POLL_INTERVAL_SECS") {
            if let Ok(i) = interval.parse() {
                self.controller.poll_interval_secs = i;
            }
        }

        if let Some(path) = var("SIGNER_STATUS_FILE") {
            self.status.status_file = Some(PathBuf::from(path));
        }

        // Logging overrides
        if let Some(level) = var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Some(format) = var("SIGNER_LOG_FORMAT") {
            self.logging.format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "compact" => LogFormat::Compact,
                _ => LogFormat::Pretty,
            };
        }
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.signer.name.trim().is_empty() {
            anyhow::bail!("Signer name cannot be empty");
        }
        if self.signer.ca_secret_namespace.is_empty() || self.signer.ca_secret_name.is_empty() {
            anyhow::bail!("CA secret namespace and name must both be set");
        }
        if self.signer.certificate_validity_hours == 0 {
            anyhow::bail!("Certificate validity must be at least one hour");
        }
        if self.signer.certificate_validity_hours > MAX_CERTIFICATE_VALIDITY_HOURS {
            anyhow::bail!(
                "Certificate validity cannot exceed {} hours",
                MAX_CERTIFICATE_VALIDITY_HOURS
            );
        }

        if self.controller.workers == 0 {
            anyhow::bail!("Controller workers cannot be 0");
        }
        if self.controller.poll_interval_secs == 0 {
            anyhow::bail!("Poll interval cannot be 0");
        }
        self.backoff().context("Invalid controller backoff settings")?;

        Ok(())
    }

    /// Lifetime of issued certificates
    pub fn certificate_validity(&self) -> Duration {
        Duration::from_secs(self.signer.certificate_validity_hours.saturating_mul(3600))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.controller.poll_interval_secs)
    }

    /// Requeue backoff built from the controller settings
    pub fn backoff(&self) -> Result<ExponentialBackoff> {
        let backoff = ExponentialBackoff::new(
            Duration::from_millis(self.controller.backoff_min_ms),
            Duration::from_secs(self.controller.backoff_max_secs),
            self.controller.backoff_jitter,
        )?;
        Ok(backoff)
    }
}
