//! Configuration management for kubetcd
//!
//! Settings are layered, later sources winning:
//! 1. Default values
//! 2. Configuration file (TOML format)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::etcd::command::EtcdctlConfig;
use crate::etcd::EtcdSettings;
use crate::kubernetes::PodSelector;
pub use crate::logging::{LogRotation, LoggingConfig};
use kubetcd_common::etcd::{DEFAULT_KEY_LIMIT, DEFAULT_TREE_LIMIT, MAX_KEY_LIMIT};

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KubetcdConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub encryption: EncryptionConfig,
    pub etcd: EtcdConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite:///var/lib/kubetcd/kubetcd.db")
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
}

/// Credential encryption
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionConfig {
    /// Secret the credential key is derived from. Never written back out.
    #[serde(skip_serializing)]
    pub key: Option<String>,
}

impl std::fmt::Debug for EncryptionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionConfig")
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// etcd pod discovery and etcdctl invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EtcdConfig {
    /// Namespace the etcd pods run in
    pub namespace: String,
    pub primary_selector: String,
    pub fallback_selector: String,
    /// Name fragment a fallback pod must contain
    pub pod_marker: String,
    pub endpoint: String,
    pub cacert: String,
    pub cert: String,
    pub key: String,
    /// Upper bound on a single etcdctl run
    pub command_timeout_secs: u64,
    /// Upper bound on establishing a control-plane session
    pub connect_timeout_secs: u64,
    pub default_list_limit: u32,
    pub default_tree_limit: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:///var/lib/kubetcd/kubetcd.db".to_string(),
            max_connections: 16,
        }
    }
}

impl Default for EtcdConfig {
    fn default() -> Self {
        let selector = PodSelector::default();
        let etcdctl = EtcdctlConfig::default();
        Self {
            namespace: selector.namespace,
            primary_selector: selector.primary,
            fallback_selector: selector.fallback,
            pod_marker: selector.marker,
            endpoint: etcdctl.endpoint,
            cacert: etcdctl.cacert,
            cert: etcdctl.cert,
            key: etcdctl.key,
            command_timeout_secs: 30,
            connect_timeout_secs: 10,
            default_list_limit: DEFAULT_KEY_LIMIT,
            default_tree_limit: DEFAULT_TREE_LIMIT,
        }
    }
}

impl EtcdConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn settings(&self) -> EtcdSettings {
        EtcdSettings {
            selector: PodSelector {
                namespace: self.namespace.clone(),
                primary: self.primary_selector.clone(),
                fallback: self.fallback_selector.clone(),
                marker: self.pod_marker.clone(),
            },
            etcdctl: EtcdctlConfig {
                endpoint: self.endpoint.clone(),
                cacert: self.cacert.clone(),
                cert: self.cert.clone(),
                key: self.key.clone(),
            },
            command_timeout: Duration::from_secs(self.command_timeout_secs),
            default_list_limit: self.default_list_limit,
            default_tree_limit: self.default_tree_limit,
        }
    }
}

impl KubetcdConfig {
    /// Load configuration from the config file (if any) and the environment
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                tracing::debug!("Loading configuration from {:?}", path);
                Self::load_from_file(&path)?
            }
            None => Self::default(),
        };

        config.apply_env_overrides(|name| std::env::var(name).ok());

        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_path_buf(), e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let paths = [
            std::env::var("KUBETCD_CONFIG").ok().map(PathBuf::from),
            Some(PathBuf::from("/etc/kubetcd/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        paths.into_iter().flatten().find(|p| p.exists())
    }

    /// Apply environment variable overrides through `lookup`
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Server
        if let Some(host) = lookup("KUBETCD_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("KUBETCD_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }

        // Database
        if let Some(url) = lookup("KUBETCD_DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(max) = lookup("KUBETCD_DATABASE_MAX_CONNECTIONS").and_then(|m| m.parse().ok()) {
            self.database.max_connections = max;
        }

        // Logging
        if let Some(level) = lookup("KUBETCD_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(path) = lookup("KUBETCD_LOG_DIR") {
            self.logging.file_path = Some(path);
        }
        if let Some(json) = lookup("KUBETCD_LOG_JSON") {
            self.logging.json_format = json.parse().unwrap_or(false);
        }

        // Encryption
        if let Some(key) = lookup("ENCRYPTION_KEY").or_else(|| lookup("KUBETCD_ENCRYPTION_KEY")) {
            self.encryption.key = Some(key);
        }

        // etcd
        if let Some(namespace) = lookup("KUBETCD_ETCD_NAMESPACE") {
            self.etcd.namespace = namespace;
        }
        if let Some(endpoint) = lookup("KUBETCD_ETCD_ENDPOINT") {
            self.etcd.endpoint = endpoint;
        }
        if let Some(path) = lookup("KUBETCD_ETCD_CACERT") {
            self.etcd.cacert = path;
        }
        if let Some(path) = lookup("KUBETCD_ETCD_CERT") {
            self.etcd.cert = path;
        }
        if let Some(path) = lookup("KUBETCD_ETCD_KEY") {
            self.etcd.key = path;
        }
        if let Some(secs) = lookup("KUBETCD_ETCD_TIMEOUT").and_then(|s| s.parse().ok()) {
            self.etcd.command_timeout_secs = secs;
        }
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("Port cannot be 0".to_string()));
        }

        if self.database.url.is_empty() {
            return Err(ConfigError::Validation(
                "Database URL cannot be empty".to_string(),
            ));
        }

        if self.etcd.command_timeout_secs == 0 || self.etcd.connect_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "etcd timeouts must be greater than 0".to_string(),
            ));
        }

        if self.etcd.endpoint.is_empty() {
            return Err(ConfigError::Validation(
                "etcd endpoint cannot be empty".to_string(),
            ));
        }

        for (name, limit) in [
            ("default_list_limit", self.etcd.default_list_limit),
            ("default_tree_limit", self.etcd.default_tree_limit),
        ] {
            if limit == 0 || limit > MAX_KEY_LIMIT {
                return Err(ConfigError::Validation(format!(
                    "etcd.{} must be between 1 and {}",
                    name, MAX_KEY_LIMIT
                )));
            }
        }

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0:?}: {1}")]
    FileRead(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Config validation failed: {0}")]
    Validation(String),
}
