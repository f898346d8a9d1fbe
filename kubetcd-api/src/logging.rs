//! Logging configuration module
//! Console output plus an optional rotating JSON log file

use serde::{Deserialize, Serialize};
use std::io;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const LOG_FILE_NAME: &str = "kubetcd.log";

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,             // log level (trace, debug, info, warn, error)
    pub file_path: Option<String>, // log directory; console only when unset
    pub rotation: LogRotation,
    pub json_format: bool, // JSON on the console too
}

/// Log rotation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Hourly,
    Daily,
    Never,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_path: None,
            rotation: LogRotation::Daily,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Initialize logging based on configuration.
    ///
    /// The returned guard flushes the file writer on drop; keep it alive for
    /// the lifetime of the process.
    pub fn init(&self) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error>> {
        let env_filter =
            EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&self.level))?;

        let console_layer = fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_thread_ids(false)
            .with_ansi(!self.json_format)
            .with_writer(io::stdout);
        let console_layer = if self.json_format {
            console_layer.json().boxed()
        } else {
            console_layer.boxed()
        };

        let guard = if let Some(ref path) = self.file_path {
            let file_appender = match self.rotation {
                LogRotation::Hourly => rolling::hourly(path, LOG_FILE_NAME),
                LogRotation::Daily => rolling::daily(path, LOG_FILE_NAME),
                LogRotation::Never => rolling::never(path, LOG_FILE_NAME),
            };

            let (non_blocking, guard) = non_blocking(file_appender);

            let file_layer = fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .json()
                .with_writer(non_blocking);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .with(file_layer)
                .try_init()?;

            Some(guard)
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .try_init()?;

            None
        };

        tracing::info!("Logging initialized - level: {}", self.level);

        Ok(guard)
    }
}

/// Log an etcd operation with its cluster
#[macro_export]
macro_rules! log_etcd_operation {
    ($op:expr, $cluster_id:expr) => {
        tracing::info!(
            operation = $op,
            cluster_id = $cluster_id,
            "etcd operation"
        )
    };
    ($op:expr, $cluster_id:expr, $($key:ident = $value:expr),+) => {
        tracing::info!(
            operation = $op,
            cluster_id = $cluster_id,
            $($key = $value),+,
            "etcd operation"
        )
    };
}
