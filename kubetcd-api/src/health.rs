//! Service health probes for `/api/health`
//!
//! Local dependencies only; no cluster is contacted. A generated encryption
//! key degrades the service because stored kubeconfigs will not survive a
//! restart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::db::Database;
use crate::encryption::KeySource;

/// Ordered from best to worst so the report status is the max of its probes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub component: String,
    pub status: ProbeStatus,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl ProbeResult {
    fn new(component: &str, status: ProbeStatus, detail: impl Into<String>) -> Self {
        Self {
            component: component.to_string(),
            status,
            detail: detail.into(),
            latency_ms: None,
        }
    }

    fn timed(mut self, started: Instant) -> Self {
        self.latency_ms = Some(started.elapsed().as_millis() as u64);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: ProbeStatus,
    pub version: String,
    pub uptime_secs: u64,
    pub checked_at: DateTime<Utc>,
    pub probes: Vec<ProbeResult>,
}

#[derive(Debug)]
pub struct HealthProbe {
    started: Instant,
    version: String,
}

impl HealthProbe {
    pub fn new(version: &str) -> Self {
        Self {
            started: Instant::now(),
            version: version.to_string(),
        }
    }

    pub async fn database(&self, db: &Database) -> ProbeResult {
        let started = Instant::now();
        let result = match db.ping().await {
            Ok(()) => ProbeResult::new("database", ProbeStatus::Healthy, "reachable"),
            Err(e) => ProbeResult::new("database", ProbeStatus::Unhealthy, e.to_string()),
        };
        result.timed(started)
    }

    /// Registered and active cluster counts
    pub async fn registry(&self, db: &Database) -> ProbeResult {
        let started = Instant::now();
        let result = match db.list_clusters().await {
            Ok(clusters) => {
                let active = clusters.iter().filter(|c| c.is_active).count();
                ProbeResult::new(
                    "registry",
                    ProbeStatus::Healthy,
                    format!("{} clusters, {} active", clusters.len(), active),
                )
            }
            Err(e) => ProbeResult::new("registry", ProbeStatus::Unhealthy, e.to_string()),
        };
        result.timed(started)
    }

    pub fn encryption(&self, source: KeySource) -> ProbeResult {
        match source {
            KeySource::Configured => {
                ProbeResult::new("encryption", ProbeStatus::Healthy, "configured key")
            }
            KeySource::Generated => ProbeResult::new(
                "encryption",
                ProbeStatus::Degraded,
                "generated key; set ENCRYPTION_KEY to keep credentials across restarts",
            ),
        }
    }

    pub fn report(&self, probes: Vec<ProbeResult>) -> HealthReport {
        HealthReport {
            status: probes
                .iter()
                .map(|p| p.status)
                .max()
                .unwrap_or(ProbeStatus::Healthy),
            version: self.version.clone(),
            uptime_secs: self.started.elapsed().as_secs(),
            checked_at: Utc::now(),
            probes,
        }
    }
}
