use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Immutable per-run settings. Built once at startup from the config file
/// and/or CLI flags, read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the OpenWebUI SQLite database.
    pub database: PathBuf,

    /// Path to the audit log file. Extraction is skipped when unset.
    #[serde(default)]
    pub audit_log: Option<PathBuf>,

    /// Loki push API endpoint.
    #[serde(default = "default_loki_url")]
    pub loki_url: String,

    /// Maximum number of events per push request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Sleep between extraction cycles.
    #[serde(with = "humantime_serde", default = "default_interval")]
    pub interval: Duration,

    /// Request timeout for a single push.
    #[serde(with = "humantime_serde", default = "default_push_timeout")]
    pub push_timeout: Duration,

    /// Static labels attached to every stream.
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

fn default_loki_url() -> String {
    "http://localhost:3100/loki/api/v1/push".to_string()
}

fn default_batch_size() -> usize {
    100
}

fn default_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_push_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Config {
    /// Config with defaults for everything but the database path; the shape
    /// used when running from CLI flags alone.
    pub fn new(database: PathBuf) -> Self {
        Self {
            database,
            audit_log: None,
            loki_url: default_loki_url(),
            batch_size: default_batch_size(),
            interval: default_interval(),
            push_timeout: default_push_timeout(),
            labels: HashMap::new(),
        }
    }

    /// Fill in the `job` and `source` labels when the operator supplied
    /// neither. Explicit values are left alone.
    pub fn ensure_default_labels(&mut self) {
        self.labels
            .entry("job".to_string())
            .or_insert_with(|| "openwebui".to_string());
        self.labels
            .entry("source".to_string())
            .or_insert_with(|| "openwebui".to_string());
    }
}
