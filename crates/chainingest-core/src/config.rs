//! Ingestion configuration.
//!
//! Every field has a default so a config file only needs to name what it
//! changes. The CLI reads this from YAML.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::classifier::DispositionTable;
use crate::error::IngestError;
use crate::retry::RetryConfig;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub chain: ChainConfig,
    pub store: StoreConfig,
    pub queue: QueueConfig,
    pub scheduler: SchedulerConfig,
    pub worker: WorkerConfig,
    pub policy: DispositionTable,
    pub log: LogConfig,
}

impl IngestConfig {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chain.node_url.is_empty() {
            return Err(IngestError::Config("chain.node_url is empty".into()));
        }
        if self.store.url.is_empty() {
            return Err(IngestError::Config("store.url is empty".into()));
        }
        if self.store.table.is_empty() {
            return Err(IngestError::Config("store.table is empty".into()));
        }
        if self.scheduler.tick_interval_ms == 0 {
            return Err(IngestError::Config("scheduler.tick_interval_ms must be > 0".into()));
        }
        if self.scheduler.batch_size == 0 {
            return Err(IngestError::Config("scheduler.batch_size must be > 0".into()));
        }
        if self.worker.concurrency == 0 {
            return Err(IngestError::Config("worker.concurrency must be > 0".into()));
        }
        Ok(())
    }
}

/// Chain node connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// REST API base URL, e.g. `http://localhost:8080/v1`.
    pub node_url: String,
    pub request_timeout_ms: u64,
    /// Retries for transient HTTP failures inside the client.
    pub retry: RetryConfig,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            node_url: "http://127.0.0.1:8080/v1".into(),
            request_timeout_ms: 30_000,
            retry: RetryConfig {
                max_retries: 3,
                initial_backoff_ms: 100,
                max_backoff_ms: 10_000,
                ..RetryConfig::default()
            },
        }
    }
}

/// Columnar store connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// ClickHouse HTTP interface, e.g. `http://localhost:8123`.
    pub url: String,
    pub database: String,
    pub table: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub request_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8123".into(),
            database: "default".into(),
            table: "event_v7".into(),
            user: None,
            password: None,
            request_timeout_ms: 60_000,
        }
    }
}

/// Durable queue location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Queue name; several queues can share one database.
    pub name: String,
    /// SQLite path or `sqlite:` URL.
    pub database_url: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "ol-version-v7".into(),
            database_url: "./chainingest.db".into(),
        }
    }
}

/// Version scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Cursor key.
    pub id: String,
    /// How often a `fetchLatestVersion` job is enqueued.
    pub tick_interval_ms: u64,
    /// Version jobs per bulk enqueue call.
    pub batch_size: u64,
    /// Ignore the cursor and submit `[0, head]` on every tick.
    pub full_rescan: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            id: "ol-version-v7".into(),
            tick_interval_ms: 10_000,
            batch_size: 1_000,
            full_rescan: false,
        }
    }
}

/// Worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of concurrent workers.
    pub concurrency: usize,
    /// Sleep between polls of an empty queue.
    pub poll_interval_ms: u64,
    /// Upper bound on a single job; expiry is retryable.
    pub job_timeout_ms: u64,
    /// `running` jobs untouched for this long are returned to `pending` at start.
    pub stall_timeout_ms: u64,
    /// Redelivery policy for retryable failures.
    pub retry: RetryConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            poll_interval_ms: 500,
            job_timeout_ms: 60_000,
            stall_timeout_ms: 300_000,
            retry: RetryConfig::default(),
        }
    }
}

/// Log level per component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Global default level: "trace" | "debug" | "info" | "warn" | "error"
    #[serde(default = "default_level")]
    pub level: String,
    /// Override per component: crate name → level
    #[serde(default)]
    pub components: HashMap<String, String>,
    /// Emit JSON structured logs instead of human-readable text.
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            components: HashMap::new(),
            json: false,
        }
    }
}
