//! SQLite backend for the job queue and the scheduler cursor.
//!
//! One database file can hold several queues; every job row and every submit
//! cursor is scoped by queue name. Completed and failed rows are kept so
//! their ids keep de-duplicating. Completed rows without an id are deleted.
//!
//! # Usage
//! ```rust,no_run
//! use chainingest_storage::sqlite::SqliteStore;
//!
//! # async fn example() -> Result<(), chainingest_core::IngestError> {
//! // File-backed (persistent)
//! let store = SqliteStore::open("./chainingest.db", "ol-version-v7").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStore::in_memory("ol-version-v7").await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use std::time::Duration;
use tracing::{debug, warn};

use chainingest_core::checkpoint::CursorStore;
use chainingest_core::cursor::SubmitCursor;
use chainingest_core::error::IngestError;
use chainingest_core::job::{Job, JobPayload, JobStatus, NewJob};
use chainingest_core::queue::{JobQueue, QueueCounts};

fn queue_err(e: sqlx::Error) -> IngestError {
    IngestError::Queue(e.to_string())
}

fn storage_err(e: sqlx::Error) -> IngestError {
    IngestError::Storage(e.to_string())
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A job that ended in `failed`, for operator inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedJob {
    pub key: String,
    pub name: String,
    pub attempts: u32,
    pub last_error: Option<String>,
}

/// SQLite-backed job queue and cursor store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    queue: String,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./chainingest.db"`) or a full
    /// SQLite URL (`"sqlite:./chainingest.db?mode=rwc"`).
    pub async fn open(path: &str, queue: impl Into<String>) -> Result<Self, IngestError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(storage_err)?;
        let store = Self {
            pool,
            queue: queue.into(),
        };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory database. A single connection keeps every query on
    /// the same database; all data is lost when the store is dropped.
    pub async fn in_memory(queue: impl Into<String>) -> Result<Self, IngestError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;
        let store = Self {
            pool,
            queue: queue.into(),
        };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn queue_name(&self) -> &str {
        &self.queue
    }

    async fn init_schema(&self) -> Result<(), IngestError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS ingest_jobs (
                seq        INTEGER PRIMARY KEY AUTOINCREMENT,
                queue      TEXT    NOT NULL,
                job_key    TEXT    NOT NULL,
                job_id     TEXT,
                name       TEXT    NOT NULL,
                payload    TEXT    NOT NULL,
                status     TEXT    NOT NULL,
                attempts   INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                run_at     INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE (queue, job_key)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_ingest_jobs_ready
             ON ingest_jobs (queue, status, run_at, seq);",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS submit_cursors (
                queue          TEXT    NOT NULL,
                scheduler_id   TEXT    NOT NULL,
                last_submitted INTEGER NOT NULL,
                updated_at     INTEGER NOT NULL,
                PRIMARY KEY (queue, scheduler_id)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    async fn insert_job<'e, E>(&self, executor: E, job: NewJob) -> Result<bool, IngestError>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let payload =
            serde_json::to_string(&job.payload).map_err(|e| IngestError::Queue(e.to_string()))?;
        let key = job
            .id
            .clone()
            .unwrap_or_else(|| format!("anon:{}", uuid::Uuid::new_v4()));
        let now = now_ms();

        let result = sqlx::query(
            "INSERT INTO ingest_jobs
                (queue, job_key, job_id, name, payload, status, attempts, run_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, 'pending', 0, ?, ?, ?)
             ON CONFLICT (queue, job_key) DO NOTHING",
        )
        .bind(&self.queue)
        .bind(&key)
        .bind(&job.id)
        .bind(&job.name)
        .bind(&payload)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(executor)
        .await
        .map_err(queue_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn settle(
        &self,
        job: &Job,
        status: JobStatus,
        reason: Option<&str>,
        run_at: Option<i64>,
    ) -> Result<(), IngestError> {
        self.settle_key(&job.key, status, reason, run_at).await
    }

    async fn settle_key(
        &self,
        key: &str,
        status: JobStatus,
        reason: Option<&str>,
        run_at: Option<i64>,
    ) -> Result<(), IngestError> {
        let now = now_ms();
        let result = sqlx::query(
            "UPDATE ingest_jobs
             SET status = ?, last_error = COALESCE(?, last_error),
                 run_at = COALESCE(?, run_at), updated_at = ?
             WHERE queue = ? AND job_key = ?",
        )
        .bind(status.as_str())
        .bind(reason)
        .bind(run_at)
        .bind(now)
        .bind(&self.queue)
        .bind(key)
        .execute(&self.pool)
        .await
        .map_err(queue_err)?;

        if result.rows_affected() == 0 {
            return Err(IngestError::Queue(format!("unknown job '{key}'")));
        }
        debug!(job = %key, status = %status, "job settled");
        Ok(())
    }

    /// Most recently failed jobs, newest first.
    pub async fn failed_jobs(&self, limit: u32) -> Result<Vec<FailedJob>, IngestError> {
        let rows = sqlx::query(
            "SELECT job_key, name, attempts, last_error FROM ingest_jobs
             WHERE queue = ? AND status = 'failed'
             ORDER BY updated_at DESC, seq DESC LIMIT ?",
        )
        .bind(&self.queue)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(queue_err)?;

        Ok(rows
            .into_iter()
            .map(|row| FailedJob {
                key: row.get("job_key"),
                name: row.get("name"),
                attempts: row.get::<i64, _>("attempts") as u32,
                last_error: row.get("last_error"),
            })
            .collect())
    }

    /// Status of the job with the given key.
    pub async fn status(&self, key: &str) -> Result<Option<JobStatus>, IngestError> {
        let row = sqlx::query("SELECT status FROM ingest_jobs WHERE queue = ? AND job_key = ?")
            .bind(&self.queue)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(queue_err)?;
        Ok(row.and_then(|r| JobStatus::parse(&r.get::<String, _>("status"))))
    }
}

#[async_trait]
impl JobQueue for SqliteStore {
    fn name(&self) -> &str {
        &self.queue
    }

    async fn enqueue(&self, job: NewJob) -> Result<bool, IngestError> {
        self.insert_job(&self.pool, job).await
    }

    /// All jobs of one call are inserted in a single transaction.
    async fn enqueue_bulk(&self, jobs: Vec<NewJob>) -> Result<u64, IngestError> {
        let mut tx = self.pool.begin().await.map_err(queue_err)?;
        let mut added = 0;
        for job in jobs {
            if self.insert_job(&mut *tx, job).await? {
                added += 1;
            }
        }
        tx.commit().await.map_err(queue_err)?;
        Ok(added)
    }

    /// A row whose payload does not decode is failed on the spot and the
    /// next ready row is claimed instead.
    async fn next(&self) -> Result<Option<Job>, IngestError> {
        loop {
            let now = now_ms();
            let row = sqlx::query(
                "UPDATE ingest_jobs
                 SET status = 'running', attempts = attempts + 1, updated_at = ?
                 WHERE seq = (
                     SELECT seq FROM ingest_jobs
                     WHERE queue = ? AND status = 'pending' AND run_at <= ?
                     ORDER BY run_at, seq LIMIT 1
                 )
                 RETURNING job_key, job_id, name, payload, attempts",
            )
            .bind(now)
            .bind(&self.queue)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(queue_err)?;

            let Some(row) = row else {
                return Ok(None);
            };
            let key: String = row.get("job_key");
            let payload: String = row.get("payload");
            let payload: JobPayload = match serde_json::from_str(&payload) {
                Ok(payload) => payload,
                Err(e) => {
                    let reason = IngestError::InvalidPayload(e.to_string()).to_string();
                    warn!(job = %key, error = %reason, "Failing job with undecodable payload");
                    self.settle_key(&key, JobStatus::Failed, Some(&reason), None)
                        .await?;
                    continue;
                }
            };

            return Ok(Some(Job {
                key,
                id: row.get("job_id"),
                name: row.get("name"),
                payload,
                attempts: row.get::<i64, _>("attempts") as u32,
            }));
        }
    }

    async fn complete(&self, job: &Job) -> Result<(), IngestError> {
        if job.id.is_some() {
            return self.settle(job, JobStatus::Completed, None, None).await;
        }
        let result = sqlx::query("DELETE FROM ingest_jobs WHERE queue = ? AND job_key = ?")
            .bind(&self.queue)
            .bind(&job.key)
            .execute(&self.pool)
            .await
            .map_err(queue_err)?;
        if result.rows_affected() == 0 {
            return Err(IngestError::Queue(format!("unknown job '{}'", job.key)));
        }
        debug!(job = %job.key, "anonymous job completed and removed");
        Ok(())
    }

    async fn retry(&self, job: &Job, delay: Duration, reason: &str) -> Result<(), IngestError> {
        let run_at = now_ms() + delay.as_millis() as i64;
        self.settle(job, JobStatus::Pending, Some(reason), Some(run_at)).await
    }

    async fn fail(&self, job: &Job, reason: &str) -> Result<(), IngestError> {
        self.settle(job, JobStatus::Failed, Some(reason), None).await
    }

    async fn recover_stalled(&self, older_than: Duration) -> Result<u64, IngestError> {
        let now = now_ms();
        let cutoff = now - older_than.as_millis() as i64;
        let result = sqlx::query(
            "UPDATE ingest_jobs SET status = 'pending', run_at = ?, updated_at = ?
             WHERE queue = ? AND status = 'running' AND updated_at <= ?",
        )
        .bind(now)
        .bind(now)
        .bind(&self.queue)
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(queue_err)?;
        Ok(result.rows_affected())
    }

    async fn contains(&self, id: &str) -> Result<bool, IngestError> {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM ingest_jobs WHERE queue = ? AND job_key = ?) AS found",
        )
        .bind(&self.queue)
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(queue_err)?;
        Ok(row.get::<i64, _>("found") != 0)
    }

    async fn counts(&self) -> Result<QueueCounts, IngestError> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS cnt FROM ingest_jobs WHERE queue = ? GROUP BY status",
        )
        .bind(&self.queue)
        .fetch_all(&self.pool)
        .await
        .map_err(queue_err)?;

        let mut counts = QueueCounts::default();
        for row in rows {
            let n = row.get::<i64, _>("cnt") as u64;
            match JobStatus::parse(&row.get::<String, _>("status")) {
                Some(JobStatus::Pending) => counts.pending = n,
                Some(JobStatus::Running) => counts.running = n,
                Some(JobStatus::Completed) => counts.completed = n,
                Some(JobStatus::Failed) => counts.failed = n,
                None => {}
            }
        }
        Ok(counts)
    }
}

#[async_trait]
impl CursorStore for SqliteStore {
    async fn load(
        &self,
        queue: &str,
        scheduler_id: &str,
    ) -> Result<Option<SubmitCursor>, IngestError> {
        let row = sqlx::query(
            "SELECT queue, scheduler_id, last_submitted, updated_at FROM submit_cursors
             WHERE queue = ? AND scheduler_id = ?",
        )
        .bind(queue)
        .bind(scheduler_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.map(|r| SubmitCursor {
            queue: r.get("queue"),
            scheduler_id: r.get("scheduler_id"),
            last_submitted: r.get::<i64, _>("last_submitted") as u64,
            updated_at: r.get("updated_at"),
        }))
    }

    async fn save(&self, cursor: &SubmitCursor) -> Result<(), IngestError> {
        sqlx::query(
            "INSERT INTO submit_cursors (queue, scheduler_id, last_submitted, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (queue, scheduler_id) DO UPDATE SET
                 last_submitted = excluded.last_submitted,
                 updated_at     = excluded.updated_at",
        )
        .bind(&cursor.queue)
        .bind(&cursor.scheduler_id)
        .bind(cursor.last_submitted as i64)
        .bind(cursor.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!(
            queue = %cursor.queue,
            scheduler = %cursor.scheduler_id,
            version = cursor.last_submitted,
            "cursor saved"
        );
        Ok(())
    }

    async fn delete(&self, queue: &str, scheduler_id: &str) -> Result<(), IngestError> {
        sqlx::query("DELETE FROM submit_cursors WHERE queue = ? AND scheduler_id = ?")
            .bind(queue)
            .bind(scheduler_id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainingest_core::chain::ChainClient;
    use chainingest_core::config::SchedulerConfig;
    use chainingest_core::scheduler::{TickReport, VersionScheduler};
    use chainingest_core::types::Transaction;
    use std::sync::Arc;

    async fn store() -> SqliteStore {
        SqliteStore::in_memory("ol-version-v7").await.unwrap()
    }

    #[tokio::test]
    async fn enqueue_dedups_by_id() {
        let s = store().await;
        assert!(s.enqueue(NewJob::version(5)).await.unwrap());
        assert!(!s.enqueue(NewJob::version(5)).await.unwrap());

        let job = s.next().await.unwrap().unwrap();
        s.complete(&job).await.unwrap();
        assert!(!s.enqueue(NewJob::version(5)).await.unwrap());
        assert_eq!(s.counts().await.unwrap().completed, 1);
    }

    #[tokio::test]
    async fn anonymous_jobs_never_dedup() {
        let s = store().await;
        assert!(s.enqueue(NewJob::fetch_latest_version()).await.unwrap());
        assert!(s.enqueue(NewJob::fetch_latest_version()).await.unwrap());
        let job = s.next().await.unwrap().unwrap();
        assert!(job.key.starts_with("anon:"));
        assert_eq!(job.id, None);
        assert_eq!(job.payload, JobPayload::default());
    }

    #[tokio::test]
    async fn bulk_counts_only_new_jobs() {
        let s = store().await;
        s.enqueue(NewJob::version(2)).await.unwrap();
        let added = s
            .enqueue_bulk((0..5).map(NewJob::version).collect())
            .await
            .unwrap();
        assert_eq!(added, 4);
        assert_eq!(s.counts().await.unwrap().pending, 5);
    }

    #[tokio::test]
    async fn claim_order_and_attempts() {
        let s = store().await;
        s.enqueue_bulk(vec![NewJob::version(9), NewJob::version(1)])
            .await
            .unwrap();

        let first = s.next().await.unwrap().unwrap();
        assert_eq!(first.key, "__version__9");
        assert_eq!(first.payload.version, Some(9));
        assert_eq!(first.attempts, 1);
        assert_eq!(s.status("__version__9").await.unwrap(), Some(JobStatus::Running));

        s.retry(&first, Duration::ZERO, "not found").await.unwrap();
        let a = s.next().await.unwrap().unwrap();
        let b = s.next().await.unwrap().unwrap();
        let again = if a.key == "__version__9" { a } else { b };
        assert_eq!(again.attempts, 2);
        assert!(s.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delayed_retry_is_not_ready() {
        let s = store().await;
        s.enqueue(NewJob::version(1)).await.unwrap();
        let job = s.next().await.unwrap().unwrap();
        s.retry(&job, Duration::from_secs(3600), "later").await.unwrap();
        assert!(s.next().await.unwrap().is_none());
        assert_eq!(s.counts().await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn failed_jobs_keep_their_reason() {
        let s = store().await;
        s.enqueue(NewJob::version(42)).await.unwrap();
        let job = s.next().await.unwrap().unwrap();
        s.fail(&job, "unsupported transaction type 'state_checkpoint_transaction'")
            .await
            .unwrap();

        let failed = s.failed_jobs(10).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].key, "__version__42");
        assert_eq!(failed[0].attempts, 1);
        assert!(failed[0].last_error.as_deref().unwrap().contains("state_checkpoint"));
        assert!(s.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stalled_jobs_recovered() {
        let s = store().await;
        s.enqueue(NewJob::version(1)).await.unwrap();
        s.next().await.unwrap().unwrap();
        assert_eq!(s.recover_stalled(Duration::from_secs(3600)).await.unwrap(), 0);
        assert_eq!(s.recover_stalled(Duration::ZERO).await.unwrap(), 1);
        assert_eq!(s.next().await.unwrap().unwrap().attempts, 2);
    }

    #[tokio::test]
    async fn settling_unknown_job_errors() {
        let s = store().await;
        let ghost = Job {
            key: "__version__404".into(),
            id: Some("__version__404".into()),
            name: "version".into(),
            payload: JobPayload { version: Some(404) },
            attempts: 1,
        };
        assert!(matches!(s.complete(&ghost).await, Err(IngestError::Queue(_))));
    }

    #[tokio::test]
    async fn cursor_upsert_and_delete() {
        let s = store().await;
        assert!(s.load("ol-version-v7", "ol").await.unwrap().is_none());

        s.save(&SubmitCursor::new("ol-version-v7", "ol", 100)).await.unwrap();
        s.save(&SubmitCursor::new("ol-version-v7", "ol", 250)).await.unwrap();
        assert_eq!(
            s.load("ol-version-v7", "ol").await.unwrap().unwrap().last_submitted,
            250
        );
        assert!(s.load("ol-version-v8", "ol").await.unwrap().is_none());

        s.delete("ol-version-v7", "ol").await.unwrap();
        assert!(s.load("ol-version-v7", "ol").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn completed_tick_jobs_are_removed() {
        let s = store().await;
        for _ in 0..50 {
            s.enqueue(NewJob::fetch_latest_version()).await.unwrap();
            let job = s.next().await.unwrap().unwrap();
            s.complete(&job).await.unwrap();
        }
        assert_eq!(s.counts().await.unwrap(), QueueCounts::default());

        s.enqueue(NewJob::version(1)).await.unwrap();
        let job = s.next().await.unwrap().unwrap();
        s.complete(&job).await.unwrap();
        assert!(s.contains("__version__1").await.unwrap());
        assert_eq!(s.counts().await.unwrap().completed, 1);
    }

    #[tokio::test]
    async fn undecodable_payload_is_failed_and_skipped() {
        let s = store().await;
        sqlx::query(
            "INSERT INTO ingest_jobs
                (queue, job_key, job_id, name, payload, status, attempts, run_at, created_at, updated_at)
             VALUES ('ol-version-v7', 'broken', 'broken', 'version', '{not json', 'pending', 0, 0, 0, 0)",
        )
        .execute(&s.pool)
        .await
        .unwrap();
        s.enqueue(NewJob::version(3)).await.unwrap();

        let job = s.next().await.unwrap().unwrap();
        assert_eq!(job.key, "__version__3");
        assert_eq!(s.status("broken").await.unwrap(), Some(JobStatus::Failed));
        let failed = s.failed_jobs(10).await.unwrap();
        assert!(failed[0].last_error.as_deref().unwrap().contains("invalid job payload"));
        assert!(s.next().await.unwrap().is_none());
    }

    // ─── Scheduler against one database file ─────────────────────────────────

    struct Head(u64);

    #[async_trait]
    impl ChainClient for Head {
        async fn transactions(&self, _: u64, _: u16) -> Result<Vec<Transaction>, IngestError> {
            Ok(vec![])
        }
        async fn head_version(&self) -> Result<u64, IngestError> {
            Ok(self.0)
        }
        async fn view(
            &self,
            _: &str,
            _: &str,
            _: Vec<String>,
            _: Vec<serde_json::Value>,
        ) -> Result<Vec<serde_json::Value>, IngestError> {
            Ok(vec![])
        }
    }

    async fn tick(store: &SqliteStore, head: u64) -> TickReport {
        let store = Arc::new(store.clone());
        VersionScheduler::new(
            Arc::new(Head(head)),
            store.clone(),
            store,
            SchedulerConfig::default(),
        )
        .tick()
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn renamed_queue_in_same_file_resubmits_everything() {
        let path = std::env::temp_dir().join(format!("chainingest-{}.db", uuid::Uuid::new_v4()));
        let path = path.to_string_lossy().to_string();

        let v7 = SqliteStore::open(&path, "ol-version-v7").await.unwrap();
        assert_eq!(tick(&v7, 3).await.range, Some((0, 3)));
        assert_eq!(v7.counts().await.unwrap().pending, 4);

        let v8 = SqliteStore::open(&path, "ol-version-v8").await.unwrap();
        let report = tick(&v8, 3).await;
        assert_eq!(report.range, Some((0, 3)));
        assert_eq!(report.submitted, 4);
        for v in 0..=3 {
            let status = v8.status(&format!("__version__{v}")).await.unwrap();
            assert_eq!(status, Some(JobStatus::Pending));
        }

        // the v7 cursor still resumes its own queue
        assert_eq!(tick(&v7, 5).await.range, Some((4, 5)));

        drop((v7, v8));
        for suffix in ["", "-wal", "-shm"] {
            std::fs::remove_file(format!("{path}{suffix}")).ok();
        }
    }
}
