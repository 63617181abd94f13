//! Durable job queue seam and an in-memory implementation.
//!
//! Semantics every backend provides:
//! - `enqueue` de-duplicates by job id against every retained record
//!   (pending, running, completed or failed);
//! - `next` claims the oldest ready pending job and bumps its attempt count;
//! - completed records with an id are retained so their ids keep
//!   de-duplicating. Completed jobs without an id are dropped.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::IngestError;
use crate::job::{Job, JobPayload, JobStatus, NewJob};

/// Number of job records per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
}

impl QueueCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.running + self.completed + self.failed
    }
}

/// A durable job queue with id-based de-duplication and at-least-once delivery.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Queue name. Submit cursors are scoped by it.
    fn name(&self) -> &str;

    /// Submit a job. Returns `false` if a job with the same id already exists.
    async fn enqueue(&self, job: NewJob) -> Result<bool, IngestError>;

    /// Submit many jobs; returns how many were newly enqueued.
    async fn enqueue_bulk(&self, jobs: Vec<NewJob>) -> Result<u64, IngestError> {
        let mut added = 0;
        for job in jobs {
            if self.enqueue(job).await? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Claim the next ready job, if any.
    async fn next(&self) -> Result<Option<Job>, IngestError>;

    /// Mark a claimed job as completed.
    async fn complete(&self, job: &Job) -> Result<(), IngestError>;

    /// Return a claimed job to the queue, ready after `delay`.
    async fn retry(&self, job: &Job, delay: Duration, reason: &str) -> Result<(), IngestError>;

    /// Mark a claimed job as failed; it will not be delivered again.
    async fn fail(&self, job: &Job, reason: &str) -> Result<(), IngestError>;

    /// Return jobs stuck in `running` for longer than `older_than` to
    /// `pending` (a worker died mid-job). Returns how many were recovered.
    async fn recover_stalled(&self, _older_than: Duration) -> Result<u64, IngestError> {
        Ok(0)
    }

    async fn counts(&self) -> Result<QueueCounts, IngestError>;

    /// `true` if a record with this job id exists, whatever its status.
    async fn contains(&self, id: &str) -> Result<bool, IngestError>;
}

// ─── In-memory queue ──────────────────────────────────────────────────────────

struct Record {
    seq: u64,
    id: Option<String>,
    name: String,
    payload: JobPayload,
    status: JobStatus,
    attempts: u32,
    ready_at: Instant,
    updated_at: Instant,
    last_error: Option<String>,
}

#[derive(Default)]
struct Inner {
    records: HashMap<String, Record>,
    next_seq: u64,
}

/// In-memory job queue for tests and ephemeral runs. Not durable.
pub struct MemoryJobQueue {
    name: String,
    inner: Mutex<Inner>,
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::named("memory")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Status of the job with the given key, if it exists.
    pub fn status(&self, key: &str) -> Option<JobStatus> {
        self.inner.lock().unwrap().records.get(key).map(|r| r.status)
    }

    /// Last recorded failure reason for the job with the given key.
    pub fn last_error(&self, key: &str) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .records
            .get(key)
            .and_then(|r| r.last_error.clone())
    }

    /// Keys of all records, oldest first.
    pub fn keys(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        let mut keys: Vec<_> = inner
            .records
            .iter()
            .map(|(k, r)| (r.seq, k.clone()))
            .collect();
        keys.sort();
        keys.into_iter().map(|(_, k)| k).collect()
    }

    fn finish(
        &self,
        job: &Job,
        status: JobStatus,
        error: Option<&str>,
        ready_at: Option<Instant>,
    ) -> Result<(), IngestError> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .records
            .get_mut(&job.key)
            .ok_or_else(|| IngestError::Queue(format!("unknown job '{}'", job.key)))?;
        if status == JobStatus::Completed && record.id.is_none() {
            inner.records.remove(&job.key);
            return Ok(());
        }
        record.status = status;
        record.updated_at = Instant::now();
        if let Some(e) = error {
            record.last_error = Some(e.to_string());
        }
        if let Some(at) = ready_at {
            record.ready_at = at;
        }
        Ok(())
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn enqueue(&self, job: NewJob) -> Result<bool, IngestError> {
        let mut inner = self.inner.lock().unwrap();
        let seq = inner.next_seq;
        let key = match &job.id {
            Some(id) if inner.records.contains_key(id) => return Ok(false),
            Some(id) => id.clone(),
            None => format!("anon:{seq}"),
        };
        inner.next_seq += 1;
        let now = Instant::now();
        inner.records.insert(
            key,
            Record {
                seq,
                id: job.id,
                name: job.name,
                payload: job.payload,
                status: JobStatus::Pending,
                attempts: 0,
                ready_at: now,
                updated_at: now,
                last_error: None,
            },
        );
        Ok(true)
    }

    async fn next(&self) -> Result<Option<Job>, IngestError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        let candidate = inner
            .records
            .iter()
            .filter(|(_, r)| r.status == JobStatus::Pending && r.ready_at <= now)
            .min_by_key(|(_, r)| (r.ready_at, r.seq))
            .map(|(k, _)| k.clone());

        let Some(key) = candidate else {
            return Ok(None);
        };
        let record = inner
            .records
            .get_mut(&key)
            .ok_or_else(|| IngestError::Queue(format!("job '{key}' vanished")))?;
        record.status = JobStatus::Running;
        record.attempts += 1;
        record.updated_at = now;
        Ok(Some(Job {
            key,
            id: record.id.clone(),
            name: record.name.clone(),
            payload: record.payload.clone(),
            attempts: record.attempts,
        }))
    }

    async fn complete(&self, job: &Job) -> Result<(), IngestError> {
        self.finish(job, JobStatus::Completed, None, None)
    }

    async fn retry(&self, job: &Job, delay: Duration, reason: &str) -> Result<(), IngestError> {
        self.finish(job, JobStatus::Pending, Some(reason), Some(Instant::now() + delay))
    }

    async fn fail(&self, job: &Job, reason: &str) -> Result<(), IngestError> {
        self.finish(job, JobStatus::Failed, Some(reason), None)
    }

    async fn recover_stalled(&self, older_than: Duration) -> Result<u64, IngestError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        let mut recovered = 0;
        for record in inner.records.values_mut() {
            let stalled = now.duration_since(record.updated_at) >= older_than;
            if record.status == JobStatus::Running && stalled {
                record.status = JobStatus::Pending;
                record.ready_at = now;
                record.updated_at = now;
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    async fn contains(&self, id: &str) -> Result<bool, IngestError> {
        Ok(self.inner.lock().unwrap().records.contains_key(id))
    }

    async fn counts(&self) -> Result<QueueCounts, IngestError> {
        let inner = self.inner.lock().unwrap();
        let mut counts = QueueCounts::default();
        for record in inner.records.values() {
            match record.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Running => counts.running += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }
}
