//! Version scheduler.
//!
//! A tick reads the head version from the node and submits one `version` job
//! for every version not yet covered by the submit cursor:
//!
//! ```text
//! tick
//!  ├── head = chain.head_version()
//!  ├── enqueue version(head)            (newest first, ahead of any backlog)
//!  ├── enqueue_bulk [cursor+1 ..= head] (in batch_size chunks)
//!  └── cursor = head                    (only after the whole range is queued)
//! ```
//!
//! Job ids are deterministic, so re-submitting a version is a no-op in the
//! queue. A tick that fails half way leaves the cursor where it was and the
//! next tick re-submits the same range.
//!
//! The cursor is stored per queue name, so a new queue starts from version 0.
//! A cursor whose own version job is missing from the queue is ignored.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

use crate::chain::ChainClient;
use crate::checkpoint::CursorStore;
use crate::config::SchedulerConfig;
use crate::cursor::SubmitCursor;
use crate::error::IngestError;
use crate::job::{version_job_id, NewJob};
use crate::queue::JobQueue;
use crate::types::Version;

/// Outcome of one scheduler tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub head: Version,
    /// Inclusive range submitted this tick, `None` when nothing was due.
    pub range: Option<(Version, Version)>,
    /// Jobs newly added to the queue (head job included).
    pub submitted: u64,
    /// Jobs the queue already had.
    pub deduplicated: u64,
}

/// Submits `version` jobs for every version up to the chain head.
pub struct VersionScheduler {
    chain: Arc<dyn ChainClient>,
    queue: Arc<dyn JobQueue>,
    cursors: Arc<dyn CursorStore>,
    config: SchedulerConfig,
}

impl VersionScheduler {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        queue: Arc<dyn JobQueue>,
        cursors: Arc<dyn CursorStore>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            chain,
            queue,
            cursors,
            config,
        }
    }

    /// Run one scheduling pass.
    pub async fn tick(&self) -> Result<TickReport, IngestError> {
        let head = self.chain.head_version().await?;
        let mut report = TickReport {
            head,
            range: None,
            submitted: 0,
            deduplicated: 0,
        };

        let queue = self.queue.name().to_string();
        let mut cursor = self.cursors.load(&queue, &self.config.id).await?;
        if let Some(c) = &cursor {
            if !self.queue.contains(&version_job_id(c.last_submitted)).await? {
                tracing::warn!(
                    scheduler = %self.config.id,
                    queue = %queue,
                    cursor = c.last_submitted,
                    "Queue lost the cursor's version job; ignoring stored submit cursor"
                );
                cursor = None;
            }
        }

        if self.queue.enqueue(NewJob::version(head)).await? {
            report.submitted += 1;
        } else {
            report.deduplicated += 1;
        }

        let start = match (&cursor, self.config.full_rescan) {
            (_, true) | (None, false) => Some(0),
            (Some(c), false) if head < c.last_submitted => {
                tracing::warn!(
                    scheduler = %self.config.id,
                    head,
                    cursor = c.last_submitted,
                    "Node head is behind the submit cursor; leaving cursor in place"
                );
                return Ok(report);
            }
            (Some(c), false) => c.next_version(),
        };

        if let Some(start) = start.filter(|s| *s <= head) {
            self.submit_range(start, head, &mut report).await?;
            report.range = Some((start, head));
        }

        let mut cursor =
            cursor.unwrap_or_else(|| SubmitCursor::new(&queue, &self.config.id, head));
        cursor.advance(head);
        self.cursors.save(&cursor).await?;

        tracing::info!(
            scheduler = %self.config.id,
            head,
            range = ?report.range,
            submitted = report.submitted,
            deduplicated = report.deduplicated,
            "Scheduler tick complete"
        );
        Ok(report)
    }

    async fn submit_range(
        &self,
        start: Version,
        end: Version,
        report: &mut TickReport,
    ) -> Result<(), IngestError> {
        let batch = self.config.batch_size.max(1);
        let mut current = start;
        loop {
            let chunk_end = current.saturating_add(batch - 1).min(end);
            let jobs: Vec<NewJob> = (current..=chunk_end).map(NewJob::version).collect();
            let len = jobs.len() as u64;
            let added = self.queue.enqueue_bulk(jobs).await?;
            report.submitted += added;
            report.deduplicated += len - added;

            tracing::debug!(from = current, to = chunk_end, added, "Submitted version batch");

            if chunk_end == end {
                return Ok(());
            }
            current = chunk_end + 1;
        }
    }
}

// ─── Ticker ───────────────────────────────────────────────────────────────────

/// Enqueues a `fetchLatestVersion` job on a fixed interval.
///
/// The tick itself runs inside a worker, so a slow node never blocks the
/// timer and ticks are retried like any other job.
pub struct Ticker {
    queue: Arc<dyn JobQueue>,
    interval: Duration,
}

impl Ticker {
    pub fn new(queue: Arc<dyn JobQueue>, interval: Duration) -> Self {
        Self { queue, interval }
    }

    /// Run until `shutdown` flips to `true`. The first job is enqueued
    /// immediately.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.queue.enqueue(NewJob::fetch_latest_version()).await {
                        tracing::warn!(error = %e, "Failed to enqueue fetchLatestVersion");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::debug!("Ticker stopped");
                        return;
                    }
                }
            }
        }
    }
}
