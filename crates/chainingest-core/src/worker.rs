//! Queue workers.
//!
//! Each worker loops: claim a job, run it through the dispatcher under a
//! timeout, then settle it in the queue (complete, retry with backoff, or
//! fail). Delivery is at-least-once: a job whose worker dies stays `running`
//! until [`JobQueue::recover_stalled`] hands it back out.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::config::WorkerConfig;
use crate::dispatcher::{JobDispatcher, JobOutcome};
use crate::error::IngestError;
use crate::job::Job;
use crate::queue::JobQueue;
use crate::retry::RetryPolicy;

/// A single queue consumer.
#[derive(Clone)]
pub struct Worker {
    id: usize,
    queue: Arc<dyn JobQueue>,
    dispatcher: Arc<JobDispatcher>,
    retry: RetryPolicy,
    poll_interval: Duration,
    job_timeout: Duration,
}

impl Worker {
    pub fn new(
        id: usize,
        queue: Arc<dyn JobQueue>,
        dispatcher: Arc<JobDispatcher>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            id,
            queue,
            dispatcher,
            retry: RetryPolicy::new(config.retry.clone()),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            job_timeout: Duration::from_millis(config.job_timeout_ms),
        }
    }

    /// Claim and process at most one job.
    ///
    /// Returns the settled outcome, or `None` if the queue had nothing ready.
    /// A retryable failure whose retries are exhausted comes back as
    /// [`JobOutcome::Failed`].
    pub async fn run_once(&self) -> Result<Option<JobOutcome>, IngestError> {
        let Some(job) = self.queue.next().await? else {
            return Ok(None);
        };

        let outcome = match tokio::time::timeout(self.job_timeout, self.dispatcher.dispatch(&job)).await {
            Ok(outcome) => outcome,
            Err(_) => JobOutcome::Retry(IngestError::Timeout {
                ms: self.job_timeout.as_millis() as u64,
            }),
        };

        self.settle(&job, outcome).await.map(Some)
    }

    async fn settle(&self, job: &Job, outcome: JobOutcome) -> Result<JobOutcome, IngestError> {
        match outcome {
            JobOutcome::Completed => {
                self.queue.complete(job).await?;
                tracing::debug!(worker = self.id, job = %job.key, "Job completed");
                Ok(JobOutcome::Completed)
            }
            JobOutcome::Retry(err) => match self.retry.next_delay(job.attempts) {
                Some(delay) => {
                    self.queue.retry(job, delay, &err.to_string()).await?;
                    tracing::warn!(
                        worker = self.id,
                        job = %job.key,
                        attempt = job.attempts,
                        delay_ms = delay.as_millis() as u64,
                        kind = err.kind(),
                        error = %err,
                        "Job failed, will retry"
                    );
                    Ok(JobOutcome::Retry(err))
                }
                None => {
                    self.queue.fail(job, &err.to_string()).await?;
                    tracing::error!(
                        worker = self.id,
                        job = %job.key,
                        attempts = job.attempts,
                        kind = err.kind(),
                        error = %err,
                        "Job retries exhausted"
                    );
                    Ok(JobOutcome::Failed(err))
                }
            },
            JobOutcome::Failed(err) => {
                self.queue.fail(job, &err.to_string()).await?;
                tracing::info!(
                    worker = self.id,
                    job = %job.key,
                    kind = err.kind(),
                    error = %err,
                    "Job failed"
                );
                Ok(JobOutcome::Failed(err))
            }
        }
    }

    /// Process jobs until `shutdown` flips to `true`. The job in flight is
    /// finished before returning.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::debug!(worker = self.id, "Worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let idle = match self.run_once().await {
                Ok(Some(_)) => false,
                Ok(None) => true,
                Err(e) => {
                    tracing::warn!(worker = self.id, error = %e, "Queue error");
                    true
                }
            };
            if idle {
                tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }
        tracing::debug!(worker = self.id, "Worker stopped");
    }
}

/// A fixed-size set of workers sharing one queue and dispatcher.
pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    dispatcher: Arc<JobDispatcher>,
    config: WorkerConfig,
}

impl WorkerPool {
    pub fn new(queue: Arc<dyn JobQueue>, dispatcher: Arc<JobDispatcher>, config: WorkerConfig) -> Self {
        Self {
            queue,
            dispatcher,
            config,
        }
    }

    /// Recover stalled jobs, then run `concurrency` workers until shutdown.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), IngestError> {
        let recovered = self
            .queue
            .recover_stalled(Duration::from_millis(self.config.stall_timeout_ms))
            .await?;
        if recovered > 0 {
            tracing::info!(recovered, "Returned stalled jobs to the queue");
        }

        let mut set = JoinSet::new();
        for id in 0..self.config.concurrency {
            let worker = Worker::new(id, self.queue.clone(), self.dispatcher.clone(), &self.config);
            set.spawn(worker.run(shutdown.clone()));
        }
        tracing::info!(concurrency = self.config.concurrency, "Worker pool running");

        while let Some(res) = set.join_next().await {
            if let Err(e) = res {
                tracing::error!(error = %e, "Worker task panicked");
            }
        }
        Ok(())
    }
}
