//! Job dispatcher: routes a claimed job to its handler.
//!
//! | job name             | handler                                        |
//! |----------------------|------------------------------------------------|
//! | `fetchLatestVersion` | [`VersionScheduler::tick`]                     |
//! | `version`            | fetch → classify → encode → load → disposition |
//! | anything else        | terminal `InvalidJobName`                      |

use std::sync::Arc;

use crate::chain::ChainClient;
use crate::classifier::{classify, DispositionTable};
use crate::encoder::encode_events;
use crate::error::IngestError;
use crate::job::{Job, FETCH_LATEST_VERSION_JOB, VERSION_JOB};
use crate::scheduler::VersionScheduler;
use crate::store::ColumnarStore;
use crate::types::{Transaction, Version};

/// How a job attempt ended.
#[derive(Debug)]
pub enum JobOutcome {
    Completed,
    /// Failed, eligible for redelivery.
    Retry(IngestError),
    /// Failed, never redelivered.
    Failed(IngestError),
}

impl JobOutcome {
    pub fn from_result(result: Result<(), IngestError>) -> Self {
        match result {
            Ok(()) => Self::Completed,
            Err(e) if e.is_retryable() => Self::Retry(e),
            Err(e) => Self::Failed(e),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Routes jobs and runs the per-version ingestion pipeline.
pub struct JobDispatcher {
    chain: Arc<dyn ChainClient>,
    store: Arc<dyn ColumnarStore>,
    scheduler: Arc<VersionScheduler>,
    policy: DispositionTable,
}

impl JobDispatcher {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        store: Arc<dyn ColumnarStore>,
        scheduler: Arc<VersionScheduler>,
        policy: DispositionTable,
    ) -> Self {
        Self {
            chain,
            store,
            scheduler,
            policy,
        }
    }

    /// Run `job` once and report the outcome.
    pub async fn dispatch(&self, job: &Job) -> JobOutcome {
        let result = self.handle(job).await;
        if let Err(e) = &result {
            if matches!(e, IngestError::InvalidJobName(_)) {
                tracing::error!(job = %job.key, name = %job.name, "Unknown job name");
            } else {
                tracing::debug!(job = %job.key, kind = e.kind(), error = %e, "Job attempt failed");
            }
        }
        JobOutcome::from_result(result)
    }

    async fn handle(&self, job: &Job) -> Result<(), IngestError> {
        match job.name.as_str() {
            FETCH_LATEST_VERSION_JOB => self.scheduler.tick().await.map(|_| ()),
            VERSION_JOB => {
                let version = job.payload.version.ok_or_else(|| {
                    IngestError::InvalidPayload(format!("job '{}' has no version", job.key))
                })?;
                self.ingest_version(version).await.map(|_| ())
            }
            other => Err(IngestError::InvalidJobName(other.to_string())),
        }
    }

    /// Fetch and ingest the transaction at `version`. Returns the number of
    /// rows loaded when the transaction's disposition is success.
    pub async fn ingest_version(&self, version: Version) -> Result<u64, IngestError> {
        let tx = self
            .chain
            .transactions(version, 1)
            .await?
            .into_iter()
            .next()
            .filter(|tx| tx.version().map_or(true, |v| v == version))
            .ok_or(IngestError::NotFound { version })?;
        self.ingest_transaction(&tx, version).await
    }

    /// Classify, encode and load one transaction, then apply its disposition.
    ///
    /// The load always happens before the disposition is applied, so a
    /// transaction reported as unsupported may still have had its events
    /// stored.
    pub async fn ingest_transaction(
        &self,
        tx: &Transaction,
        requested: Version,
    ) -> Result<u64, IngestError> {
        let classification = classify(tx, requested, &self.policy);

        let mut loaded = 0;
        if let Some(batch) = classification.batch {
            let rows = encode_events(classification.version, batch.timestamp, batch.events)?;
            loaded = self.store.load(&rows).await?;
            tracing::debug!(
                version = classification.version,
                kind = %classification.kind,
                rows = loaded,
                "Loaded events"
            );
        }

        classification.finish()?;
        Ok(loaded)
    }
}
