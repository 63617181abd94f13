//! Offline export of a version range.

use std::sync::Arc;

use serde::Serialize;

use chainingest_core::dispatcher::JobDispatcher;
use chainingest_core::error::IngestError;
use chainingest_core::types::Version;

use crate::sink::ParquetSink;

/// What an export pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    /// Versions fetched and classified.
    pub versions: u64,
    /// Versions whose kind ends in a terminal `unsupported` disposition.
    /// Their events are still exported when the policy extracts them.
    pub unsupported: u64,
    /// Rows buffered in the sink.
    pub rows: u64,
    /// First version the node did not have; the pass stops there.
    pub stopped_at: Option<Version>,
}

/// Ingest `[from, to]` through `dispatcher`, whose store must be `sink`.
///
/// Disposition failures are counted and skipped, a missing version ends the
/// pass, and any other error aborts it.
pub async fn export_range(
    dispatcher: &JobDispatcher,
    sink: &Arc<ParquetSink>,
    from: Version,
    to: Version,
) -> Result<ExportSummary, IngestError> {
    if from > to {
        return Err(IngestError::Config(format!(
            "export range is empty: {from} > {to}"
        )));
    }

    let mut summary = ExportSummary::default();
    for version in from..=to {
        match dispatcher.ingest_version(version).await {
            Ok(_) => summary.versions += 1,
            Err(IngestError::UnsupportedTransactionType { kind, .. }) => {
                tracing::debug!(version, kind = %kind, "Unsupported transaction kind");
                summary.versions += 1;
                summary.unsupported += 1;
            }
            Err(IngestError::NotFound { version }) => {
                tracing::warn!(version, "Version not available on the node; stopping export");
                summary.stopped_at = Some(version);
                break;
            }
            Err(e) => return Err(e),
        }
    }
    summary.rows = sink.len() as u64;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chainingest_core::checkpoint::MemoryCursorStore;
    use chainingest_core::classifier::DispositionTable;
    use chainingest_core::config::SchedulerConfig;
    use chainingest_core::queue::MemoryJobQueue;
    use chainingest_core::scheduler::VersionScheduler;
    use chainingest_core::types::{
        BlockMetadataTransaction, Event, EventGuid, StateCheckpointTransaction, Transaction,
    };
    use chainingest_core::ChainClient;

    /// Versions `0..len`: even ones are block metadata, odd ones checkpoints.
    struct Ledger {
        len: u64,
    }

    #[async_trait]
    impl ChainClient for Ledger {
        async fn transactions(&self, start: Version, _: u16) -> Result<Vec<Transaction>, IngestError> {
            if start >= self.len {
                return Ok(vec![]);
            }
            let tx = if start % 2 == 0 {
                Transaction::BlockMetadata(BlockMetadataTransaction {
                    version: start,
                    timestamp: 1_000 + start,
                    epoch: 1,
                    round: start,
                    proposer: "0xb0b".into(),
                    events: vec![Event {
                        type_path: "0x1::block::NewBlockEvent".into(),
                        guid: EventGuid {
                            creation_number: 3,
                            account_address: "0x1".into(),
                        },
                        sequence_number: start,
                        data: serde_json::json!({ "round": start.to_string() }),
                    }],
                })
            } else {
                Transaction::StateCheckpoint(StateCheckpointTransaction {
                    version: start,
                    timestamp: 1_000 + start,
                })
            };
            Ok(vec![tx])
        }
        async fn head_version(&self) -> Result<Version, IngestError> {
            Ok(self.len.saturating_sub(1))
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

    fn setup(len: u64) -> (JobDispatcher, Arc<ParquetSink>) {
        let chain: Arc<dyn ChainClient> = Arc::new(Ledger { len });
        let sink = Arc::new(ParquetSink::new());
        let scheduler = Arc::new(VersionScheduler::new(
            chain.clone(),
            Arc::new(MemoryJobQueue::new()),
            Arc::new(MemoryCursorStore::new()),
            SchedulerConfig::default(),
        ));
        let dispatcher =
            JobDispatcher::new(chain, sink.clone(), scheduler, DispositionTable::default());
        (dispatcher, sink)
    }

    #[tokio::test]
    async fn exports_extracted_events_and_counts_unsupported() {
        let (d, sink) = setup(10);
        let summary = export_range(&d, &sink, 0, 5).await.unwrap();
        assert_eq!(
            summary,
            ExportSummary {
                versions: 6,
                unsupported: 6,
                rows: 3,
                stopped_at: None,
            }
        );
    }

    #[tokio::test]
    async fn stops_at_first_missing_version() {
        let (d, sink) = setup(4);
        let summary = export_range(&d, &sink, 2, 8).await.unwrap();
        assert_eq!(summary.versions, 2);
        assert_eq!(summary.stopped_at, Some(4));
        assert_eq!(summary.rows, 1);
    }

    #[tokio::test]
    async fn inverted_range_is_rejected() {
        let (d, sink) = setup(4);
        assert!(matches!(
            export_range(&d, &sink, 3, 1).await,
            Err(IngestError::Config(_))
        ));
    }
}
