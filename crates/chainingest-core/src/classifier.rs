//! Transaction classifier.
//!
//! Classification splits handling of a transaction into two independent
//! decisions, both read from a [`DispositionTable`]:
//!
//! 1. **Extraction**: which events (if any) go to the encoder and loader,
//!    and with which timestamp.
//! 2. **Disposition**: how the job ends once extraction is done: succeed,
//!    fail terminally, or fail and be redelivered.

use serde::{Deserialize, Serialize};

use crate::error::IngestError;
use crate::types::{Event, Transaction, TransactionKind, Version};

/// How a job ends after its events (if any) were loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Mark the job complete.
    Succeed,
    /// Report `UnsupportedTransactionType`, never redeliver.
    Fail,
    /// Report `UnsupportedTransactionType` and let the retry policy redeliver.
    Retry,
}

/// Handling rule for one transaction kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantPolicy {
    /// Hand the transaction's events to the encoder and loader.
    #[serde(default)]
    pub extract_events: bool,
    #[serde(default = "default_disposition")]
    pub disposition: Disposition,
}

fn default_disposition() -> Disposition {
    Disposition::Fail
}

impl VariantPolicy {
    pub const fn new(extract_events: bool, disposition: Disposition) -> Self {
        Self {
            extract_events,
            disposition,
        }
    }
}

/// Per-kind handling rules.
///
/// The default ingests genesis and block-metadata events and then reports
/// every kind as unsupported, terminally, so a loaded transaction is never
/// loaded twice by a redelivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispositionTable {
    pub genesis: VariantPolicy,
    pub block_metadata: VariantPolicy,
    pub state_checkpoint: VariantPolicy,
    pub user: VariantPolicy,
    /// Kinds unknown to this build. `extract_events` is ignored: there are no
    /// parsed events to extract.
    pub other: VariantPolicy,
}

impl Default for DispositionTable {
    fn default() -> Self {
        Self {
            genesis: VariantPolicy::new(true, Disposition::Fail),
            block_metadata: VariantPolicy::new(true, Disposition::Fail),
            state_checkpoint: VariantPolicy::new(false, Disposition::Fail),
            user: VariantPolicy::new(false, Disposition::Fail),
            other: VariantPolicy::new(false, Disposition::Fail),
        }
    }
}

impl DispositionTable {
    pub fn policy(&self, kind: TransactionKind) -> VariantPolicy {
        match kind {
            TransactionKind::Genesis => self.genesis,
            TransactionKind::BlockMetadata => self.block_metadata,
            TransactionKind::StateCheckpoint => self.state_checkpoint,
            TransactionKind::User => self.user,
            TransactionKind::Other => self.other,
        }
    }
}

/// Events selected for loading, with the timestamp to stamp on every row.
#[derive(Debug, Clone, Copy)]
pub struct EventBatch<'a> {
    pub timestamp: u64,
    pub events: &'a [Event],
}

/// Result of classifying one transaction.
#[derive(Debug, Clone)]
pub struct Classification<'a> {
    pub version: Version,
    pub kind: TransactionKind,
    /// The node's type tag (differs from `kind` only for `Other`).
    pub type_name: &'a str,
    /// `None` when nothing is to be loaded.
    pub batch: Option<EventBatch<'a>>,
    pub disposition: Disposition,
}

impl Classification<'_> {
    /// The job result once phase 1 (load) has succeeded.
    pub fn finish(&self) -> Result<(), IngestError> {
        match self.disposition {
            Disposition::Succeed => Ok(()),
            Disposition::Fail | Disposition::Retry => Err(IngestError::UnsupportedTransactionType {
                version: self.version,
                kind: self.type_name.to_string(),
                retryable: self.disposition == Disposition::Retry,
            }),
        }
    }
}

/// Classify `tx` against `table`.
///
/// `requested` is the version the job asked for; it is used when the node
/// omits the version on an unknown transaction kind.
pub fn classify<'a>(
    tx: &'a Transaction,
    requested: Version,
    table: &DispositionTable,
) -> Classification<'a> {
    let kind = tx.kind();
    let policy = table.policy(kind);

    let candidate = match tx {
        // Genesis carries no timestamp; rows get a synthetic 0.
        Transaction::Genesis(t) => Some(EventBatch {
            timestamp: 0,
            events: &t.events,
        }),
        Transaction::BlockMetadata(t) => Some(EventBatch {
            timestamp: t.timestamp,
            events: &t.events,
        }),
        Transaction::User(t) => Some(EventBatch {
            timestamp: t.timestamp,
            events: &t.events,
        }),
        Transaction::StateCheckpoint(_) | Transaction::Other { .. } => None,
    };

    Classification {
        version: tx.version().unwrap_or(requested),
        kind,
        type_name: tx.type_name(),
        batch: candidate.filter(|_| policy.extract_events),
        disposition: policy.disposition,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        BlockMetadataTransaction, EventGuid, GenesisTransaction, StateCheckpointTransaction,
    };

    fn ev() -> Event {
        Event {
            type_path: "0x1::block::NewBlockEvent".into(),
            guid: EventGuid {
                creation_number: 2,
                account_address: "0x1".into(),
            },
            sequence_number: 0,
            data: serde_json::json!({}),
        }
    }

    #[test]
    fn genesis_extracts_with_zero_timestamp_then_fails() {
        let tx = Transaction::Genesis(GenesisTransaction {
            version: 0,
            events: vec![ev(), ev()],
        });
        let c = classify(&tx, 0, &DispositionTable::default());
        let batch = c.batch.expect("genesis events are extracted");
        assert_eq!(batch.timestamp, 0);
        assert_eq!(batch.events.len(), 2);

        let err = c.finish().unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("genesis_transaction"));
    }

    #[test]
    fn block_metadata_uses_own_timestamp() {
        let tx = Transaction::BlockMetadata(BlockMetadataTransaction {
            version: 5,
            timestamp: 1_666_000_000_000_000,
            epoch: 1,
            round: 3,
            proposer: "0x1".into(),
            events: vec![ev()],
        });
        let c = classify(&tx, 5, &DispositionTable::default());
        assert_eq!(c.batch.unwrap().timestamp, 1_666_000_000_000_000);
        assert_eq!(c.disposition, Disposition::Fail);
    }

    #[test]
    fn state_checkpoint_extracts_nothing() {
        let tx = Transaction::StateCheckpoint(StateCheckpointTransaction {
            version: 42,
            timestamp: 1,
        });
        let c = classify(&tx, 42, &DispositionTable::default());
        assert!(c.batch.is_none());
        assert!(matches!(
            c.finish(),
            Err(IngestError::UnsupportedTransactionType {
                version: 42,
                retryable: false,
                ..
            })
        ));
    }

    #[test]
    fn other_never_extracts_and_keeps_type_name() {
        let table = DispositionTable {
            other: VariantPolicy::new(true, Disposition::Retry),
            ..Default::default()
        };
        let tx = Transaction::Other {
            type_name: "validator_transaction".into(),
            version: None,
        };
        let c = classify(&tx, 77, &table);
        assert!(c.batch.is_none());
        assert_eq!(c.version, 77);
        match c.finish() {
            Err(IngestError::UnsupportedTransactionType {
                kind, retryable, ..
            }) => {
                assert_eq!(kind, "validator_transaction");
                assert!(retryable);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn table_can_mark_block_metadata_complete() {
        let table = DispositionTable {
            block_metadata: VariantPolicy::new(true, Disposition::Succeed),
            ..Default::default()
        };
        let tx = Transaction::BlockMetadata(BlockMetadataTransaction {
            version: 5,
            timestamp: 9,
            epoch: 1,
            round: 1,
            proposer: "0x1".into(),
            events: vec![],
        });
        assert!(classify(&tx, 5, &table).finish().is_ok());
    }

    #[test]
    fn table_fills_missing_kinds_with_defaults() {
        let table: DispositionTable = serde_json::from_value(serde_json::json!({
            "user": { "extract_events": true, "disposition": "succeed" }
        }))
        .unwrap();
        assert_eq!(table.user, VariantPolicy::new(true, Disposition::Succeed));
        assert_eq!(table.genesis, DispositionTable::default().genesis);
    }
}
