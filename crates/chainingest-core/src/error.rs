//! Error types for the ingestion pipeline.

use thiserror::Error;

use crate::types::Version;

/// Errors that can occur while scheduling, fetching, encoding or loading.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The node has no transaction at this version (yet).
    #[error("transaction not found at version {version}")]
    NotFound { version: Version },

    /// The transaction variant is not (fully) handled.
    #[error("unsupported transaction type '{kind}' at version {version}")]
    UnsupportedTransactionType {
        version: Version,
        kind: String,
        /// Decided by the disposition table, not by the error kind itself.
        retryable: bool,
    },

    /// Malformed chain data: bad event type path or non-hex address.
    #[error("encoding error at version {version}: {reason}")]
    Encoding { version: Version, reason: String },

    /// The columnar store rejected the batch.
    #[error("load error: {0}")]
    Load(String),

    #[error("invalid job name '{0}'")]
    InvalidJobName(String),

    #[error("invalid job payload: {0}")]
    InvalidPayload(String),

    /// Transport failure talking to the chain node (connection, 429, 5xx).
    #[error("chain client error: {0}")]
    Chain(String),

    /// The node answered, but with a body that cannot be used or a
    /// client-error status. Redelivery would get the same answer.
    #[error("invalid chain data: {0}")]
    ChainData(String),

    #[error("queue error: {0}")]
    Queue(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("job timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("configuration error: {0}")]
    Config(String),
}

impl IngestError {
    /// Returns `true` if the failed job should be redelivered.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NotFound { .. }
            | Self::Load(_)
            | Self::Chain(_)
            | Self::Queue(_)
            | Self::Storage(_)
            | Self::Timeout { .. } => true,
            Self::UnsupportedTransactionType { retryable, .. } => *retryable,
            Self::Encoding { .. }
            | Self::ChainData(_)
            | Self::InvalidJobName(_)
            | Self::InvalidPayload(_)
            | Self::Config(_) => false,
        }
    }

    /// Short machine-readable label, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::UnsupportedTransactionType { .. } => "unsupported_transaction_type",
            Self::Encoding { .. } => "encoding",
            Self::Load(_) => "load",
            Self::InvalidJobName(_) => "invalid_job_name",
            Self::InvalidPayload(_) => "invalid_payload",
            Self::Chain(_) => "chain",
            Self::ChainData(_) => "chain_data",
            Self::Queue(_) => "queue",
            Self::Storage(_) => "storage",
            Self::Timeout { .. } => "timeout",
            Self::Config(_) => "config",
        }
    }
}
