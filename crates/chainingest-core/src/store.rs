//! Columnar store seam and an in-memory implementation.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::error::IngestError;
use crate::types::EncodedRow;

/// Sink for encoded event rows.
///
/// One call carries the rows of exactly one transaction and is atomic: either
/// every row is stored or none is. An empty slice is a successful no-op.
#[async_trait]
pub trait ColumnarStore: Send + Sync {
    /// Load `rows`, returning the number of rows written.
    async fn load(&self, rows: &[EncodedRow]) -> Result<u64, IngestError>;
}

/// In-memory columnar store for tests and dry runs.
#[derive(Default)]
pub struct MemoryColumnarStore {
    rows: Mutex<Vec<EncodedRow>>,
    loads: Mutex<u64>,
    fail_next: Mutex<Option<String>>,
}

impl MemoryColumnarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `load` call fail with a [`IngestError::Load`].
    pub fn fail_next_load(&self, reason: impl Into<String>) {
        *self.fail_next.lock().unwrap() = Some(reason.into());
    }

    /// All rows stored so far, in load order.
    pub fn rows(&self) -> Vec<EncodedRow> {
        self.rows.lock().unwrap().clone()
    }

    /// Number of non-empty batches written.
    pub fn load_count(&self) -> u64 {
        *self.loads.lock().unwrap()
    }
}

#[async_trait]
impl ColumnarStore for MemoryColumnarStore {
    async fn load(&self, rows: &[EncodedRow]) -> Result<u64, IngestError> {
        if rows.is_empty() {
            return Ok(0);
        }
        if let Some(reason) = self.fail_next.lock().unwrap().take() {
            return Err(IngestError::Load(reason));
        }
        if let Some(bad) = rows.iter().find(|r| !r.has_valid_addresses()) {
            return Err(IngestError::Load(format!(
                "batch for version {} rejected: address column is not 64 hex characters",
                bad.version
            )));
        }
        self.rows.lock().unwrap().extend_from_slice(rows);
        *self.loads.lock().unwrap() += 1;
        Ok(rows.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(version: u64, account: &str) -> EncodedRow {
        EncodedRow {
            version,
            timestamp: 0,
            creation_number: 0,
            account_address: account.into(),
            sequence_number: 0,
            module_address: "0".repeat(64),
            module_name: "m".into(),
            struct_name: "S".into(),
            data: "{}".into(),
        }
    }

    #[tokio::test]
    async fn empty_batch_is_a_noop() {
        let store = MemoryColumnarStore::new();
        assert_eq!(store.load(&[]).await.unwrap(), 0);
        assert_eq!(store.load_count(), 0);
    }

    #[tokio::test]
    async fn malformed_row_rejects_whole_batch() {
        let store = MemoryColumnarStore::new();
        let good = "0".repeat(64);
        let batch = vec![row(1, &good), row(1, "XYZ"), row(1, &good)];
        assert!(store.load(&batch).await.is_err());
        assert!(store.rows().is_empty());

        let ok = vec![row(2, &good), row(2, &good)];
        assert_eq!(store.load(&ok).await.unwrap(), 2);
        assert_eq!(store.rows().len(), 2);
    }
}
