//! Cursor persistence, so the scheduler resumes without rescanning history.
//!
//! Cursors are keyed by `(queue, scheduler_id)`. Losing the stored cursor is
//! safe: the scheduler falls back to a full rescan from version 0 and the
//! queue de-duplicates what already exists.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::cursor::SubmitCursor;
use crate::error::IngestError;

/// Trait for storing and loading submit cursors.
///
/// Implementations: [`MemoryCursorStore`] here, `SqliteStore` in
/// `chainingest-storage`.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Load the cursor a scheduler keeps for `queue`.
    async fn load(
        &self,
        queue: &str,
        scheduler_id: &str,
    ) -> Result<Option<SubmitCursor>, IngestError>;

    /// Save (upsert) a cursor.
    async fn save(&self, cursor: &SubmitCursor) -> Result<(), IngestError>;

    /// Delete a cursor (forces a full rescan on the next tick).
    async fn delete(&self, queue: &str, scheduler_id: &str) -> Result<(), IngestError>;
}

// ─── In-memory store (for testing) ────────────────────────────────────────────

/// In-memory cursor store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryCursorStore {
    data: Mutex<HashMap<(String, String), SubmitCursor>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(queue: &str, scheduler_id: &str) -> (String, String) {
        (queue.to_string(), scheduler_id.to_string())
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn load(
        &self,
        queue: &str,
        scheduler_id: &str,
    ) -> Result<Option<SubmitCursor>, IngestError> {
        Ok(self.data.lock().unwrap().get(&Self::key(queue, scheduler_id)).cloned())
    }

    async fn save(&self, cursor: &SubmitCursor) -> Result<(), IngestError> {
        self.data
            .lock()
            .unwrap()
            .insert(Self::key(&cursor.queue, &cursor.scheduler_id), cursor.clone());
        Ok(())
    }

    async fn delete(&self, queue: &str, scheduler_id: &str) -> Result<(), IngestError> {
        self.data.lock().unwrap().remove(&Self::key(queue, scheduler_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryCursorStore::new();
        assert!(store.load("v7", "ol").await.unwrap().is_none());

        store.save(&SubmitCursor::new("v7", "ol", 1000)).await.unwrap();
        let cursor = store.load("v7", "ol").await.unwrap().unwrap();
        assert_eq!(cursor.last_submitted, 1000);
        assert!(store.load("v7", "other").await.unwrap().is_none());
        assert!(store.load("v8", "ol").await.unwrap().is_none());

        store.delete("v7", "ol").await.unwrap();
        assert!(store.load("v7", "ol").await.unwrap().is_none());
    }
}
