//! Submit cursor: the scheduler's position in the version space.

use serde::{Deserialize, Serialize};

use crate::types::Version;

/// Last version whose job is known to be queued.
///
/// Every version in `[0, last_submitted]` has had a job submitted to `queue`.
/// The cursor only moves forward, and only after a whole range was queued.
/// It vouches for one queue's records, so a cursor is never shared between
/// queues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitCursor {
    /// Queue the submitted jobs live in.
    pub queue: String,
    pub scheduler_id: String,
    pub last_submitted: Version,
    /// Unix timestamp of the last save.
    pub updated_at: i64,
}

impl SubmitCursor {
    pub fn new(
        queue: impl Into<String>,
        scheduler_id: impl Into<String>,
        last_submitted: Version,
    ) -> Self {
        Self {
            queue: queue.into(),
            scheduler_id: scheduler_id.into(),
            last_submitted,
            updated_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Move the cursor to `version`. Never moves backwards; returns `true` if
    /// the cursor changed.
    pub fn advance(&mut self, version: Version) -> bool {
        if version <= self.last_submitted {
            return false;
        }
        self.last_submitted = version;
        self.updated_at = chrono::Utc::now().timestamp();
        true
    }

    /// First version not yet covered by the cursor, `None` once the cursor
    /// sits at `u64::MAX`.
    pub fn next_version(&self) -> Option<Version> {
        self.last_submitted.checked_add(1)
    }
}
