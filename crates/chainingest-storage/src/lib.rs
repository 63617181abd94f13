//! chainingest-storage — durable backends for the job queue and the
//! scheduler cursor.
//!
//! Backends:
//! - [`sqlite`]: SQLite via `sqlx` (embedded, single-file persistence)
//!
//! In-memory implementations for tests live in `chainingest-core`.

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::{FailedJob, SqliteStore};
