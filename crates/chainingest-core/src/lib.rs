//! chainingest-core — scheduling, classification and encoding for the
//! version-by-version event ingestion pipeline.
//!
//! # Architecture
//!
//! ```text
//! Ticker ──fetchLatestVersion──▶ JobQueue ◀──version(v)── VersionScheduler
//!                                   │                        ▲
//!                                   ▼                        │ tick
//!                              WorkerPool ──▶ JobDispatcher ─┘
//!                                                 │
//!                 ChainClient ─▶ classify ─▶ encode_events ─▶ ColumnarStore
//! ```
//!
//! Chain access, the queue, cursor persistence and the columnar store are
//! traits; the Aptos client, SQLite queue and ClickHouse loader live in the
//! sibling crates.

pub mod chain;
pub mod checkpoint;
pub mod classifier;
pub mod config;
pub mod cursor;
pub mod dispatcher;
pub mod encoder;
pub mod error;
pub mod job;
pub mod queue;
pub mod retry;
pub mod scheduler;
pub mod store;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod types;
pub mod worker;

pub use chain::ChainClient;
pub use checkpoint::{CursorStore, MemoryCursorStore};
pub use classifier::{classify, Classification, Disposition, DispositionTable, VariantPolicy};
pub use config::{IngestConfig, LogConfig};
pub use cursor::SubmitCursor;
pub use dispatcher::{JobDispatcher, JobOutcome};
pub use encoder::encode_events;
pub use error::IngestError;
pub use job::{Job, JobPayload, JobStatus, NewJob};
pub use queue::{JobQueue, MemoryJobQueue, QueueCounts};
pub use retry::{RetryConfig, RetryPolicy};
pub use scheduler::{TickReport, Ticker, VersionScheduler};
pub use store::{ColumnarStore, MemoryColumnarStore};
pub use types::{EncodedRow, Event, Transaction, TransactionKind, Version};
pub use worker::{Worker, WorkerPool};
