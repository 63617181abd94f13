//! chainingest-parquet — writes encoded event rows to Parquet files.
//!
//! [`ParquetSink`] implements the core `ColumnarStore` seam, so the regular
//! dispatcher can fill it; the CLI's `export-parquet` command uses it for
//! offline exports of a version range.

pub mod export;
pub mod sink;

pub use export::{export_range, ExportSummary};
pub use sink::{event_schema, ParquetSink, ADDRESS_BYTES};
