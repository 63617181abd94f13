//! Buffered Parquet sink for encoded event rows.
//!
//! Rows are validated and buffered by [`ParquetSink::load`] (one call per
//! transaction, all-or-nothing), then written as a single record batch by
//! [`ParquetSink::write_to`]. Addresses are stored as 32-byte
//! `FixedSizeBinary` values, the other columns keep their encoded types.

use async_trait::async_trait;
use std::fs::File;
use std::path::Path;
use std::sync::{Arc, Mutex};

use arrow::array::{ArrayRef, FixedSizeBinaryArray, FixedSizeBinaryBuilder, StringArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use chainingest_core::error::IngestError;
use chainingest_core::store::ColumnarStore;
use chainingest_core::types::EncodedRow;

/// Width of an address column in bytes.
pub const ADDRESS_BYTES: i32 = 32;

/// Arrow schema of an event file. Column order matches the ClickHouse table.
pub fn event_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("version", DataType::UInt64, false),
        Field::new("timestamp", DataType::UInt64, false),
        Field::new("creation_number", DataType::UInt64, false),
        Field::new("account_address", DataType::FixedSizeBinary(ADDRESS_BYTES), false),
        Field::new("sequence_number", DataType::UInt64, false),
        Field::new("module_address", DataType::FixedSizeBinary(ADDRESS_BYTES), false),
        Field::new("module_name", DataType::Utf8, false),
        Field::new("struct_name", DataType::Utf8, false),
        Field::new("data", DataType::Utf8, false),
    ]))
}

struct BufferedRow {
    row: EncodedRow,
    account: [u8; 32],
    module: [u8; 32],
}

fn address_bytes(version: u64, column: &str, hex_str: &str) -> Result<[u8; 32], IngestError> {
    let bytes = hex::decode(hex_str).map_err(|e| IngestError::Encoding {
        version,
        reason: format!("{column} '{hex_str}' is not hex: {e}"),
    })?;
    bytes.try_into().map_err(|b: Vec<u8>| IngestError::Encoding {
        version,
        reason: format!("{column} is {} bytes, expected {ADDRESS_BYTES}", b.len()),
    })
}

fn storage_err(e: impl std::fmt::Display) -> IngestError {
    IngestError::Storage(e.to_string())
}

/// Collects rows in memory and writes them to one Parquet file.
#[derive(Default)]
pub struct ParquetSink {
    rows: Mutex<Vec<BufferedRow>>,
}

impl ParquetSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffered rows.
    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Validate and buffer one transaction's rows. A bad address rejects
    /// the whole call.
    pub fn push(&self, rows: &[EncodedRow]) -> Result<u64, IngestError> {
        let buffered = rows
            .iter()
            .map(|row| {
                Ok(BufferedRow {
                    account: address_bytes(row.version, "account_address", &row.account_address)?,
                    module: address_bytes(row.version, "module_address", &row.module_address)?,
                    row: row.clone(),
                })
            })
            .collect::<Result<Vec<_>, IngestError>>()?;

        let added = buffered.len() as u64;
        self.rows.lock().unwrap().extend(buffered);
        Ok(added)
    }

    /// Write every buffered row to `path` and clear the buffer. An empty
    /// buffer writes no file and returns `0`.
    pub fn write_to(&self, path: &Path) -> Result<u64, IngestError> {
        let rows = std::mem::take(&mut *self.rows.lock().unwrap());
        if rows.is_empty() {
            return Ok(0);
        }

        let batch = record_batch(&rows).map_err(storage_err)?;
        let file = File::create(path)
            .map_err(|e| IngestError::Storage(format!("create {}: {e}", path.display())))?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();

        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props)).map_err(storage_err)?;
        writer.write(&batch).map_err(storage_err)?;
        writer.close().map_err(storage_err)?;

        tracing::info!(rows = rows.len(), path = %path.display(), "Parquet file written");
        Ok(rows.len() as u64)
    }
}

fn address_array<'a>(
    len: usize,
    values: impl Iterator<Item = &'a [u8; 32]>,
) -> Result<ArrayRef, arrow::error::ArrowError> {
    if len == 0 {
        return Ok(Arc::new(FixedSizeBinaryBuilder::new(ADDRESS_BYTES).finish()));
    }
    Ok(Arc::new(FixedSizeBinaryArray::try_from_iter(values)?))
}

fn record_batch(rows: &[BufferedRow]) -> Result<RecordBatch, arrow::error::ArrowError> {
    let u64_column = |f: fn(&EncodedRow) -> u64| -> ArrayRef {
        Arc::new(UInt64Array::from_iter_values(rows.iter().map(|r| f(&r.row))))
    };
    let str_column = |f: fn(&EncodedRow) -> &str| -> ArrayRef {
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| f(&r.row))))
    };

    let columns = vec![
        u64_column(|r| r.version),
        u64_column(|r| r.timestamp),
        u64_column(|r| r.creation_number),
        address_array(rows.len(), rows.iter().map(|r| &r.account))?,
        u64_column(|r| r.sequence_number),
        address_array(rows.len(), rows.iter().map(|r| &r.module))?,
        str_column(|r| r.module_name.as_str()),
        str_column(|r| r.struct_name.as_str()),
        str_column(|r| r.data.as_str()),
    ];
    RecordBatch::try_new(event_schema(), columns)
}

#[async_trait]
impl ColumnarStore for ParquetSink {
    async fn load(&self, rows: &[EncodedRow]) -> Result<u64, IngestError> {
        self.push(rows)
    }
}
