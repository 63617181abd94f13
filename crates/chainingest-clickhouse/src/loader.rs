//! Columnar bulk loader over the ClickHouse HTTP interface.

use async_trait::async_trait;
use std::time::Duration;

use chainingest_core::config::StoreConfig;
use chainingest_core::error::IngestError;
use chainingest_core::store::ColumnarStore;
use chainingest_core::types::EncodedRow;

use crate::payload::rows_to_csv;
use crate::statement::{create_table_statement, insert_statement};

/// Writes encoded rows with one `INSERT ... FORMAT CSV` per call.
pub struct ClickHouseLoader {
    http: reqwest::Client,
    url: String,
    database: String,
    table: String,
    user: Option<String>,
    password: Option<String>,
    insert_sql: String,
}

impl ClickHouseLoader {
    pub fn new(config: &StoreConfig) -> Result<Self, IngestError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| IngestError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            url: config.url.trim_end_matches('/').to_string(),
            database: config.database.clone(),
            table: config.table.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
            insert_sql: insert_statement(&config.table),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the event table if it does not exist.
    pub async fn ensure_table(&self) -> Result<(), IngestError> {
        self.execute(&create_table_statement(&self.table), String::new())
            .await
            .map_err(|e| IngestError::Storage(format!("create table {}: {e}", self.table)))?;
        tracing::info!(table = %self.table, database = %self.database, "Event table ready");
        Ok(())
    }

    /// `GET /ping`; the server answers `Ok.`.
    pub async fn ping(&self) -> Result<(), IngestError> {
        let resp = self
            .http
            .get(format!("{}/ping", self.url))
            .send()
            .await
            .map_err(|e| IngestError::Storage(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(IngestError::Storage(format!("ping: HTTP {}", resp.status().as_u16())));
        }
        Ok(())
    }

    async fn execute(&self, query: &str, body: String) -> Result<String, String> {
        let mut req = self
            .http
            .post(&self.url)
            .query(&[("query", query), ("database", self.database.as_str())])
            .body(body);
        if let Some(user) = &self.user {
            req = req.header("X-ClickHouse-User", user);
        }
        if let Some(password) = &self.password {
            req = req.header("X-ClickHouse-Key", password);
        }

        let resp = req.send().await.map_err(|e| e.to_string())?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(format!("HTTP {}: {}", status.as_u16(), text.trim()));
        }
        Ok(text)
    }
}

#[async_trait]
impl ColumnarStore for ClickHouseLoader {
    async fn load(&self, rows: &[EncodedRow]) -> Result<u64, IngestError> {
        let Some(first) = rows.first() else {
            return Ok(0);
        };
        if let Some(bad) = rows.iter().find(|r| !r.has_valid_addresses()) {
            return Err(IngestError::Load(format!(
                "batch for version {} rejected: address column is not 64 hex characters \
(account '{}', module '{}')",
                bad.version, bad.account_address, bad.module_address
            )));
        }

        let payload = rows_to_csv(rows);
        self.execute(&self.insert_sql, payload)
            .await
            .map_err(|e| IngestError::Load(format!("insert into {} at version {}: {e}", self.table, first.version)))?;

        tracing::debug!(table = %self.table, version = first.version, rows = rows.len(), "Inserted rows");
        Ok(rows.len() as u64)
    }
}
