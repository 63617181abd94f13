//! chainingest-aptos — chain client for Move-based nodes exposing the Aptos
//! REST API.
//!
//! # Usage
//!
//! ```rust,no_run
//! use chainingest_aptos::{AptosClientConfig, AptosRestClient};
//! use chainingest_core::ChainClient;
//!
//! # async fn example() -> Result<(), chainingest_core::IngestError> {
//! let client = AptosRestClient::new("http://localhost:8080/v1", AptosClientConfig::default())?;
//! let head = client.head_version().await?;
//! let txs = client.transactions(head, 1).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod model;

pub use client::{AptosClientConfig, AptosRestClient};
pub use model::{transaction_from_json, LedgerInfo};
