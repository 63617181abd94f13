//! Chain client adapter seam.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::IngestError;
use crate::types::{Transaction, Version};

/// Read access to a chain node.
///
/// One long-lived client is constructed at startup and shared as
/// `Arc<dyn ChainClient>` by the scheduler and the dispatcher; tests pass a
/// mock instead.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Fetch up to `limit` transactions starting at `start`.
    ///
    /// Returns an empty vector when the node has nothing at `start` yet.
    async fn transactions(&self, start: Version, limit: u16) -> Result<Vec<Transaction>, IngestError>;

    /// The highest version the node currently knows.
    async fn head_version(&self) -> Result<Version, IngestError>;

    /// Call a read-only view function `module::function`.
    async fn view(
        &self,
        module: &str,
        function: &str,
        type_arguments: Vec<String>,
        arguments: Vec<Value>,
    ) -> Result<Vec<Value>, IngestError>;
}
