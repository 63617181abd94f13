//! Shared types for the ingestion pipeline.

use serde::{Deserialize, Serialize};

/// Ledger-assigned, monotonically increasing transaction index.
pub type Version = u64;

// ─── Event ────────────────────────────────────────────────────────────────────

/// Globally unique event-stream handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventGuid {
    pub creation_number: u64,
    /// Account address as reported by the node (usually `0x`-prefixed).
    pub account_address: String,
}

/// A chain event as emitted by a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Fully-qualified type path: `address::module::struct`.
    #[serde(rename = "type")]
    pub type_path: String,
    pub guid: EventGuid,
    pub sequence_number: u64,
    /// Opaque structured payload.
    pub data: serde_json::Value,
}

// ─── Transaction ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisTransaction {
    pub version: Version,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockMetadataTransaction {
    pub version: Version,
    /// Microseconds since the Unix epoch.
    pub timestamp: u64,
    pub epoch: u64,
    pub round: u64,
    pub proposer: String,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateCheckpointTransaction {
    pub version: Version,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserTransaction {
    pub version: Version,
    pub timestamp: u64,
    pub sender: String,
    pub sequence_number: u64,
    pub success: bool,
    pub events: Vec<Event>,
}

/// A ledger transaction.
///
/// The set of variants is closed: every `match` on it is exhaustive, so a new
/// chain transaction kind shows up as a compile error at each dispatch point.
/// Kinds the node reports that this build does not know land in `Other`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transaction {
    Genesis(GenesisTransaction),
    BlockMetadata(BlockMetadataTransaction),
    StateCheckpoint(StateCheckpointTransaction),
    User(UserTransaction),
    Other {
        /// Raw `type` tag reported by the node.
        type_name: String,
        version: Option<Version>,
    },
}

impl Transaction {
    pub fn kind(&self) -> TransactionKind {
        match self {
            Self::Genesis(_) => TransactionKind::Genesis,
            Self::BlockMetadata(_) => TransactionKind::BlockMetadata,
            Self::StateCheckpoint(_) => TransactionKind::StateCheckpoint,
            Self::User(_) => TransactionKind::User,
            Self::Other { .. } => TransactionKind::Other,
        }
    }

    /// The version, if the node reported one.
    pub fn version(&self) -> Option<Version> {
        match self {
            Self::Genesis(t) => Some(t.version),
            Self::BlockMetadata(t) => Some(t.version),
            Self::StateCheckpoint(t) => Some(t.version),
            Self::User(t) => Some(t.version),
            Self::Other { version, .. } => *version,
        }
    }

    /// The node's type tag for this transaction (e.g. `"genesis_transaction"`).
    pub fn type_name(&self) -> &str {
        match self {
            Self::Other { type_name, .. } => type_name,
            known => known.kind().wire_name(),
        }
    }
}

/// Payload-free tag of a [`Transaction`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Genesis,
    BlockMetadata,
    StateCheckpoint,
    User,
    Other,
}

impl TransactionKind {
    /// The `type` tag the node uses on the wire.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Genesis => "genesis_transaction",
            Self::BlockMetadata => "block_metadata_transaction",
            Self::StateCheckpoint => "state_checkpoint_transaction",
            Self::User => "user_transaction",
            Self::Other => "unknown_transaction",
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

// ─── EncodedRow ───────────────────────────────────────────────────────────────

/// Load-ready projection of one event plus its parent transaction's
/// version and timestamp.
///
/// Both address columns are exactly 64 uppercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedRow {
    pub version: Version,
    pub timestamp: u64,
    pub creation_number: u64,
    pub account_address: String,
    pub sequence_number: u64,
    pub module_address: String,
    pub module_name: String,
    pub struct_name: String,
    /// Event payload as JSON text.
    pub data: String,
}

/// Width of a padded address column in hex characters (32 bytes).
pub const ADDRESS_HEX_WIDTH: usize = 64;

impl EncodedRow {
    /// Returns `true` if both address columns hold exactly 64 hex digits.
    pub fn has_valid_addresses(&self) -> bool {
        is_padded_hex(&self.account_address) && is_padded_hex(&self.module_address)
    }
}

fn is_padded_hex(s: &str) -> bool {
    s.len() == ADDRESS_HEX_WIDTH && s.bytes().all(|b| b.is_ascii_hexdigit())
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn row(account: &str, module: &str) -> EncodedRow {
        EncodedRow {
            version: 1,
            timestamp: 0,
            creation_number: 0,
            account_address: account.into(),
            sequence_number: 0,
            module_address: module.into(),
            module_name: "block".into(),
            struct_name: "NewBlockEvent".into(),
            data: "{}".into(),
        }
    }

    #[test]
    fn type_name_of_known_and_other() {
        let tx = Transaction::StateCheckpoint(StateCheckpointTransaction {
            version: 42,
            timestamp: 1,
        });
        assert_eq!(tx.type_name(), "state_checkpoint_transaction");
        assert_eq!(tx.version(), Some(42));

        let other = Transaction::Other {
            type_name: "validator_transaction".into(),
            version: Some(9),
        };
        assert_eq!(other.type_name(), "validator_transaction");
        assert_eq!(other.kind(), TransactionKind::Other);
    }

    #[test]
    fn address_width_check() {
        let ok = "0".repeat(63) + "1";
        assert!(row(&ok, &ok).has_valid_addresses());
        assert!(!row("1", &ok).has_valid_addresses());
        assert!(!row(&ok, &("Z".repeat(64))).has_valid_addresses());
    }
}
