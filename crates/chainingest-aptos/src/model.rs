//! Wire model of the node REST API.
//!
//! The node encodes every `u64` as a JSON string (`"version": "42"`). The
//! structs here mirror that shape and convert into the chain-agnostic types
//! of `chainingest-core`.

use chainingest_core::error::IngestError;
use chainingest_core::types::{
    BlockMetadataTransaction, Event, EventGuid, GenesisTransaction, StateCheckpointTransaction,
    Transaction, UserTransaction,
};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Accepts `"123"` or `123`.
fn u64_str<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(u64),
    }
    match Raw::deserialize(d)? {
        Raw::Str(s) => s.parse().map_err(D::Error::custom),
        Raw::Num(n) => Ok(n),
    }
}

/// `GET /` response.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerInfo {
    pub chain_id: u8,
    #[serde(deserialize_with = "u64_str")]
    pub epoch: u64,
    #[serde(deserialize_with = "u64_str")]
    pub ledger_version: u64,
    #[serde(deserialize_with = "u64_str")]
    pub oldest_ledger_version: u64,
    #[serde(deserialize_with = "u64_str")]
    pub ledger_timestamp: u64,
    #[serde(default)]
    pub node_role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireGuid {
    #[serde(deserialize_with = "u64_str")]
    creation_number: u64,
    account_address: String,
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    guid: WireGuid,
    #[serde(deserialize_with = "u64_str")]
    sequence_number: u64,
    #[serde(rename = "type")]
    type_path: String,
    #[serde(default)]
    data: Value,
}

impl From<WireEvent> for Event {
    fn from(e: WireEvent) -> Self {
        Event {
            type_path: e.type_path,
            guid: EventGuid {
                creation_number: e.guid.creation_number,
                account_address: e.guid.account_address,
            },
            sequence_number: e.sequence_number,
            data: e.data,
        }
    }
}

fn events(wire: Vec<WireEvent>) -> Vec<Event> {
    wire.into_iter().map(Event::from).collect()
}

#[derive(Debug, Deserialize)]
struct WireGenesis {
    #[serde(deserialize_with = "u64_str")]
    version: u64,
    #[serde(default)]
    events: Vec<WireEvent>,
}

#[derive(Debug, Deserialize)]
struct WireBlockMetadata {
    #[serde(deserialize_with = "u64_str")]
    version: u64,
    #[serde(deserialize_with = "u64_str")]
    timestamp: u64,
    #[serde(deserialize_with = "u64_str")]
    epoch: u64,
    #[serde(deserialize_with = "u64_str")]
    round: u64,
    proposer: String,
    #[serde(default)]
    events: Vec<WireEvent>,
}

#[derive(Debug, Deserialize)]
struct WireStateCheckpoint {
    #[serde(deserialize_with = "u64_str")]
    version: u64,
    #[serde(deserialize_with = "u64_str")]
    timestamp: u64,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    #[serde(deserialize_with = "u64_str")]
    version: u64,
    #[serde(deserialize_with = "u64_str")]
    timestamp: u64,
    sender: String,
    #[serde(deserialize_with = "u64_str")]
    sequence_number: u64,
    success: bool,
    #[serde(default)]
    events: Vec<WireEvent>,
}

fn parse<T: for<'de> Deserialize<'de>>(kind: &str, value: Value) -> Result<T, IngestError> {
    serde_json::from_value(value).map_err(|e| IngestError::ChainData(format!("malformed {kind}: {e}")))
}

/// Convert one element of a `GET /transactions` response.
///
/// Unknown `type` tags become [`Transaction::Other`]; a known tag with a
/// malformed body is an error.
pub fn transaction_from_json(value: Value) -> Result<Transaction, IngestError> {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| IngestError::ChainData("transaction without a 'type' field".into()))?
        .to_string();

    let tx = match kind.as_str() {
        "genesis_transaction" => {
            let t: WireGenesis = parse(&kind, value)?;
            Transaction::Genesis(GenesisTransaction {
                version: t.version,
                events: events(t.events),
            })
        }
        "block_metadata_transaction" => {
            let t: WireBlockMetadata = parse(&kind, value)?;
            Transaction::BlockMetadata(BlockMetadataTransaction {
                version: t.version,
                timestamp: t.timestamp,
                epoch: t.epoch,
                round: t.round,
                proposer: t.proposer,
                events: events(t.events),
            })
        }
        "state_checkpoint_transaction" => {
            let t: WireStateCheckpoint = parse(&kind, value)?;
            Transaction::StateCheckpoint(StateCheckpointTransaction {
                version: t.version,
                timestamp: t.timestamp,
            })
        }
        "user_transaction" => {
            let t: WireUser = parse(&kind, value)?;
            Transaction::User(UserTransaction {
                version: t.version,
                timestamp: t.timestamp,
                sender: t.sender,
                sequence_number: t.sequence_number,
                success: t.success,
                events: events(t.events),
            })
        }
        _ => {
            let version = value
                .get("version")
                .and_then(|v| match v {
                    Value::String(s) => s.parse().ok(),
                    other => other.as_u64(),
                });
            Transaction::Other {
                type_name: kind,
                version,
            }
        }
    };
    Ok(tx)
}
