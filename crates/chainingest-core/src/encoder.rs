//! Event encoder. Flattens a transaction's events into [`EncodedRow`]s.
//!
//! Pure transform: no I/O, output order matches input order and no event is
//! dropped. Any malformed event fails the whole call with
//! [`IngestError::Encoding`] carrying the offending version.

use crate::error::IngestError;
use crate::types::{EncodedRow, Event, Version, ADDRESS_HEX_WIDTH};

/// Encode every event of one transaction.
pub fn encode_events(
    version: Version,
    timestamp: u64,
    events: &[Event],
) -> Result<Vec<EncodedRow>, IngestError> {
    events
        .iter()
        .map(|event| encode_event(version, timestamp, event))
        .collect()
}

fn encode_event(version: Version, timestamp: u64, event: &Event) -> Result<EncodedRow, IngestError> {
    let fail = |reason: String| IngestError::Encoding { version, reason };

    let path = split_type_path(&event.type_path).map_err(fail)?;
    let account_address = pad_address(&event.guid.account_address)
        .map_err(|r| fail(format!("account address: {r}")))?;
    let module_address =
        pad_address(path.address).map_err(|r| fail(format!("module address: {r}")))?;
    let data = serde_json::to_string(&event.data)
        .map_err(|e| fail(format!("event data: {e}")))?;

    Ok(EncodedRow {
        version,
        timestamp,
        creation_number: event.guid.creation_number,
        account_address,
        sequence_number: event.sequence_number,
        module_address,
        module_name: path.module.to_string(),
        struct_name: path.struct_name,
        data,
    })
}

/// The three parts of an `address::module::struct` type path.
#[derive(Debug, PartialEq, Eq)]
pub struct TypePath<'a> {
    /// Raw module address, prefix not yet stripped.
    pub address: &'a str,
    pub module: &'a str,
    /// Everything after the module, rejoined with `::` (generic or nested
    /// struct paths keep their inner separators).
    pub struct_name: String,
}

/// Split an event type path on `::`.
pub fn split_type_path(type_path: &str) -> Result<TypePath<'_>, String> {
    let mut parts = type_path.split("::");
    let address = parts.next().unwrap_or_default();
    let module = parts.next().unwrap_or_default();
    let struct_name = parts.collect::<Vec<_>>().join("::");

    if address.is_empty() || module.is_empty() || struct_name.is_empty() {
        return Err(format!("malformed event type '{type_path}'"));
    }
    Ok(TypePath {
        address,
        module,
        struct_name,
    })
}

/// Normalize an address to 64 uppercase hex characters.
///
/// Strips an optional `0x`/`0X` prefix, uppercases, and left-pads with `0`.
pub fn pad_address(raw: &str) -> Result<String, String> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);

    if digits.is_empty() {
        return Err(format!("empty address '{raw}'"));
    }
    if digits.len() > ADDRESS_HEX_WIDTH {
        return Err(format!(
            "address '{raw}' longer than {ADDRESS_HEX_WIDTH} hex digits"
        ));
    }
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(format!("address '{raw}' is not hex"));
    }

    Ok(format!(
        "{:0>width$}",
        digits.to_ascii_uppercase(),
        width = ADDRESS_HEX_WIDTH
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventGuid;
    use serde_json::json;

    fn event(type_path: &str, account: &str, seq: u64) -> Event {
        Event {
            type_path: type_path.into(),
            guid: EventGuid {
                creation_number: 3,
                account_address: account.into(),
            },
            sequence_number: seq,
            data: json!({ "amount": "100", "memo": "a,b \"c\"" }),
        }
    }

    #[test]
    fn split_simple_path() {
        let p = split_type_path("0xABC::coin::TransferEvent").unwrap();
        assert_eq!(p.address, "0xABC");
        assert_eq!(p.module, "coin");
        assert_eq!(p.struct_name, "TransferEvent");
    }

    #[test]
    fn split_nested_path_keeps_remainder() {
        let p = split_type_path("0xABC::nft::Wrapper::Inner").unwrap();
        assert_eq!(p.module, "nft");
        assert_eq!(p.struct_name, "Wrapper::Inner");

        let g = split_type_path("0x1::coin::DepositEvent<0x1::gas_coin::GasCoin>").unwrap();
        assert_eq!(g.struct_name, "DepositEvent<0x1::gas_coin::GasCoin>");
    }

    #[test]
    fn split_rejects_short_paths() {
        assert!(split_type_path("0x1::coin").is_err());
        assert!(split_type_path("vector<u8>").is_err());
        assert!(split_type_path("").is_err());
    }

    #[test]
    fn pad_address_widths() {
        for len in 1..=40 {
            let digits = "a".repeat(len);
            for raw in [digits.clone(), format!("0x{digits}")] {
                let padded = pad_address(&raw).unwrap();
                assert_eq!(padded.len(), 64);
                assert!(padded.ends_with(&"A".repeat(len)));
                assert!(padded[..64 - len].bytes().all(|b| b == b'0'));
            }
        }
    }

    #[test]
    fn pad_address_rejects_garbage() {
        assert!(pad_address("0x").is_err());
        assert!(pad_address("0xZZ").is_err());
        assert!(pad_address(&"1".repeat(65)).is_err());
    }

    #[test]
    fn encode_preserves_order_and_fields() {
        let events = vec![
            event("0x1::block::NewBlockEvent", "0x1", 7),
            event("0xABC::coin::TransferEvent", "0xdead", 8),
        ];
        let rows = encode_events(10, 1_700_000, &events).unwrap();
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].sequence_number, 7);
        assert_eq!(rows[0].module_name, "block");
        assert_eq!(rows[0].account_address, format!("{}1", "0".repeat(63)));

        assert_eq!(rows[1].version, 10);
        assert_eq!(rows[1].timestamp, 1_700_000);
        assert_eq!(rows[1].creation_number, 3);
        assert_eq!(rows[1].module_address, format!("{}ABC", "0".repeat(61)));
        assert_eq!(rows[1].account_address, format!("{}DEAD", "0".repeat(60)));
        assert_eq!(rows[1].struct_name, "TransferEvent");
        assert_eq!(rows[1].data, r#"{"amount":"100","memo":"a,b \"c\""}"#);
        assert!(rows.iter().all(|r| r.has_valid_addresses()));
    }

    #[test]
    fn encode_fails_whole_batch_with_version() {
        let events = vec![
            event("0x1::block::NewBlockEvent", "0x1", 0),
            event("0x1::block::NewBlockEvent", "0xnothex", 1),
        ];
        let err = encode_events(99, 0, &events).unwrap_err();
        match err {
            IngestError::Encoding { version, reason } => {
                assert_eq!(version, 99);
                assert!(reason.contains("account address"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn encode_empty_is_empty() {
        assert!(encode_events(5, 0, &[]).unwrap().is_empty());
    }
}
