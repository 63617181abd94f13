//! CSV payload for `FORMAT CSV` inserts.
//!
//! RFC 4180 quoting: a field containing `,` `"` CR or LF is wrapped in
//! double quotes and inner quotes are doubled. Records end with `\n`.

use chainingest_core::types::EncodedRow;
use std::fmt::Write as _;

/// Quote a field if needed.
pub fn escape_csv_field(field: &str) -> std::borrow::Cow<'_, str> {
    if field.contains([',', '"', '\r', '\n']) {
        std::borrow::Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        std::borrow::Cow::Borrowed(field)
    }
}

/// Serialize rows in insert column order.
pub fn rows_to_csv(rows: &[EncodedRow]) -> String {
    let mut out = String::with_capacity(rows.len() * 256);
    for row in rows {
        // Writing to a String cannot fail.
        let _ = writeln!(
            out,
            "{},{},{},{},{},{},{},{},{}",
            row.version,
            row.timestamp,
            row.creation_number,
            escape_csv_field(&row.account_address),
            row.sequence_number,
            escape_csv_field(&row.module_address),
            escape_csv_field(&row.module_name),
            escape_csv_field(&row.struct_name),
            escape_csv_field(&row.data),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(struct_name: &str, data: &str) -> EncodedRow {
        EncodedRow {
            version: 7,
            timestamp: 1_666_000_000_000_000,
            creation_number: 2,
            account_address: format!("{}1", "0".repeat(63)),
            sequence_number: 5,
            module_address: format!("{}1", "0".repeat(63)),
            module_name: "block".into(),
            struct_name: struct_name.into(),
            data: data.into(),
        }
    }

    #[test]
    fn plain_fields_are_unquoted() {
        assert_eq!(escape_csv_field("NewBlockEvent"), "NewBlockEvent");
    }

    #[test]
    fn special_characters_are_quoted() {
        assert_eq!(escape_csv_field("a,b"), "\"a,b\"");
        assert_eq!(escape_csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_csv_field("line\nbreak"), "\"line\nbreak\"");
        assert_eq!(escape_csv_field("cr\rhere"), "\"cr\rhere\"");
    }

    #[test]
    fn json_data_is_one_quoted_field() {
        let csv = rows_to_csv(&[row("NewBlockEvent", r#"{"epoch":"1","round":"2"}"#)]);
        let zeros = format!("{}1", "0".repeat(63));
        assert_eq!(
            csv,
            format!(
                "7,1666000000000000,2,{zeros},5,{zeros},block,NewBlockEvent,\"{{\"\"epoch\"\":\"\"1\"\",\"\"round\"\":\"\"2\"\"}}\"\n"
            )
        );
    }

    #[test]
    fn one_record_per_row() {
        let csv = rows_to_csv(&[row("A", "{}"), row("Coin<0x1::a::B, 0x1::c::D>", "{}")]);
        assert_eq!(csv.lines().count(), 2);
        assert!(csv.contains("\"Coin<0x1::a::B, 0x1::c::D>\""));
    }

    #[test]
    fn empty_rows_empty_payload() {
        assert!(rows_to_csv(&[]).is_empty());
    }
}
