//! SQL text for the event table.

/// Insert columns, in CSV order.
pub const COLUMNS: [&str; 9] = [
    "version",
    "timestamp",
    "creation_number",
    "account_address",
    "sequence_number",
    "module_address",
    "module_name",
    "struct_name",
    "data",
];

/// Typed structure of the CSV payload, read through `input()`.
const INPUT_STRUCTURE: &str = "version UInt64, timestamp UInt64, creation_number UInt64, \
account_address String, sequence_number UInt64, module_address String, \
module_name String, struct_name String, data String";

/// Quote an identifier with backticks, escaping embedded backticks.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Insert statement taking a CSV body. Hex address columns are converted to
/// `UInt256` server-side.
pub fn insert_statement(table: &str) -> String {
    format!(
        "INSERT INTO {table} ({columns}) \
SELECT version, timestamp, creation_number, \
reinterpretAsUInt256(reverse(unhex(account_address))), sequence_number, \
reinterpretAsUInt256(reverse(unhex(module_address))), module_name, struct_name, data \
FROM input('{INPUT_STRUCTURE}') FORMAT CSV",
        table = quote_ident(table),
        columns = COLUMNS.join(", "),
    )
}

/// DDL for the event table. The ordering key identifies one event, so a
/// repeated load of the same transaction collapses on merge.
pub fn create_table_statement(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (\
version UInt64, \
timestamp UInt64, \
creation_number UInt64, \
account_address UInt256, \
sequence_number UInt64, \
module_address UInt256, \
module_name String, \
struct_name String, \
data String\
) ENGINE = ReplacingMergeTree \
ORDER BY (version, creation_number, account_address, sequence_number)",
        table = quote_ident(table),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_reads_csv_through_input() {
        let sql = insert_statement("event_v7");
        assert!(sql.starts_with("INSERT INTO `event_v7` (version, timestamp, creation_number, account_address,"));
        assert!(sql.contains("reinterpretAsUInt256(reverse(unhex(account_address)))"));
        assert!(sql.contains("reinterpretAsUInt256(reverse(unhex(module_address)))"));
        assert!(sql.contains("FROM input('version UInt64, timestamp UInt64,"));
        assert!(sql.ends_with("FORMAT CSV"));
    }

    #[test]
    fn table_name_is_quoted() {
        assert_eq!(quote_ident("we`ird"), "`we``ird`");
        assert!(insert_statement("a b").contains("`a b`"));
    }

    #[test]
    fn ddl_uses_replacing_merge_tree() {
        let ddl = create_table_statement("event_v7");
        assert!(ddl.contains("CREATE TABLE IF NOT EXISTS `event_v7`"));
        assert!(ddl.contains("account_address UInt256"));
        assert!(ddl.contains("ENGINE = ReplacingMergeTree"));
        assert!(ddl.ends_with("ORDER BY (version, creation_number, account_address, sequence_number)"));
    }
}
