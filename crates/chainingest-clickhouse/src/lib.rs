//! chainingest-clickhouse — bulk loader writing encoded event rows into a
//! ClickHouse table over its HTTP interface.
//!
//! Each transaction's rows become one CSV payload and one
//! `INSERT ... SELECT ... FROM input(...) FORMAT CSV` statement; the server
//! converts the padded hex addresses to `UInt256` (see [`reinterpret`]).

pub mod loader;
pub mod payload;
pub mod reinterpret;
pub mod statement;

pub use loader::ClickHouseLoader;
pub use payload::rows_to_csv;
pub use reinterpret::{address_to_u256, u256_to_address};
