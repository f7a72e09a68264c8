//! Redb table definitions.

use redb::TableDefinition;

/// Name of the database file inside a store directory
pub const DATA_FILE: &str = "data.redb";

// Every store is a flat keyspace: key (str) -> opaque bytes
pub const ENTRIES: TableDefinition<&str, &[u8]> = TableDefinition::new("entries");
