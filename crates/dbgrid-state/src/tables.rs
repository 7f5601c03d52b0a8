//! redb table definitions for the dbgrid state store.
//!
//! Each data table uses `&str` keys and `&[u8]` values (JSON-serialized).

use redb::TableDefinition;

/// Objects of every kind keyed by `{kind}/{namespace}/{name}`.
pub const OBJECTS: TableDefinition<&str, &[u8]> = TableDefinition::new("objects");

/// Provisioned tenants keyed by tenant path.
pub const TENANTS: TableDefinition<&str, &[u8]> = TableDefinition::new("tenants");

/// Events keyed by `{namespace}/{name}:{seq:020}`.
pub const EVENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("events");

/// Monotonic counters keyed by name.
pub const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");
