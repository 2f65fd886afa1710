//! redb table definitions for the gridsched state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized core types).

use redb::TableDefinition;

/// Shape shared by every table in the store.
pub type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Nodes keyed by `{node_id}`.
pub const NODES: JsonTable = TableDefinition::new("nodes");

/// Jobs keyed by `{job_id}`.
pub const JOBS: JsonTable = TableDefinition::new("jobs");

/// Allocations keyed by `{node_id}:{alloc_id}` so a node's allocations
/// form one contiguous key range.
pub const ALLOCS: JsonTable = TableDefinition::new("allocs");

/// Allocation id → node currently holding its row in [`ALLOCS`].
pub const ALLOC_NODES: TableDefinition<'static, &'static str, &'static str> =
    TableDefinition::new("alloc_nodes");

pub fn alloc_key(node_id: &str, alloc_id: &str) -> String {
    format!("{node_id}:{alloc_id}")
}

pub fn node_alloc_prefix(node_id: &str) -> String {
    format!("{node_id}:")
}
