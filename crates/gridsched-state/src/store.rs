//! StateStore — redb-backed cluster state for gridsched.
//!
//! Writes go through [`StateStore`], one write transaction per call. Reads
//! for scheduling go through [`StateSnapshot`], which holds a single read
//! transaction open for its whole lifetime.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadTransaction, ReadableDatabase, ReadableTable};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use gridsched_core::{Allocation, Job, Node, StateBackend, StateConfig};

use crate::error::{StateError, StateResult};
use crate::tables::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe cluster state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store.
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Open whichever backend the configuration selects.
    pub fn from_config(config: &StateConfig) -> StateResult<Self> {
        match config.backend {
            StateBackend::Memory => Self::open_in_memory(),
            StateBackend::Disk => {
                let path = config.path.as_deref().ok_or_else(|| {
                    StateError::Config("disk backend requires a path".to_string())
                })?;
                Self::open(path)
            }
        }
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(NODES).map_err(map_err!(Table))?;
        txn.open_table(JOBS).map_err(map_err!(Table))?;
        txn.open_table(ALLOCS).map_err(map_err!(Table))?;
        txn.open_table(ALLOC_NODES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Pin a point-in-time read view of the store.
    pub fn snapshot(&self) -> StateResult<StateSnapshot> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        Ok(StateSnapshot { txn })
    }

    fn put_json<T: Serialize>(&self, table: JsonTable, key: &str, value: &T) -> StateResult<()> {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            table
                .insert(key, bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn delete_key(&self, table: JsonTable, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    // ── Nodes ──────────────────────────────────────────────────────

    /// Insert or update a node.
    pub fn put_node(&self, node: &Node) -> StateResult<()> {
        self.put_json(NODES, &node.id, node)?;
        debug!(node_id = %node.id, class = node.computed_class, "node stored");
        Ok(())
    }

    pub fn get_node(&self, node_id: &str) -> StateResult<Option<Node>> {
        self.snapshot()?.node_by_id(node_id)
    }

    pub fn list_nodes(&self) -> StateResult<Vec<Node>> {
        self.snapshot()?.nodes()
    }

    /// Delete a node by ID. Returns true if it existed.
    pub fn delete_node(&self, node_id: &str) -> StateResult<bool> {
        let existed = self.delete_key(NODES, node_id)?;
        debug!(%node_id, existed, "node deleted");
        Ok(existed)
    }

    // ── Jobs ───────────────────────────────────────────────────────

    /// Insert or update a job.
    pub fn put_job(&self, job: &Job) -> StateResult<()> {
        self.put_json(JOBS, &job.id, job)?;
        debug!(job_id = %job.id, "job stored");
        Ok(())
    }

    pub fn get_job(&self, job_id: &str) -> StateResult<Option<Job>> {
        self.snapshot()?.job_by_id(job_id)
    }

    // ── Allocations ────────────────────────────────────────────────

    /// Insert or update an allocation under its node.
    ///
    /// An allocation that moved to another node is removed from the old one
    /// in the same transaction.
    pub fn put_alloc(&self, alloc: &Allocation) -> StateResult<()> {
        let bytes = serde_json::to_vec(alloc).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let moved_from;
        {
            let mut index = txn.open_table(ALLOC_NODES).map_err(map_err!(Table))?;
            moved_from = index
                .insert(alloc.id.as_str(), alloc.node_id.as_str())
                .map_err(map_err!(Write))?
                .map(|prev| prev.value().to_string())
                .filter(|prev| *prev != alloc.node_id);

            let mut allocs = txn.open_table(ALLOCS).map_err(map_err!(Table))?;
            if let Some(prev) = &moved_from {
                allocs
                    .remove(alloc_key(prev, &alloc.id).as_str())
                    .map_err(map_err!(Write))?;
            }
            allocs
                .insert(alloc_key(&alloc.node_id, &alloc.id).as_str(), bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;

        if let Some(prev) = moved_from {
            debug!(alloc_id = %alloc.id, from = %prev, to = %alloc.node_id, "allocation moved");
        }
        Ok(())
    }

    pub fn get_alloc(&self, node_id: &str, alloc_id: &str) -> StateResult<Option<Allocation>> {
        self.snapshot()?.alloc(node_id, alloc_id)
    }

    /// All allocations recorded for a node, terminal ones included.
    pub fn allocs_by_node(&self, node_id: &str) -> StateResult<Vec<Allocation>> {
        self.snapshot()?.allocs_by_node(node_id)
    }

    /// Delete an allocation. Returns true if it existed.
    pub fn delete_alloc(&self, node_id: &str, alloc_id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut allocs = txn.open_table(ALLOCS).map_err(map_err!(Table))?;
            existed = allocs
                .remove(alloc_key(node_id, alloc_id).as_str())
                .map_err(map_err!(Write))?
                .is_some();

            let mut index = txn.open_table(ALLOC_NODES).map_err(map_err!(Table))?;
            let indexed_here = index
                .get(alloc_id)
                .map_err(map_err!(Read))?
                .is_some_and(|n| n.value() == node_id);
            if indexed_here {
                index.remove(alloc_id).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }
}

/// Consistent read view over the store, valid until dropped.
pub struct StateSnapshot {
    txn: ReadTransaction,
}

impl StateSnapshot {
    pub fn node_by_id(&self, node_id: &str) -> StateResult<Option<Node>> {
        self.get_json(NODES, node_id)
    }

    pub fn nodes(&self) -> StateResult<Vec<Node>> {
        self.scan_json(NODES, "")
    }

    pub fn job_by_id(&self, job_id: &str) -> StateResult<Option<Job>> {
        self.get_json(JOBS, job_id)
    }

    pub fn alloc(&self, node_id: &str, alloc_id: &str) -> StateResult<Option<Allocation>> {
        self.get_json(ALLOCS, &alloc_key(node_id, alloc_id))
    }

    /// All allocations recorded for a node, terminal ones included.
    pub fn allocs_by_node(&self, node_id: &str) -> StateResult<Vec<Allocation>> {
        let mut allocs: Vec<Allocation> = self.scan_json(ALLOCS, &node_alloc_prefix(node_id))?;
        // The key range also covers nodes whose id extends `{node_id}:`.
        allocs.retain(|a| a.node_id == node_id);
        Ok(allocs)
    }

    fn get_json<T: DeserializeOwned>(&self, table: JsonTable, key: &str) -> StateResult<Option<T>> {
        let table = self.txn.open_table(table).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Decode every value whose key starts with `prefix`, in key order.
    fn scan_json<T: DeserializeOwned>(&self, table: JsonTable, prefix: &str) -> StateResult<Vec<T>> {
        let table = self.txn.open_table(table).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.range(prefix..).map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if !key.value().starts_with(prefix) {
                break;
            }
            let decoded: T =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(decoded);
        }
        Ok(results)
    }
}
