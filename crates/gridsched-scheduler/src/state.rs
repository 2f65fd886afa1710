//! Read-only cluster state consumed by an evaluation.

use gridsched_core::{Allocation, Job, Node};
use gridsched_state::{StateResult, StateSnapshot, StateStore};

/// Point-in-time query surface over cluster state.
///
/// Implementations are shared by many workers and must hand out
/// consistent reads without callers taking locks.
pub trait State {
    /// Allocations recorded for a node, possibly including terminal ones.
    fn allocs_by_node(&self, node_id: &str) -> StateResult<Vec<Allocation>>;

    fn node_by_id(&self, node_id: &str) -> StateResult<Option<Node>>;

    fn nodes(&self) -> StateResult<Vec<Node>>;

    fn job_by_id(&self, job_id: &str) -> StateResult<Option<Job>>;
}

impl State for StateSnapshot {
    fn allocs_by_node(&self, node_id: &str) -> StateResult<Vec<Allocation>> {
        StateSnapshot::allocs_by_node(self, node_id)
    }

    fn node_by_id(&self, node_id: &str) -> StateResult<Option<Node>> {
        StateSnapshot::node_by_id(self, node_id)
    }

    fn nodes(&self) -> StateResult<Vec<Node>> {
        StateSnapshot::nodes(self)
    }

    fn job_by_id(&self, job_id: &str) -> StateResult<Option<Job>> {
        StateSnapshot::job_by_id(self, job_id)
    }
}

/// Each call reads through its own transaction; prefer a
/// [`StateSnapshot`] when one evaluation makes several queries.
impl State for StateStore {
    fn allocs_by_node(&self, node_id: &str) -> StateResult<Vec<Allocation>> {
        StateStore::allocs_by_node(self, node_id)
    }

    fn node_by_id(&self, node_id: &str) -> StateResult<Option<Node>> {
        self.get_node(node_id)
    }

    fn nodes(&self) -> StateResult<Vec<Node>> {
        self.list_nodes()
    }

    fn job_by_id(&self, job_id: &str) -> StateResult<Option<Job>> {
        self.get_job(job_id)
    }
}
