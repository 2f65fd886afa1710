//! The in-progress placement plan of an evaluation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::node::NodeId;
use crate::types::{AllocDesiredStatus, Allocation};

/// Evictions and placements proposed by one evaluation, keyed by node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub eval_id: String,
    pub priority: u32,
    /// Node-id → allocations the plan stops or evicts there.
    pub node_update: HashMap<NodeId, Vec<Allocation>>,
    /// Node-id → allocations the plan newly places there.
    pub node_allocation: HashMap<NodeId, Vec<Allocation>>,
}

impl Plan {
    pub fn new(eval_id: &str, priority: u32) -> Self {
        Self {
            eval_id: eval_id.to_string(),
            priority,
            ..Self::default()
        }
    }

    /// Record that `alloc` should transition to `desired_status` on its node.
    pub fn append_update(
        &mut self,
        alloc: &Allocation,
        desired_status: AllocDesiredStatus,
        description: &str,
    ) {
        let mut update = alloc.clone();
        update.desired_status = desired_status;
        update.desired_description = description.to_string();
        self.node_update
            .entry(alloc.node_id.clone())
            .or_default()
            .push(update);
    }

    /// Undo the most recent update for `alloc`'s node if it targets `alloc`.
    pub fn pop_update(&mut self, alloc: &Allocation) {
        let Some(existing) = self.node_update.get_mut(&alloc.node_id) else {
            return;
        };
        if existing.last().is_some_and(|last| last.id == alloc.id) {
            existing.pop();
        }
        if existing.is_empty() {
            self.node_update.remove(&alloc.node_id);
        }
    }

    /// Record a new placement on `alloc.node_id`.
    pub fn append_alloc(&mut self, alloc: Allocation) {
        self.node_allocation
            .entry(alloc.node_id.clone())
            .or_default()
            .push(alloc);
    }

    pub fn is_no_op(&self) -> bool {
        self.node_update.is_empty() && self.node_allocation.is_empty()
    }
}
