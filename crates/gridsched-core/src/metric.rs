//! Placement metrics recorded while filtering and scoring nodes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::node::Node;

/// Counters describing why nodes were or were not chosen for a task group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocMetric {
    /// Nodes considered at all.
    pub nodes_evaluated: usize,
    /// Nodes rejected by a constraint or class verdict.
    pub nodes_filtered: usize,
    /// Datacenter → nodes available before filtering.
    pub nodes_available: HashMap<String, usize>,
    /// Node class → nodes filtered.
    pub class_filtered: HashMap<String, usize>,
    /// Constraint (display form) → nodes filtered by it.
    pub constraint_filtered: HashMap<String, usize>,
    /// Nodes that passed filtering but lacked capacity.
    pub nodes_exhausted: usize,
    pub class_exhausted: HashMap<String, usize>,
    pub dimension_exhausted: HashMap<String, usize>,
    /// `{node_id}.{scorer}` → score.
    pub scores: HashMap<String, f64>,
    /// Placements folded into an earlier identical failure.
    pub coalesced_failures: usize,
}

impl AllocMetric {
    pub fn evaluate_node(&mut self) {
        self.nodes_evaluated += 1;
    }

    /// Record that `node` was rejected, optionally naming the reason.
    pub fn filter_node(&mut self, node: &Node, constraint: &str) {
        self.nodes_filtered += 1;
        if !node.node_class.is_empty() {
            *self.class_filtered.entry(node.node_class.clone()).or_insert(0) += 1;
        }
        if !constraint.is_empty() {
            *self
                .constraint_filtered
                .entry(constraint.to_string())
                .or_insert(0) += 1;
        }
    }

    /// Record that `node` ran out of `dimension` (e.g. "memory").
    pub fn exhaust_node(&mut self, node: &Node, dimension: &str) {
        self.nodes_exhausted += 1;
        if !node.node_class.is_empty() {
            *self.class_exhausted.entry(node.node_class.clone()).or_insert(0) += 1;
        }
        if !dimension.is_empty() {
            *self
                .dimension_exhausted
                .entry(dimension.to_string())
                .or_insert(0) += 1;
        }
    }

    pub fn score_node(&mut self, node: &Node, name: &str, score: f64) {
        self.scores.insert(format!("{}.{}", node.id, name), score);
    }
}
