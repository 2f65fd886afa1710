//! Cluster nodes and their computed class.
//!
//! Nodes that agree on every scheduling-relevant property hash to the same
//! computed class, which lets the scheduler decide feasibility once per
//! class instead of once per node. Properties under the `unique.` namespace
//! differ per node by definition and are excluded from the hash.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Unique identifier for a node in the cluster.
pub type NodeId = String;

/// Hash bucket of attribute-equivalent nodes.
pub type ComputedClass = u64;

/// Reserved class value reported by members that predate computed classes.
pub const UNKNOWN_COMPUTED_CLASS: ComputedClass = 0;

const UNIQUE_NAMESPACE: &str = "unique.";

/// Scheduling view of a cluster node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub datacenter: String,
    /// Operator-assigned class label (e.g. "batch", "gpu").
    #[serde(default)]
    pub node_class: String,
    /// Fingerprinted attributes, e.g. `kernel.name` or `unique.hostname`.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Operator-supplied metadata.
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
    /// Zero until [`Node::compute_class`] runs.
    #[serde(default)]
    pub computed_class: ComputedClass,
}

impl Node {
    /// Hash the class-relevant fields and store the result on the node.
    pub fn compute_class(&mut self) -> ComputedClass {
        self.computed_class = self.class_hash();
        self.computed_class
    }

    fn class_hash(&self) -> ComputedClass {
        let mut hasher = Sha256::new();
        hasher.update(self.datacenter.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.node_class.as_bytes());
        hasher.update([0u8]);
        hash_shared_entries(&mut hasher, &self.attributes);
        hasher.update([0xffu8]);
        hash_shared_entries(&mut hasher, &self.meta);

        let digest = hasher.finalize();
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        match u64::from_be_bytes(prefix) {
            UNKNOWN_COMPUTED_CLASS => 1,
            class => class,
        }
    }

    /// Interpolate a constraint target against this node.
    ///
    /// Literals resolve to themselves. `${...}` references resolve to the
    /// node property they name, or `None` when the node lacks it.
    pub fn resolve_target<'a>(&'a self, target: &'a str) -> Option<&'a str> {
        if !target.starts_with("${") {
            return Some(target);
        }

        match target {
            "${node.unique.id}" => Some(self.id.as_str()),
            "${node.unique.name}" => Some(self.name.as_str()),
            "${node.datacenter}" => Some(self.datacenter.as_str()),
            "${node.class}" => Some(self.node_class.as_str()),
            _ => {
                let inner = target.strip_prefix("${")?.strip_suffix('}')?;
                if let Some(key) = inner.strip_prefix("attr.") {
                    self.attributes.get(key).map(String::as_str)
                } else if let Some(key) = inner.strip_prefix("meta.") {
                    self.meta.get(key).map(String::as_str)
                } else {
                    None
                }
            }
        }
    }
}

fn hash_shared_entries(hasher: &mut Sha256, entries: &BTreeMap<String, String>) {
    for (key, value) in entries {
        if key.starts_with(UNIQUE_NAMESPACE) {
            continue;
        }
        hasher.update(key.as_bytes());
        hasher.update([0u8]);
        hasher.update(value.as_bytes());
        hasher.update([0u8]);
    }
}
