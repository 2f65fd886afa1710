//! gridsched-core — shared data model for the gridsched evaluation core.
//!
//! Everything the scheduler consults while evaluating a job lives here:
//! the job/constraint model, nodes with their computed class, allocations,
//! the in-progress plan, and the metrics accumulated while filtering nodes.

pub mod config;
pub mod constraint;
pub mod metric;
pub mod node;
pub mod plan;
pub mod types;

pub use config::{SchedulerConfig, StateBackend, StateConfig};
pub use constraint::{Constraint, ConstraintOperand, escaped_constraints};
pub use metric::AllocMetric;
pub use node::{ComputedClass, Node, NodeId, UNKNOWN_COMPUTED_CLASS};
pub use plan::Plan;
pub use types::*;
