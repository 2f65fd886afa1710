//! gridsched-scheduler — the evaluation core of the gridsched scheduler.
//!
//! A scheduling worker builds one [`EvalContext`] per evaluation attempt and
//! threads it through every feasibility and placement step. The context:
//!
//! - Exposes a read-only [`State`] view and the in-progress [`Plan`]
//! - Computes proposed allocations per node (existing − evictions + placements)
//! - Caches compiled regexps and version requirements for the evaluation
//! - Tracks feasibility verdicts per computed node class ([`EvalEligibility`])
//!
//! # Architecture
//!
//! ```text
//! Worker (one evaluation at a time)
//!   └── EvalContext
//!       ├── &dyn State (shared, snapshot-isolated)
//!       ├── &mut Plan (owned by the worker)
//!       ├── AllocMetric (reset per task group)
//!       ├── EvalCache (regexp / version requirement memo)
//!       └── EvalEligibility (class verdicts, escaped constraints)
//!
//! FeasibilityWrapper
//!   ├── job checkers ──┐
//!   └── tg checkers ───┴── consult EvalEligibility before running
//! ```
//!
//! [`Plan`]: gridsched_core::Plan

pub mod context;
pub mod eligibility;
pub mod error;
pub mod feasible;
pub mod state;

pub use context::{EvalCache, EvalContext};
pub use eligibility::{ComputedClassFeasibility, EvalEligibility};
pub use error::{SchedulerError, SchedulerResult};
pub use feasible::{
    ConstraintChecker, DistinctHostsChecker, DistinctPropertyChecker, FeasibilityChecker,
    FeasibilityWrapper, check_constraint,
};
pub use state::State;
