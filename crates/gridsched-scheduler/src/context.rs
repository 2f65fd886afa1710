//! Evaluation context — the object threaded through placement code.
//!
//! One `EvalContext` exists per evaluation attempt. It borrows the cluster
//! state view and the plan being built, and owns the scratch caches,
//! placement metrics and the class eligibility tracker for that attempt.
//! Nothing here is shared between workers, so none of it is locked.

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;
use semver::VersionReq;
use tracing::{Span, info_span, trace};

use gridsched_core::{AllocMetric, Allocation, Plan, filter_terminal_allocs, remove_allocs};

use crate::eligibility::EvalEligibility;
use crate::error::SchedulerResult;
use crate::state::State;

/// Per-evaluation memo of compiled patterns, keyed by source string.
#[derive(Debug, Default)]
pub struct EvalCache {
    re_cache: Option<HashMap<String, Arc<Regex>>>,
    constraint_cache: Option<HashMap<String, Arc<VersionReq>>>,
}

impl EvalCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn regexp_cache(&mut self) -> &mut HashMap<String, Arc<Regex>> {
        self.re_cache.get_or_insert_with(HashMap::new)
    }

    pub fn constraint_cache(&mut self) -> &mut HashMap<String, Arc<VersionReq>> {
        self.constraint_cache.get_or_insert_with(HashMap::new)
    }

    /// Fetch the compiled form of `pattern`, compiling it on first use.
    ///
    /// Failed compilations are not cached.
    pub fn regexp(&mut self, pattern: &str) -> Result<Arc<Regex>, regex::Error> {
        if let Some(re) = self.regexp_cache().get(pattern) {
            return Ok(Arc::clone(re));
        }
        let re = Arc::new(Regex::new(pattern)?);
        self.regexp_cache()
            .insert(pattern.to_string(), Arc::clone(&re));
        Ok(re)
    }

    /// Fetch the parsed form of a version requirement such as `>= 1.2, < 2`.
    pub fn version_constraint(&mut self, source: &str) -> Result<Arc<VersionReq>, semver::Error> {
        if let Some(req) = self.constraint_cache().get(source) {
            return Ok(Arc::clone(req));
        }
        let req = Arc::new(VersionReq::parse(source)?);
        self.constraint_cache()
            .insert(source.to_string(), Arc::clone(&req));
        Ok(req)
    }
}

/// Context for a single evaluation attempt.
pub struct EvalContext<'a> {
    cache: EvalCache,
    state: &'a dyn State,
    plan: &'a mut Plan,
    metrics: AllocMetric,
    eligibility: Option<EvalEligibility>,
    span: Span,
}

impl<'a> EvalContext<'a> {
    pub fn new(state: &'a dyn State, plan: &'a mut Plan) -> Self {
        let span = info_span!("eval", eval_id = %plan.eval_id);
        Self {
            cache: EvalCache::new(),
            state,
            plan,
            metrics: AllocMetric::default(),
            eligibility: None,
            span,
        }
    }

    pub fn state(&self) -> &'a dyn State {
        self.state
    }

    /// Swap in a different state view, e.g. a fresher snapshot.
    pub fn set_state(&mut self, state: &'a dyn State) {
        self.state = state;
    }

    pub fn plan(&self) -> &Plan {
        &*self.plan
    }

    pub fn plan_mut(&mut self) -> &mut Plan {
        &mut *self.plan
    }

    pub fn metrics(&self) -> &AllocMetric {
        &self.metrics
    }

    pub fn metrics_mut(&mut self) -> &mut AllocMetric {
        &mut self.metrics
    }

    /// Span covering this evaluation; enter it around placement work.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Start fresh metrics for the next task group.
    ///
    /// Caches and eligibility verdicts stay valid for the whole evaluation
    /// and are kept.
    pub fn reset(&mut self) {
        self.metrics = AllocMetric::default();
    }

    /// Allocations on `node_id` as they would be if the plan were applied.
    ///
    /// Existing non-terminal allocations, minus the plan's evictions for the
    /// node, followed by the plan's new placements for the node.
    pub fn proposed_allocs(&self, node_id: &str) -> SchedulerResult<Vec<Allocation>> {
        let existing = self.state.allocs_by_node(node_id)?;
        let mut proposed = filter_terminal_allocs(existing);

        if let Some(update) = self.plan.node_update.get(node_id).filter(|u| !u.is_empty()) {
            proposed = remove_allocs(proposed, update);
        }
        if let Some(placed) = self.plan.node_allocation.get(node_id) {
            proposed.extend(placed.iter().cloned());
        }

        trace!(parent: &self.span, %node_id, count = proposed.len(), "proposed allocations");
        Ok(proposed)
    }

    pub fn cache_mut(&mut self) -> &mut EvalCache {
        &mut self.cache
    }

    pub fn regexp_cache(&mut self) -> &mut HashMap<String, Arc<Regex>> {
        self.cache.regexp_cache()
    }

    pub fn constraint_cache(&mut self) -> &mut HashMap<String, Arc<VersionReq>> {
        self.cache.constraint_cache()
    }

    /// The class eligibility tracker, created on first use.
    pub fn eligibility(&mut self) -> &mut EvalEligibility {
        self.eligibility.get_or_insert_with(EvalEligibility::new)
    }
}
