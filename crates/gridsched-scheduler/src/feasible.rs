//! Feasibility checks and the class-aware wrapper that caches them.
//!
//! Checkers answer "can this node run the work?" for one node at a time.
//! [`FeasibilityWrapper`] sits in front of them and consults the
//! evaluation's [`EvalEligibility`](crate::eligibility::EvalEligibility) so
//! that nodes sharing a computed class are only checked once.

use std::collections::HashSet;

use semver::Version;
use tracing::{trace, warn};

use gridsched_core::{Allocation, Constraint, ConstraintOperand, Job, Node, TaskGroup};

use crate::context::{EvalCache, EvalContext};
use crate::eligibility::ComputedClassFeasibility;
use crate::error::SchedulerResult;

const FILTER_CLASS_INELIGIBLE: &str = "computed class ineligible";
const FILTER_DISTINCT_HOSTS: &str = "distinct_hosts";

/// A single feasibility test applied to one node.
pub trait FeasibilityChecker {
    fn feasible(&mut self, ctx: &mut EvalContext<'_>, node: &Node) -> SchedulerResult<bool>;
}

// ── Constraints ───────────────────────────────────────────────────

/// Checks a fixed set of constraints against node properties.
#[derive(Debug, Clone, Default)]
pub struct ConstraintChecker {
    constraints: Vec<Constraint>,
}

impl ConstraintChecker {
    pub fn new(constraints: Vec<Constraint>) -> Self {
        Self { constraints }
    }

    pub fn set_constraints(&mut self, constraints: Vec<Constraint>) {
        self.constraints = constraints;
    }
}

impl FeasibilityChecker for ConstraintChecker {
    fn feasible(&mut self, ctx: &mut EvalContext<'_>, node: &Node) -> SchedulerResult<bool> {
        for constraint in &self.constraints {
            if !meets_constraint(ctx.cache_mut(), constraint, node) {
                ctx.metrics_mut().filter_node(node, &constraint.to_string());
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn meets_constraint(cache: &mut EvalCache, constraint: &Constraint, node: &Node) -> bool {
    // Placement-dependent operands are enforced by dedicated checkers.
    if constraint.operand.is_placement_dependent() {
        return true;
    }

    let (Some(lval), Some(rval)) = (
        node.resolve_target(&constraint.l_target),
        node.resolve_target(&constraint.r_target),
    ) else {
        return false;
    };

    check_constraint(cache, constraint.operand, lval, rval)
}

/// Compare two resolved targets under `operand`.
pub fn check_constraint(
    cache: &mut EvalCache,
    operand: ConstraintOperand,
    lval: &str,
    rval: &str,
) -> bool {
    match operand {
        ConstraintOperand::Equal => lval == rval,
        ConstraintOperand::NotEqual => lval != rval,
        ConstraintOperand::Less => lval < rval,
        ConstraintOperand::LessEqual => lval <= rval,
        ConstraintOperand::Greater => lval > rval,
        ConstraintOperand::GreaterEqual => lval >= rval,
        ConstraintOperand::Regexp => check_regexp_match(cache, lval, rval),
        ConstraintOperand::Version => check_version_match(cache, lval, rval),
        ConstraintOperand::SetContains => check_set_contains(lval, rval),
        ConstraintOperand::DistinctHosts | ConstraintOperand::DistinctProperty => true,
    }
}

fn check_regexp_match(cache: &mut EvalCache, lval: &str, pattern: &str) -> bool {
    match cache.regexp(pattern) {
        Ok(re) => re.is_match(lval),
        Err(err) => {
            warn!(%pattern, error = %err, "invalid regexp constraint");
            false
        }
    }
}

fn check_version_match(cache: &mut EvalCache, lval: &str, requirement: &str) -> bool {
    let Some(version) = parse_version(lval) else {
        trace!(version = %lval, "node version does not parse");
        return false;
    };
    match cache.version_constraint(requirement) {
        Ok(req) => req.matches(&version),
        Err(err) => {
            warn!(%requirement, error = %err, "invalid version constraint");
            false
        }
    }
}

/// Every comma-separated item of `rval` must appear in `lval`.
fn check_set_contains(lval: &str, rval: &str) -> bool {
    let have: HashSet<&str> = lval.split(',').map(str::trim).collect();
    rval.split(',').map(str::trim).all(|item| have.contains(item))
}

/// Parse a node-reported version, padding missing minor/patch components
/// (`"1.2"` → `1.2.0`).
fn parse_version(raw: &str) -> Option<Version> {
    let raw = raw.trim().trim_start_matches('v');
    if let Ok(version) = Version::parse(raw) {
        return Some(version);
    }

    let split = raw.find(['-', '+']).unwrap_or(raw.len());
    let (core, suffix) = raw.split_at(split);
    let padded = match core.matches('.').count() {
        0 => format!("{core}.0.0{suffix}"),
        1 => format!("{core}.0{suffix}"),
        _ => return None,
    };
    Version::parse(&padded).ok()
}

// ── Distinct hosts ────────────────────────────────────────────────

/// Rejects nodes that already host (or are planned to host) an
/// allocation of the same job, optionally scoped to one task group.
#[derive(Debug, Clone)]
pub struct DistinctHostsChecker {
    job_id: String,
    task_group: Option<String>,
}

impl DistinctHostsChecker {
    pub fn new(job_id: &str, task_group: Option<&str>) -> Self {
        Self {
            job_id: job_id.to_string(),
            task_group: task_group.map(str::to_string),
        }
    }
}

impl FeasibilityChecker for DistinctHostsChecker {
    fn feasible(&mut self, ctx: &mut EvalContext<'_>, node: &Node) -> SchedulerResult<bool> {
        let proposed = ctx.proposed_allocs(&node.id)?;
        let collides = proposed.iter().any(|alloc| {
            alloc.job_id == self.job_id
                && self
                    .task_group
                    .as_ref()
                    .is_none_or(|tg| &alloc.task_group == tg)
        });

        if collides {
            ctx.metrics_mut().filter_node(node, FILTER_DISTINCT_HOSTS);
            return Ok(false);
        }
        Ok(true)
    }
}

fn has_distinct_hosts(constraints: &[Constraint]) -> bool {
    constraints
        .iter()
        .any(|c| c.operand == ConstraintOperand::DistinctHosts)
}

// ── Distinct property ─────────────────────────────────────────────

/// Limits how many allocations of a job may share one value of a node
/// property, e.g. at most one per `${meta.rack}`.
///
/// The right-hand target is the allowed count per value and defaults to 1.
/// Nodes that cannot resolve the property are infeasible.
#[derive(Debug, Clone)]
pub struct DistinctPropertyChecker {
    job_id: String,
    task_group: Option<String>,
    constraints: Vec<Constraint>,
}

impl DistinctPropertyChecker {
    /// Keeps only the `distinct_property` entries of `constraints`.
    pub fn new(job_id: &str, task_group: Option<&str>, constraints: &[Constraint]) -> Self {
        Self {
            job_id: job_id.to_string(),
            task_group: task_group.map(str::to_string),
            constraints: constraints
                .iter()
                .filter(|c| c.operand == ConstraintOperand::DistinctProperty)
                .cloned()
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    fn counts(&self, alloc: &Allocation) -> bool {
        alloc.job_id == self.job_id
            && self
                .task_group
                .as_ref()
                .is_none_or(|tg| &alloc.task_group == tg)
    }

    /// Allocations of this job that would sit on nodes where `property`
    /// resolves to `value`, the candidate node included.
    fn used(
        &self,
        ctx: &EvalContext<'_>,
        candidate: &Node,
        property: &str,
        value: &str,
    ) -> SchedulerResult<usize> {
        let mut used = ctx
            .proposed_allocs(&candidate.id)?
            .iter()
            .filter(|a| self.counts(a))
            .count();

        for node in ctx.state().nodes()? {
            if node.id == candidate.id || node.resolve_target(property) != Some(value) {
                continue;
            }
            used += ctx
                .proposed_allocs(&node.id)?
                .iter()
                .filter(|a| self.counts(a))
                .count();
        }
        Ok(used)
    }
}

impl FeasibilityChecker for DistinctPropertyChecker {
    fn feasible(&mut self, ctx: &mut EvalContext<'_>, node: &Node) -> SchedulerResult<bool> {
        for constraint in &self.constraints {
            let Some(limit) = distinct_property_limit(&constraint.r_target) else {
                warn!(limit = %constraint.r_target, "invalid distinct_property limit");
                ctx.metrics_mut().filter_node(node, &constraint.to_string());
                return Ok(false);
            };

            let property = constraint.l_target.as_str();
            let Some(value) = node.resolve_target(property) else {
                ctx.metrics_mut().filter_node(node, &constraint.to_string());
                return Ok(false);
            };

            let used = self.used(ctx, node, property, value)?;
            if used >= limit {
                trace!(node_id = %node.id, %property, %value, used, limit, "distinct property exhausted");
                ctx.metrics_mut().filter_node(node, &constraint.to_string());
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn distinct_property_limit(raw: &str) -> Option<usize> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(1);
    }
    raw.parse().ok().filter(|limit| *limit > 0)
}

// ── Class-aware wrapper ───────────────────────────────────────────

/// Runs job-level then task-group-level checkers, reusing class verdicts.
///
/// A class verdict is only recorded when the class status was `Unknown`;
/// escaped jobs and task groups are checked on every node.
pub struct FeasibilityWrapper {
    job_checkers: Vec<Box<dyn FeasibilityChecker>>,
    tg_checkers: Vec<Box<dyn FeasibilityChecker>>,
    task_group: String,
}

impl FeasibilityWrapper {
    pub fn new(
        task_group: &str,
        job_checkers: Vec<Box<dyn FeasibilityChecker>>,
        tg_checkers: Vec<Box<dyn FeasibilityChecker>>,
    ) -> Self {
        Self {
            job_checkers,
            tg_checkers,
            task_group: task_group.to_string(),
        }
    }

    /// Standard checkers for placing `tg` of `job`: constraint checks at
    /// both levels plus distinct-hosts and distinct-property where requested.
    pub fn for_task_group(job: &Job, tg: &TaskGroup) -> Self {
        let mut job_checkers: Vec<Box<dyn FeasibilityChecker>> =
            vec![Box::new(ConstraintChecker::new(job.constraints.clone()))];
        if has_distinct_hosts(&job.constraints) {
            job_checkers.push(Box::new(DistinctHostsChecker::new(&job.id, None)));
        }
        let job_property = DistinctPropertyChecker::new(&job.id, None, &job.constraints);
        if !job_property.is_empty() {
            job_checkers.push(Box::new(job_property));
        }

        let tg_constraints = tg.combined_constraints();
        let distinct = has_distinct_hosts(&tg_constraints);
        let tg_property = DistinctPropertyChecker::new(&job.id, Some(&tg.name), &tg_constraints);
        let mut tg_checkers: Vec<Box<dyn FeasibilityChecker>> =
            vec![Box::new(ConstraintChecker::new(tg_constraints))];
        if distinct {
            tg_checkers.push(Box::new(DistinctHostsChecker::new(&job.id, Some(&tg.name))));
        }
        if !tg_property.is_empty() {
            tg_checkers.push(Box::new(tg_property));
        }

        Self::new(&tg.name, job_checkers, tg_checkers)
    }

    pub fn task_group(&self) -> &str {
        &self.task_group
    }

    /// Decide whether `node` can host the task group.
    pub fn feasible(&mut self, ctx: &mut EvalContext<'_>, node: &Node) -> SchedulerResult<bool> {
        let class = node.computed_class;
        ctx.metrics_mut().evaluate_node();

        let job_status = ctx.eligibility().job_status(class);
        if job_status == ComputedClassFeasibility::Ineligible {
            ctx.metrics_mut().filter_node(node, FILTER_CLASS_INELIGIBLE);
            return Ok(false);
        }
        let job_escaped = job_status == ComputedClassFeasibility::Escaped;

        if !run_checkers(&mut self.job_checkers, ctx, node)? {
            if !job_escaped {
                ctx.eligibility().set_job_eligibility(false, class);
            }
            return Ok(false);
        }
        if job_status == ComputedClassFeasibility::Unknown {
            ctx.eligibility().set_job_eligibility(true, class);
        }

        let tg_status = ctx.eligibility().task_group_status(&self.task_group, class);
        match tg_status {
            ComputedClassFeasibility::Ineligible => {
                ctx.metrics_mut().filter_node(node, FILTER_CLASS_INELIGIBLE);
                return Ok(false);
            }
            ComputedClassFeasibility::Eligible => return Ok(true),
            ComputedClassFeasibility::Escaped | ComputedClassFeasibility::Unknown => {}
        }
        let tg_escaped = tg_status == ComputedClassFeasibility::Escaped;

        if !run_checkers(&mut self.tg_checkers, ctx, node)? {
            if !tg_escaped {
                ctx.eligibility()
                    .set_task_group_eligibility(false, &self.task_group, class);
            }
            return Ok(false);
        }
        if tg_status == ComputedClassFeasibility::Unknown {
            ctx.eligibility()
                .set_task_group_eligibility(true, &self.task_group, class);
        }

        trace!(node_id = %node.id, class, task_group = %self.task_group, "node feasible");
        Ok(true)
    }

    /// Filter `nodes` down to the feasible ones, in order.
    pub fn select<'n>(
        &mut self,
        ctx: &mut EvalContext<'_>,
        nodes: &'n [Node],
    ) -> SchedulerResult<Vec<&'n Node>> {
        let mut feasible = Vec::new();
        for node in nodes {
            if self.feasible(ctx, node)? {
                feasible.push(node);
            }
        }
        Ok(feasible)
    }
}

fn run_checkers(
    checkers: &mut [Box<dyn FeasibilityChecker>],
    ctx: &mut EvalContext<'_>,
    node: &Node,
) -> SchedulerResult<bool> {
    for checker in checkers.iter_mut() {
        if !checker.feasible(ctx, node)? {
            return Ok(false);
        }
    }
    Ok(true)
}
