//! Node eligibility tracking by computed node class.
//!
//! Feasibility is decided once per computed class rather than once per
//! node: the first node of a class runs the full constraint checks and the
//! verdict is reused for every other node of that class. This is only safe
//! when every constraint can be answered from class-relevant properties.
//! Jobs and task groups with escaped constraints always report
//! [`ComputedClassFeasibility::Escaped`], which forces per-node checks.
//!
//! A tracker lives for exactly one evaluation and is owned by its
//! `EvalContext`. Nested maps are created lazily without synchronization;
//! sharing a tracker across threads is not supported.

use std::collections::HashMap;

use tracing::debug;

use gridsched_core::{ComputedClass, Constraint, Job, UNKNOWN_COMPUTED_CLASS, escaped_constraints};

/// Cached feasibility verdict for a computed class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ComputedClassFeasibility {
    /// Not yet evaluated for this class.
    #[default]
    Unknown,
    Ineligible,
    Eligible,
    /// The class cannot decide feasibility; check every node.
    Escaped,
}

/// Tracks class-level eligibility for one evaluation.
#[derive(Debug, Default)]
pub struct EvalEligibility {
    /// Job-level verdict per computed class.
    job: HashMap<ComputedClass, ComputedClassFeasibility>,
    job_escaped_constraints: Vec<Constraint>,
    /// Task group name → verdict per computed class.
    task_groups: HashMap<String, HashMap<ComputedClass, ComputedClassFeasibility>>,
    /// Task group name → escaped constraints of the group and its tasks.
    tg_escaped_constraints: HashMap<String, Vec<Constraint>>,
}

impl EvalEligibility {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute escaped constraints for the job and each of its task groups.
    ///
    /// Must run before any status query of the evaluation.
    pub fn set_job(&mut self, job: &Job) {
        self.set_job_with(job, escaped_constraints);
    }

    /// [`set_job`](Self::set_job) with a caller-supplied escape analysis.
    pub fn set_job_with<F>(&mut self, job: &Job, mut escaped: F)
    where
        F: FnMut(&[Constraint]) -> Vec<Constraint>,
    {
        self.job_escaped_constraints = escaped(&job.constraints);

        for tg in &job.task_groups {
            let constraints = tg.combined_constraints();
            self.tg_escaped_constraints
                .insert(tg.name.clone(), escaped(&constraints));
        }

        debug!(
            job_id = %job.id,
            job_escaped = self.job_escaped_constraints.len(),
            task_groups = job.task_groups.len(),
            "computed escaped constraints"
        );
    }

    /// Whether the job or any of its task groups escaped class caching.
    pub fn has_escaped(&self) -> bool {
        !self.job_escaped_constraints.is_empty()
            || self.tg_escaped_constraints.values().any(|c| !c.is_empty())
    }

    pub fn job_escaped_constraints(&self) -> &[Constraint] {
        &self.job_escaped_constraints
    }

    pub fn task_group_escaped_constraints(&self, tg: &str) -> &[Constraint] {
        self.tg_escaped_constraints
            .get(tg)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Job-level verdict for `class`.
    pub fn job_status(&self, class: ComputedClass) -> ComputedClassFeasibility {
        // Members that predate computed classes report class 0; never trust
        // the cache for them.
        if !self.job_escaped_constraints.is_empty() || class == UNKNOWN_COMPUTED_CLASS {
            return ComputedClassFeasibility::Escaped;
        }

        self.job.get(&class).copied().unwrap_or_default()
    }

    /// Record the job-level verdict for `class`. Later calls overwrite.
    pub fn set_job_eligibility(&mut self, eligible: bool, class: ComputedClass) {
        self.job.insert(class, feasibility(eligible));
    }

    /// Task-group-level verdict for `class`.
    pub fn task_group_status(&self, tg: &str, class: ComputedClass) -> ComputedClassFeasibility {
        if class == UNKNOWN_COMPUTED_CLASS {
            return ComputedClassFeasibility::Escaped;
        }

        if self
            .tg_escaped_constraints
            .get(tg)
            .is_some_and(|escaped| !escaped.is_empty())
        {
            return ComputedClassFeasibility::Escaped;
        }

        self.task_groups
            .get(tg)
            .and_then(|classes| classes.get(&class))
            .copied()
            .unwrap_or_default()
    }

    /// Record the verdict of task group `tg` for `class`. Later calls overwrite.
    pub fn set_task_group_eligibility(&mut self, eligible: bool, tg: &str, class: ComputedClass) {
        self.task_groups
            .entry(tg.to_string())
            .or_default()
            .insert(class, feasibility(eligible));
    }
}

fn feasibility(eligible: bool) -> ComputedClassFeasibility {
    if eligible {
        ComputedClassFeasibility::Eligible
    } else {
        ComputedClassFeasibility::Ineligible
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridsched_core::{ConstraintOperand, Task, TaskGroup};

    use super::ComputedClassFeasibility::*;

    fn plain() -> Constraint {
        Constraint::new("${attr.kernel.name}", ConstraintOperand::Equal, "linux")
    }

    fn unique() -> Constraint {
        Constraint::new("${attr.unique.hostname}", ConstraintOperand::Equal, "web-1")
    }

    fn task_group(name: &str, own: Vec<Constraint>, task: Vec<Constraint>) -> TaskGroup {
        TaskGroup {
            name: name.to_string(),
            count: 1,
            constraints: own,
            tasks: vec![Task {
                name: format!("{name}-task"),
                driver: "exec".to_string(),
                constraints: task,
            }],
        }
    }

    fn job(constraints: Vec<Constraint>, task_groups: Vec<TaskGroup>) -> Job {
        Job {
            id: "api".to_string(),
            name: "api".to_string(),
            priority: 50,
            constraints,
            task_groups,
        }
    }

    fn tracker_for(job: &Job) -> EvalEligibility {
        let mut e = EvalEligibility::new();
        e.set_job(job);
        e
    }

    #[test]
    fn default_status_is_unknown() {
        assert_eq!(ComputedClassFeasibility::default(), Unknown);
    }

    #[test]
    fn job_status_unknown_until_set() {
        let e = tracker_for(&job(vec![plain()], vec![]));
        assert_eq!(e.job_status(5), Unknown);
    }

    #[test]
    fn job_eligibility_last_write_wins() {
        let mut e = tracker_for(&job(vec![plain()], vec![]));

        e.set_job_eligibility(true, 5);
        assert_eq!(e.job_status(5), Eligible);

        e.set_job_eligibility(false, 5);
        assert_eq!(e.job_status(5), Ineligible);

        e.set_job_eligibility(false, 5);
        assert_eq!(e.job_status(5), Ineligible);
        assert_eq!(e.job_status(6), Unknown);
    }

    #[test]
    fn class_zero_always_escapes() {
        let mut e = tracker_for(&job(vec![], vec![task_group("web", vec![], vec![])]));

        e.set_job_eligibility(true, 0);
        e.set_task_group_eligibility(true, "web", 0);

        assert_eq!(e.job_status(0), Escaped);
        assert_eq!(e.task_group_status("web", 0), Escaped);
    }

    #[test]
    fn escaped_job_overrides_cached_status() {
        let mut e = tracker_for(&job(vec![plain(), unique()], vec![]));
        assert!(e.has_escaped());
        assert_eq!(e.job_escaped_constraints(), &[unique()]);

        for class in [1, 5, 42, u64::MAX] {
            e.set_job_eligibility(true, class);
            assert_eq!(e.job_status(class), Escaped);
        }
    }

    #[test]
    fn task_group_status_unknown_before_set() {
        let e = tracker_for(&job(vec![], vec![task_group("web", vec![plain()], vec![])]));
        assert_eq!(e.task_group_status("web", 3), Unknown);
    }

    #[test]
    fn task_group_eligibility_is_per_group_and_class() {
        let mut e = tracker_for(&job(
            vec![],
            vec![task_group("web", vec![], vec![]), task_group("db", vec![], vec![])],
        ));

        e.set_task_group_eligibility(true, "web", 3);
        e.set_task_group_eligibility(false, "db", 3);
        e.set_task_group_eligibility(false, "web", 4);

        assert_eq!(e.task_group_status("web", 3), Eligible);
        assert_eq!(e.task_group_status("db", 3), Ineligible);
        assert_eq!(e.task_group_status("web", 4), Ineligible);
        assert_eq!(e.task_group_status("db", 4), Unknown);

        e.set_task_group_eligibility(false, "web", 3);
        assert_eq!(e.task_group_status("web", 3), Ineligible);
    }

    #[test]
    fn task_constraints_escape_their_group_only() {
        let mut e = tracker_for(&job(
            vec![],
            vec![
                task_group("web", vec![plain()], vec![unique()]),
                task_group("db", vec![plain()], vec![plain()]),
            ],
        ));

        e.set_task_group_eligibility(true, "web", 9);
        e.set_task_group_eligibility(true, "db", 9);

        assert_eq!(e.task_group_status("web", 9), Escaped);
        assert_eq!(e.task_group_status("db", 9), Eligible);
        assert_eq!(e.job_status(9), Unknown);
        assert_eq!(e.task_group_escaped_constraints("web"), &[unique()]);
        assert!(e.task_group_escaped_constraints("db").is_empty());
    }

    #[test]
    fn queries_before_set_job_fail_open() {
        let mut e = EvalEligibility::new();
        assert_eq!(e.job_status(5), Unknown);
        assert_eq!(e.task_group_status("web", 5), Unknown);
        assert!(e.task_group_escaped_constraints("web").is_empty());

        e.set_task_group_eligibility(true, "web", 5);
        assert_eq!(e.task_group_status("web", 5), Eligible);
    }

    #[test]
    fn set_job_scans_constraints_once() {
        let j = job(
            vec![plain()],
            vec![
                task_group("web", vec![plain()], vec![unique()]),
                task_group("db", vec![], vec![]),
            ],
        );

        let mut calls = 0;
        let mut e = EvalEligibility::new();
        e.set_job_with(&j, |constraints| {
            calls += 1;
            escaped_constraints(constraints)
        });
        // Once for the job, once per task group.
        assert_eq!(calls, 3);

        for class in 1..100 {
            e.job_status(class);
            e.task_group_status("web", class);
            e.task_group_status("db", class);
        }
        assert_eq!(calls, 3);
        assert_eq!(e.task_group_status("web", 1), Escaped);
    }

    #[test]
    fn set_job_passes_group_and_task_constraints_together() {
        let j = job(vec![], vec![task_group("web", vec![plain()], vec![unique(), plain()])]);

        let mut seen = Vec::new();
        let mut e = EvalEligibility::new();
        e.set_job_with(&j, |constraints| {
            seen.push(constraints.len());
            Vec::new()
        });

        assert_eq!(seen, vec![0, 3]);
        assert!(!e.has_escaped());
    }
}
