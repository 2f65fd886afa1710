//! Job and allocation types shared across gridsched crates.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::constraint::Constraint;
use crate::node::NodeId;

/// Unique identifier for a job.
pub type JobId = String;

/// Unique identifier for an allocation.
pub type AllocId = String;

// ── Job ───────────────────────────────────────────────────────────

/// A job submitted for scheduling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    #[serde(default)]
    pub priority: u32,
    /// Constraints applying to every task group of the job.
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    pub task_groups: Vec<TaskGroup>,
}

impl Job {
    pub fn lookup_task_group(&self, name: &str) -> Option<&TaskGroup> {
        self.task_groups.iter().find(|tg| tg.name == name)
    }
}

/// A set of tasks that must be co-located on one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskGroup {
    pub name: String,
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl TaskGroup {
    /// The group's own constraints followed by those of each task.
    pub fn combined_constraints(&self) -> Vec<Constraint> {
        let mut constraints = self.constraints.clone();
        for task in &self.tasks {
            constraints.extend(task.constraints.iter().cloned());
        }
        constraints
    }
}

fn default_count() -> u32 {
    1
}

/// A single unit of work inside a task group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    pub driver: String,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

// ── Allocation ────────────────────────────────────────────────────

/// Placement of one task group instance on a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: AllocId,
    pub eval_id: String,
    /// Human-readable name, `{job}.{group}[{index}]`.
    pub name: String,
    pub node_id: NodeId,
    pub job_id: JobId,
    pub task_group: String,
    pub desired_status: AllocDesiredStatus,
    #[serde(default)]
    pub desired_description: String,
    pub client_status: AllocClientStatus,
}

/// What the scheduler wants to happen to an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocDesiredStatus {
    Run,
    Stop,
    Evict,
}

/// What the client reports about an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocClientStatus {
    Pending,
    Running,
    Complete,
    Failed,
    Lost,
}

impl Allocation {
    /// An allocation is terminal once it is asked to stop or has finished.
    pub fn terminal_status(&self) -> bool {
        match self.desired_status {
            AllocDesiredStatus::Stop | AllocDesiredStatus::Evict => true,
            AllocDesiredStatus::Run => matches!(
                self.client_status,
                AllocClientStatus::Complete | AllocClientStatus::Failed | AllocClientStatus::Lost
            ),
        }
    }
}

/// Drop allocations that no longer consume resources on their node.
pub fn filter_terminal_allocs(allocs: Vec<Allocation>) -> Vec<Allocation> {
    allocs.into_iter().filter(|a| !a.terminal_status()).collect()
}

/// Remove every allocation whose id appears in `remove`.
///
/// Order of the surviving allocations is preserved; ids in `remove` that
/// match nothing are ignored.
pub fn remove_allocs(mut allocs: Vec<Allocation>, remove: &[Allocation]) -> Vec<Allocation> {
    let ids: HashSet<&str> = remove.iter().map(|a| a.id.as_str()).collect();
    allocs.retain(|a| !ids.contains(a.id.as_str()));
    allocs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::ConstraintOperand;

    fn alloc(id: &str, desired: AllocDesiredStatus, client: AllocClientStatus) -> Allocation {
        Allocation {
            id: id.to_string(),
            eval_id: "eval-1".to_string(),
            name: format!("job.web[{id}]"),
            node_id: "node-1".to_string(),
            job_id: "job".to_string(),
            task_group: "web".to_string(),
            desired_status: desired,
            desired_description: String::new(),
            client_status: client,
        }
    }

    #[test]
    fn terminal_status_covers_desired_and_client() {
        use super::AllocClientStatus::*;
        use super::AllocDesiredStatus::*;

        assert!(!alloc("a", Run, Pending).terminal_status());
        assert!(!alloc("a", Run, Running).terminal_status());
        assert!(alloc("a", Run, Complete).terminal_status());
        assert!(alloc("a", Run, Failed).terminal_status());
        assert!(alloc("a", Run, Lost).terminal_status());
        assert!(alloc("a", Stop, Running).terminal_status());
        assert!(alloc("a", Evict, Running).terminal_status());
    }

    #[test]
    fn filter_terminal_keeps_live_allocs() {
        let allocs = vec![
            alloc("a", AllocDesiredStatus::Run, AllocClientStatus::Running),
            alloc("b", AllocDesiredStatus::Stop, AllocClientStatus::Running),
            alloc("c", AllocDesiredStatus::Run, AllocClientStatus::Pending),
        ];
        let ids: Vec<_> = filter_terminal_allocs(allocs).into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn remove_allocs_preserves_order_and_ignores_unknown_ids() {
        let run = AllocDesiredStatus::Run;
        let running = AllocClientStatus::Running;
        let allocs = vec![alloc("a", run, running), alloc("b", run, running), alloc("c", run, running)];
        let remove = vec![alloc("b", run, running), alloc("zzz", run, running)];

        let ids: Vec<_> = remove_allocs(allocs, &remove).into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn combined_constraints_include_tasks() {
        let tg = TaskGroup {
            name: "web".to_string(),
            count: 2,
            constraints: vec![Constraint::new("${attr.arch}", ConstraintOperand::Equal, "amd64")],
            tasks: vec![Task {
                name: "server".to_string(),
                driver: "exec".to_string(),
                constraints: vec![Constraint::new(
                    "${attr.kernel.name}",
                    ConstraintOperand::Equal,
                    "linux",
                )],
            }],
        };
        let combined = tg.combined_constraints();
        assert_eq!(combined.len(), 2);
        assert_eq!(combined[1].r_target, "linux");
    }

    #[test]
    fn task_group_count_defaults_to_one() {
        let tg: TaskGroup = serde_json::from_str(r#"{"name":"web"}"#).unwrap();
        assert_eq!(tg.count, 1);
        assert!(tg.tasks.is_empty());
    }
}
