//! Placement constraints and escape analysis.
//!
//! A constraint compares a left target (usually an interpolated node
//! property such as `${attr.kernel.name}`) against a right target using an
//! operand. Constraints that reference per-node unique properties, or that
//! depend on what else is placed on a node, cannot be decided from the
//! computed node class alone; those are "escaped".

use std::fmt;

use serde::{Deserialize, Serialize};

/// Target prefixes whose values are unique per node and therefore never
/// folded into the computed node class.
const UNIQUE_TARGET_PREFIXES: [&str; 3] = ["${node.unique.", "${attr.unique.", "${meta.unique."];

/// Comparison applied between the left and right target of a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintOperand {
    #[serde(rename = "=", alias = "==", alias = "is")]
    Equal,
    #[serde(rename = "!=", alias = "not")]
    NotEqual,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = "<=")]
    LessEqual,
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = ">=")]
    GreaterEqual,
    #[serde(rename = "regexp")]
    Regexp,
    #[serde(rename = "version")]
    Version,
    #[serde(rename = "set_contains")]
    SetContains,
    #[serde(rename = "distinct_hosts")]
    DistinctHosts,
    #[serde(rename = "distinct_property")]
    DistinctProperty,
}

impl ConstraintOperand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstraintOperand::Equal => "=",
            ConstraintOperand::NotEqual => "!=",
            ConstraintOperand::Less => "<",
            ConstraintOperand::LessEqual => "<=",
            ConstraintOperand::Greater => ">",
            ConstraintOperand::GreaterEqual => ">=",
            ConstraintOperand::Regexp => "regexp",
            ConstraintOperand::Version => "version",
            ConstraintOperand::SetContains => "set_contains",
            ConstraintOperand::DistinctHosts => "distinct_hosts",
            ConstraintOperand::DistinctProperty => "distinct_property",
        }
    }

    /// Operands whose outcome depends on the other allocations of a node
    /// rather than on the node's own properties.
    pub fn is_placement_dependent(&self) -> bool {
        matches!(
            self,
            ConstraintOperand::DistinctHosts | ConstraintOperand::DistinctProperty
        )
    }
}

impl fmt::Display for ConstraintOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single placement constraint on a job, task group or task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Constraint {
    #[serde(default)]
    pub l_target: String,
    #[serde(default)]
    pub r_target: String,
    pub operand: ConstraintOperand,
}

impl Constraint {
    pub fn new(l_target: &str, operand: ConstraintOperand, r_target: &str) -> Self {
        Self {
            l_target: l_target.to_string(),
            r_target: r_target.to_string(),
            operand,
        }
    }

    /// Whether this constraint cannot be decided from the computed node class.
    pub fn is_escaped(&self) -> bool {
        self.operand.is_placement_dependent()
            || target_escapes(&self.l_target)
            || target_escapes(&self.r_target)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.l_target, self.operand, self.r_target)
    }
}

fn target_escapes(target: &str) -> bool {
    UNIQUE_TARGET_PREFIXES
        .iter()
        .any(|prefix| target.starts_with(prefix))
}

/// Return the subset of `constraints` that escape computed node class.
pub fn escaped_constraints(constraints: &[Constraint]) -> Vec<Constraint> {
    constraints
        .iter()
        .filter(|c| c.is_escaped())
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_attributes_do_not_escape() {
        let constraints = vec![
            Constraint::new("${attr.kernel.name}", ConstraintOperand::Equal, "linux"),
            Constraint::new("${node.class}", ConstraintOperand::NotEqual, "batch"),
            Constraint::new("${meta.rack}", ConstraintOperand::Regexp, "r[0-9]+"),
        ];
        assert!(escaped_constraints(&constraints).is_empty());
    }

    #[test]
    fn unique_targets_escape_on_either_side() {
        let left = Constraint::new("${attr.unique.hostname}", ConstraintOperand::Equal, "web-1");
        let right = Constraint::new("web-1", ConstraintOperand::Equal, "${node.unique.name}");
        let meta = Constraint::new("${meta.unique.serial}", ConstraintOperand::NotEqual, "x");

        let escaped = escaped_constraints(&[left.clone(), right.clone(), meta.clone()]);
        assert_eq!(escaped, vec![left, right, meta]);
    }

    #[test]
    fn distinct_operands_escape() {
        let hosts = Constraint::new("", ConstraintOperand::DistinctHosts, "");
        let property = Constraint::new("${meta.rack}", ConstraintOperand::DistinctProperty, "");
        let plain = Constraint::new("${attr.arch}", ConstraintOperand::Equal, "amd64");

        let escaped = escaped_constraints(&[hosts.clone(), plain, property.clone()]);
        assert_eq!(escaped, vec![hosts, property]);
    }

    #[test]
    fn operand_aliases_deserialize() {
        let c: Constraint =
            serde_json::from_str(r#"{"l_target":"${attr.os}","r_target":"linux","operand":"is"}"#)
                .unwrap();
        assert_eq!(c.operand, ConstraintOperand::Equal);

        let c: Constraint =
            serde_json::from_str(r#"{"l_target":"a","r_target":"b","operand":"not"}"#).unwrap();
        assert_eq!(c.operand, ConstraintOperand::NotEqual);
    }

    #[test]
    fn display_reads_like_source() {
        let c = Constraint::new("${attr.version}", ConstraintOperand::Version, ">= 1.2");
        assert_eq!(c.to_string(), "${attr.version} version >= 1.2");
    }
}
