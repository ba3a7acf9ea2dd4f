//! Plan descriptions for `EXPLAIN`-style output.

use std::fmt;
use std::hash::Hasher;

use serde::Serialize;
use xxhash_rust::xxh64::Xxh64;

use crate::error::{ExecError, Result};
use crate::plan::{ExecutionPlan, NodeKind, PlanNode, PlanNodeId};

/// Flat description of every node reachable from the plan root.
#[derive(Clone, Debug, Serialize)]
pub struct PlanExplain {
    /// Root node id.
    pub root: PlanNodeId,
    /// Nodes in breadth-first order from the root.
    pub nodes: Vec<ExplainNode>,
    /// Deterministic hash of the plan shape.
    pub plan_hash: u64,
}

/// One operator in a [`PlanExplain`].
#[derive(Clone, Debug, Serialize)]
pub struct ExplainNode {
    /// Node id.
    pub id: PlanNodeId,
    /// Kind name.
    pub kind: String,
    /// Output variable.
    pub output_var: String,
    /// Dependencies in declaration order.
    pub deps: Vec<PlanNodeId>,
    /// Nested subgraph roots labelled `then`, `else` or `body`.
    pub branches: Vec<(String, PlanNodeId)>,
    /// Description entries attached by the planner.
    pub props: Vec<(String, String)>,
}

impl PlanExplain {
    /// Serializes the description as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| ExecError::Plan(format!("failed to serialize explain: {err}")))
    }
}

impl fmt::Display for PlanExplain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "plan {:016x} root={}", self.plan_hash, self.root)?;
        for node in &self.nodes {
            write!(f, "  #{} {} -> {}", node.id, node.kind, node.output_var)?;
            if !node.deps.is_empty() {
                let deps: Vec<String> = node.deps.iter().map(|d| d.to_string()).collect();
                write!(f, " deps=[{}]", deps.join(","))?;
            }
            for (label, root) in &node.branches {
                write!(f, " {label}=#{root}")?;
            }
            for (key, value) in &node.props {
                write!(f, " {key}={value}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

pub(crate) fn describe(plan: &ExecutionPlan) -> PlanExplain {
    let nodes: Vec<ExplainNode> = plan
        .reachable(plan.root())
        .into_iter()
        .filter_map(|id| plan.node(id))
        .map(|node| explain_node(node))
        .collect();
    let plan_hash = hash_nodes(&nodes);
    PlanExplain {
        root: plan.root(),
        nodes,
        plan_hash,
    }
}

fn explain_node(node: &PlanNode) -> ExplainNode {
    let branches = match node.kind() {
        NodeKind::Select {
            then_branch,
            else_branch,
        } => vec![
            ("then".to_owned(), *then_branch),
            ("else".to_owned(), *else_branch),
        ],
        NodeKind::Loop { body } => vec![("body".to_owned(), *body)],
        _ => Vec::new(),
    };
    ExplainNode {
        id: node.id(),
        kind: node.kind().name().to_owned(),
        output_var: node.output_var().to_owned(),
        deps: node.deps().to_vec(),
        branches,
        props: node.description().to_vec(),
    }
}

fn hash_nodes(nodes: &[ExplainNode]) -> u64 {
    let mut hasher = Xxh64::new(0);
    hasher.write_u64(nodes.len() as u64);
    for node in nodes {
        hasher.write_u64(node.id.0);
        hasher.write(node.kind.as_bytes());
        hasher.write(node.output_var.as_bytes());
        hasher.write_u64(node.deps.len() as u64);
        for dep in &node.deps {
            hasher.write_u64(dep.0);
        }
        for (label, root) in &node.branches {
            hasher.write(label.as_bytes());
            hasher.write_u64(root.0);
        }
        for (key, value) in &node.props {
            hasher.write(key.as_bytes());
            hasher.write(value.as_bytes());
        }
    }
    hasher.finish()
}
