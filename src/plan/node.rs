#![forbid(unsafe_code)]

use std::fmt;

use serde::Serialize;

/// Identifier of a plan node, unique within one plan.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize)]
pub struct PlanNodeId(pub u64);

impl fmt::Display for PlanNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out monotonically increasing node ids for one plan.
#[derive(Debug, Default)]
pub struct IdGenerator {
    next: u64,
}

impl IdGenerator {
    /// Starts numbering at `first`.
    pub fn starting_at(first: u64) -> Self {
        Self { next: first }
    }

    /// Returns the next id.
    pub fn next_id(&mut self) -> PlanNodeId {
        let id = PlanNodeId(self.next);
        self.next += 1;
        id
    }
}

/// What a plan node does, as far as the scheduler is concerned.
///
/// Select and loop nodes own their nested subgraphs by root id; every other
/// operator kind is opaque and carries only its name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// Leaf that produces nothing.
    Start,
    /// No-op used to join several inputs.
    PassThrough,
    /// Conditional branch over two nested subgraphs.
    Select {
        /// Root of the subgraph run when the condition holds.
        then_branch: PlanNodeId,
        /// Root of the subgraph run otherwise.
        else_branch: PlanNodeId,
    },
    /// Repeats the nested body while the condition holds.
    Loop {
        /// Root of the loop body.
        body: PlanNodeId,
    },
    /// Any concrete operator the scheduler does not inspect.
    Operator(String),
}

impl NodeKind {
    /// Display name of the kind.
    pub fn name(&self) -> &str {
        match self {
            NodeKind::Start => "Start",
            NodeKind::PassThrough => "PassThrough",
            NodeKind::Select { .. } => "Select",
            NodeKind::Loop { .. } => "Loop",
            NodeKind::Operator(name) => name,
        }
    }

    /// Roots of the nested subgraphs owned by this node.
    pub fn nested_roots(&self) -> Vec<PlanNodeId> {
        match self {
            NodeKind::Select {
                then_branch,
                else_branch,
            } => vec![*then_branch, *else_branch],
            NodeKind::Loop { body } => vec![*body],
            _ => Vec::new(),
        }
    }
}

/// Immutable description of one physical plan step.
#[derive(Clone, Debug)]
pub struct PlanNode {
    pub(crate) id: PlanNodeId,
    pub(crate) kind: NodeKind,
    pub(crate) deps: Vec<PlanNodeId>,
    pub(crate) output_var: String,
    pub(crate) input_vars: Vec<String>,
    pub(crate) description: Vec<(String, String)>,
}

impl PlanNode {
    /// Node id.
    pub fn id(&self) -> PlanNodeId {
        self.id
    }

    /// Node kind.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Dependencies in declaration order.
    pub fn deps(&self) -> &[PlanNodeId] {
        &self.deps
    }

    /// Variable the node publishes its result under.
    pub fn output_var(&self) -> &str {
        &self.output_var
    }

    /// Variables the node reads.
    pub fn input_vars(&self) -> &[String] {
        &self.input_vars
    }

    /// Free-form key/value pairs rendered by explain.
    pub fn description(&self) -> &[(String, String)] {
        &self.description
    }
}
