#![forbid(unsafe_code)]

//! Physical plan graph consumed by the scheduler.
//!
//! A plan is an immutable DAG of [`PlanNode`]s. Nodes may be shared by
//! several consumers; select and loop nodes additionally own nested
//! subgraphs that are scheduled on demand.

/// Plan construction and validation.
pub mod builder;

/// Human-readable and hashed plan descriptions.
pub mod explain;

/// Last-reader analysis for releasing intermediate variables.
pub mod lifetime;

mod node;

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

pub use builder::{NodeBuilder, PlanBuilder};
pub use explain::{ExplainNode, PlanExplain};
pub use lifetime::VariableLifetimes;
pub use node::{IdGenerator, NodeKind, PlanNode, PlanNodeId};

/// Validated plan graph.
#[derive(Clone, Debug)]
pub struct ExecutionPlan {
    pub(crate) root: PlanNodeId,
    pub(crate) nodes: BTreeMap<PlanNodeId, Arc<PlanNode>>,
}

impl ExecutionPlan {
    /// Root node id.
    pub fn root(&self) -> PlanNodeId {
        self.root
    }

    /// Looks up a node.
    pub fn node(&self, id: PlanNodeId) -> Option<&Arc<PlanNode>> {
        self.nodes.get(&id)
    }

    /// All nodes ordered by id.
    pub fn nodes(&self) -> impl Iterator<Item = &Arc<PlanNode>> {
        self.nodes.values()
    }

    /// Number of nodes in the plan.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` for a plan without nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids reachable from `from` through dependencies and nested subgraphs,
    /// in breadth-first order.
    pub fn reachable(&self, from: PlanNodeId) -> Vec<PlanNodeId> {
        let mut seen = BTreeSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([from]);
        seen.insert(from);
        while let Some(id) = queue.pop_front() {
            order.push(id);
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            for next in node.deps().iter().chain(node.kind().nested_roots().iter()) {
                if seen.insert(*next) {
                    queue.push_back(*next);
                }
            }
        }
        order
    }

    /// Describes the plan for explain output.
    pub fn explain(&self) -> PlanExplain {
        explain::describe(self)
    }

    /// Computes variable lifetimes for this plan.
    pub fn lifetimes(&self) -> VariableLifetimes {
        lifetime::analyze(self)
    }
}
