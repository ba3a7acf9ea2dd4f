#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use crate::plan::{ExecutionPlan, NodeKind, PlanNodeId};

/// Which variables may be dropped from the store once a node completes.
///
/// A variable is releasable after node `L` when `L` reads it and every other
/// reader is a transitive dependency of `L`, so no reader can still be
/// running once `L` finished. Variables read inside a nested subgraph or by
/// a loop node, variables without such a last reader, and the root's output
/// are pinned for the whole query.
#[derive(Clone, Debug, Default)]
pub struct VariableLifetimes {
    release_after: BTreeMap<PlanNodeId, Vec<String>>,
    last_reader: BTreeMap<String, PlanNodeId>,
    pinned: BTreeSet<String>,
}

impl VariableLifetimes {
    /// Variables that can be deleted once `node` succeeded.
    pub fn release_after(&self, node: PlanNodeId) -> &[String] {
        self.release_after
            .get(&node)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Last reader of `var`, if the variable is releasable.
    pub fn last_reader(&self, var: &str) -> Option<PlanNodeId> {
        self.last_reader.get(var).copied()
    }

    /// Returns `true` when `var` must outlive the query.
    pub fn is_pinned(&self, var: &str) -> bool {
        self.pinned.contains(var)
    }
}

pub(crate) fn analyze(plan: &ExecutionPlan) -> VariableLifetimes {
    let reachable = plan.reachable(plan.root());

    let mut nested = BTreeSet::new();
    for id in &reachable {
        let Some(node) = plan.node(*id) else {
            continue;
        };
        for nested_root in node.kind().nested_roots() {
            nested.extend(plan.reachable(nested_root));
        }
    }

    let mut lifetimes = VariableLifetimes::default();
    if let Some(root) = plan.node(plan.root()) {
        lifetimes.pinned.insert(root.output_var().to_owned());
    }

    let mut readers: BTreeMap<String, BTreeSet<PlanNodeId>> = BTreeMap::new();
    for id in &reachable {
        let Some(node) = plan.node(*id) else {
            continue;
        };
        let in_loop = matches!(node.kind(), NodeKind::Loop { .. });
        for var in node.input_vars() {
            if in_loop || nested.contains(id) {
                lifetimes.pinned.insert(var.clone());
            }
            readers.entry(var.clone()).or_default().insert(*id);
        }
    }

    for (var, nodes) in readers {
        if lifetimes.pinned.contains(&var) {
            continue;
        }
        let last = nodes.iter().copied().find(|candidate| {
            let ancestors = dependency_closure(plan, *candidate);
            nodes
                .iter()
                .all(|other| other == candidate || ancestors.contains(other))
        });
        match last {
            Some(last) => {
                lifetimes
                    .release_after
                    .entry(last)
                    .or_default()
                    .push(var.clone());
                lifetimes.last_reader.insert(var, last);
            }
            None => {
                lifetimes.pinned.insert(var);
            }
        }
    }
    lifetimes
}

/// Transitive dependencies of `id`, excluding nested subgraphs.
fn dependency_closure(plan: &ExecutionPlan, id: PlanNodeId) -> BTreeSet<PlanNodeId> {
    let mut seen = BTreeSet::new();
    let mut stack = vec![id];
    while let Some(current) = stack.pop() {
        let Some(node) = plan.node(current) else {
            continue;
        };
        for dep in node.deps() {
            if seen.insert(*dep) {
                stack.push(*dep);
            }
        }
    }
    seen
}
