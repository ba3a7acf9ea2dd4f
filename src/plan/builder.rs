#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{ExecError, Result};
use crate::plan::node::{IdGenerator, NodeKind, PlanNode, PlanNodeId};
use crate::plan::ExecutionPlan;

/// Assembles plan nodes and validates the finished graph.
///
/// The builder owns the id generator, so ids are unique and increasing
/// within one plan without any process-wide counter.
#[derive(Debug, Default)]
pub struct PlanBuilder {
    ids: IdGenerator,
    nodes: BTreeMap<PlanNodeId, PlanNode>,
}

impl PlanBuilder {
    /// Creates an empty builder whose first node gets id 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty builder drawing ids from `ids`.
    pub fn with_ids(ids: IdGenerator) -> Self {
        Self {
            ids,
            nodes: BTreeMap::new(),
        }
    }

    /// Starts a node of the given kind.
    pub fn node(&mut self, kind: NodeKind) -> NodeBuilder<'_> {
        NodeBuilder {
            builder: self,
            kind,
            deps: Vec::new(),
            output_var: None,
            input_vars: Vec::new(),
            description: Vec::new(),
        }
    }

    /// Adds a start leaf.
    pub fn start(&mut self) -> PlanNodeId {
        self.node(NodeKind::Start).add()
    }

    /// Adds a pass-through joining `deps`.
    pub fn pass_through(&mut self, deps: &[PlanNodeId]) -> PlanNodeId {
        self.node(NodeKind::PassThrough)
            .depends_on(deps.iter().copied())
            .add()
    }

    /// Adds a select node publishing its condition under `condition_var`.
    pub fn select(
        &mut self,
        deps: &[PlanNodeId],
        then_branch: PlanNodeId,
        else_branch: PlanNodeId,
        condition_var: &str,
    ) -> PlanNodeId {
        self.node(NodeKind::Select {
            then_branch,
            else_branch,
        })
        .depends_on(deps.iter().copied())
        .output_var(condition_var)
        .add()
    }

    /// Adds a loop node publishing its condition under `condition_var`.
    pub fn loop_node(
        &mut self,
        deps: &[PlanNodeId],
        body: PlanNodeId,
        condition_var: &str,
    ) -> PlanNodeId {
        self.node(NodeKind::Loop { body })
            .depends_on(deps.iter().copied())
            .output_var(condition_var)
            .add()
    }

    /// Adds an opaque operator node.
    pub fn operator(&mut self, name: &str, deps: &[PlanNodeId]) -> PlanNodeId {
        self.node(NodeKind::Operator(name.to_owned()))
            .depends_on(deps.iter().copied())
            .add()
    }

    /// Number of nodes added so far.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` when no node was added.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Validates the graph and freezes it into an [`ExecutionPlan`].
    pub fn build(self, root: PlanNodeId) -> Result<ExecutionPlan> {
        if !self.nodes.contains_key(&root) {
            return Err(ExecError::Plan(format!("root node {root} does not exist")));
        }
        for node in self.nodes.values() {
            for target in node.deps.iter().chain(node.kind.nested_roots().iter()) {
                if !self.nodes.contains_key(target) {
                    return Err(ExecError::Plan(format!(
                        "node {} references missing node {target}",
                        node.id
                    )));
                }
            }
        }
        check_acyclic(&self.nodes)?;
        let nodes = self
            .nodes
            .into_iter()
            .map(|(id, node)| (id, Arc::new(node)))
            .collect();
        Ok(ExecutionPlan { root, nodes })
    }
}

/// Fluent handle for one node under construction.
pub struct NodeBuilder<'a> {
    builder: &'a mut PlanBuilder,
    kind: NodeKind,
    deps: Vec<PlanNodeId>,
    output_var: Option<String>,
    input_vars: Vec<String>,
    description: Vec<(String, String)>,
}

impl NodeBuilder<'_> {
    /// Appends dependencies.
    pub fn depends_on(mut self, deps: impl IntoIterator<Item = PlanNodeId>) -> Self {
        self.deps.extend(deps);
        self
    }

    /// Overrides the generated output variable name.
    pub fn output_var(mut self, name: &str) -> Self {
        self.output_var = Some(name.to_owned());
        self
    }

    /// Declares a variable the node reads.
    pub fn input_var(mut self, name: &str) -> Self {
        self.input_vars.push(name.to_owned());
        self
    }

    /// Attaches a description entry shown by explain.
    pub fn describe(mut self, key: &str, value: impl Into<String>) -> Self {
        self.description.push((key.to_owned(), value.into()));
        self
    }

    /// Adds the node and returns its id.
    pub fn add(self) -> PlanNodeId {
        let id = self.builder.ids.next_id();
        // Anonymous variables follow the `__<Kind>_<id>` convention.
        let output_var = self
            .output_var
            .unwrap_or_else(|| format!("__{}_{}", self.kind.name(), id));
        self.builder.nodes.insert(
            id,
            PlanNode {
                id,
                kind: self.kind,
                deps: self.deps,
                output_var,
                input_vars: self.input_vars,
                description: self.description,
            },
        );
        id
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

fn check_acyclic(nodes: &BTreeMap<PlanNodeId, PlanNode>) -> Result<()> {
    let mut marks: BTreeMap<PlanNodeId, Mark> = BTreeMap::new();
    for &start in nodes.keys() {
        if marks.contains_key(&start) {
            continue;
        }
        // (node, expanded) pairs; a node is marked done on its second visit.
        let mut stack = vec![(start, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                marks.insert(id, Mark::Done);
                continue;
            }
            match marks.get(&id) {
                Some(Mark::Done) => continue,
                Some(Mark::Visiting) => continue,
                None => {}
            }
            marks.insert(id, Mark::Visiting);
            stack.push((id, true));
            let Some(node) = nodes.get(&id) else {
                continue;
            };
            for next in node.deps.iter().chain(node.kind.nested_roots().iter()) {
                match marks.get(next) {
                    Some(Mark::Visiting) => {
                        return Err(ExecError::Plan(format!(
                            "cycle detected through node {id} and node {next}"
                        )));
                    }
                    Some(Mark::Done) => {}
                    None => stack.push((*next, false)),
                }
            }
        }
    }
    Ok(())
}
