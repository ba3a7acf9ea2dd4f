#![forbid(unsafe_code)]

use std::collections::VecDeque;
use std::sync::atomic::AtomicU8;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::debug;

use crate::error::{ExecError, Result};
use crate::exec::logic::{PassThrough, Start};
use crate::exec::operator::{Control, ExecState, Operator, OperatorId, OperatorImpl};
use crate::plan::{ExecutionPlan, NodeKind, PlanNode, PlanNodeId};

/// Supplies implementations for plan nodes the execution core does not
/// provide itself (everything except `Start` and `PassThrough`).
pub trait OperatorFactory {
    /// Creates the implementation for `node`.
    fn create(&self, node: &PlanNode) -> Result<Box<dyn OperatorImpl>>;
}

impl<F> OperatorFactory for F
where
    F: Fn(&PlanNode) -> Result<Box<dyn OperatorImpl>>,
{
    fn create(&self, node: &PlanNode) -> Result<Box<dyn OperatorImpl>> {
        self(node)
    }
}

/// Arena of operators, one per plan node reachable from the plan root.
///
/// Built once before scheduling starts and read-only afterwards.
#[derive(Debug)]
pub struct OperatorGraph {
    plan: Arc<ExecutionPlan>,
    operators: Vec<Operator>,
    by_node: FxHashMap<PlanNodeId, OperatorId>,
    root: OperatorId,
}

impl OperatorGraph {
    /// Translates `plan` into operators, memoized by plan node id so that a
    /// node shared by several consumers yields a single operator.
    pub fn build(plan: Arc<ExecutionPlan>, factory: &dyn OperatorFactory) -> Result<Self> {
        let mut by_node: FxHashMap<PlanNodeId, OperatorId> = FxHashMap::default();
        let mut order: Vec<Arc<PlanNode>> = Vec::new();
        let mut queue = VecDeque::from([plan.root()]);
        while let Some(id) = queue.pop_front() {
            if by_node.contains_key(&id) {
                continue;
            }
            let node = plan
                .node(id)
                .ok_or_else(|| ExecError::Plan(format!("node {id} missing from plan")))?;
            by_node.insert(id, OperatorId(order.len()));
            queue.extend(node.deps().iter().copied());
            queue.extend(node.kind().nested_roots());
            order.push(Arc::clone(node));
        }

        let resolve = |id: PlanNodeId| -> Result<OperatorId> {
            by_node
                .get(&id)
                .copied()
                .ok_or_else(|| ExecError::Plan(format!("node {id} has no operator")))
        };

        let mut operators = Vec::with_capacity(order.len());
        for (index, node) in order.into_iter().enumerate() {
            let deps = node
                .deps()
                .iter()
                .map(|dep| resolve(*dep))
                .collect::<Result<SmallVec<[OperatorId; 2]>>>()?;
            let control = match node.kind() {
                NodeKind::Select {
                    then_branch,
                    else_branch,
                } => Control::Select {
                    then_root: resolve(*then_branch)?,
                    else_root: resolve(*else_branch)?,
                },
                NodeKind::Loop { body } => Control::Loop {
                    body_root: resolve(*body)?,
                },
                _ => Control::Ordinary,
            };
            let imp: Box<dyn OperatorImpl> = match node.kind() {
                NodeKind::Start => Box::new(Start),
                NodeKind::PassThrough => Box::new(PassThrough),
                _ => factory.create(&node)?,
            };
            operators.push(Operator {
                id: OperatorId(index),
                node,
                deps,
                control,
                imp,
                state: AtomicU8::new(ExecState::NotStarted as u8),
            });
        }

        let root = resolve(plan.root())?;
        debug!(operators = operators.len(), root = %plan.root(), "graph.built");
        Ok(Self {
            plan,
            operators,
            by_node,
            root,
        })
    }

    /// Plan the graph was built from.
    pub fn plan(&self) -> &Arc<ExecutionPlan> {
        &self.plan
    }

    /// Operator for the plan root.
    pub fn root(&self) -> OperatorId {
        self.root
    }

    /// Operator by arena index.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this graph.
    pub fn operator(&self, id: OperatorId) -> &Operator {
        &self.operators[id.0]
    }

    /// Operator created for plan node `node`, if it is reachable.
    pub fn operator_for(&self, node: PlanNodeId) -> Option<&Operator> {
        self.by_node.get(&node).map(|id| self.operator(*id))
    }

    /// Number of operators.
    pub fn len(&self) -> usize {
        self.operators.len()
    }

    /// Returns `true` for an empty graph.
    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Iterates operators in arena order.
    pub fn operators(&self) -> impl Iterator<Item = &Operator> {
        self.operators.iter()
    }
}
