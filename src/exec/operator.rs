#![forbid(unsafe_code)]

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::context::VariableStore;
use crate::error::Status;
use crate::plan::PlanNode;
use crate::value::Value;

/// Index of an operator inside its [`OperatorGraph`](crate::exec::OperatorGraph).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct OperatorId(pub(crate) usize);

impl fmt::Display for OperatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything an operator implementation may touch while executing.
#[derive(Clone)]
pub struct ExecContext {
    node: Arc<PlanNode>,
    store: Arc<VariableStore>,
}

impl ExecContext {
    /// Creates a context for `node` over `store`.
    pub fn new(node: Arc<PlanNode>, store: Arc<VariableStore>) -> Self {
        Self { node, store }
    }

    /// Plan node being executed.
    pub fn node(&self) -> &PlanNode {
        &self.node
    }

    /// Query-wide variable store.
    pub fn store(&self) -> &VariableStore {
        &self.store
    }

    /// Publishes `value` under the node's output variable.
    pub fn publish(&self, value: Value) {
        self.store.set(self.node.output_var(), value);
    }
}

/// Operator specific behaviour behind the open/run/close lifecycle.
///
/// `run` is the only phase that may suspend. Implementations report
/// failures through the returned status; they never retry on behalf of the
/// scheduler.
pub trait OperatorImpl: Send + Sync {
    /// Validates preconditions before `run`.
    fn open(&self, _ctx: &ExecContext) -> Status {
        Ok(())
    }

    /// Performs the operator's work.
    fn run<'a>(&'a self, ctx: &'a ExecContext) -> BoxFuture<'a, Status>;

    /// Releases whatever `open` acquired.
    fn close(&self, _ctx: &ExecContext) -> Status {
        Ok(())
    }
}

/// Execution state of an operator.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ExecState {
    /// Never dispatched.
    NotStarted = 0,
    /// Lifecycle in progress.
    Running = 1,
    /// Lifecycle finished, successfully or not.
    Done = 2,
}

impl ExecState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ExecState::Running,
            2 => ExecState::Done,
            _ => ExecState::NotStarted,
        }
    }
}

/// Scheduler-visible control flow of an operator.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Control {
    /// Runs its lifecycle once.
    Ordinary,
    /// Evaluates a condition, then schedules exactly one branch.
    Select {
        /// Root of the branch taken on `true`.
        then_root: OperatorId,
        /// Root of the branch taken on `false`.
        else_root: OperatorId,
    },
    /// Evaluates a condition, scheduling the body while it holds.
    Loop {
        /// Root of the loop body.
        body_root: OperatorId,
    },
}

/// Runtime counterpart of exactly one plan node.
pub struct Operator {
    pub(crate) id: OperatorId,
    pub(crate) node: Arc<PlanNode>,
    pub(crate) deps: SmallVec<[OperatorId; 2]>,
    pub(crate) control: Control,
    pub(crate) imp: Box<dyn OperatorImpl>,
    pub(crate) state: AtomicU8,
}

impl fmt::Debug for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operator")
            .field("id", &self.id)
            .field("node", &self.node.id())
            .field("kind", &self.node.kind().name())
            .field("deps", &self.deps)
            .field("control", &self.control)
            .field("state", &self.state())
            .finish()
    }
}

impl Operator {
    /// Arena index.
    pub fn id(&self) -> OperatorId {
        self.id
    }

    /// Plan node this operator executes.
    pub fn node(&self) -> &Arc<PlanNode> {
        &self.node
    }

    /// Operators this one waits on.
    pub fn deps(&self) -> &[OperatorId] {
        &self.deps
    }

    /// Control flow the scheduler applies.
    pub fn control(&self) -> Control {
        self.control
    }

    /// Current execution state.
    pub fn state(&self) -> ExecState {
        ExecState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Runs open, run and close in order.
    ///
    /// A failed `open` skips the rest and a failed `run` skips `close`. A
    /// `close` failure after a successful run becomes the operator's result.
    pub(crate) async fn run_lifecycle(&self, ctx: &ExecContext) -> Status {
        let previous = self.state.swap(ExecState::Running as u8, Ordering::AcqRel);
        if previous == ExecState::Running as u8 {
            warn!(node_id = %self.node.id(), "operator.reentered");
        }
        let status = self.lifecycle(ctx).await;
        self.state.store(ExecState::Done as u8, Ordering::Release);
        status
    }

    async fn lifecycle(&self, ctx: &ExecContext) -> Status {
        if let Err(err) = self.imp.open(ctx) {
            debug!(node_id = %self.node.id(), error = %err, "operator.open_failed");
            return Err(err);
        }
        if let Err(err) = self.imp.run(ctx).await {
            debug!(node_id = %self.node.id(), error = %err, "operator.run_failed");
            return Err(err);
        }
        self.imp.close(ctx)
    }
}
