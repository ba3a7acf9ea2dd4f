#![forbid(unsafe_code)]

//! Dependency-driven scheduling of an [`OperatorGraph`].
//!
//! `schedule` walks the subgraph reachable from a root, builds a join plan
//! with one countdown per operator, and dispatches leaves onto the
//! [`TaskRunner`]. Every completed operator signals its consumers; the
//! consumer whose countdown reaches zero is dispatched next. A failure skips
//! every downstream operator and resolves the caller with the same error.
//!
//! Select and loop operators call `schedule` again for their nested
//! subgraphs, so scheduling is re-entrant.

mod join;
mod runner;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, debug_span, trace, warn, Instrument};

use crate::context::VariableStore;
use crate::error::{ExecError, Result, Status};
use crate::exec::profile::profile_timer;
use crate::exec::{Control, ExecContext, ExecutionProfile, Operator, OperatorGraph, OperatorId};
use crate::options::SchedulerOptions;
use crate::plan::VariableLifetimes;
use crate::value::Value;

use self::join::JoinPlan;
pub use self::runner::{TaskRunner, TokioRunner};

/// Runs operator graphs. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

struct Inner {
    graph: Arc<OperatorGraph>,
    store: Arc<VariableStore>,
    runner: Arc<dyn TaskRunner>,
    options: SchedulerOptions,
    profile: Option<Arc<ExecutionProfile>>,
    lifetimes: Option<VariableLifetimes>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("operators", &self.inner.graph.len())
            .field("options", &self.inner.options)
            .finish()
    }
}

impl Scheduler {
    /// Creates a scheduler for `graph` writing into `store`.
    pub fn new(
        graph: Arc<OperatorGraph>,
        store: Arc<VariableStore>,
        runner: Arc<dyn TaskRunner>,
        options: SchedulerOptions,
    ) -> Self {
        let lifetimes = options
            .enable_lifetime_optimize
            .then(|| graph.plan().lifetimes());
        let profile = options.profile.then(|| Arc::new(ExecutionProfile::new()));
        Self {
            inner: Arc::new(Inner {
                graph,
                store,
                runner,
                options,
                profile,
                lifetimes,
            }),
        }
    }

    /// Graph being scheduled.
    pub fn graph(&self) -> &Arc<OperatorGraph> {
        &self.inner.graph
    }

    /// Query-wide variable store.
    pub fn store(&self) -> &Arc<VariableStore> {
        &self.inner.store
    }

    /// Options the scheduler was created with.
    pub fn options(&self) -> &SchedulerOptions {
        &self.inner.options
    }

    /// Execution statistics, present when profiling is enabled.
    pub fn profile(&self) -> Option<&Arc<ExecutionProfile>> {
        self.inner.profile.as_ref()
    }

    /// Schedules the plan's root.
    pub fn schedule_plan(&self) -> BoxFuture<'static, Status> {
        self.schedule(self.inner.graph.root())
    }

    /// Runs every operator reachable from `root` at most once and resolves
    /// to the status of `root`, or to the first failure observed on the way
    /// to it.
    ///
    /// Work starts immediately; the returned future only waits for the
    /// outcome. A `root` that does not belong to this scheduler's graph
    /// resolves to [`ExecError::Plan`] without running anything.
    pub fn schedule(&self, root: OperatorId) -> BoxFuture<'static, Status> {
        if root.0 >= self.inner.graph.len() {
            warn!(
                root = root.0,
                operators = self.inner.graph.len(),
                "scheduler.foreign_root"
            );
            let err = ExecError::Plan(format!(
                "operator {} is not part of this graph ({} operators)",
                root.0,
                self.inner.graph.len()
            ));
            return futures::future::ready(Err(err)).boxed();
        }
        let (join, done) = JoinPlan::build(&self.inner.graph, root);
        let join = Arc::new(join);
        debug!(
            root = %self.inner.graph.operator(root).node().id(),
            operators = join.len(),
            "scheduler.schedule"
        );
        for idx in join.leaves() {
            self.dispatch(&join, idx);
        }
        async move {
            done.await.unwrap_or_else(|_| {
                Err(ExecError::Runner(
                    "scheduled work was dropped before the root completed".into(),
                ))
            })
        }
        .boxed()
    }

    fn dispatch(&self, join: &Arc<JoinPlan>, idx: usize) {
        let record = join.record(idx);
        let id = record.operator;
        let node = record.node;
        debug!(node_id = %node, "scheduler.dispatch");

        let scheduler = self.clone();
        let join = Arc::clone(join);
        let work = async move {
            let status = AssertUnwindSafe(scheduler.execute(id))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    Err(ExecError::Runner(format!("operator on node {node} panicked")))
                });
            debug!(node_id = %node, ok = status.is_ok(), "scheduler.completed");
            for next in join.settle(idx, status.clone()) {
                scheduler.dispatch(&join, next);
            }
            status
        }
        .boxed();
        // Completion is observed through the join plan, not the handle.
        drop(self.inner.runner.submit(work));
    }

    fn execute(&self, id: OperatorId) -> BoxFuture<'_, Status> {
        let op = self.inner.graph.operator(id);
        let span = debug_span!(
            "operator",
            node_id = %op.node().id(),
            kind = op.node().kind().name()
        );
        async move {
            match op.control() {
                Control::Ordinary => self.run_operator(op).await,
                Control::Select {
                    then_root,
                    else_root,
                } => {
                    self.run_operator(op).await?;
                    let taken = self.read_condition(op)?;
                    debug!(node_id = %op.node().id(), taken, "scheduler.select");
                    let branch = if taken { then_root } else { else_root };
                    self.schedule(branch).await
                }
                Control::Loop { body_root } => self.run_loop(op, body_root).await,
            }
        }
        .instrument(span)
        .boxed()
    }

    async fn run_loop(&self, op: &Operator, body: OperatorId) -> Status {
        let node = op.node().id();
        let mut iterations: u64 = 0;
        loop {
            self.run_operator(op).await?;
            if !self.read_condition(op)? {
                debug!(node_id = %node, iterations, "scheduler.loop_done");
                return Ok(());
            }
            if let Some(limit) = self.inner.options.max_loop_iterations {
                if iterations >= limit {
                    warn!(node_id = %node, limit, "scheduler.loop_limit");
                    return Err(ExecError::LoopLimitExceeded { node, limit });
                }
            }
            iterations += 1;
            trace!(node_id = %node, iteration = iterations, "scheduler.loop_iteration");
            self.schedule(body).await?;
        }
    }

    async fn run_operator(&self, op: &Operator) -> Status {
        let ctx = ExecContext::new(Arc::clone(op.node()), Arc::clone(&self.inner.store));
        let start = profile_timer(self.inner.profile.is_some());
        let status = op.run_lifecycle(&ctx).await;
        if let Some(profile) = &self.inner.profile {
            profile.record(op.node().id(), start, status.is_ok());
        }
        if status.is_ok() {
            self.release_variables(op);
        }
        status
    }

    fn release_variables(&self, op: &Operator) {
        let Some(lifetimes) = &self.inner.lifetimes else {
            return;
        };
        for var in lifetimes.release_after(op.node().id()) {
            if self.inner.store.delete(var) {
                trace!(node_id = %op.node().id(), var = %var, "scheduler.release");
            }
        }
    }

    /// Reads back the boolean a select or loop operator just published.
    fn read_condition(&self, op: &Operator) -> Result<bool> {
        let node = op.node();
        match self.inner.store.get(node.output_var()) {
            Value::Bool(taken) => Ok(taken),
            other => {
                warn!(
                    node_id = %node.id(),
                    var = node.output_var(),
                    found = other.type_name(),
                    "scheduler.bad_condition"
                );
                Err(ExecError::BadCondition {
                    node: node.id(),
                    var: node.output_var().to_owned(),
                    found: other.type_name().to_owned(),
                })
            }
        }
    }
}
