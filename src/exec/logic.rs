//! Control operators shipped with the execution core.
//!
//! `Start` and `PassThrough` do no work. `SelectCondition` and
//! `LoopCondition` evaluate a [`Condition`] and publish the result under the
//! node's output variable, where the scheduler reads it back to pick a branch
//! or decide whether to iterate again.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use tracing::trace;

use crate::context::VariableStore;
use crate::error::Status;
use crate::exec::operator::{ExecContext, OperatorImpl};
use crate::value::Value;

/// Leaf operator that succeeds immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct Start;

impl OperatorImpl for Start {
    fn run<'a>(&'a self, _ctx: &'a ExecContext) -> BoxFuture<'a, Status> {
        future::ready(Ok(())).boxed()
    }
}

/// Operator that only forwards completion of its dependencies.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

impl OperatorImpl for PassThrough {
    fn run<'a>(&'a self, _ctx: &'a ExecContext) -> BoxFuture<'a, Status> {
        future::ready(Ok(())).boxed()
    }
}

/// Predicate evaluated against the variable store.
///
/// It returns a [`Value`] rather than a `bool` so that a malformed result
/// reaches the scheduler and fails the node instead of being coerced.
#[derive(Clone)]
pub struct Condition {
    eval: Arc<dyn Fn(&VariableStore) -> Value + Send + Sync>,
}

impl Condition {
    /// Wraps an arbitrary evaluation function.
    pub fn new<F>(eval: F) -> Self
    where
        F: Fn(&VariableStore) -> Value + Send + Sync + 'static,
    {
        Self {
            eval: Arc::new(eval),
        }
    }

    /// Always evaluates to `value`.
    pub fn constant(value: Value) -> Self {
        Self::new(move |_| value.clone())
    }

    /// Evaluates to the latest version of `var`.
    pub fn variable(var: impl Into<String>) -> Self {
        let var = var.into();
        Self::new(move |store| store.get(&var))
    }

    /// Evaluates the condition.
    pub fn eval(&self, store: &VariableStore) -> Value {
        (self.eval)(store)
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Condition")
    }
}

/// Condition producer for select nodes.
#[derive(Debug)]
pub struct SelectCondition {
    condition: Condition,
}

impl SelectCondition {
    /// Creates the operator.
    pub fn new(condition: Condition) -> Self {
        Self { condition }
    }
}

impl OperatorImpl for SelectCondition {
    fn run<'a>(&'a self, ctx: &'a ExecContext) -> BoxFuture<'a, Status> {
        let value = self.condition.eval(ctx.store());
        trace!(node_id = %ctx.node().id(), value = %value, "select.condition");
        ctx.publish(value);
        future::ready(Ok(())).boxed()
    }
}

/// Condition producer for loop nodes; counts the iterations it allowed.
#[derive(Debug)]
pub struct LoopCondition {
    condition: Condition,
    iterations: AtomicU64,
}

impl LoopCondition {
    /// Creates the operator.
    pub fn new(condition: Condition) -> Self {
        Self {
            condition,
            iterations: AtomicU64::new(0),
        }
    }

    /// Number of evaluations that returned `true`.
    pub fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Acquire)
    }
}

impl OperatorImpl for LoopCondition {
    fn run<'a>(&'a self, ctx: &'a ExecContext) -> BoxFuture<'a, Status> {
        let value = self.condition.eval(ctx.store());
        if value.as_bool() == Some(true) {
            self.iterations.fetch_add(1, Ordering::AcqRel);
        }
        trace!(
            node_id = %ctx.node().id(),
            value = %value,
            iterations = self.iterations(),
            "loop.condition"
        );
        ctx.publish(value);
        future::ready(Ok(())).boxed()
    }
}
