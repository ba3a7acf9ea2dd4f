//! Sombra query execution core.
//!
//! Turns a physical [`ExecutionPlan`] into an [`OperatorGraph`] and runs it on
//! a [`TaskRunner`]: every operator executes once, after all of its
//! dependencies succeeded, and a failure anywhere skips everything
//! downstream of it. Operators exchange data through a versioned
//! [`VariableStore`].
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use sombra_exec::{
//!     OperatorGraph, OperatorImpl, PassThrough, PlanBuilder, PlanNode, Scheduler,
//!     SchedulerOptions, TokioRunner, VariableStore,
//! };
//!
//! # async fn demo() -> sombra_exec::Result<()> {
//! let mut builder = PlanBuilder::new();
//! let start = builder.start();
//! let root = builder.pass_through(&[start]);
//! let plan = Arc::new(builder.build(root)?);
//! let factory = |_node: &PlanNode| -> sombra_exec::Result<Box<dyn OperatorImpl>> {
//!     Ok(Box::new(PassThrough))
//! };
//! let graph = OperatorGraph::build(plan, &factory)?;
//! let scheduler = Scheduler::new(
//!     Arc::new(graph),
//!     Arc::new(VariableStore::new()),
//!     Arc::new(TokioRunner::current()?),
//!     SchedulerOptions::default(),
//! );
//! scheduler.schedule_plan().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod context;
/// Error types shared by every layer.
pub mod error;
pub mod exec;
/// Scheduler configuration.
pub mod options;
pub mod plan;
pub mod scheduler;
pub mod value;

pub use context::VariableStore;
pub use error::{ExecError, Result, Status};
pub use exec::{
    Condition, Control, ExecContext, ExecState, ExecutionProfile, LoopCondition, Operator,
    OperatorFactory, OperatorGraph, OperatorId, OperatorImpl, OperatorStats, PassThrough,
    SelectCondition, Start,
};
pub use options::SchedulerOptions;
pub use plan::{
    ExecutionPlan, IdGenerator, NodeKind, PlanBuilder, PlanExplain, PlanNode, PlanNodeId,
    VariableLifetimes,
};
pub use scheduler::{Scheduler, TaskRunner, TokioRunner};
pub use value::Value;
