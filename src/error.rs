#![forbid(unsafe_code)]

use thiserror::Error;

use crate::plan::PlanNodeId;

/// Result alias used throughout the execution core.
pub type Result<T> = std::result::Result<T, ExecError>;

/// Terminal outcome of an operator, a subgraph, or a whole plan.
pub type Status = Result<()>;

/// Structured errors surfaced by operators and the scheduler.
///
/// Errors are `Clone` because a single failure is broadcast to every
/// downstream consumer of the operator that produced it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// Operator precondition check failed; `run` and `close` were skipped.
    #[error("open failed on node {node}: {reason}")]
    Open {
        /// Plan node whose operator failed.
        node: PlanNodeId,
        /// Operator supplied reason.
        reason: String,
    },
    /// The operator's asynchronous work failed; `close` was skipped.
    #[error("run failed on node {node}: {reason}")]
    Run {
        /// Plan node whose operator failed.
        node: PlanNodeId,
        /// Operator supplied reason.
        reason: String,
    },
    /// Releasing operator resources after a successful run failed.
    #[error("close failed on node {node}: {reason}")]
    Close {
        /// Plan node whose operator failed.
        node: PlanNodeId,
        /// Operator supplied reason.
        reason: String,
    },
    /// A select or loop node published something other than a boolean.
    #[error("node {node} produced a bad condition result in '{var}' (type: {found})")]
    BadCondition {
        /// Select or loop node.
        node: PlanNodeId,
        /// Variable the condition was read from.
        var: String,
        /// Type name of the value found, `empty` when absent.
        found: String,
    },
    /// A loop ran more iterations than the configured limit allows.
    #[error("loop node {node} exceeded {limit} iterations")]
    LoopLimitExceeded {
        /// Loop node.
        node: PlanNodeId,
        /// Configured iteration limit.
        limit: u64,
    },
    /// The plan graph is malformed.
    #[error("invalid plan: {0}")]
    Plan(String),
    /// The task runner lost or aborted a unit of work.
    #[error("task runner failure: {0}")]
    Runner(String),
    /// Scheduler options could not be loaded or are inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ExecError {
    /// Builds an [`ExecError::Open`] for `node`.
    pub fn open(node: PlanNodeId, reason: impl Into<String>) -> Self {
        ExecError::Open {
            node,
            reason: reason.into(),
        }
    }

    /// Builds an [`ExecError::Run`] for `node`.
    pub fn run(node: PlanNodeId, reason: impl Into<String>) -> Self {
        ExecError::Run {
            node,
            reason: reason.into(),
        }
    }

    /// Builds an [`ExecError::Close`] for `node`.
    pub fn close(node: PlanNodeId, reason: impl Into<String>) -> Self {
        ExecError::Close {
            node,
            reason: reason.into(),
        }
    }

    /// Plan node the failure originated from, when known.
    pub fn node(&self) -> Option<PlanNodeId> {
        match self {
            ExecError::Open { node, .. }
            | ExecError::Run { node, .. }
            | ExecError::Close { node, .. }
            | ExecError::BadCondition { node, .. }
            | ExecError::LoopLimitExceeded { node, .. } => Some(*node),
            ExecError::Plan(_) | ExecError::Runner(_) | ExecError::Config(_) => None,
        }
    }

    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            ExecError::Open { .. } => "OpenFailed",
            ExecError::Run { .. } => "RunFailed",
            ExecError::Close { .. } => "CloseFailed",
            ExecError::BadCondition { .. } => "BadCondition",
            ExecError::LoopLimitExceeded { .. } => "LoopLimitExceeded",
            ExecError::Plan(_) => "InvalidPlan",
            ExecError::Runner(_) => "RunnerFailure",
            ExecError::Config(_) => "InvalidConfig",
        }
    }
}
