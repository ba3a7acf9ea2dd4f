#![forbid(unsafe_code)]

//! Runtime operators bound to plan nodes.

mod graph;
pub mod logic;
mod operator;
/// Per-operator execution statistics.
pub mod profile;

pub use graph::{OperatorFactory, OperatorGraph};
pub use logic::{Condition, LoopCondition, PassThrough, SelectCondition, Start};
pub use operator::{Control, ExecContext, ExecState, Operator, OperatorId, OperatorImpl};
pub use profile::{ExecutionProfile, OperatorStats};
