//! Per-query execution state shared by operators.

mod store;

pub use store::VariableStore;
