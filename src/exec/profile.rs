use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use parking_lot::Mutex;

use crate::plan::PlanNodeId;

/// Accumulated statistics for one plan node.
///
/// Loop nodes and operators inside loop bodies execute their lifecycle once
/// per iteration, so `executions` can exceed one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperatorStats {
    /// Number of completed lifecycles.
    pub executions: u64,
    /// Number of lifecycles that returned an error.
    pub failures: u64,
    /// Total nanoseconds spent in open/run/close.
    pub total_ns: u64,
}

/// Per-query execution profile, populated when profiling is enabled.
#[derive(Debug, Default)]
pub struct ExecutionProfile {
    stats: Mutex<HashMap<PlanNodeId, OperatorStats>>,
}

impl ExecutionProfile {
    /// Creates an empty profile.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&self, node: PlanNodeId, start: Option<Instant>, ok: bool) {
        let Some(start) = start else {
            return;
        };
        let nanos = start.elapsed().as_nanos().min(u64::MAX as u128) as u64;
        let mut stats = self.stats.lock();
        let entry = stats.entry(node).or_default();
        entry.executions += 1;
        entry.total_ns = entry.total_ns.saturating_add(nanos);
        if !ok {
            entry.failures += 1;
        }
    }

    /// Statistics recorded for `node`.
    pub fn get(&self, node: PlanNodeId) -> Option<OperatorStats> {
        self.stats.lock().get(&node).copied()
    }

    /// Retrieves a snapshot of all statistics ordered by node id.
    pub fn snapshot(&self) -> BTreeMap<PlanNodeId, OperatorStats> {
        self.stats.lock().iter().map(|(id, s)| (*id, *s)).collect()
    }

    /// Drops everything recorded so far.
    pub fn reset(&self) {
        self.stats.lock().clear();
    }
}

pub(crate) fn profile_timer(enabled: bool) -> Option<Instant> {
    enabled.then(Instant::now)
}
