#![forbid(unsafe_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::Status;
use crate::exec::{OperatorGraph, OperatorId};
use crate::plan::PlanNodeId;

/// Receiver of an operator's terminal status.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Consumer {
    /// Another record of the same join plan.
    Record(usize),
    /// Whoever called `schedule` for this subgraph.
    Caller,
}

/// Per-operator join state for one `schedule` call.
#[derive(Debug)]
pub(crate) struct JoinRecord {
    pub(crate) operator: OperatorId,
    pub(crate) node: PlanNodeId,
    pending: AtomicUsize,
    settled: AtomicBool,
    consumers: SmallVec<[Consumer; 2]>,
}

impl JoinRecord {
    pub(crate) fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub(crate) fn consumers(&self) -> &[Consumer] {
        &self.consumers
    }
}

/// Join records for the subgraph reachable from one root.
///
/// Every dependency edge owns one slot in its consumer's `pending` countdown.
/// A record becomes ready when the countdown reaches zero; a failed record
/// settles its consumers immediately with the same error.
#[derive(Debug)]
pub(crate) struct JoinPlan {
    records: Vec<JoinRecord>,
    caller: Mutex<Option<oneshot::Sender<Status>>>,
}

struct Draft {
    operator: OperatorId,
    node: PlanNodeId,
    pending: usize,
    consumers: SmallVec<[Consumer; 2]>,
}

impl JoinPlan {
    /// Walks dependency edges breadth-first from `root`, visiting each
    /// operator once. Nested select and loop subgraphs are not part of the
    /// plan; they get their own when scheduled.
    pub(crate) fn build(
        graph: &OperatorGraph,
        root: OperatorId,
    ) -> (Self, oneshot::Receiver<Status>) {
        let mut index: FxHashMap<OperatorId, usize> = FxHashMap::default();
        let mut drafts: Vec<Draft> = Vec::new();
        let mut queue = VecDeque::new();

        let mut discover =
            |op: OperatorId, drafts: &mut Vec<Draft>, queue: &mut VecDeque<usize>| {
                if let Some(idx) = index.get(&op) {
                    return *idx;
                }
                let idx = drafts.len();
                index.insert(op, idx);
                drafts.push(Draft {
                    operator: op,
                    node: graph.operator(op).node().id(),
                    pending: 0,
                    consumers: SmallVec::new(),
                });
                queue.push_back(idx);
                idx
            };

        let root_idx = discover(root, &mut drafts, &mut queue);
        drafts[root_idx].consumers.push(Consumer::Caller);
        while let Some(idx) = queue.pop_front() {
            let op = drafts[idx].operator;
            for dep in graph.operator(op).deps() {
                let dep_idx = discover(*dep, &mut drafts, &mut queue);
                drafts[dep_idx].consumers.push(Consumer::Record(idx));
                drafts[idx].pending += 1;
            }
        }

        let records = drafts
            .into_iter()
            .map(|draft| JoinRecord {
                operator: draft.operator,
                node: draft.node,
                pending: AtomicUsize::new(draft.pending),
                settled: AtomicBool::new(false),
                consumers: draft.consumers,
            })
            .collect();
        let (tx, rx) = oneshot::channel();
        (
            Self {
                records,
                caller: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn record(&self, idx: usize) -> &JoinRecord {
        &self.records[idx]
    }

    /// Records without dependencies, in discovery order.
    pub(crate) fn leaves(&self) -> Vec<usize> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, record)| record.pending() == 0)
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Resolves record `idx` with `status` and returns the records that
    /// became ready to run as a result.
    ///
    /// Settling is idempotent per record. A failure cascades through every
    /// transitive consumer that has not settled yet.
    pub(crate) fn settle(&self, idx: usize, status: Status) -> Vec<usize> {
        let mut ready = Vec::new();
        let mut stack = vec![(idx, status)];
        while let Some((idx, status)) = stack.pop() {
            let record = &self.records[idx];
            if record.settled.swap(true, Ordering::AcqRel) {
                trace!(node_id = %record.node, "scheduler.already_settled");
                continue;
            }
            for consumer in record.consumers() {
                match consumer {
                    Consumer::Caller => {
                        if let Some(tx) = self.caller.lock().take() {
                            // The caller may have stopped waiting.
                            let _ = tx.send(status.clone());
                        }
                    }
                    Consumer::Record(next) => {
                        let downstream = &self.records[*next];
                        match &status {
                            Ok(()) => {
                                let remaining =
                                    downstream.pending.fetch_sub(1, Ordering::AcqRel);
                                trace!(
                                    node_id = %downstream.node,
                                    from = %record.node,
                                    remaining = remaining - 1,
                                    "scheduler.signal"
                                );
                                if remaining == 1
                                    && !downstream.settled.load(Ordering::Acquire)
                                {
                                    ready.push(*next);
                                }
                            }
                            Err(err) => {
                                debug!(
                                    node_id = %downstream.node,
                                    from = %record.node,
                                    error = %err,
                                    "scheduler.fail_fast"
                                );
                                stack.push((*next, Err(err.clone())));
                            }
                        }
                    }
                }
            }
        }
        ready
    }
}
