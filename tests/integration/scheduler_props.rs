//! Randomized DAGs: run-once, dependency order and fail-fast hold for any shape.

#![allow(missing_docs)]

#[path = "../support/mod.rs"]
mod support;

use std::collections::BTreeSet;

use proptest::prelude::*;
use sombra_exec::{ExecError, PlanBuilder, PlanNodeId, SchedulerOptions};
use support::{scheduler, Event, Script, TestFactory};

/// Node count, a lower-triangular adjacency matrix and an optional failing node.
fn dag_strategy() -> impl Strategy<Value = (usize, Vec<Vec<bool>>, Option<usize>)> {
    (1usize..10).prop_flat_map(|n| {
        (
            Just(n),
            prop::collection::vec(prop::collection::vec(any::<bool>(), n), n),
            prop::option::of(0..n),
        )
    })
}

struct Dag {
    ids: Vec<PlanNodeId>,
    deps: Vec<Vec<usize>>,
    root: PlanNodeId,
}

fn build_dag(n: usize, edges: &[Vec<bool>]) -> (PlanBuilder, Dag) {
    let mut b = PlanBuilder::new();
    let mut ids = Vec::with_capacity(n);
    let mut deps = Vec::with_capacity(n);
    for i in 0..n {
        let mine: Vec<usize> = (0..i).filter(|j| edges[i][*j]).collect();
        let dep_ids: Vec<PlanNodeId> = mine.iter().map(|j| ids[*j]).collect();
        ids.push(b.operator(&format!("N{i}"), &dep_ids));
        deps.push(mine);
    }
    let consumed: BTreeSet<usize> = deps.iter().flatten().copied().collect();
    let sinks: Vec<PlanNodeId> = (0..n)
        .filter(|i| !consumed.contains(i))
        .map(|i| ids[i])
        .collect();
    let root = b.pass_through(&sinks);
    (b, Dag { ids, deps, root })
}

/// Every node that transitively depends on `failed`, including itself.
fn downstream_of(dag: &Dag, failed: usize) -> BTreeSet<usize> {
    let mut tainted = BTreeSet::from([failed]);
    for i in 0..dag.ids.len() {
        if dag.deps[i].iter().any(|d| tainted.contains(d)) {
            tainted.insert(i);
        }
    }
    tainted
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]
    #[test]
    fn random_dags_respect_dependencies((n, edges, failing) in dag_strategy()) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(3)
            .enable_time()
            .build()
            .expect("runtime");
        let (b, dag) = build_dag(n, &edges);
        let mut factory = TestFactory::new();
        if let Some(f) = failing {
            factory = factory.script(&format!("N{f}"), Script::failing_run());
        }
        let plan = b.build(dag.root).expect("valid plan");

        let (status, journal) = runtime.block_on(async {
            let sched = scheduler(plan, &factory, SchedulerOptions::default());
            let status = sched.schedule_plan().await;
            (status, factory.journal.clone())
        });

        for i in 0..n {
            let name = format!("N{i}");
            prop_assert!(journal.runs(&name) <= 1);
        }
        match failing {
            None => {
                prop_assert!(status.is_ok());
                for i in 0..n {
                    let name = format!("N{i}");
                    prop_assert_eq!(journal.runs(&name), 1);
                    let start = journal.position(&Event::RunStart(name)).unwrap();
                    for d in &dag.deps[i] {
                        let closed = journal.position(&Event::Close(format!("N{d}"))).unwrap();
                        prop_assert!(closed < start);
                    }
                }
            }
            Some(f) => {
                prop_assert_eq!(
                    status,
                    Err(ExecError::run(dag.ids[f], format!("N{f} run")))
                );
                for i in downstream_of(&dag, f) {
                    if i != f {
                        prop_assert_eq!(journal.runs(&format!("N{i}")), 0);
                    }
                }
            }
        }
    }
}
