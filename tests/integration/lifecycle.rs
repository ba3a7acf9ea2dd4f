//! Open/run/close contract, variable release and profiling.

#![allow(missing_docs)]

#[path = "../support/mod.rs"]
mod support;

use sombra_exec::{ExecError, NodeKind, PlanBuilder, SchedulerOptions, Value};
use support::{init_tracing, scheduler, Event, Script, TestFactory};

fn events(name: &str, kinds: &[fn(String) -> Event]) -> Vec<Event> {
    kinds.iter().map(|kind| kind(name.to_owned())).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn open_failure_skips_run_and_close() {
    init_tracing();
    let mut b = PlanBuilder::new();
    let root = b.operator("A", &[]);
    let factory = TestFactory::new().script(
        "A",
        Script {
            fail_open: true,
            ..Script::default()
        },
    );
    let sched = scheduler(b.build(root).unwrap(), &factory, SchedulerOptions::default());

    let err = sched.schedule_plan().await.unwrap_err();

    assert_eq!(err, ExecError::open(root, "A open"));
    assert_eq!(err.code(), "OpenFailed");
    assert_eq!(factory.journal.events(), events("A", &[Event::Open]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_failure_skips_close() {
    init_tracing();
    let mut b = PlanBuilder::new();
    let root = b.operator("A", &[]);
    let factory = TestFactory::new().script("A", Script::failing_run());
    let sched = scheduler(b.build(root).unwrap(), &factory, SchedulerOptions::default());

    let err = sched.schedule_plan().await.unwrap_err();

    assert_eq!(err, ExecError::run(root, "A run"));
    assert_eq!(
        factory.journal.events(),
        events("A", &[Event::Open, Event::RunStart, Event::RunEnd])
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_failure_wins_over_a_failing_close() {
    init_tracing();
    let mut b = PlanBuilder::new();
    let root = b.operator("A", &[]);
    let factory = TestFactory::new().script(
        "A",
        Script {
            fail_run: true,
            fail_close: true,
            ..Script::default()
        },
    );
    let sched = scheduler(b.build(root).unwrap(), &factory, SchedulerOptions::default());

    let err = sched.schedule_plan().await.unwrap_err();

    assert_eq!(err, ExecError::run(root, "A run"));
    assert!(!factory.journal.contains(&Event::Close("A".into())));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn close_failure_overrides_success() {
    init_tracing();
    let mut b = PlanBuilder::new();
    let a = b.operator("A", &[]);
    let root = b.operator("B", &[a]);
    let factory = TestFactory::new().script(
        "A",
        Script {
            fail_close: true,
            ..Script::default()
        },
    );
    let sched = scheduler(b.build(root).unwrap(), &factory, SchedulerOptions::default());

    let err = sched.schedule_plan().await.unwrap_err();

    assert_eq!(err, ExecError::close(a, "A close"));
    assert_eq!(factory.journal.runs("B"), 0);
}

/// `Scan(v) -> Filter[v] -> Project[v](result)`.
fn scan_filter_project() -> sombra_exec::ExecutionPlan {
    let mut b = PlanBuilder::new();
    let scan = b.node(NodeKind::Operator("Scan".into())).output_var("v").add();
    let filter = b
        .node(NodeKind::Operator("Filter".into()))
        .depends_on([scan])
        .input_var("v")
        .add();
    let project = b
        .node(NodeKind::Operator("Project".into()))
        .depends_on([filter])
        .input_var("v")
        .output_var("result")
        .add();
    b.build(project).unwrap()
}

fn scan_factory() -> TestFactory {
    TestFactory::new()
        .script("Scan", Script::output(Value::Int(42)))
        .script("Project", Script::output(Value::String("done".into())))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn lifetime_optimize_releases_consumed_variables() {
    init_tracing();
    let factory = scan_factory();
    let options = SchedulerOptions {
        enable_lifetime_optimize: true,
        ..SchedulerOptions::default()
    };
    let sched = scheduler(scan_filter_project(), &factory, options);

    sched.schedule_plan().await.unwrap();

    assert!(!sched.store().contains("v"));
    assert_eq!(sched.store().get("result"), Value::String("done".into()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn variables_are_kept_without_lifetime_optimize() {
    init_tracing();
    let factory = scan_factory();
    let sched = scheduler(scan_filter_project(), &factory, SchedulerOptions::default());

    sched.schedule_plan().await.unwrap();

    assert_eq!(sched.store().get("v"), Value::Int(42));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn profile_counts_each_operator() {
    init_tracing();
    let mut b = PlanBuilder::new();
    let a = b.operator("A", &[]);
    let left = b.operator("B", &[a]);
    let right = b.operator("C", &[a]);
    let root = b.operator("R", &[left, right]);
    let factory = TestFactory::new()
        .script("A", Script::delayed(5))
        .script("C", Script::failing_run());
    let options = SchedulerOptions {
        profile: true,
        ..SchedulerOptions::default()
    };
    let sched = scheduler(b.build(root).unwrap(), &factory, options);

    let _ = sched.schedule_plan().await;

    let profile = sched.profile().unwrap();
    let a_stats = profile.get(a).unwrap();
    assert_eq!(a_stats.executions, 1);
    assert_eq!(a_stats.failures, 0);
    assert!(a_stats.total_ns >= 5_000_000);
    let c_stats = profile.get(right).unwrap();
    assert_eq!(c_stats.failures, 1);
    assert!(profile.get(root).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn profiling_is_off_by_default() {
    init_tracing();
    let mut b = PlanBuilder::new();
    let root = b.operator("A", &[]);
    let factory = TestFactory::new();
    let sched = scheduler(b.build(root).unwrap(), &factory, SchedulerOptions::default());

    sched.schedule_plan().await.unwrap();

    assert!(sched.profile().is_none());
}
