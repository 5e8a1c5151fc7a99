//! Execution tests: plans run against scripted workers.

use std::sync::Arc;
use std::time::Duration;

use switchyard::config::Config;
use switchyard::core::task::{Task, TaskId, TaskStatus};
use switchyard::error::Error;
use switchyard::orchestration::{
    BackendKind, BackendSelector, CommandBackend, Coordinator, Pipeline,
};
use switchyard::routing::{ModeSelector, PatternSpec};

use crate::fixtures::{
    fast_options, independent_tasks, pipeline_with, release_batch, sprint_scenario, Reply,
    ScriptedDispatcher,
};

fn status(report: &switchyard::ExecutionReport, id: &str) -> TaskStatus {
    report.status_of(&TaskId::from(id)).unwrap()
}

/// Test: groups run strictly in sequence
/// Given the sprint scenario
/// When executed
/// Then each group starts only after the previous one finished
#[tokio::test(start_paused = true)]
async fn test_groups_run_in_sequence() {
    let worker = Arc::new(ScriptedDispatcher::new("worker"));
    let pipeline = pipeline_with(&Config::default(), worker.clone(), fast_options(0));

    let run = pipeline.run(&sprint_scenario()).await.unwrap();
    assert!(run.report.is_success());
    assert_eq!(run.report.summary().succeeded, 3);

    let calls = worker.calls();
    assert_eq!(calls.len(), 3);
    let by_desc = |d: &str| calls.iter().find(|c| c.description == d).unwrap().clone();
    let a = by_desc("plan the sprint");
    let b = by_desc("design REST API");
    let c = by_desc("implement login endpoint");
    assert!(b.started >= a.finished);
    assert!(c.started >= b.finished);
    assert_eq!(c.worker_role, "backend-dev");
}

/// Test: same-tier tasks with no dependencies are dispatched together
#[tokio::test(start_paused = true)]
async fn test_same_group_dispatched_concurrently() {
    let worker = Arc::new(ScriptedDispatcher::new("worker"));
    let pipeline = pipeline_with(&Config::default(), worker.clone(), fast_options(0));

    let run = pipeline.run(&independent_tasks(4)).await.unwrap();
    assert_eq!(run.plan.group_count(), 1);
    assert_eq!(worker.peak_concurrency(), 4);

    let calls = worker.calls();
    let first_start = calls.iter().map(|c| c.started).min().unwrap();
    assert!(calls.iter().all(|c| c.started == first_start));
}

/// Test: the configured concurrency cap bounds in-flight dispatches
#[tokio::test(start_paused = true)]
async fn test_concurrency_cap_from_config() {
    let mut config = Config::default();
    config.coordinator.max_concurrency = Some(2);
    let worker = Arc::new(ScriptedDispatcher::new("worker"));
    let pipeline = pipeline_with(&config, worker.clone(), config.coordinator.options());

    let run = pipeline.run(&independent_tasks(5)).await.unwrap();
    assert!(run.report.is_success());
    assert_eq!(worker.peak_concurrency(), 2);
}

/// Test: a failing task does not disturb its siblings or later groups
/// Given c always fails
/// When the release batch runs with two retries
/// Then c fails after three attempts and everything else succeeds
#[tokio::test(start_paused = true)]
async fn test_partial_failure_isolation() {
    let worker = Arc::new(ScriptedDispatcher::new("worker").script(
        "implement login endpoint",
        &[Reply::Fail("compile error"), Reply::Fail("compile error"), Reply::Fail("compile error")],
    ));
    let pipeline = pipeline_with(&Config::default(), worker.clone(), fast_options(2));

    let run = pipeline.run(&release_batch()).await.unwrap();
    let report = &run.report;

    let c = report.result(&TaskId::from("c")).unwrap();
    assert_eq!(c.status, TaskStatus::Failed);
    assert_eq!(c.attempt_count, 3);
    assert_eq!(c.error.as_deref(), Some("compile error"));

    for id in ["a", "b", "d", "e", "f", "g", "h"] {
        assert_eq!(status(report, id), TaskStatus::Succeeded, "task {}", id);
    }
    assert!(!report.is_success());
    assert_eq!(report.failures().count(), 1);
}

/// Test: N retries mean at most N+1 dispatches and one terminal status
#[tokio::test(start_paused = true)]
async fn test_retry_boundedness() {
    for max_retries in 0..=3u32 {
        let failures = vec![Reply::Fail("boom"); 10];
        let worker = Arc::new(ScriptedDispatcher::new("worker").script("write the README guide", &failures));
        let pipeline = pipeline_with(&Config::default(), worker.clone(), fast_options(max_retries));

        let tasks = vec![Task::new("docs", "write the README guide")];
        let run = pipeline.run(&tasks).await.unwrap();

        assert_eq!(worker.calls_for("write the README guide"), max_retries as usize + 1);
        assert_eq!(run.report.results.len(), 1);
        assert_eq!(run.report.results[0].status, TaskStatus::Failed);
        assert_eq!(run.report.results[0].attempt_count, max_retries + 1);
    }
}

/// Test: a transient failure recovers within the retry budget
#[tokio::test(start_paused = true)]
async fn test_transient_failure_recovers() {
    let worker = Arc::new(
        ScriptedDispatcher::new("worker").script("design REST API", &[Reply::Fail("rate limited"), Reply::Ok]),
    );
    let pipeline = pipeline_with(&Config::default(), worker.clone(), fast_options(2));

    let run = pipeline.run(&sprint_scenario()).await.unwrap();
    let b = run.report.result(&TaskId::from("b")).unwrap();
    assert_eq!(b.status, TaskStatus::Succeeded);
    assert_eq!(b.attempt_count, 2);
    assert!(run.report.is_success());
}

/// Test: an unreachable backend aborts the run but keeps finished work
/// Given c's dispatch reports the backend unavailable
/// When the release batch runs
/// Then earlier groups are reported, c's group settles and later groups never run
#[tokio::test(start_paused = true)]
async fn test_backend_unavailable_keeps_partial_results() {
    let worker = Arc::new(
        ScriptedDispatcher::new("worker").script("implement login endpoint", &[Reply::Unavailable]),
    );
    let pipeline = pipeline_with(&Config::default(), worker.clone(), fast_options(2));

    let err = pipeline.run(&release_batch()).await.unwrap_err();
    assert!(matches!(err, Error::BackendUnavailable { .. }));

    let partial = err.partial_report().unwrap();
    for id in ["a", "f", "b", "g", "e"] {
        assert_eq!(status(partial, id), TaskStatus::Succeeded, "task {}", id);
    }
    assert_eq!(status(partial, "c"), TaskStatus::Failed);
    assert_eq!(partial.not_run, vec![TaskId::from("d"), TaskId::from("h")]);
    assert_eq!(worker.calls_for("implement login endpoint"), 1);
    assert_eq!(worker.calls_for("write the README guide"), 0);
    assert_eq!(partial.summary().total, 8);
}

/// Test: a task stuck past the group timeout is marked timed out and the run moves on
#[tokio::test(start_paused = true)]
async fn test_group_timeout_advances() {
    let worker = Arc::new(
        ScriptedDispatcher::new("worker").script("design REST API", &[Reply::Delay(Duration::from_secs(3600))]),
    );
    let mut options = fast_options(0);
    options.attempt_timeout = Duration::from_secs(600);
    options.group_timeout = Some(Duration::from_secs(60));
    let pipeline = pipeline_with(&Config::default(), worker.clone(), options);

    let run = pipeline.run(&sprint_scenario()).await.unwrap();
    assert_eq!(status(&run.report, "b"), TaskStatus::TimedOut);
    assert_eq!(status(&run.report, "c"), TaskStatus::Succeeded);
    assert_eq!(run.report.summary().timed_out, 1);
}

/// Test: complex tasks go to the advanced backend and fall back to simple
/// Given an advanced backend that is down for one task
/// When a mixed batch runs
/// Then plain tasks use simple, the failing complex task falls back, and the other stays advanced
#[tokio::test(start_paused = true)]
async fn test_advanced_backend_with_fallback() {
    let simple = Arc::new(ScriptedDispatcher::new("simple"));
    let advanced = Arc::new(
        ScriptedDispatcher::new("advanced")
            .script("step-by-step: implement login endpoint", &[Reply::Unavailable]),
    );
    let modes = ModeSelector::new(&[PatternSpec::new(r"\bstep-by-step\b", 5)], 3).unwrap();
    let backends = BackendSelector::new(simple.clone()).with_advanced(advanced.clone(), modes);

    let config = Config::default();
    let pipeline = Pipeline::new(
        config.build_route().unwrap(),
        config.build_planner(),
        Coordinator::new(backends, fast_options(0)),
    );

    let tasks = vec![
        Task::new("plain", "implement logout endpoint"),
        Task::new("fallback", "step-by-step: implement login endpoint"),
        Task::new("complex", "step-by-step: implement signup endpoint"),
    ];
    let run = pipeline.run(&tasks).await.unwrap();
    let report = &run.report;
    assert!(report.is_success());

    let backend_of = |id: &str| report.result(&TaskId::from(id)).unwrap().backend;
    assert_eq!(backend_of("plain"), Some(BackendKind::Simple));
    assert_eq!(backend_of("fallback"), Some(BackendKind::Simple));
    assert_eq!(backend_of("complex"), Some(BackendKind::Advanced));

    assert_eq!(advanced.calls_for("implement logout endpoint"), 0);
    assert_eq!(advanced.calls_for("step-by-step: implement login endpoint"), 1);
    assert_eq!(simple.calls_for("step-by-step: implement login endpoint"), 1);
    assert_eq!(simple.calls_for("step-by-step: implement signup endpoint"), 0);
}

/// Test: the simple command backend runs a real process per task
#[tokio::test]
async fn test_command_backend_end_to_end() {
    let config = Config::default();
    let pipeline = Pipeline::new(
        config.build_route().unwrap(),
        config.build_planner(),
        Coordinator::with_dispatcher(Arc::new(CommandBackend::new("echo", &[])), fast_options(0)),
    );

    let run = pipeline.run(&sprint_scenario()).await.unwrap();
    assert!(run.report.is_success());
    let c = run.report.result(&TaskId::from("c")).unwrap();
    assert_eq!(c.output.as_deref(), Some("[backend-dev] implement login endpoint"));
}

/// Test: a missing program makes the backend unavailable and aborts the run
#[tokio::test]
async fn test_missing_program_aborts() {
    let config = Config::default();
    let pipeline = Pipeline::new(
        config.build_route().unwrap(),
        config.build_planner(),
        Coordinator::with_dispatcher(
            Arc::new(CommandBackend::new("/nonexistent/switchyard-worker", &[])),
            fast_options(3),
        ),
    );

    let err = pipeline.run(&sprint_scenario()).await.unwrap_err();
    let partial = err.partial_report().unwrap();
    assert_eq!(partial.results.len(), 1);
    assert_eq!(partial.results[0].attempt_count, 1);
    assert_eq!(partial.not_run, vec![TaskId::from("b"), TaskId::from("c")]);
}
