//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - A scripted dispatcher that records calls and concurrency
//! - Predefined task batches
//! - Pipelines over the default configuration

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use switchyard::config::Config;
use switchyard::core::task::{Task, TaskId};
use switchyard::orchestration::{
    Coordinator, CoordinatorOptions, DispatchError, Dispatcher, ExecutionPlan, Pipeline,
    RetryPolicy,
};

/// What a scripted dispatch does.
#[derive(Debug, Clone)]
pub enum Reply {
    Ok,
    Fail(&'static str),
    Unavailable,
    Delay(Duration),
}

/// One observed dispatch.
#[derive(Debug, Clone)]
pub struct Call {
    pub description: String,
    pub worker_role: String,
    pub started: Instant,
    pub finished: Instant,
}

/// Dispatcher whose replies are scripted per task description.
///
/// Unscripted calls succeed after `default_delay`.
pub struct ScriptedDispatcher {
    name: String,
    script: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<Call>>,
    default_delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedDispatcher {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            default_delay: Duration::from_millis(50),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn script(self, description: &str, replies: &[Reply]) -> Self {
        self.script
            .lock()
            .unwrap()
            .insert(description.to_string(), replies.iter().cloned().collect());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, description: &str) -> usize {
        self.calls().iter().filter(|c| c.description == description).count()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Dispatcher for ScriptedDispatcher {
    async fn dispatch(&self, description: &str, worker_role: &str) -> Result<String, DispatchError> {
        let started = Instant::now();
        let reply = self
            .script
            .lock()
            .unwrap()
            .get_mut(description)
            .and_then(|q| q.pop_front())
            .unwrap_or(Reply::Delay(self.default_delay));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let result = match reply {
            Reply::Ok => Ok(format!("{} handled by {}", description, worker_role)),
            Reply::Fail(message) => Err(DispatchError::Failed(message.to_string())),
            Reply::Unavailable => Err(DispatchError::Unavailable("connection refused".to_string())),
            Reply::Delay(d) => {
                tokio::time::sleep(d).await;
                Ok(format!("{} handled by {}", description, worker_role))
            }
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.calls.lock().unwrap().push(Call {
            description: description.to_string(),
            worker_role: worker_role.to_string(),
            started,
            finished: Instant::now(),
        });
        result
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Options with short backoff and no concurrency cap.
pub fn fast_options(max_retries: u32) -> CoordinatorOptions {
    CoordinatorOptions {
        retry: RetryPolicy::new(max_retries, Duration::from_millis(10), Duration::from_millis(100)),
        attempt_timeout: Duration::from_secs(30),
        group_timeout: None,
        plan_deadline: None,
        max_concurrency: None,
    }
}

/// Pipeline over `config` whose coordinator dispatches to `dispatcher`.
pub fn pipeline_with(
    config: &Config,
    dispatcher: Arc<ScriptedDispatcher>,
    options: CoordinatorOptions,
) -> Pipeline {
    Pipeline::new(
        config.build_route().unwrap(),
        config.build_planner(),
        Coordinator::with_dispatcher(dispatcher, options),
    )
}

/// The three-task sprint scenario.
pub fn sprint_scenario() -> Vec<Task> {
    vec![
        Task::new("a", "plan the sprint"),
        Task::new("b", "design REST API"),
        Task::new("c", "implement login endpoint").with_dependencies(["b"]),
    ]
}

/// A mixed batch spanning all three tiers and four domains.
///
/// Tiers: a, f = 1; b, g = 2; c, d, e, h = 3.
pub fn release_batch() -> Vec<Task> {
    vec![
        Task::new("a", "plan the sprint"),
        Task::new("b", "design REST API"),
        Task::new("c", "implement login endpoint").with_dependencies(["b"]),
        Task::new("d", "write unit tests for the login endpoint").with_dependencies(["c"]),
        Task::new("e", "add docker deployment"),
        Task::new("f", "review the release roadmap"),
        Task::new("g", "architecture for the payment service").with_dependencies(["a"]),
        Task::new("h", "write the README guide").with_dependencies(["e"]),
    ]
}

/// `count` tasks with no dependencies at the same tier.
pub fn independent_tasks(count: usize) -> Vec<Task> {
    (0..count)
        .map(|i| Task::new(format!("task-{}", i), &format!("implement endpoint number {}", i)))
        .collect()
}

/// Group index of every task in the plan.
pub fn group_index(plan: &ExecutionPlan) -> HashMap<TaskId, usize> {
    plan.parallel_groups
        .iter()
        .enumerate()
        .flat_map(|(i, g)| g.tasks.iter().map(move |id| (id.clone(), i)))
        .collect()
}

/// Task ids of each group as plain strings.
pub fn group_ids(plan: &ExecutionPlan) -> Vec<Vec<&str>> {
    plan.parallel_groups
        .iter()
        .map(|g| g.tasks.iter().map(|t| t.as_str()).collect())
        .collect()
}
