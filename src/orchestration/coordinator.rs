//! Plan execution.
//!
//! Groups run strictly in sequence. Inside a group every task is dispatched
//! concurrently (optionally capped by a semaphore) and the coordinator waits
//! for all of them to settle before the next group starts.
//!
//! Per task the state machine is `Pending -> Running -> {Succeeded, Failed,
//! TimedOut}`, with `Failed`/`TimedOut -> Running` allowed while the retry
//! budget lasts. A failed task never disturbs its siblings or later groups.
//! The one run-level failure is an unreachable backend: the current group
//! settles, later groups are skipped, and the results gathered so far come
//! back inside [`Error::BackendUnavailable`].

use crate::core::task::{Task, TaskId, TaskStatus};
use crate::error::{Error, PlanningError, Result};
use crate::orchestration::backend::{BackendKind, BackendSelector, DispatchError, Dispatcher, Served};
use crate::orchestration::planner::{ExecutionPlan, ParallelGroup};
use crate::orchestration::report::{ExecutionReport, ExecutionResult};
use crate::orchestration::retry::RetryPolicy;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default per-attempt timeout (5 minutes).
pub const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorOptions {
    pub retry: RetryPolicy,
    /// Limit for one dispatch attempt; exceeding it counts as a timed-out attempt.
    pub attempt_timeout: Duration,
    /// Limit for a whole group, measured from its start.
    pub group_timeout: Option<Duration>,
    /// Limit for the whole run, measured from its start.
    pub plan_deadline: Option<Duration>,
    /// Tasks in flight at once inside a group; `None` means unbounded.
    pub max_concurrency: Option<usize>,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            attempt_timeout: Duration::from_secs(DEFAULT_ATTEMPT_TIMEOUT_SECS),
            group_timeout: None,
            plan_deadline: None,
            max_concurrency: Some(4),
        }
    }
}

/// Progress notifications for callers that want to follow a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorEvent {
    GroupStarted { index: usize, tasks: usize },
    TaskStarted { task_id: TaskId, worker_role: String, attempt: u32 },
    TaskRetrying { task_id: TaskId, attempt: u32, delay: Duration, error: String },
    TaskSettled { task_id: TaskId, status: TaskStatus },
    GroupFinished { index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    Cancelled,
    GroupTimeout,
    Deadline,
    Halted,
}

impl Interrupt {
    fn message(self) -> &'static str {
        match self {
            Interrupt::Cancelled => "run cancelled",
            Interrupt::GroupTimeout => "group timeout exceeded",
            Interrupt::Deadline => "plan deadline exceeded",
            Interrupt::Halted => "run aborted",
        }
    }
}

enum TaskOutcome {
    Settled(ExecutionResult),
    /// Backend unreachable; the result is kept and the run aborts.
    Fatal(ExecutionResult, String),
    NotStarted(TaskId),
}

struct TaskRef<'a> {
    id: &'a TaskId,
    role: &'a str,
    description: &'a str,
    group: usize,
}

#[derive(Default)]
struct GroupOutcome {
    results: Vec<ExecutionResult>,
    not_started: Vec<TaskId>,
    fatal: Option<String>,
}

/// The instant a group must stop, and which limit it belongs to.
#[derive(Debug, Clone, Copy)]
struct Cutoff {
    at: Instant,
    reason: Interrupt,
}

/// Resolves with the cutoff's reason once it passes; never resolves without one.
async fn wait_for(cutoff: Option<Cutoff>) -> Interrupt {
    match cutoff {
        Some(cutoff) => {
            sleep_until(cutoff.at).await;
            cutoff.reason
        }
        None => std::future::pending().await,
    }
}

/// Earlier of the group timeout and the plan deadline. On a tie the plan
/// deadline is reported.
fn earliest(group: Option<Instant>, deadline: Option<Instant>) -> Option<Cutoff> {
    let group = group.map(|at| Cutoff {
        at,
        reason: Interrupt::GroupTimeout,
    });
    let deadline = deadline.map(|at| Cutoff {
        at,
        reason: Interrupt::Deadline,
    });
    match (group, deadline) {
        (Some(g), Some(d)) if g.at < d.at => Some(g),
        (g, d) => d.or(g),
    }
}

pub struct Coordinator {
    backends: BackendSelector,
    options: CoordinatorOptions,
    cancel: CancellationToken,
    events: Option<mpsc::Sender<CoordinatorEvent>>,
}

impl Coordinator {
    pub fn new(backends: BackendSelector, options: CoordinatorOptions) -> Self {
        Self {
            backends,
            options,
            cancel: CancellationToken::new(),
            events: None,
        }
    }

    /// Coordinator over a single dispatcher.
    pub fn with_dispatcher(dispatcher: Arc<dyn Dispatcher>, options: CoordinatorOptions) -> Self {
        Self::new(BackendSelector::new(dispatcher), options)
    }

    /// Cancelling `token` settles every unfinished task as timed out.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_events(mut self, tx: mpsc::Sender<CoordinatorEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn options(&self) -> &CoordinatorOptions {
        &self.options
    }

    /// Events never hold up the run: a full channel or a dropped receiver
    /// loses the event.
    fn emit(&self, event: CoordinatorEvent) {
        if let Some(tx) = &self.events {
            if let Err(mpsc::error::TrySendError::Full(event)) = tx.try_send(event) {
                debug!(?event, "event channel full, dropping event");
            }
        }
    }

    fn interrupt_before(&self, deadline: Option<Instant>) -> Option<Interrupt> {
        if self.cancel.is_cancelled() {
            Some(Interrupt::Cancelled)
        } else if deadline.is_some_and(|d| Instant::now() >= d) {
            Some(Interrupt::Deadline)
        } else {
            None
        }
    }

    /// Execute a plan.
    ///
    /// Returns the report even when tasks failed; inspect
    /// [`ExecutionReport::is_success`].
    ///
    /// # Errors
    /// - [`Error::Planning`] if the plan names a task missing from `tasks`
    ///   or lacking an assignment (nothing is dispatched)
    /// - [`Error::BackendUnavailable`] carrying the partial report
    pub async fn execute(&self, plan: &ExecutionPlan, tasks: &[Task]) -> Result<ExecutionReport> {
        let descriptions: HashMap<&TaskId, &str> = tasks
            .iter()
            .map(|t| (&t.id, t.description.as_str()))
            .collect();
        for id in &plan.task_order {
            if !descriptions.contains_key(id) {
                return Err(PlanningError::UnknownTask(id.clone()).into());
            }
            if !plan.task_assignments.contains_key(id) {
                return Err(PlanningError::MissingAssignment(id.clone()).into());
            }
        }

        let deadline = self.options.plan_deadline.map(|d| Instant::now() + d);
        let mut report = ExecutionReport::new();
        info!(
            run_id = %report.run_id,
            tasks = plan.task_count(),
            groups = plan.group_count(),
            "run started"
        );

        for (index, group) in plan.parallel_groups.iter().enumerate() {
            if let Some(interrupt) = self.interrupt_before(deadline) {
                warn!(group = index, reason = interrupt.message(), "group not dispatched");
                for id in &group.tasks {
                    let role = plan.assignment(id).map_or("", |a| a.worker_role.as_str());
                    report.push(ExecutionResult::unsuccessful(
                        id.clone(),
                        role,
                        TaskStatus::Pending.transition(TaskStatus::TimedOut)?,
                        format!("{} before dispatch", interrupt.message()),
                        0,
                        None,
                        index,
                    ));
                }
                continue;
            }

            let cutoff = earliest(self.options.group_timeout.map(|t| Instant::now() + t), deadline);
            self.emit(CoordinatorEvent::GroupStarted {
                index,
                tasks: group.tasks.len(),
            });
            info!(group = index, tasks = group.tasks.len(), stage = ?group.stage, "group started");

            let outcome = self.run_group(index, group, plan, &descriptions, cutoff).await?;
            report.results.extend(outcome.results);
            report.not_run.extend(outcome.not_started);
            self.emit(CoordinatorEvent::GroupFinished { index });

            if let Some(message) = outcome.fatal {
                report.not_run.extend(
                    plan.parallel_groups[index + 1..]
                        .iter()
                        .flat_map(|g| g.tasks.iter().cloned()),
                );
                report.finish();
                error!(
                    run_id = %report.run_id,
                    group = index,
                    not_run = report.not_run.len(),
                    error = %message,
                    "backend unavailable, aborting run"
                );
                return Err(Error::BackendUnavailable {
                    message,
                    partial: Box::new(report),
                });
            }
        }

        report.finish();
        let summary = report.summary();
        info!(
            run_id = %report.run_id,
            succeeded = summary.succeeded,
            failed = summary.failed,
            timed_out = summary.timed_out,
            "run finished"
        );
        Ok(report)
    }

    async fn run_group(
        &self,
        index: usize,
        group: &ParallelGroup,
        plan: &ExecutionPlan,
        descriptions: &HashMap<&TaskId, &str>,
        cutoff: Option<Cutoff>,
    ) -> Result<GroupOutcome> {
        let halt = CancellationToken::new();
        let permits = self
            .options
            .max_concurrency
            .filter(|n| *n > 0)
            .map(Semaphore::new);

        let mut in_flight = FuturesUnordered::new();
        for id in &group.tasks {
            let role = plan
                .assignment(id)
                .map(|a| a.worker_role.as_str())
                .ok_or_else(|| PlanningError::MissingAssignment(id.clone()))?;
            let description = descriptions
                .get(id)
                .copied()
                .ok_or_else(|| PlanningError::UnknownTask(id.clone()))?;
            let task = TaskRef {
                id,
                role,
                description,
                group: index,
            };
            in_flight.push(self.run_task(task, permits.as_ref(), &halt, cutoff));
        }

        let mut outcome = GroupOutcome::default();
        while let Some(done) = in_flight.next().await {
            match done? {
                TaskOutcome::Settled(result) => {
                    self.emit(CoordinatorEvent::TaskSettled {
                        task_id: result.task_id.clone(),
                        status: result.status,
                    });
                    outcome.results.push(result);
                }
                TaskOutcome::Fatal(result, message) => {
                    halt.cancel();
                    self.emit(CoordinatorEvent::TaskSettled {
                        task_id: result.task_id.clone(),
                        status: result.status,
                    });
                    outcome.results.push(result);
                    outcome.fatal.get_or_insert(message);
                }
                TaskOutcome::NotStarted(id) => outcome.not_started.push(id),
            }
        }
        drop(in_flight);

        let position = |id: &TaskId| group.tasks.iter().position(|t| t == id);
        outcome.results.sort_by_key(|r| position(&r.task_id));
        outcome.not_started.sort_by_key(|id| position(id));
        Ok(outcome)
    }

    async fn run_task(
        &self,
        task: TaskRef<'_>,
        permits: Option<&Semaphore>,
        halt: &CancellationToken,
        cutoff: Option<Cutoff>,
    ) -> Result<TaskOutcome> {
        let mut status = TaskStatus::Pending;

        let _permit = match permits {
            Some(semaphore) => tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return self.never_ran(&task, Interrupt::Cancelled);
                }
                interrupt = wait_for(cutoff) => return self.never_ran(&task, interrupt),
                _ = halt.cancelled() => return Ok(TaskOutcome::NotStarted(task.id.clone())),
                permit = semaphore.acquire() => permit.ok(),
            },
            None => None,
        };

        let retry = self.options.retry;
        let mut attempts = 0u32;
        let mut last_error: String;
        let mut last_backend: Option<BackendKind> = None;

        loop {
            attempts += 1;
            status = status.transition(TaskStatus::Running)?;
            self.emit(CoordinatorEvent::TaskStarted {
                task_id: task.id.clone(),
                worker_role: task.role.to_string(),
                attempt: attempts,
            });
            debug!(task_id = %task.id, worker = task.role, attempt = attempts, "dispatching");

            let attempt = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(Interrupt::Cancelled),
                interrupt = wait_for(cutoff) => Err(interrupt),
                served = timeout(
                    self.options.attempt_timeout,
                    self.backends.dispatch(task.description, task.role),
                ) => Ok(served),
            };

            match attempt {
                Err(interrupt) => {
                    status = status.transition(TaskStatus::TimedOut)?;
                    warn!(task_id = %task.id, reason = interrupt.message(), "attempt interrupted");
                    return Ok(TaskOutcome::Settled(ExecutionResult::unsuccessful(
                        task.id.clone(),
                        task.role,
                        status,
                        interrupt.message().to_string(),
                        attempts,
                        last_backend.or(Some(self.backends.select(task.description))),
                        task.group,
                    )));
                }
                Ok(Err(_elapsed)) => {
                    status = status.transition(TaskStatus::TimedOut)?;
                    last_backend = Some(self.backends.select(task.description));
                    last_error = format!("attempt timed out after {:?}", self.options.attempt_timeout);
                }
                Ok(Ok(Served {
                    result: Ok(output),
                    backend,
                })) => {
                    status.transition(TaskStatus::Succeeded)?;
                    debug!(task_id = %task.id, attempts, backend = %backend, "task succeeded");
                    return Ok(TaskOutcome::Settled(ExecutionResult::succeeded(
                        task.id.clone(),
                        task.role,
                        output,
                        attempts,
                        backend,
                        task.group,
                    )));
                }
                Ok(Ok(Served {
                    result: Err(DispatchError::Unavailable(message)),
                    backend,
                })) => {
                    status = status.transition(TaskStatus::Failed)?;
                    let result = ExecutionResult::unsuccessful(
                        task.id.clone(),
                        task.role,
                        status,
                        format!("backend unavailable: {}", message),
                        attempts,
                        Some(backend),
                        task.group,
                    );
                    return Ok(TaskOutcome::Fatal(result, message));
                }
                Ok(Ok(Served {
                    result: Err(DispatchError::Failed(message)),
                    backend,
                })) => {
                    status = status.transition(TaskStatus::Failed)?;
                    last_backend = Some(backend);
                    last_error = message;
                }
            }

            if !retry.should_retry(attempts) {
                break;
            }

            let delay = retry.backoff(attempts - 1);
            warn!(
                task_id = %task.id,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %last_error,
                "attempt failed, retrying"
            );
            self.emit(CoordinatorEvent::TaskRetrying {
                task_id: task.id.clone(),
                attempt: attempts,
                delay,
                error: last_error.clone(),
            });

            let interrupted = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Some(Interrupt::Cancelled),
                interrupt = wait_for(cutoff) => Some(interrupt),
                _ = halt.cancelled() => Some(Interrupt::Halted),
                _ = sleep(delay) => None,
            };
            if let Some(interrupt) = interrupted {
                last_error = format!("{} (retry abandoned: {})", last_error, interrupt.message());
                break;
            }
        }

        warn!(task_id = %task.id, status = %status, attempts, error = %last_error, "task settled unsuccessfully");
        Ok(TaskOutcome::Settled(ExecutionResult::unsuccessful(
            task.id.clone(),
            task.role,
            status,
            last_error,
            attempts,
            last_backend,
            task.group,
        )))
    }

    fn never_ran(&self, task: &TaskRef<'_>, interrupt: Interrupt) -> Result<TaskOutcome> {
        let status = TaskStatus::Pending.transition(TaskStatus::TimedOut)?;
        Ok(TaskOutcome::Settled(ExecutionResult::unsuccessful(
            task.id.clone(),
            task.role,
            status,
            format!("{} before dispatch", interrupt.message()),
            0,
            None,
            task.group,
        )))
    }
}
