use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::events::SchedulerEvent;
use crate::executor::{ExecutionContext, ExecutionError, Executor};
use crate::task::{Task, DEFAULT_QUEUE};
use crate::types::{TaskId, TaskStatus};

use super::core::EngineState;
use super::Scheduler;

/// An executor attempt ready to be spawned once the lock is released.
pub(super) struct Launch {
    task: Task,
    executor: Arc<dyn Executor>,
    ctx: ExecutionContext,
    token: u64,
}

/// Work collected under the lock and carried out after it is released.
#[derive(Default)]
pub(super) struct Effects {
    pub(super) launches: Vec<Launch>,
    /// Tasks waiting out a backoff delay before rescheduling.
    pub(super) retries: Vec<(TaskId, Duration)>,
}

impl Scheduler {
    /// Spawn collected executor attempts and backoff timers.
    pub(super) fn apply(&self, effects: Effects) {
        if effects.launches.is_empty() && effects.retries.is_empty() {
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            error!("No tokio runtime; dropping {} launches", effects.launches.len());
            return;
        };

        for Launch {
            task,
            executor,
            ctx,
            token,
        } in effects.launches
        {
            let scheduler = self.clone();
            let task_id = task.id.clone();
            let body = runtime.spawn(async move { executor.execute(task, ctx).await });
            runtime.spawn(async move {
                // A panicking executor is reported as a failed attempt.
                let outcome = match body.await {
                    Ok(outcome) => outcome,
                    Err(e) => Err(ExecutionError::Failed(format!("executor panicked: {e}"))),
                };
                scheduler.finish_execution(&task_id, token, outcome);
            });
        }

        for (task_id, delay) in effects.retries {
            let scheduler = self.clone();
            runtime.spawn(async move {
                tokio::time::sleep(delay).await;
                scheduler.resume_after_backoff(&task_id);
            });
        }
    }

    /// Mark a task running and prepare its attempt.
    pub(super) fn start_locked(
        &self,
        state: &mut EngineState,
        task_id: &str,
        executor: Arc<dyn Executor>,
        now: DateTime<Utc>,
    ) -> Option<Launch> {
        let task = state.tasks.get_mut(task_id)?;
        task.status = TaskStatus::Running;
        task.started_at = Some(now);
        task.completed_at = None;
        task.executor = Some(executor.id().to_string());

        let attempt = task.retry_attempts + 1;
        state.next_token += 1;
        let token = state.next_token;
        let (ctx, handle) = ExecutionContext::new(task.id.clone(), attempt, token);
        state.contexts.insert(task.id.clone(), handle);
        state.undispatched_ticks.remove(task_id);
        state.strategy.record_dispatch(task, executor.id(), now);

        info!(
            task_id = %task.id,
            executor = %executor.name(),
            attempt,
            "Task started"
        );
        self.emit(SchedulerEvent::TaskStarted {
            task_id: task.id.clone(),
            executor_id: executor.id().to_string(),
            attempt,
        });

        Some(Launch {
            task: task.clone(),
            executor,
            ctx,
            token,
        })
    }

    /// Record the outcome of an attempt and apply the retry policy.
    ///
    /// Outcomes for attempts that were cancelled or superseded are dropped.
    pub(super) fn finish_execution(
        &self,
        task_id: &str,
        token: u64,
        outcome: Result<serde_json::Value, ExecutionError>,
    ) {
        let mut effects = Effects::default();
        {
            let mut guard = self.lock();
            let state = &mut *guard;

            let attempt = match state.contexts.get(task_id) {
                Some(handle) if handle.token == token => handle.attempt,
                _ => {
                    debug!(task_id, token, "Ignoring outcome of settled attempt");
                    return;
                }
            };
            state.contexts.remove(task_id);

            let now = Utc::now();
            let Some(task) = state.tasks.get_mut(task_id) else {
                return;
            };
            if task.status != TaskStatus::Running {
                return;
            }
            let queue_id = task
                .queue_id
                .clone()
                .unwrap_or_else(|| DEFAULT_QUEUE.to_string());

            match outcome {
                Ok(value) => {
                    task.status = TaskStatus::Completed;
                    task.completed_at = Some(now);
                    task.result = Some(value);
                    task.error = None;
                    let execution_ms = task.execution_time().map(|d| d.as_millis() as u64);
                    info!(task_id, execution_ms, "Task completed");
                    self.emit(SchedulerEvent::TaskCompleted {
                        task_id: task_id.to_string(),
                        execution_ms,
                    });

                    if let Some(queue) = state.queues.get_mut(&queue_id) {
                        queue.remove(task_id);
                    }
                    self.unblock_dependents(state, &mut effects);
                }
                Err(err) => {
                    let message = err.to_string();
                    task.status = TaskStatus::Failed;
                    task.error = Some(message.clone());
                    task.completed_at = Some(now);
                    task.last_attempt_at = Some(now);
                    let retryable = task.can_retry();
                    let attempts = task.retry_attempts + 1;

                    warn!(task_id, attempt, error = %message, "Task failed");
                    self.emit(SchedulerEvent::TaskFailed {
                        task_id: task_id.to_string(),
                        error: message,
                        attempt,
                    });

                    if let Some(queue) = state.queues.get_mut(&queue_id) {
                        queue.remove(task_id);
                    }
                    if !retryable || !self.retry_locked(state, task_id, &mut effects) {
                        warn!(task_id, attempts, "Retries exhausted");
                        self.emit(SchedulerEvent::TaskRetryExhausted {
                            task_id: task_id.to_string(),
                            attempts,
                        });
                    }
                }
            }

            // The slot this attempt held is free again.
            self.dispatch_queue(state, &queue_id, &mut effects);
        }
        self.apply(effects);
    }

    /// Retry a failed task after its backoff delay. Only valid from `Failed`
    /// while the retry budget allows it.
    ///
    /// The engine already retries every failure on its own, moving the task
    /// to `Retrying` or exhausting its budget, so a task is never left
    /// `Failed` with retries to spare. In practice this returns false, except
    /// for failures recorded while no tokio runtime was available.
    pub fn retry_task(&self, task_id: &str) -> bool {
        let mut effects = Effects::default();
        let retried = self.retry_locked(&mut self.lock(), task_id, &mut effects);
        self.apply(effects);
        retried
    }

    pub(super) fn retry_locked(
        &self,
        state: &mut EngineState,
        task_id: &str,
        effects: &mut Effects,
    ) -> bool {
        if Handle::try_current().is_err() {
            warn!(task_id, "Retry needs a tokio runtime for the backoff timer");
            return false;
        }
        let Some(task) = state.tasks.get_mut(task_id) else {
            return false;
        };
        if task.status != TaskStatus::Failed || !task.can_retry() {
            return false;
        }

        task.retry_attempts += 1;
        task.error = None;
        task.status = TaskStatus::Retrying;
        let delay = task.backoff_delay();

        info!(
            task_id,
            attempt = task.retry_attempts,
            delay_ms = delay.as_millis() as u64,
            "Retrying task"
        );
        self.emit(SchedulerEvent::TaskRetrying {
            task_id: task_id.to_string(),
            attempt: task.retry_attempts,
            delay_ms: delay.as_millis() as u64,
        });
        effects.retries.push((task_id.to_string(), delay));
        true
    }

    /// Backoff elapsed: return the task to `Pending` and schedule it again.
    pub(super) fn resume_after_backoff(&self, task_id: &str) {
        let mut effects = Effects::default();
        {
            let mut guard = self.lock();
            let state = &mut *guard;
            let Some(task) = state.tasks.get_mut(task_id) else {
                return;
            };
            // Cancelled or removed while waiting.
            if task.status != TaskStatus::Retrying {
                return;
            }
            task.status = TaskStatus::Pending;
            let queue_id = task.target_queue().to_string();
            self.schedule_locked(state, task_id, &queue_id, &mut effects);
        }
        self.apply(effects);
    }

    /// Cancel a task. Running attempts are signalled cooperatively; scheduled
    /// tasks leave their queue at once. False if unknown or already terminal.
    pub fn cancel_task(&self, task_id: &str) -> bool {
        let mut effects = Effects::default();
        let cancelled = self.cancel_locked(&mut self.lock(), task_id, &mut effects);
        self.apply(effects);
        cancelled
    }

    pub(super) fn cancel_locked(
        &self,
        state: &mut EngineState,
        task_id: &str,
        effects: &mut Effects,
    ) -> bool {
        let Some(task) = state.tasks.get_mut(task_id) else {
            return false;
        };
        if task.status.is_terminal() {
            return false;
        }

        let was_running = task.status == TaskStatus::Running;
        task.status = TaskStatus::Cancelled;
        task.completed_at = Some(Utc::now());
        let queue_id = task.queue_id.clone();

        if let Some(handle) = state.contexts.remove(task_id) {
            handle.cancel();
        }
        state.undispatched_ticks.remove(task_id);
        if let Some(queue_id) = &queue_id {
            if let Some(queue) = state.queues.get_mut(queue_id) {
                queue.remove(task_id);
            }
        }

        info!(task_id, was_running, "Task cancelled");
        self.emit(SchedulerEvent::TaskCancelled {
            task_id: task_id.to_string(),
        });

        if was_running {
            if let Some(queue_id) = &queue_id {
                self.dispatch_queue(state, queue_id, effects);
            }
        }
        true
    }
}
