use std::collections::HashMap;

use chrono::Utc;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::events::SchedulerEvent;
use crate::registry::Resolution;
use crate::task::Task;
use crate::types::{TaskId, TaskStatus};

use super::core::EngineState;
use super::execution::Effects;
use super::lifecycle::TickGuard;
use super::Scheduler;

impl Scheduler {
    /// Move a pending task into a queue and dispatch from that queue.
    ///
    /// Returns false unless the task is `Pending`, every dependency is
    /// `Completed`, and the queue exists.
    pub fn schedule_task(&self, task_id: &str, queue_id: &str) -> bool {
        let mut effects = Effects::default();
        let scheduled = self.schedule_locked(&mut self.lock(), task_id, queue_id, &mut effects);
        self.apply(effects);
        scheduled
    }

    pub(super) fn schedule_locked(
        &self,
        state: &mut EngineState,
        task_id: &str,
        queue_id: &str,
        effects: &mut Effects,
    ) -> bool {
        let Some(task) = state.tasks.get(task_id) else {
            return false;
        };
        if task.status != TaskStatus::Pending {
            return false;
        }
        if !dependencies_met(state, task) {
            debug!(task_id, "Dependencies incomplete, staying pending");
            return false;
        }
        let Some(queue) = state.queues.get_mut(queue_id) else {
            warn!(task_id, queue = %queue_id, "Cannot schedule into unknown queue");
            return false;
        };
        queue.push(task_id);

        if let Some(task) = state.tasks.get_mut(task_id) {
            task.status = TaskStatus::Scheduled;
            task.scheduled_at = Some(Utc::now());
            task.queue_id = Some(queue_id.to_string());
        }
        info!(task_id, queue = %queue_id, "Task scheduled");
        self.emit(SchedulerEvent::TaskScheduled {
            task_id: task_id.to_string(),
            queue_id: queue_id.to_string(),
        });

        self.dispatch_queue(state, queue_id, effects);
        true
    }

    /// Schedule every pending task whose dependencies have all completed.
    pub(super) fn unblock_dependents(&self, state: &mut EngineState, effects: &mut Effects) {
        let ready: Vec<(TaskId, String)> = state
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending && !t.dependencies.is_empty())
            .filter(|t| dependencies_met(state, t))
            .map(|t| (t.id.clone(), t.preferred_queue.clone()))
            .collect();

        for (task_id, queue_id) in ready {
            debug!(task_id = %task_id, "Dependencies met");
            self.schedule_locked(state, &task_id, &queue_id, effects);
        }
    }

    /// Hand free slots of one queue to its waiting tasks in strategy order.
    ///
    /// Returns the scheduled tasks that found no executor.
    pub(super) fn dispatch_queue(
        &self,
        state: &mut EngineState,
        queue_id: &str,
        effects: &mut Effects,
    ) -> Vec<TaskId> {
        if Handle::try_current().is_err() {
            debug!(queue = %queue_id, "No tokio runtime, dispatch deferred");
            return Vec::new();
        }
        let Some(queue) = state.queues.get(queue_id) else {
            return Vec::new();
        };
        if queue.paused {
            return Vec::new();
        }

        let running = state
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Running && t.queue_id.as_deref() == Some(queue_id))
            .count();
        let mut free = queue.concurrency.saturating_sub(running);
        if free == 0 {
            debug!(queue = %queue_id, running, "Queue at capacity");
            return Vec::new();
        }

        let waiting: Vec<Task> = queue
            .tasks
            .iter()
            .filter_map(|id| state.tasks.get(id))
            .filter(|t| t.status == TaskStatus::Scheduled)
            .cloned()
            .collect();
        if waiting.is_empty() {
            return Vec::new();
        }

        let ordered = state.strategy.schedule(waiting, &state.resources);
        let mut per_executor = running_per_executor(state);
        let mut unmatched = Vec::new();
        let now = Utc::now();

        for candidate in ordered {
            if free == 0 {
                break;
            }
            let executor = match state.executors.resolve(&candidate, &per_executor) {
                Resolution::Ready(executor) => executor,
                Resolution::Saturated => {
                    debug!(task_id = %candidate.id, "Capable executors busy, waiting");
                    state.undispatched_ticks.remove(&candidate.id);
                    continue;
                }
                Resolution::Unmatched => {
                    warn!(task_id = %candidate.id, queue = %queue_id, "No executor found");
                    self.emit(SchedulerEvent::NoExecutorFound {
                        task_id: candidate.id.clone(),
                        queue_id: queue_id.to_string(),
                    });
                    unmatched.push(candidate.id);
                    continue;
                }
            };
            *per_executor.entry(executor.id().to_string()).or_default() += 1;
            if let Some(launch) = self.start_locked(state, &candidate.id, executor, now) {
                effects.launches.push(launch);
                free -= 1;
            }
        }
        unmatched
    }

    /// Dispatch from every unpaused queue, highest queue priority first.
    pub(super) fn dispatch_all(&self, state: &mut EngineState, effects: &mut Effects) -> Vec<TaskId> {
        let mut order: Vec<(i32, String)> = state
            .queues
            .values()
            .filter(|q| !q.paused)
            .map(|q| (q.priority, q.id.clone()))
            .collect();
        // Stable: equal priorities keep creation order.
        order.sort_by(|a, b| b.0.cmp(&a.0));

        let mut unmatched = Vec::new();
        for (_, queue_id) in order {
            unmatched.extend(self.dispatch_queue(state, &queue_id, effects));
        }
        unmatched
    }

    /// Run one dispatch tick. Skipped if another tick is still in flight.
    ///
    /// Scheduled tasks that stay unmatched accumulate stall ticks.
    pub fn process_queues(&self) {
        let Some(_guard) = TickGuard::enter(&self.ticks.dispatch) else {
            debug!("Dispatch tick still in flight, skipping");
            return;
        };
        let mut effects = Effects::default();
        {
            let mut guard = self.lock();
            let state = &mut *guard;
            let unmatched = self.dispatch_all(state, &mut effects);
            for task_id in unmatched {
                *state.undispatched_ticks.entry(task_id).or_default() += 1;
            }
            let threshold = self.config.stall_threshold_ticks;
            let stalled = state
                .undispatched_ticks
                .values()
                .filter(|&&ticks| ticks > threshold)
                .count();
            if stalled > 0 {
                debug!(stalled, "Tasks stalled without a matching executor");
            }
        }
        self.apply(effects);
    }
}

fn dependencies_met(state: &EngineState, task: &Task) -> bool {
    task.dependencies.iter().all(|dep| {
        state
            .tasks
            .get(dep)
            .is_some_and(|t| t.status == TaskStatus::Completed)
    })
}

fn running_per_executor(state: &EngineState) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for task in state.tasks.values() {
        if task.status == TaskStatus::Running {
            if let Some(executor) = &task.executor {
                *counts.entry(executor.clone()).or_default() += 1;
            }
        }
    }
    counts
}
