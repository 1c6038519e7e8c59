use chrono::Utc;
use tracing::{debug, warn};

use crate::events::SchedulerEvent;
use crate::metrics::{ResourceUtilization, SchedulerMetrics};
use crate::types::SystemResources;

use super::lifecycle::TickGuard;
use super::Scheduler;

impl Scheduler {
    /// Emit `task-overdue` / `task-deadline-warning` for every active task
    /// with a deadline. Status is never changed. Returns the number of alarms.
    ///
    /// Alarms repeat on every call while the condition holds.
    pub fn check_deadlines(&self) -> usize {
        let Some(_guard) = TickGuard::enter(&self.ticks.deadline) else {
            debug!("Deadline tick still in flight, skipping");
            return 0;
        };
        let now = Utc::now();
        let warning = self.config.deadline_warning();

        let state = self.lock();
        let mut alarms = 0;
        for task in state.tasks.values() {
            if task.status.is_terminal() {
                continue;
            }
            let Some(deadline) = task.deadline else {
                continue;
            };
            let remaining = deadline - now;
            if remaining < chrono::Duration::zero() {
                let overdue_ms = (-remaining).num_milliseconds().max(0) as u64;
                warn!(task_id = %task.id, overdue_ms, "Task overdue");
                self.emit(SchedulerEvent::TaskOverdue {
                    task_id: task.id.clone(),
                    overdue_ms,
                });
                alarms += 1;
            } else if let Some(left) = remaining
                .to_std()
                .ok()
                .filter(|left| !left.is_zero() && *left < warning)
            {
                let remaining_ms = left.as_millis() as u64;
                debug!(task_id = %task.id, remaining_ms, "Deadline approaching");
                self.emit(SchedulerEvent::TaskDeadlineWarning {
                    task_id: task.id.clone(),
                    remaining_ms,
                });
                alarms += 1;
            }
        }
        alarms
    }

    /// Sample the resource probe and store the snapshot for strategies.
    pub fn refresh_resources(&self) -> SystemResources {
        let mut state = self.lock();
        let snapshot = self.probe.sample(state.running_count());
        state.resources = snapshot;
        snapshot
    }

    /// Last resource snapshot.
    pub fn resources(&self) -> SystemResources {
        self.lock().resources
    }

    pub fn get_metrics(&self) -> SchedulerMetrics {
        let state = self.lock();
        let threshold = self.config.stall_threshold_ticks;

        let mut metrics = SchedulerMetrics {
            stalled_tasks: state
                .undispatched_ticks
                .values()
                .filter(|&&ticks| ticks > threshold)
                .count(),
            resource_utilization: ResourceUtilization::from_available(&state.resources),
            queues: state.queue_stats(),
            strategy: state.strategy.name().to_string(),
            ..Default::default()
        };
        metrics.record_tasks(state.tasks.values());
        metrics
    }

    /// One monitor tick: refresh resources and publish metrics.
    pub(super) fn monitor_tick(&self) {
        let Some(_guard) = TickGuard::enter(&self.ticks.monitor) else {
            debug!("Monitor tick still in flight, skipping");
            return;
        };
        let resources = self.refresh_resources();
        debug!(cpu = resources.cpu, memory = resources.memory, "Resources sampled");
        if self.config.enable_metrics {
            self.emit(SchedulerEvent::MetricsUpdated {
                metrics: Box::new(self.get_metrics()),
            });
        }
    }
}
