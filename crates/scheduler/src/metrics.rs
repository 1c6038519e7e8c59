use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::queue::QueueStats;
use super::task::Task;
use super::types::{SystemResources, TaskStatus};

/// Percent in use per resource dimension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ResourceUtilization {
    pub cpu: f64,
    pub memory: f64,
    pub gpu: f64,
    pub network: f64,
}

impl ResourceUtilization {
    /// `100 - available` per dimension.
    pub fn from_available(available: &SystemResources) -> Self {
        Self {
            cpu: 100.0 - available.cpu,
            memory: 100.0 - available.memory,
            gpu: 100.0 - available.gpu,
            network: 100.0 - available.network,
        }
    }
}

/// Engine snapshot returned by `Scheduler::get_metrics` and carried by the
/// `metrics-updated` event.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerMetrics {
    pub total_tasks: usize,
    pub pending: usize,
    pub scheduled: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub retrying: usize,
    /// completed / (completed + failed) × 100, 0 before any task settles.
    pub success_rate: f64,
    /// Mean of `completed_at - started_at` over completed tasks.
    pub average_execution_time: Duration,
    /// Scheduled tasks that have gone unmatched for too many dispatch ticks.
    pub stalled_tasks: usize,
    pub resource_utilization: ResourceUtilization,
    pub queues: Vec<QueueStats>,
    /// Name of the active strategy.
    pub strategy: String,
    pub collected_at: DateTime<Utc>,
}

impl Default for SchedulerMetrics {
    fn default() -> Self {
        Self {
            total_tasks: 0,
            pending: 0,
            scheduled: 0,
            running: 0,
            completed: 0,
            failed: 0,
            cancelled: 0,
            retrying: 0,
            success_rate: 0.0,
            average_execution_time: Duration::ZERO,
            stalled_tasks: 0,
            resource_utilization: ResourceUtilization::default(),
            queues: Vec::new(),
            strategy: String::new(),
            collected_at: Utc::now(),
        }
    }
}

impl SchedulerMetrics {
    /// Tally status counts and execution time over a set of tasks.
    pub fn record_tasks<'a>(&mut self, tasks: impl IntoIterator<Item = &'a Task>) {
        let mut total_exec = Duration::ZERO;
        let mut timed = 0u32;

        for task in tasks {
            self.total_tasks += 1;
            match task.status {
                TaskStatus::Pending => self.pending += 1,
                TaskStatus::Scheduled => self.scheduled += 1,
                TaskStatus::Running => self.running += 1,
                TaskStatus::Completed => {
                    self.completed += 1;
                    if let Some(elapsed) = task.execution_time() {
                        total_exec += elapsed;
                        timed += 1;
                    }
                }
                TaskStatus::Failed => self.failed += 1,
                TaskStatus::Cancelled => self.cancelled += 1,
                TaskStatus::Retrying => self.retrying += 1,
            }
        }

        self.success_rate = success_rate(self.completed, self.failed);
        self.average_execution_time = if timed == 0 {
            Duration::ZERO
        } else {
            total_exec / timed
        };
    }
}

/// Percentage of settled tasks that completed. Always within `[0, 100]`.
pub fn success_rate(completed: usize, failed: usize) -> f64 {
    let settled = completed + failed;
    if settled == 0 {
        0.0
    } else {
        completed as f64 / settled as f64 * 100.0
    }
}
