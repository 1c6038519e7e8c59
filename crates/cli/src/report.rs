use std::collections::BTreeMap;

use serde::Serialize;
use taskmill_scheduler::{SchedulerMetrics, Task, TaskStatus};

/// Final state of a workload run.
#[derive(Debug, Serialize)]
pub struct Report {
    pub metrics: SchedulerMetrics,
    pub tasks: Vec<Task>,
    /// Events seen per kind.
    pub events: BTreeMap<String, usize>,
}

impl Report {
    pub fn new(metrics: SchedulerMetrics, tasks: Vec<Task>, events: BTreeMap<String, usize>) -> Self {
        Self {
            metrics,
            tasks,
            events,
        }
    }

    /// Tasks still pending once nothing else can run.
    pub fn blocked(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| t.status == TaskStatus::Pending)
    }

    pub fn print_summary(&self) {
        println!();
        println!("{:<20} {:<10} {:>8} {:<12} {}", "TASK", "STATUS", "ATTEMPTS", "QUEUE", "DETAIL");
        for task in &self.tasks {
            let attempts = if task.started_at.is_some() {
                task.retry_attempts + 1
            } else {
                0
            };
            let detail = match task.status {
                TaskStatus::Failed => task.error.clone().unwrap_or_default(),
                TaskStatus::Completed => task
                    .execution_time()
                    .map(|d| format!("{}ms", d.as_millis()))
                    .unwrap_or_default(),
                TaskStatus::Pending => {
                    let deps: Vec<&str> = task.dependencies.iter().map(String::as_str).collect();
                    format!("waiting on {}", deps.join(", "))
                }
                _ => String::new(),
            };
            println!(
                "{:<20} {:<10} {:>8} {:<12} {}",
                task.id,
                task.status,
                attempts,
                task.target_queue(),
                detail
            );
        }

        let m = &self.metrics;
        println!();
        println!(
            "total={} completed={} failed={} cancelled={} pending={} scheduled={}",
            m.total_tasks, m.completed, m.failed, m.cancelled, m.pending, m.scheduled
        );
        println!(
            "success rate {:.1}%, average execution {}ms, strategy {}",
            m.success_rate,
            m.average_execution_time.as_millis(),
            m.strategy
        );
        let blocked = self.blocked().count();
        if blocked > 0 {
            println!("{blocked} task(s) blocked on dependencies that never completed");
        }
        if !self.events.is_empty() {
            let events: Vec<String> = self.events.iter().map(|(k, v)| format!("{k}={v}")).collect();
            println!("events: {}", events.join(" "));
        }
    }
}
