use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use super::SchedulingStrategy;
use crate::task::Task;
use crate::types::SystemResources;

/// Priority descending, then earliest deadline (tasks with a deadline ahead
/// of those without), then oldest first.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriorityFirst;

fn deadline_order(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl SchedulingStrategy for PriorityFirst {
    fn name(&self) -> &str {
        "priority-first"
    }

    fn schedule(&self, mut tasks: Vec<Task>, _resources: &SystemResources) -> Vec<Task> {
        tasks.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| deadline_order(a.deadline, b.deadline))
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        tasks
    }
}
