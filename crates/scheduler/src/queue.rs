use serde::{Deserialize, Serialize};

use super::types::TaskId;

/// A named pool with its own concurrency ceiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskQueue {
    pub id: String,
    pub name: String,
    /// Max tasks from this queue running at once.
    pub concurrency: usize,
    /// Paused queues receive no new dispatches; running tasks are left alone.
    pub paused: bool,
    /// Higher-priority queues are dispatched first on each tick.
    pub priority: i32,
    /// Not-yet-terminal tasks currently scheduled or running from this queue.
    pub tasks: Vec<TaskId>,
}

impl TaskQueue {
    pub fn new(id: impl Into<String>, name: impl Into<String>, concurrency: usize, priority: i32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            concurrency,
            paused: false,
            priority,
            tasks: Vec::new(),
        }
    }

    /// Append a task unless it is already listed.
    pub fn push(&mut self, task_id: &str) {
        if !self.contains(task_id) {
            self.tasks.push(task_id.to_string());
        }
    }

    /// Returns true if the task was listed.
    pub fn remove(&mut self, task_id: &str) -> bool {
        let len = self.tasks.len();
        self.tasks.retain(|t| t != task_id);
        self.tasks.len() < len
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.tasks.iter().any(|t| t == task_id)
    }
}

/// Point-in-time view of one queue.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub queue_id: String,
    pub name: String,
    pub concurrency: usize,
    pub paused: bool,
    pub priority: i32,
    /// Tasks waiting for a slot.
    pub scheduled: usize,
    pub running: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_is_idempotent() {
        let mut q = TaskQueue::new("q", "Queue", 2, 0);
        q.push("a");
        q.push("a");
        q.push("b");
        assert_eq!(q.tasks, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn remove_reports_membership() {
        let mut q = TaskQueue::new("q", "Queue", 2, 0);
        q.push("a");
        assert!(q.remove("a"));
        assert!(!q.remove("a"));
        assert!(q.tasks.is_empty());
    }
}
