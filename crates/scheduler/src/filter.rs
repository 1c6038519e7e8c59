use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::Task;
use super::types::TaskStatus;

/// Filter for querying tasks. Every set field must match (conjunction);
/// the default filter matches everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFilter {
    /// Status must be one of these.
    pub status: Option<Vec<TaskStatus>>,
    pub min_priority: Option<u8>,
    pub max_priority: Option<u8>,
    /// At least one tag in common.
    pub tags: Option<Vec<String>>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub has_deadline: Option<bool>,
    /// Deadline passed and status is not `Completed`.
    pub overdue: Option<bool>,
}

impl TaskFilter {
    pub fn status(statuses: impl IntoIterator<Item = TaskStatus>) -> Self {
        Self {
            status: Some(statuses.into_iter().collect()),
            ..Default::default()
        }
    }

    pub fn matches(&self, task: &Task, now: DateTime<Utc>) -> bool {
        if let Some(statuses) = &self.status {
            if !statuses.contains(&task.status) {
                return false;
            }
        }
        if self.min_priority.is_some_and(|min| task.priority < min) {
            return false;
        }
        if self.max_priority.is_some_and(|max| task.priority > max) {
            return false;
        }
        if let Some(tags) = &self.tags {
            if !tags.iter().any(|t| task.tags.contains(t)) {
                return false;
            }
        }
        if self.created_after.is_some_and(|after| task.created_at < after) {
            return false;
        }
        if self.created_before.is_some_and(|before| task.created_at > before) {
            return false;
        }
        if let Some(has_deadline) = self.has_deadline {
            if task.deadline.is_some() != has_deadline {
                return false;
            }
        }
        if let Some(overdue) = self.overdue {
            if task.is_overdue(now) != overdue {
                return false;
            }
        }
        true
    }
}
