use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{BackoffStrategy, Metadata, ResourceRequirements, TaskId, TaskStatus};

/// Lowest accepted priority.
pub const MIN_PRIORITY: u8 = 1;
/// Highest accepted priority.
pub const MAX_PRIORITY: u8 = 10;
/// Priority assigned when the caller doesn't set one.
pub const DEFAULT_PRIORITY: u8 = 5;

/// Name of the queue created with every scheduler.
pub const DEFAULT_QUEUE: &str = "default";

/// A schedulable unit of work and its full lifecycle record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    /// 1-10, 10 highest.
    pub priority: u8,
    /// Tasks that must be `Completed` before this one may leave `Pending`.
    pub dependencies: BTreeSet<TaskId>,
    pub estimated_duration: Option<Duration>,
    /// Advisory only: crossing it raises alarms, never cancels.
    pub deadline: Option<DateTime<Utc>>,
    /// Retries performed so far (the initial attempt is not a retry).
    pub retry_attempts: u32,
    pub max_retries: u32,
    pub backoff_strategy: BackoffStrategy,
    /// Base delay fed into the backoff formula.
    pub backoff_delay: Duration,
    pub tags: BTreeSet<String>,
    pub metadata: Metadata,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Executor that ran (or is running) the latest attempt.
    pub executor: Option<String>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub resource_requirements: Option<ResourceRequirements>,
    /// Queue the task was last scheduled into.
    pub queue_id: Option<String>,
    /// Queue used when the engine schedules the task on its own.
    pub preferred_queue: String,
}

impl Task {
    /// Delay before the next retry, computed from the current `retry_attempts`.
    pub fn backoff_delay(&self) -> Duration {
        self.backoff_strategy
            .delay(self.backoff_delay, self.retry_attempts)
    }

    /// Deadline has passed and the task hasn't completed.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status != TaskStatus::Completed && self.deadline.is_some_and(|d| d < now)
    }

    /// Whether the retry budget still allows another attempt.
    pub fn can_retry(&self) -> bool {
        self.retry_attempts < self.max_retries
    }

    /// Wall time of the latest attempt, when both ends are known.
    pub fn execution_time(&self) -> Option<Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => (end - start).to_std().ok(),
            _ => None,
        }
    }

    /// Queue the engine would schedule this task into right now.
    pub fn target_queue(&self) -> &str {
        self.queue_id.as_deref().unwrap_or(&self.preferred_queue)
    }
}

/// Input for [`crate::Scheduler::add_task`]. Unset fields take engine defaults.
#[derive(Debug, Clone, Default)]
pub struct TaskSpec {
    pub id: Option<TaskId>,
    pub name: String,
    pub priority: Option<u8>,
    pub dependencies: BTreeSet<TaskId>,
    pub estimated_duration: Option<Duration>,
    pub deadline: Option<DateTime<Utc>>,
    pub max_retries: Option<u32>,
    pub backoff_strategy: Option<BackoffStrategy>,
    pub backoff_delay: Option<Duration>,
    pub tags: BTreeSet<String>,
    pub metadata: Metadata,
    pub resource_requirements: Option<ResourceRequirements>,
    pub queue: Option<String>,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn depends_on(mut self, id: impl Into<TaskId>) -> Self {
        self.dependencies.insert(id.into());
        self
    }

    pub fn estimated_duration(mut self, duration: Duration) -> Self {
        self.estimated_duration = Some(duration);
        self
    }

    pub fn deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn backoff(mut self, strategy: BackoffStrategy, base: Duration) -> Self {
        self.backoff_strategy = Some(strategy);
        self.backoff_delay = Some(base);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn resources(mut self, requirements: ResourceRequirements) -> Self {
        self.resource_requirements = Some(requirements);
        self
    }

    /// Queue used for automatic scheduling (defaults to `default`).
    pub fn queue(mut self, queue_id: impl Into<String>) -> Self {
        self.queue = Some(queue_id.into());
        self
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Bare task for strategy and filter tests.
    pub fn task(id: &str, priority: u8) -> Task {
        Task {
            id: id.to_string(),
            name: id.to_string(),
            priority,
            dependencies: BTreeSet::new(),
            estimated_duration: None,
            deadline: None,
            retry_attempts: 0,
            max_retries: 3,
            backoff_strategy: BackoffStrategy::Exponential,
            backoff_delay: Duration::from_millis(1000),
            tags: BTreeSet::new(),
            metadata: Metadata::new(),
            status: TaskStatus::Scheduled,
            created_at: Utc::now(),
            scheduled_at: None,
            started_at: None,
            completed_at: None,
            last_attempt_at: None,
            executor: None,
            result: None,
            error: None,
            resource_requirements: None,
            queue_id: None,
            preferred_queue: DEFAULT_QUEUE.to_string(),
        }
    }
}
