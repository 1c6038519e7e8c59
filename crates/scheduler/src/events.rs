//! Typed event surface and its broadcast fan-out.

use serde::Serialize;
use tokio::sync::broadcast;

use super::metrics::SchedulerMetrics;
use super::types::TaskId;

/// Everything the engine reports to the host application.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SchedulerEvent {
    TaskAdded { task_id: TaskId, name: String },
    TaskScheduled { task_id: TaskId, queue_id: String },
    TaskStarted { task_id: TaskId, executor_id: String, attempt: u32 },
    TaskCompleted { task_id: TaskId, execution_ms: Option<u64> },
    TaskFailed { task_id: TaskId, error: String, attempt: u32 },
    TaskCancelled { task_id: TaskId },
    /// `attempt` is the retry number about to run, `delay_ms` the backoff before it.
    TaskRetrying { task_id: TaskId, attempt: u32, delay_ms: u64 },
    TaskRetryExhausted { task_id: TaskId, attempts: u32 },
    NoExecutorFound { task_id: TaskId, queue_id: String },
    QueueCreated { queue_id: String },
    QueuePaused { queue_id: String },
    QueueResumed { queue_id: String },
    ExecutorRegistered { executor_id: String },
    ExecutorUnregistered { executor_id: String },
    TaskOverdue { task_id: TaskId, overdue_ms: u64 },
    TaskDeadlineWarning { task_id: TaskId, remaining_ms: u64 },
    MetricsUpdated { metrics: Box<SchedulerMetrics> },
    SchedulerStarted,
    SchedulerStopped,
}

impl SchedulerEvent {
    /// Kebab-case event name, identical to the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            SchedulerEvent::TaskAdded { .. } => "task-added",
            SchedulerEvent::TaskScheduled { .. } => "task-scheduled",
            SchedulerEvent::TaskStarted { .. } => "task-started",
            SchedulerEvent::TaskCompleted { .. } => "task-completed",
            SchedulerEvent::TaskFailed { .. } => "task-failed",
            SchedulerEvent::TaskCancelled { .. } => "task-cancelled",
            SchedulerEvent::TaskRetrying { .. } => "task-retrying",
            SchedulerEvent::TaskRetryExhausted { .. } => "task-retry-exhausted",
            SchedulerEvent::NoExecutorFound { .. } => "no-executor-found",
            SchedulerEvent::QueueCreated { .. } => "queue-created",
            SchedulerEvent::QueuePaused { .. } => "queue-paused",
            SchedulerEvent::QueueResumed { .. } => "queue-resumed",
            SchedulerEvent::ExecutorRegistered { .. } => "executor-registered",
            SchedulerEvent::ExecutorUnregistered { .. } => "executor-unregistered",
            SchedulerEvent::TaskOverdue { .. } => "task-overdue",
            SchedulerEvent::TaskDeadlineWarning { .. } => "task-deadline-warning",
            SchedulerEvent::MetricsUpdated { .. } => "metrics-updated",
            SchedulerEvent::SchedulerStarted => "scheduler-started",
            SchedulerEvent::SchedulerStopped => "scheduler-stopped",
        }
    }

    /// Task the event refers to, if any.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            SchedulerEvent::TaskAdded { task_id, .. }
            | SchedulerEvent::TaskScheduled { task_id, .. }
            | SchedulerEvent::TaskStarted { task_id, .. }
            | SchedulerEvent::TaskCompleted { task_id, .. }
            | SchedulerEvent::TaskFailed { task_id, .. }
            | SchedulerEvent::TaskCancelled { task_id }
            | SchedulerEvent::TaskRetrying { task_id, .. }
            | SchedulerEvent::TaskRetryExhausted { task_id, .. }
            | SchedulerEvent::NoExecutorFound { task_id, .. }
            | SchedulerEvent::TaskOverdue { task_id, .. }
            | SchedulerEvent::TaskDeadlineWarning { task_id, .. } => Some(task_id),
            _ => None,
        }
    }
}

/// Broadcast fan-out. Slow subscribers lag and lose the oldest events;
/// publishing never blocks the engine.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SchedulerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: SchedulerEvent) {
        // Err only means nobody is listening.
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
