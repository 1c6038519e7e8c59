//! Executor contract and the per-attempt execution context.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::task::Task;
use super::types::TaskId;

/// Error type executors return to signal a failed attempt.
///
/// Whatever the variant, the engine stores it stringified in `Task::error`
/// and drives the retry policy from it.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("execution failed: {0}")]
    Failed(String),
    #[error("execution cancelled")]
    Cancelled,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A pluggable unit capable of running tasks that match its predicate.
///
/// Executors are registered and unregistered by the host application; the
/// engine never constructs one.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Unique id used for registration and reporting.
    fn id(&self) -> &str;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        self.id()
    }

    /// Among executors that can handle a task, the highest priority wins.
    fn priority(&self) -> i32 {
        0
    }

    /// Max tasks this executor runs at once. `None` means unbounded.
    fn concurrency(&self) -> Option<usize> {
        None
    }

    /// Capability predicate.
    fn can_handle(&self, task: &Task) -> bool;

    /// Run one attempt. Cancellation is cooperative: long-running bodies
    /// should watch [`ExecutionContext::is_cancelled`] or await
    /// [`ExecutionContext::cancelled`].
    async fn execute(
        &self,
        task: Task,
        ctx: ExecutionContext,
    ) -> Result<serde_json::Value, ExecutionError>;
}

/// Per-attempt handle passed to the executor. Created fresh for every
/// attempt (retries included) and discarded when the attempt ends.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub task_id: TaskId,
    /// 1 for the initial attempt, `retry_attempts + 1` afterwards.
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    cancel_rx: watch::Receiver<bool>,
}

/// Engine-side half of an [`ExecutionContext`].
#[derive(Debug)]
pub(crate) struct CancelHandle {
    pub(crate) attempt: u32,
    /// Engine-wide unique id of the attempt. Attempt numbers repeat when a
    /// task id is removed and added again; tokens never do.
    pub(crate) token: u64,
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub(crate) fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl ExecutionContext {
    pub(crate) fn new(task_id: TaskId, attempt: u32, token: u64) -> (Self, CancelHandle) {
        let (tx, cancel_rx) = watch::channel(false);
        let ctx = Self {
            task_id,
            attempt,
            started_at: Utc::now(),
            cancel_rx,
        };
        (ctx, CancelHandle { attempt, token, tx })
    }

    /// Whether the engine has asked this attempt to stop.
    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// Resolves once the attempt is cancelled. Never resolves otherwise.
    pub async fn cancelled(&self) {
        let mut rx = self.cancel_rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            // Handle dropped without cancelling: the attempt is already settled.
            std::future::pending::<()>().await;
        }
    }
}
