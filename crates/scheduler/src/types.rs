use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use taskmill_core::BackoffStrategy;

/// Unique identifier for a task. Caller-supplied or a generated UUID.
pub type TaskId = String;

/// Application-defined key/value passthrough. The engine never interprets it.
pub type Metadata = HashMap<String, serde_json::Value>;

/// Lifecycle state of a task.
///
/// ```text
/// pending → scheduled → running → completed | failed | cancelled
/// failed → retrying → pending → scheduled      (bounded by max_retries)
/// pending | scheduled | running | retrying → cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    Scheduled,
    Running,
    Completed,
    Failed,
    Cancelled,
    /// Waiting out the backoff delay before re-entering `Pending`.
    Retrying,
}

impl TaskStatus {
    /// Terminal states never transition again on their own.
    ///
    /// `Failed` is only ever left at rest once its retry budget is spent;
    /// a retryable failure moves straight on to `Retrying`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Scheduled => "scheduled",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Retrying => "retrying",
        };
        f.pad(s)
    }
}

/// Resource hints a task declares. Not enforced by the engine; available to custom strategies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    /// CPU share in percent.
    pub cpu: Option<f64>,
    /// Memory in megabytes.
    pub memory: Option<f64>,
    pub gpu: Option<bool>,
    pub network: Option<bool>,
}

/// Snapshot of available capacity, each dimension in percent (0-100).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SystemResources {
    pub cpu: f64,
    pub memory: f64,
    pub gpu: f64,
    pub network: f64,
}

impl Default for SystemResources {
    fn default() -> Self {
        Self {
            cpu: 100.0,
            memory: 100.0,
            gpu: 100.0,
            network: 100.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Scheduled.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(!TaskStatus::Retrying.is_terminal());
    }

    #[test]
    fn status_serializes_kebab_case() {
        let json = serde_json::to_string(&TaskStatus::Retrying).unwrap();
        assert_eq!(json, "\"retrying\"");
        assert_eq!(TaskStatus::Scheduled.to_string(), "scheduled");
    }

    #[test]
    fn resources_default_fully_available() {
        let r = SystemResources::default();
        assert_eq!(r.cpu, 100.0);
        assert_eq!(r.network, 100.0);
    }
}
