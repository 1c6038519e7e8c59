//! TOML workload files: queues to create and tasks to submit.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use taskmill_scheduler::{BackoffStrategy, TaskSpec};

use crate::simulated::FAIL_ATTEMPTS_KEY;

#[derive(Debug, Clone, Deserialize)]
pub struct Workload {
    #[serde(default)]
    pub queues: Vec<QueueDef>,
    #[serde(default)]
    pub tasks: Vec<TaskDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueDef {
    pub id: String,
    pub name: Option<String>,
    #[serde(default = "default_queue_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub priority: i32,
    /// Create the queue paused.
    #[serde(default)]
    pub paused: bool,
}

fn default_queue_concurrency() -> usize {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskDef {
    pub id: String,
    pub name: Option<String>,
    pub priority: Option<u8>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Simulated run time.
    pub estimated_ms: Option<u64>,
    /// Deadline relative to submission, negative for already overdue.
    pub deadline_secs: Option<i64>,
    pub max_retries: Option<u32>,
    pub backoff: Option<BackoffStrategy>,
    pub backoff_ms: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub queue: Option<String>,
    /// The simulated executor fails this many attempts before succeeding.
    #[serde(default)]
    pub fail_attempts: u32,
}

impl Workload {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("failed to parse workload")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read workload {}", path.display()))?;
        Self::from_toml(&content)
    }
}

impl TaskDef {
    /// Build the engine input. Deadlines are anchored at `now`.
    pub fn to_spec(&self, now: DateTime<Utc>) -> TaskSpec {
        let mut spec = TaskSpec::new(self.name.clone().unwrap_or_else(|| self.id.clone()))
            .with_id(self.id.clone())
            .metadata(FAIL_ATTEMPTS_KEY, serde_json::json!(self.fail_attempts));

        spec.priority = self.priority;
        spec.max_retries = self.max_retries;
        spec.backoff_strategy = self.backoff;
        spec.backoff_delay = self.backoff_ms.map(Duration::from_millis);
        spec.estimated_duration = self.estimated_ms.map(Duration::from_millis);
        spec.deadline = self
            .deadline_secs
            .map(|secs| now + chrono::Duration::seconds(secs));
        spec.queue = self.queue.clone();
        spec.dependencies = self.depends_on.iter().cloned().collect();
        spec.tags = self.tags.iter().cloned().collect();
        spec
    }
}
