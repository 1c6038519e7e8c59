use std::time::Duration;

use async_trait::async_trait;
use taskmill_scheduler::{ExecutionContext, ExecutionError, Executor, Task};

/// Metadata key holding how many attempts should fail.
pub const FAIL_ATTEMPTS_KEY: &str = "fail_attempts";

/// Run time for tasks without an estimate.
const DEFAULT_RUN_TIME: Duration = Duration::from_millis(100);

/// Stands in for real work: sleeps for the task's estimated duration and
/// fails the first `fail_attempts` attempts.
pub struct SimulatedExecutor {
    time_scale: f64,
}

impl SimulatedExecutor {
    pub fn new(time_scale: f64) -> Self {
        Self {
            time_scale: time_scale.max(0.0),
        }
    }

    fn run_time(&self, task: &Task) -> Duration {
        task.estimated_duration
            .unwrap_or(DEFAULT_RUN_TIME)
            .mul_f64(self.time_scale)
    }
}

fn fail_attempts(task: &Task) -> u64 {
    task.metadata
        .get(FAIL_ATTEMPTS_KEY)
        .and_then(|v| v.as_u64())
        .unwrap_or(0)
}

#[async_trait]
impl Executor for SimulatedExecutor {
    fn id(&self) -> &str {
        "simulated"
    }

    fn name(&self) -> &str {
        "Simulated executor"
    }

    fn can_handle(&self, _task: &Task) -> bool {
        true
    }

    async fn execute(
        &self,
        task: Task,
        ctx: ExecutionContext,
    ) -> Result<serde_json::Value, ExecutionError> {
        tokio::select! {
            _ = tokio::time::sleep(self.run_time(&task)) => {}
            _ = ctx.cancelled() => return Err(ExecutionError::Cancelled),
        }

        if u64::from(ctx.attempt) <= fail_attempts(&task) {
            return Err(ExecutionError::Failed(format!(
                "simulated failure on attempt {}",
                ctx.attempt
            )));
        }
        Ok(serde_json::json!({
            "task": task.id,
            "attempt": ctx.attempt,
        }))
    }
}
