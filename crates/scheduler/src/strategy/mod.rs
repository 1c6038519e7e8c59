//! Pluggable dispatch ordering.
//!
//! A strategy receives the queue's currently schedulable tasks plus the last
//! [`SystemResources`] snapshot and returns them in dispatch order. The
//! engine hands free slots to the front of that order.

mod fair_share;
mod priority_first;
mod shortest_job;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use taskmill_core::StrategyKind;

use super::task::Task;
use super::types::SystemResources;

pub use fair_share::FairShare;
pub use priority_first::PriorityFirst;
pub use shortest_job::{ShortestJobFirst, DEFAULT_ESTIMATE};

/// Orders schedulable tasks for dispatch.
pub trait SchedulingStrategy: Send + Sync {
    /// Name for logging and metrics.
    fn name(&self) -> &str;

    /// Return `tasks` in dispatch order. Must not drop or duplicate tasks.
    fn schedule(&self, tasks: Vec<Task>, resources: &SystemResources) -> Vec<Task>;

    /// Called by the engine each time a task is handed to an executor.
    fn record_dispatch(&self, _task: &Task, _executor_id: &str, _at: DateTime<Utc>) {}
}

/// Instantiate the built-in strategy selected by configuration.
pub fn from_kind(kind: StrategyKind) -> Arc<dyn SchedulingStrategy> {
    match kind {
        StrategyKind::PriorityFirst => Arc::new(PriorityFirst),
        StrategyKind::ShortestJobFirst => Arc::new(ShortestJobFirst),
        StrategyKind::FairShare => Arc::new(FairShare::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_kind_names() {
        assert_eq!(from_kind(StrategyKind::PriorityFirst).name(), "priority-first");
        assert_eq!(from_kind(StrategyKind::ShortestJobFirst).name(), "shortest-job-first");
        assert_eq!(from_kind(StrategyKind::FairShare).name(), "fair-share");
    }
}
