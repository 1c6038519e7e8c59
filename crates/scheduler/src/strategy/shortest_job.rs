use std::time::Duration;

use super::SchedulingStrategy;
use crate::task::Task;
use crate::types::SystemResources;

/// Estimate assumed for tasks that don't declare one.
pub const DEFAULT_ESTIMATE: Duration = Duration::from_secs(60);

/// Shortest estimated duration first, ties by priority descending.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShortestJobFirst;

impl SchedulingStrategy for ShortestJobFirst {
    fn name(&self) -> &str {
        "shortest-job-first"
    }

    fn schedule(&self, mut tasks: Vec<Task>, _resources: &SystemResources) -> Vec<Task> {
        tasks.sort_by(|a, b| {
            let a_est = a.estimated_duration.unwrap_or(DEFAULT_ESTIMATE);
            let b_est = b.estimated_duration.unwrap_or(DEFAULT_ESTIMATE);
            a_est.cmp(&b_est).then_with(|| b.priority.cmp(&a.priority))
        });
        tasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::test_support::task;

    #[test]
    fn shortest_first_with_default_estimate() {
        let mut quick = task("quick", 1);
        quick.estimated_duration = Some(Duration::from_secs(5));
        let mut slow = task("slow", 10);
        slow.estimated_duration = Some(Duration::from_secs(120));
        let unknown = task("unknown", 5);

        let ordered = ShortestJobFirst.schedule(vec![slow, unknown, quick], &SystemResources::default());
        let ids: Vec<&str> = ordered.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["quick", "unknown", "slow"]);
    }

    #[test]
    fn equal_estimates_fall_back_to_priority() {
        let mut low = task("low", 2);
        low.estimated_duration = Some(DEFAULT_ESTIMATE);
        let high = task("high", 9);

        let ordered = ShortestJobFirst.schedule(vec![low, high], &SystemResources::default());
        assert_eq!(ordered[0].id, "high");
    }
}
