use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};

use super::SchedulingStrategy;
use crate::task::Task;
use crate::types::SystemResources;

/// Key used for tasks that have never been bound to an executor.
const UNASSIGNED: &str = "default";

/// Favors the executor that has been idle longest.
///
/// Each task is keyed by the executor that last ran it (`"default"` if none).
/// Keys never dispatched sort first, then oldest last-dispatch time, then
/// priority descending. The engine feeds the table through
/// [`SchedulingStrategy::record_dispatch`].
#[derive(Debug, Default)]
pub struct FairShare {
    last_dispatch: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl FairShare {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last dispatch time recorded for an executor key.
    pub fn last_dispatch(&self, executor_id: &str) -> Option<DateTime<Utc>> {
        self.last_dispatch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(executor_id)
            .copied()
    }
}

impl SchedulingStrategy for FairShare {
    fn name(&self) -> &str {
        "fair-share"
    }

    fn schedule(&self, mut tasks: Vec<Task>, _resources: &SystemResources) -> Vec<Task> {
        let table = self
            .last_dispatch
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let key = |t: &Task| -> Option<DateTime<Utc>> {
            table
                .get(t.executor.as_deref().unwrap_or(UNASSIGNED))
                .copied()
        };
        // `None < Some(_)`, so never-dispatched keys lead.
        tasks.sort_by(|a, b| {
            key(a)
                .cmp(&key(b))
                .then_with(|| b.priority.cmp(&a.priority))
        });
        drop(table);
        tasks
    }

    fn record_dispatch(&self, _task: &Task, executor_id: &str, at: DateTime<Utc>) {
        self.last_dispatch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(executor_id.to_string(), at);
    }
}
