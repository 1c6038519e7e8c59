use std::collections::{BTreeSet, HashMap, VecDeque};

use chrono::Utc;
use indexmap::IndexMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::SchedulerError;
use crate::events::SchedulerEvent;
use crate::filter::TaskFilter;
use crate::task::{Task, TaskSpec, DEFAULT_PRIORITY, DEFAULT_QUEUE, MAX_PRIORITY, MIN_PRIORITY};
use crate::types::{TaskId, TaskStatus};

use super::execution::Effects;
use super::Scheduler;

impl Scheduler {
    /// Register a task and try to schedule it into its queue right away.
    ///
    /// Tasks whose dependencies aren't complete stay `Pending` until they
    /// are. Rejects duplicate ids, unknown queues and dependency cycles.
    pub fn add_task(&self, spec: TaskSpec) -> Result<TaskId, SchedulerError> {
        let id = spec.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let preferred_queue = spec.queue.unwrap_or_else(|| DEFAULT_QUEUE.to_string());

        let mut effects = Effects::default();
        {
            let mut guard = self.lock();
            let state = &mut *guard;

            if state.tasks.contains_key(&id) {
                return Err(SchedulerError::DuplicateTask(id));
            }
            if !state.queues.contains_key(&preferred_queue) {
                return Err(SchedulerError::InvalidQueue(preferred_queue));
            }
            for dep in &spec.dependencies {
                if dep != &id && !state.tasks.contains_key(dep) {
                    warn!(task_id = %id, dependency = %dep, "Dependency not yet registered");
                }
            }
            if let Err(e) = check_acyclic(&state.tasks, &id, &spec.dependencies) {
                warn!(task_id = %id, error = %e, "Rejected task");
                return Err(e);
            }

            let task = Task {
                id: id.clone(),
                name: spec.name,
                priority: spec
                    .priority
                    .unwrap_or(DEFAULT_PRIORITY)
                    .clamp(MIN_PRIORITY, MAX_PRIORITY),
                dependencies: spec.dependencies,
                estimated_duration: spec.estimated_duration,
                deadline: spec.deadline,
                retry_attempts: 0,
                max_retries: spec.max_retries.unwrap_or(self.config.max_retries),
                backoff_strategy: spec
                    .backoff_strategy
                    .unwrap_or(self.config.default_backoff_strategy),
                backoff_delay: spec
                    .backoff_delay
                    .unwrap_or_else(|| self.config.default_backoff_delay()),
                tags: spec.tags,
                metadata: spec.metadata,
                status: TaskStatus::Pending,
                created_at: Utc::now(),
                scheduled_at: None,
                started_at: None,
                completed_at: None,
                last_attempt_at: None,
                executor: None,
                result: None,
                error: None,
                resource_requirements: spec.resource_requirements,
                queue_id: None,
                preferred_queue: preferred_queue.clone(),
            };

            info!(
                task_id = %id,
                name = %task.name,
                priority = task.priority,
                dependencies = task.dependencies.len(),
                "Task added"
            );
            self.emit(SchedulerEvent::TaskAdded {
                task_id: id.clone(),
                name: task.name.clone(),
            });
            state.tasks.insert(id.clone(), task);

            self.schedule_locked(state, &id, &preferred_queue, &mut effects);
        }
        self.apply(effects);
        Ok(id)
    }

    /// Cancel (if still active) and forget a task. False if unknown.
    pub fn remove_task(&self, task_id: &str) -> bool {
        let mut effects = Effects::default();
        {
            let mut guard = self.lock();
            let state = &mut *guard;
            if !state.tasks.contains_key(task_id) {
                return false;
            }
            self.cancel_locked(state, task_id, &mut effects);

            for queue in state.queues.values_mut() {
                queue.remove(task_id);
            }
            state.contexts.remove(task_id);
            state.undispatched_ticks.remove(task_id);
            state.tasks.shift_remove(task_id);
            info!(task_id, "Task removed");
        }
        self.apply(effects);
        true
    }

    pub fn get_task(&self, task_id: &str) -> Option<Task> {
        self.lock().tasks.get(task_id).cloned()
    }

    /// Tasks matching the filter, in insertion order.
    pub fn get_tasks(&self, filter: &TaskFilter) -> Vec<Task> {
        let now = Utc::now();
        self.lock()
            .tasks
            .values()
            .filter(|t| filter.matches(t, now))
            .cloned()
            .collect()
    }

    /// Purge every terminal task. Returns how many were removed.
    pub fn clear_completed(&self) -> usize {
        let mut guard = self.lock();
        let state = &mut *guard;
        let terminal: Vec<TaskId> = state
            .tasks
            .values()
            .filter(|t| t.status.is_terminal())
            .map(|t| t.id.clone())
            .collect();

        for task_id in &terminal {
            state.tasks.shift_remove(task_id);
            state.undispatched_ticks.remove(task_id);
            for queue in state.queues.values_mut() {
                queue.remove(task_id);
            }
        }
        if !terminal.is_empty() {
            info!(cleared = terminal.len(), "Cleared terminal tasks");
        }
        terminal.len()
    }
}

/// Kahn's algorithm over the known tasks plus the candidate. The existing
/// graph is acyclic, so any leftover node is on or behind a cycle through
/// the candidate. Edges to unregistered ids are ignored.
fn check_acyclic(
    tasks: &IndexMap<TaskId, Task>,
    candidate: &str,
    candidate_deps: &BTreeSet<TaskId>,
) -> Result<(), SchedulerError> {
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    let nodes = tasks
        .values()
        .map(|t| (t.id.as_str(), &t.dependencies))
        .chain(std::iter::once((candidate, candidate_deps)));

    let known = |id: &str| id == candidate || tasks.contains_key(id);

    for (id, deps) in nodes {
        in_degree.entry(id).or_insert(0);
        for dep in deps.iter().filter(|d| known(d)) {
            dependents.entry(dep.as_str()).or_default().push(id);
            *in_degree.entry(id).or_insert(0) += 1;
        }
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&id, _)| id)
        .collect();
    let mut visited = 0;

    while let Some(node) = queue.pop_front() {
        visited += 1;
        if let Some(next) = dependents.get(node) {
            for &dep in next {
                if let Some(deg) = in_degree.get_mut(dep) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(dep);
                    }
                }
            }
        }
    }

    if visited != in_degree.len() {
        let mut in_cycle: Vec<&str> = in_degree
            .iter()
            .filter(|(_, &deg)| deg > 0)
            .map(|(&id, _)| id)
            .collect();
        in_cycle.sort_unstable();
        return Err(SchedulerError::CircularDependency(format!(
            "cycle detected among tasks: {}",
            in_cycle.join(" → ")
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::test_support::task;

    fn graph(edges: &[(&str, &[&str])]) -> IndexMap<TaskId, Task> {
        edges
            .iter()
            .map(|(id, deps)| {
                let mut t = task(id, 5);
                t.dependencies = deps.iter().map(|d| d.to_string()).collect();
                (id.to_string(), t)
            })
            .collect()
    }

    fn deps(ids: &[&str]) -> BTreeSet<TaskId> {
        ids.iter().map(|d| d.to_string()).collect()
    }

    #[test]
    fn chain_is_acyclic() {
        let tasks = graph(&[("a", &[]), ("b", &["a"])]);
        assert!(check_acyclic(&tasks, "c", &deps(&["b"])).is_ok());
    }

    #[test]
    fn self_dependency_rejected() {
        let tasks = graph(&[]);
        let err = check_acyclic(&tasks, "a", &deps(&["a"])).unwrap_err();
        assert!(matches!(err, SchedulerError::CircularDependency(_)));
    }

    #[test]
    fn closing_a_forward_reference_is_rejected() {
        // "a" waits on "b", which doesn't exist yet; "b" then waits on "a".
        let tasks = graph(&[("a", &["b"])]);
        let err = check_acyclic(&tasks, "b", &deps(&["a"])).unwrap_err();
        assert!(err.to_string().ends_with("a → b"), "{err}");
    }

    #[test]
    fn unknown_dependency_ignored() {
        let tasks = graph(&[("a", &[])]);
        assert!(check_acyclic(&tasks, "b", &deps(&["ghost", "a"])).is_ok());
    }
}
