use std::collections::HashMap;
use std::sync::Arc;

use super::executor::Executor;
use super::task::Task;

/// Manages registered executors and resolves which one runs a task.
///
/// Resolution is a linear scan in registration order. Callers only go
/// through [`ExecutorRegistry::resolve`], so an indexed lookup can replace
/// the scan without touching them.
pub struct ExecutorRegistry {
    executors: Vec<Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self {
            executors: Vec::new(),
        }
    }

    /// Register an executor. Returns error if the id is already registered.
    pub fn register(&mut self, executor: Arc<dyn Executor>) -> Result<(), RegistryError> {
        if self.get(executor.id()).is_some() {
            return Err(RegistryError::DuplicateId(executor.id().to_string()));
        }
        self.executors.push(executor);
        Ok(())
    }

    /// Remove an executor by id. Returns false if it wasn't registered.
    pub fn unregister(&mut self, id: &str) -> bool {
        let len = self.executors.len();
        self.executors.retain(|e| e.id() != id);
        self.executors.len() < len
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Executor>> {
        self.executors.iter().find(|e| e.id() == id).cloned()
    }

    /// Pick the executor for a task: highest priority among those whose
    /// predicate accepts it, ties going to the earliest registration.
    /// Executors already at their concurrency hint are skipped; if every
    /// capable executor is skipped the task is [`Resolution::Saturated`].
    pub fn resolve(&self, task: &Task, running: &HashMap<String, usize>) -> Resolution {
        let mut best: Option<&Arc<dyn Executor>> = None;
        let mut capable = false;
        for executor in &self.executors {
            if !executor.can_handle(task) {
                continue;
            }
            capable = true;
            if let Some(limit) = executor.concurrency() {
                if running.get(executor.id()).copied().unwrap_or(0) >= limit {
                    continue;
                }
            }
            // Strict comparison keeps the earlier registration on ties.
            if best.map_or(true, |b| executor.priority() > b.priority()) {
                best = Some(executor);
            }
        }
        match best {
            Some(executor) => Resolution::Ready(executor.clone()),
            None if capable => Resolution::Saturated,
            None => Resolution::Unmatched,
        }
    }

    /// Registered executor ids in registration order.
    pub fn ids(&self) -> Vec<String> {
        self.executors.iter().map(|e| e.id().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of [`ExecutorRegistry::resolve`].
pub enum Resolution {
    Ready(Arc<dyn Executor>),
    /// Some executor can handle the task but all of them are at capacity.
    Saturated,
    /// No registered executor accepts the task.
    Unmatched,
}

impl Resolution {
    pub fn executor(self) -> Option<Arc<dyn Executor>> {
        match self {
            Resolution::Ready(executor) => Some(executor),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("executor '{0}' is already registered")]
    DuplicateId(String),
}
