use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use taskmill_core::SchedulerConfig;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use crate::error::SchedulerError;
use crate::events::{EventBus, SchedulerEvent};
use crate::executor::{CancelHandle, Executor};
use crate::queue::{QueueStats, TaskQueue};
use crate::registry::ExecutorRegistry;
use crate::resources::{ResourceProbe, RunningTaskProbe};
use crate::strategy::{self, SchedulingStrategy};
use crate::task::{Task, DEFAULT_QUEUE};
use crate::types::{SystemResources, TaskId, TaskStatus};

use super::execution::Effects;

/// Everything the engine mutates. Only ever touched with the lock held.
pub(super) struct EngineState {
    pub(super) tasks: IndexMap<TaskId, Task>,
    pub(super) queues: IndexMap<String, TaskQueue>,
    /// Cancellation handles of running attempts.
    pub(super) contexts: HashMap<TaskId, CancelHandle>,
    /// Source of attempt tokens; incremented on every dispatch.
    pub(super) next_token: u64,
    /// Dispatch ticks a scheduled task has gone without a matching executor.
    pub(super) undispatched_ticks: HashMap<TaskId, u32>,
    pub(super) resources: SystemResources,
    pub(super) executors: ExecutorRegistry,
    pub(super) strategy: Arc<dyn SchedulingStrategy>,
}

impl EngineState {
    pub(super) fn running_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|t| t.status == TaskStatus::Running)
            .count()
    }

    pub(super) fn queue_stats(&self) -> Vec<QueueStats> {
        self.queues
            .values()
            .map(|q| {
                let mut scheduled = 0;
                let mut running = 0;
                for task in q.tasks.iter().filter_map(|id| self.tasks.get(id)) {
                    match task.status {
                        TaskStatus::Scheduled => scheduled += 1,
                        TaskStatus::Running => running += 1,
                        _ => {}
                    }
                }
                QueueStats {
                    queue_id: q.id.clone(),
                    name: q.name.clone(),
                    concurrency: q.concurrency,
                    paused: q.paused,
                    priority: q.priority,
                    scheduled,
                    running,
                }
            })
            .collect()
    }
}

/// Set while a tick of the given kind is executing.
#[derive(Default)]
pub(super) struct TickFlags {
    pub(super) dispatch: AtomicBool,
    pub(super) deadline: AtomicBool,
    pub(super) monitor: AtomicBool,
}

/// Handle to a task scheduling engine.
///
/// Cheap to clone; all clones drive the same engine. Every public method may
/// be called from any thread, concurrently with the tick loops started by
/// [`Scheduler::start`]. Executor bodies are spawned on the ambient tokio
/// runtime and never run under the engine lock.
#[derive(Clone)]
pub struct Scheduler {
    pub(super) config: Arc<SchedulerConfig>,
    pub(super) state: Arc<Mutex<EngineState>>,
    pub(super) events: EventBus,
    pub(super) probe: Arc<dyn ResourceProbe>,
    pub(super) running: Arc<AtomicBool>,
    pub(super) shutdown: Arc<Mutex<Option<watch::Sender<bool>>>>,
    pub(super) ticks: Arc<TickFlags>,
}

impl Scheduler {
    /// Create an engine with the `default` queue and the configured strategy.
    pub fn new(config: SchedulerConfig) -> Self {
        let mut queues = IndexMap::new();
        queues.insert(
            DEFAULT_QUEUE.to_string(),
            TaskQueue::new(DEFAULT_QUEUE, "Default", config.default_concurrency, 0),
        );

        let state = EngineState {
            tasks: IndexMap::new(),
            queues,
            contexts: HashMap::new(),
            next_token: 0,
            undispatched_ticks: HashMap::new(),
            resources: SystemResources::default(),
            executors: ExecutorRegistry::new(),
            strategy: strategy::from_kind(config.strategy),
        };

        Self {
            events: EventBus::new(config.event_capacity),
            config: Arc::new(config),
            state: Arc::new(Mutex::new(state)),
            probe: Arc::new(RunningTaskProbe),
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Mutex::new(None)),
            ticks: Arc::new(TickFlags::default()),
        }
    }

    /// Replace the configured strategy with a custom instance.
    pub fn with_strategy(self, strategy: Arc<dyn SchedulingStrategy>) -> Self {
        self.lock().strategy = strategy;
        self
    }

    /// Register an initial set of executors.
    pub fn with_executors(
        self,
        executors: impl IntoIterator<Item = Arc<dyn Executor>>,
    ) -> Result<Self, SchedulerError> {
        for executor in executors {
            self.register_executor(executor)?;
        }
        Ok(self)
    }

    /// Replace the running-task heuristic with real telemetry.
    pub fn with_resource_probe(mut self, probe: Arc<dyn ResourceProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub(super) fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn emit(&self, event: SchedulerEvent) {
        self.events.publish(event);
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }

    // ── Queues ──────────────────────────────────────────────────────

    /// Create a queue. Returns false if the id is taken.
    pub fn create_queue(
        &self,
        id: impl Into<String>,
        name: impl Into<String>,
        concurrency: usize,
        priority: i32,
    ) -> bool {
        let id = id.into();
        let mut state = self.lock();
        if state.queues.contains_key(&id) {
            warn!(queue = %id, "Queue already exists");
            return false;
        }
        state
            .queues
            .insert(id.clone(), TaskQueue::new(id.clone(), name, concurrency, priority));
        info!(queue = %id, concurrency, priority, "Queue created");
        self.emit(SchedulerEvent::QueueCreated { queue_id: id });
        true
    }

    /// Stop dispatching from a queue. Running tasks are left alone.
    pub fn pause_queue(&self, id: &str) -> bool {
        let mut state = self.lock();
        let Some(queue) = state.queues.get_mut(id) else {
            return false;
        };
        queue.paused = true;
        info!(queue = %id, "Queue paused");
        self.emit(SchedulerEvent::QueuePaused {
            queue_id: id.to_string(),
        });
        true
    }

    /// Unpause a queue and dispatch from it right away.
    pub fn resume_queue(&self, id: &str) -> bool {
        let mut effects = Effects::default();
        {
            let mut guard = self.lock();
            let state = &mut *guard;
            let Some(queue) = state.queues.get_mut(id) else {
                return false;
            };
            queue.paused = false;
            info!(queue = %id, "Queue resumed");
            self.emit(SchedulerEvent::QueueResumed {
                queue_id: id.to_string(),
            });
            self.dispatch_queue(state, id, &mut effects);
        }
        self.apply(effects);
        true
    }

    pub fn queue_stats(&self) -> Vec<QueueStats> {
        self.lock().queue_stats()
    }

    // ── Executors ───────────────────────────────────────────────────

    /// Register an executor and offer it every waiting task.
    pub fn register_executor(&self, executor: Arc<dyn Executor>) -> Result<(), SchedulerError> {
        let executor_id = executor.id().to_string();
        let mut effects = Effects::default();
        {
            let mut guard = self.lock();
            let state = &mut *guard;
            state.executors.register(executor)?;
            info!(executor = %executor_id, "Executor registered");
            self.emit(SchedulerEvent::ExecutorRegistered { executor_id });
            self.dispatch_all(state, &mut effects);
        }
        self.apply(effects);
        Ok(())
    }

    /// Unregister an executor. Attempts it is already running carry on.
    pub fn unregister_executor(&self, id: &str) -> bool {
        let removed = self.lock().executors.unregister(id);
        if removed {
            info!(executor = %id, "Executor unregistered");
            self.emit(SchedulerEvent::ExecutorUnregistered {
                executor_id: id.to_string(),
            });
        }
        removed
    }

    pub fn executor_ids(&self) -> Vec<String> {
        self.lock().executors.ids()
    }

    // ── Strategy ────────────────────────────────────────────────────

    /// Swap the active strategy. Takes effect on the next dispatch.
    pub fn set_strategy(&self, strategy: Arc<dyn SchedulingStrategy>) {
        info!(strategy = strategy.name(), "Strategy changed");
        self.lock().strategy = strategy;
    }

    pub fn strategy_name(&self) -> String {
        self.lock().strategy.name().to_string()
    }
}
