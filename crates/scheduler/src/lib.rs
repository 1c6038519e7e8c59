//! In-process task scheduling engine.
//!
//! Tasks are added to a [`Scheduler`], scheduled into named queues once their
//! dependencies complete, and dispatched to registered [`Executor`]s in the
//! order chosen by the active [`SchedulingStrategy`]. Failures are retried
//! with per-task backoff; deadlines raise alarms; every transition is
//! published as a [`SchedulerEvent`].

pub mod error;
pub mod events;
pub mod executor;
pub mod filter;
pub mod metrics;
pub mod queue;
pub mod registry;
pub mod resources;
pub mod runner;
pub mod strategy;
pub mod task;
pub mod types;

pub use error::SchedulerError;
pub use events::{EventBus, SchedulerEvent};
pub use executor::{ExecutionContext, ExecutionError, Executor};
pub use filter::TaskFilter;
pub use metrics::{ResourceUtilization, SchedulerMetrics};
pub use queue::{QueueStats, TaskQueue};
pub use registry::{ExecutorRegistry, RegistryError, Resolution};
pub use resources::{ResourceProbe, RunningTaskProbe};
pub use runner::Scheduler;
pub use strategy::{FairShare, PriorityFirst, SchedulingStrategy, ShortestJobFirst};
pub use task::{Task, TaskSpec, DEFAULT_QUEUE};
pub use taskmill_core::{SchedulerConfig, StrategyKind};
pub use types::{
    BackoffStrategy, Metadata, ResourceRequirements, SystemResources, TaskId, TaskStatus,
};
