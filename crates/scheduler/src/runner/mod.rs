//! The scheduling engine.
//!
//! Split into focused submodules:
//! - `core`: Scheduler handle, construction, queues, executors, accessors
//! - `registry_ops`: adding, removing, querying and purging tasks
//! - `scheduling`: scheduling into queues, dispatch, dependency unblocking
//! - `execution`: executor launch, completion, failure, retry, cancellation
//! - `monitor`: deadline alarms, resource sampling, metrics
//! - `lifecycle`: start/stop of the periodic tick loops

mod core;
mod execution;
mod lifecycle;
mod monitor;
mod registry_ops;
mod scheduling;

pub use self::core::Scheduler;
