use thiserror::Error;

use super::registry::RegistryError;

/// Errors returned by scheduler operations that can genuinely be rejected.
///
/// Lookups of unknown ids are not errors; those operations return `false`.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("task '{0}' already exists")]
    DuplicateTask(String),

    #[error("circular dependency: {0}")]
    CircularDependency(String),

    #[error("queue '{0}' does not exist")]
    InvalidQueue(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("scheduler is already running")]
    AlreadyRunning,

    #[error("scheduler is not running")]
    NotRunning,

    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),
}
