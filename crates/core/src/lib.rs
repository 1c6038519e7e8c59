pub mod backoff;
pub mod config;
pub mod error;

pub use backoff::BackoffStrategy;
pub use config::{load_dotenv, SchedulerConfig, StrategyKind};
pub use error::*;
