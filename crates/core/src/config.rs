use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::BackoffStrategy;
use crate::error::CoreError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Prefix shared by every environment override.
const ENV_PREFIX: &str = "TASKMILL";

fn env_opt(key: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{key}"))
        .ok()
        .filter(|s| !s.is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env_opt(key).and_then(|v| match v.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(key = %format!("{ENV_PREFIX}_{key}"), value = %v, "Ignoring unparsable env override");
            None
        }
    })
}

// ── Strategy selection ────────────────────────────────────────

/// Built-in scheduling strategy selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    #[default]
    PriorityFirst,
    ShortestJobFirst,
    FairShare,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::PriorityFirst => write!(f, "priority-first"),
            StrategyKind::ShortestJobFirst => write!(f, "shortest-job-first"),
            StrategyKind::FairShare => write!(f, "fair-share"),
        }
    }
}

impl FromStr for StrategyKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "priority-first" | "priority" => Ok(StrategyKind::PriorityFirst),
            "shortest-job-first" | "sjf" => Ok(StrategyKind::ShortestJobFirst),
            "fair-share" | "fair" => Ok(StrategyKind::FairShare),
            other => Err(CoreError::Config(format!(
                "unknown strategy '{other}', expected priority-first, shortest-job-first or fair-share"
            ))),
        }
    }
}

// ── Engine config ─────────────────────────────────────────────

/// Engine configuration, typically parsed from TOML and overridden by `TASKMILL_*` env vars.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Concurrency ceiling of the `default` queue.
    #[serde(default = "default_concurrency")]
    pub default_concurrency: usize,
    /// Retry budget applied to tasks that don't set their own.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base backoff delay in milliseconds.
    #[serde(default = "default_backoff_delay_ms")]
    pub default_backoff_delay_ms: u64,
    #[serde(default)]
    pub default_backoff_strategy: BackoffStrategy,
    /// Emit `metrics-updated` on every resource tick.
    #[serde(default = "default_true")]
    pub enable_metrics: bool,
    #[serde(default = "default_true")]
    pub enable_deadline_checking: bool,
    /// Dispatch tick period in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_deadline_check_interval_ms")]
    pub deadline_check_interval_ms: u64,
    #[serde(default = "default_resource_monitoring_interval_ms")]
    pub resource_monitoring_interval_ms: u64,
    /// Remaining time under which `task-deadline-warning` fires.
    #[serde(default = "default_deadline_warning_ms")]
    pub deadline_warning_ms: u64,
    /// Dispatch ticks a task may stay scheduled-but-undispatched before it counts as stalled.
    #[serde(default = "default_stall_threshold_ticks")]
    pub stall_threshold_ticks: u32,
    /// Buffered events per subscriber before slow subscribers start lagging.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default)]
    pub strategy: StrategyKind,
}

fn default_concurrency() -> usize { 5 }
fn default_max_retries() -> u32 { 3 }
fn default_backoff_delay_ms() -> u64 { 1_000 }
fn default_true() -> bool { true }
fn default_tick_interval_ms() -> u64 { 1_000 }
fn default_deadline_check_interval_ms() -> u64 { 30_000 }
fn default_resource_monitoring_interval_ms() -> u64 { 5_000 }
fn default_deadline_warning_ms() -> u64 { 300_000 }
fn default_stall_threshold_ticks() -> u32 { 30 }
fn default_event_capacity() -> usize { 1024 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            default_backoff_delay_ms: default_backoff_delay_ms(),
            default_backoff_strategy: BackoffStrategy::default(),
            enable_metrics: true,
            enable_deadline_checking: true,
            tick_interval_ms: default_tick_interval_ms(),
            deadline_check_interval_ms: default_deadline_check_interval_ms(),
            resource_monitoring_interval_ms: default_resource_monitoring_interval_ms(),
            deadline_warning_ms: default_deadline_warning_ms(),
            stall_threshold_ticks: default_stall_threshold_ticks(),
            event_capacity: default_event_capacity(),
            strategy: StrategyKind::default(),
        }
    }
}

impl SchedulerConfig {
    /// Defaults overridden by environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Result<Self, CoreError> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse config from a TOML string. Env overrides win over file values.
    pub fn from_toml(toml_str: &str) -> Result<Self, CoreError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn deadline_check_interval(&self) -> Duration {
        Duration::from_millis(self.deadline_check_interval_ms)
    }

    pub fn resource_monitoring_interval(&self) -> Duration {
        Duration::from_millis(self.resource_monitoring_interval_ms)
    }

    pub fn default_backoff_delay(&self) -> Duration {
        Duration::from_millis(self.default_backoff_delay_ms)
    }

    pub fn deadline_warning(&self) -> Duration {
        Duration::from_millis(self.deadline_warning_ms)
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Apply environment variable overrides.
    ///
    /// Convention: `TASKMILL_<FIELD>` overrides `<field>`, e.g.
    /// `TASKMILL_DEFAULT_CONCURRENCY`, `TASKMILL_TICK_INTERVAL_MS`, `TASKMILL_STRATEGY`.
    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse("DEFAULT_CONCURRENCY") {
            self.default_concurrency = v;
        }
        if let Some(v) = env_parse("MAX_RETRIES") {
            self.max_retries = v;
        }
        if let Some(v) = env_parse("DEFAULT_BACKOFF_DELAY_MS") {
            self.default_backoff_delay_ms = v;
        }
        if let Some(v) = env_parse("DEFAULT_BACKOFF_STRATEGY") {
            self.default_backoff_strategy = v;
        }
        if let Some(v) = env_parse("ENABLE_METRICS") {
            self.enable_metrics = v;
        }
        if let Some(v) = env_parse("ENABLE_DEADLINE_CHECKING") {
            self.enable_deadline_checking = v;
        }
        if let Some(v) = env_parse("TICK_INTERVAL_MS") {
            self.tick_interval_ms = v;
        }
        if let Some(v) = env_parse("DEADLINE_CHECK_INTERVAL_MS") {
            self.deadline_check_interval_ms = v;
        }
        if let Some(v) = env_parse("RESOURCE_MONITORING_INTERVAL_MS") {
            self.resource_monitoring_interval_ms = v;
        }
        if let Some(v) = env_parse("DEADLINE_WARNING_MS") {
            self.deadline_warning_ms = v;
        }
        if let Some(v) = env_parse("STALL_THRESHOLD_TICKS") {
            self.stall_threshold_ticks = v;
        }
        if let Some(v) = env_parse("EVENT_CAPACITY") {
            self.event_capacity = v;
        }
        if let Some(v) = env_parse("STRATEGY") {
            self.strategy = v;
        }
    }

    // ── Validation ──────────────────────────────────────────────────

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.default_concurrency == 0 {
            return Err(CoreError::Config(
                "default_concurrency must be at least 1".into(),
            ));
        }
        for (name, value) in [
            ("tick_interval_ms", self.tick_interval_ms),
            ("deadline_check_interval_ms", self.deadline_check_interval_ms),
            ("resource_monitoring_interval_ms", self.resource_monitoring_interval_ms),
        ] {
            if value == 0 {
                return Err(CoreError::Config(format!("{name} must be greater than 0")));
            }
        }
        if self.event_capacity == 0 {
            return Err(CoreError::Config("event_capacity must be at least 1".into()));
        }
        Ok(())
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Scheduler config:");
        tracing::info!("  strategy:     {}", self.strategy);
        tracing::info!("  concurrency:  default={}", self.default_concurrency);
        tracing::info!(
            "  retries:      max={}, backoff={} base={}ms",
            self.max_retries,
            self.default_backoff_strategy,
            self.default_backoff_delay_ms
        );
        tracing::info!(
            "  ticks:        dispatch={}ms, deadline={}ms ({}), resources={}ms",
            self.tick_interval_ms,
            self.deadline_check_interval_ms,
            if self.enable_deadline_checking { "on" } else { "off" },
            self.resource_monitoring_interval_ms
        );
        tracing::info!("  metrics:      {}", if self.enable_metrics { "on" } else { "off" });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn scheduler_config_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.default_concurrency, 5);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.default_backoff_delay_ms, 1000);
        assert_eq!(config.default_backoff_strategy, BackoffStrategy::Exponential);
        assert!(config.enable_metrics);
        assert!(config.enable_deadline_checking);
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.deadline_warning(), Duration::from_secs(300));
        assert_eq!(config.strategy, StrategyKind::PriorityFirst);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_partial_toml_fills_defaults() {
        let config = SchedulerConfig::from_toml(
            r#"
            default_concurrency = 2
            default_backoff_strategy = "linear"
            strategy = "fair-share"
            "#,
        )
        .unwrap();
        assert_eq!(config.default_concurrency, 2);
        assert_eq!(config.default_backoff_strategy, BackoffStrategy::Linear);
        assert_eq!(config.strategy, StrategyKind::FairShare);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.deadline_check_interval_ms, 30_000);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_retries = 7\nenable_metrics = false").unwrap();

        let config = SchedulerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_retries, 7);
        assert!(!config.enable_metrics);
    }

    #[test]
    fn zero_concurrency_rejected() {
        let err = SchedulerConfig::from_toml("default_concurrency = 0").unwrap_err();
        assert!(err.to_string().contains("default_concurrency"));
    }

    #[test]
    fn zero_interval_rejected() {
        let err = SchedulerConfig::from_toml("tick_interval_ms = 0").unwrap_err();
        assert!(err.to_string().contains("tick_interval_ms"));
    }

    #[test]
    fn invalid_toml_is_parse_error() {
        let err = SchedulerConfig::from_toml("max_retries = \"many\"").unwrap_err();
        assert!(matches!(err, CoreError::ConfigParse(_)));
    }

    #[test]
    fn strategy_kind_parsing() {
        assert_eq!("sjf".parse::<StrategyKind>().unwrap(), StrategyKind::ShortestJobFirst);
        assert_eq!("Priority-First".parse::<StrategyKind>().unwrap(), StrategyKind::PriorityFirst);
        assert_eq!("fair-share".parse::<StrategyKind>().unwrap(), StrategyKind::FairShare);
        assert!("round-robin".parse::<StrategyKind>().is_err());
        assert_eq!(StrategyKind::ShortestJobFirst.to_string(), "shortest-job-first");
    }

    #[test]
    fn env_override_stall_threshold() {
        // Unique key so parallel tests don't interfere.
        std::env::set_var("TASKMILL_STALL_THRESHOLD_TICKS", "4");
        let config = SchedulerConfig::from_toml("").unwrap();
        std::env::remove_var("TASKMILL_STALL_THRESHOLD_TICKS");
        assert_eq!(config.stall_threshold_ticks, 4);
    }

    #[test]
    fn unparsable_env_override_ignored() {
        std::env::set_var("TASKMILL_EVENT_CAPACITY", "lots");
        let config = SchedulerConfig::from_toml("").unwrap();
        std::env::remove_var("TASKMILL_EVENT_CAPACITY");
        assert_eq!(config.event_capacity, 1024);
    }
}
