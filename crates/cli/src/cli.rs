use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use taskmill_core::StrategyKind;

/// Run task workloads through the taskmill scheduling engine.
#[derive(Parser, Debug)]
#[command(name = "taskmill", version, about = "Task scheduling engine workload runner")]
pub struct CliArgs {
    /// Engine config file (TOML). `TASKMILL_*` env vars override it.
    #[arg(long, global = true, env = "TASKMILL_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute a workload file with simulated executors.
    Run(RunArgs),
    /// Print the effective engine configuration as TOML.
    Config,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Workload file describing queues and tasks.
    #[arg(long, short = 'w')]
    pub workload: PathBuf,

    /// Strategy override: priority-first, shortest-job-first or fair-share.
    #[arg(long)]
    pub strategy: Option<StrategyKind>,

    /// Give up waiting for the workload after this many seconds.
    #[arg(long, default_value_t = 300)]
    pub timeout_secs: u64,

    /// Multiplier applied to simulated task durations.
    #[arg(long, default_value_t = 1.0)]
    pub time_scale: f64,

    /// Print final metrics and tasks as JSON instead of a summary.
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_arguments() {
        let args = CliArgs::try_parse_from([
            "taskmill",
            "run",
            "--workload",
            "demo.toml",
            "--strategy",
            "sjf",
            "--json",
        ])
        .unwrap();
        let Command::Run(run) = args.command else {
            panic!("expected run");
        };
        assert_eq!(run.workload, PathBuf::from("demo.toml"));
        assert_eq!(run.strategy, Some(StrategyKind::ShortestJobFirst));
        assert_eq!(run.timeout_secs, 300);
        assert!(run.json);
    }

    #[test]
    fn rejects_unknown_strategy() {
        let res = CliArgs::try_parse_from([
            "taskmill",
            "run",
            "--workload",
            "demo.toml",
            "--strategy",
            "random",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn global_config_flag() {
        let args = CliArgs::try_parse_from(["taskmill", "config", "--config", "engine.toml"]).unwrap();
        assert!(matches!(args.command, Command::Config));
        assert_eq!(args.config, Some(PathBuf::from("engine.toml")));
    }
}
