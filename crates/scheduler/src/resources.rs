//! Available-capacity estimation fed to strategies and metrics.

use super::types::SystemResources;

/// Produces a [`SystemResources`] snapshot on each monitor tick.
pub trait ResourceProbe: Send + Sync {
    fn sample(&self, running: usize) -> SystemResources;
}

/// Heuristic probe derived from the number of running tasks.
///
/// Each running task is assumed to take 10% CPU and 5% memory. GPU and
/// network always report fully available.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningTaskProbe;

impl ResourceProbe for RunningTaskProbe {
    fn sample(&self, running: usize) -> SystemResources {
        let running = running as f64;
        SystemResources {
            cpu: (100.0 - running * 10.0).max(0.0),
            memory: (100.0 - running * 5.0).max(0.0),
            gpu: 100.0,
            network: 100.0,
        }
    }
}
