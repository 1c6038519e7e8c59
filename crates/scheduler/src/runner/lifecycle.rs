use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::PoisonError;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::error::SchedulerError;
use crate::events::SchedulerEvent;

use super::Scheduler;

/// Marks a tick of one kind as in flight until dropped.
pub(super) struct TickGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> TickGuard<'a> {
    /// `None` if a tick of this kind is already running.
    pub(super) fn enter(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl Scheduler {
    /// Start the dispatch, deadline and monitor tick loops on the current
    /// tokio runtime.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let runtime = Handle::try_current().map_err(|e| SchedulerError::NoRuntime(e.to_string()))?;
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(SchedulerError::AlreadyRunning);
        }

        let (tx, rx) = watch::channel(false);
        *self.shutdown.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);

        self.spawn_tick_loop(&runtime, "dispatch", self.config.tick_interval(), rx.clone(), |s| {
            s.process_queues()
        });
        if self.config.enable_deadline_checking {
            self.spawn_tick_loop(
                &runtime,
                "deadline",
                self.config.deadline_check_interval(),
                rx.clone(),
                |s| {
                    s.check_deadlines();
                },
            );
        }
        self.spawn_tick_loop(
            &runtime,
            "monitor",
            self.config.resource_monitoring_interval(),
            rx,
            |s| s.monitor_tick(),
        );

        info!(strategy = %self.strategy_name(), "Scheduler started");
        self.emit(SchedulerEvent::SchedulerStarted);
        Ok(())
    }

    /// Signal the tick loops to exit. Running executor attempts are left to
    /// finish and still report their outcome.
    pub fn stop(&self) -> Result<(), SchedulerError> {
        if !self.running.swap(false, Ordering::AcqRel) {
            return Err(SchedulerError::NotRunning);
        }
        if let Some(tx) = self
            .shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            tx.send_replace(true);
        }
        info!("Scheduler stopped");
        self.emit(SchedulerEvent::SchedulerStopped);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn spawn_tick_loop<F>(
        &self,
        runtime: &Handle,
        name: &'static str,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
        tick: F,
    ) where
        F: Fn(&Scheduler) + Send + 'static,
    {
        let scheduler = self.clone();
        runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => tick(&scheduler),
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!(tick = name, "Tick loop exited");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_rejects_reentry_until_dropped() {
        let flag = AtomicBool::new(false);
        let first = TickGuard::enter(&flag);
        assert!(first.is_some());
        assert!(TickGuard::enter(&flag).is_none());
        drop(first);
        assert!(TickGuard::enter(&flag).is_some());
    }
}
