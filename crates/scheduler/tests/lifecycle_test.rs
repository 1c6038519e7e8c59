//! End-to-end task lifecycle through the public engine API.
//!
//! Timing-sensitive tests run on paused tokio time so backoff delays and
//! tick intervals elapse deterministically.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use taskmill_scheduler::{
    BackoffStrategy, ExecutionContext, ExecutionError, Executor, PriorityFirst, Scheduler,
    SchedulerConfig, SchedulerEvent, SchedulingStrategy, SystemResources, Task, TaskFilter,
    TaskSpec, TaskStatus, DEFAULT_QUEUE,
};

const SETTLE: Duration = Duration::from_millis(10);

/// Always fails, counting attempts.
struct FailingExecutor {
    attempts: Arc<AtomicU32>,
}

#[async_trait]
impl Executor for FailingExecutor {
    fn id(&self) -> &str {
        "failing"
    }
    fn can_handle(&self, _task: &Task) -> bool {
        true
    }
    async fn execute(
        &self,
        _task: Task,
        _ctx: ExecutionContext,
    ) -> Result<serde_json::Value, ExecutionError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(anyhow::anyhow!("boom").into())
    }
}

/// Completes after a fixed delay.
struct SleepyExecutor {
    delay: Duration,
}

#[async_trait]
impl Executor for SleepyExecutor {
    fn id(&self) -> &str {
        "sleepy"
    }
    fn can_handle(&self, _task: &Task) -> bool {
        true
    }
    async fn execute(
        &self,
        task: Task,
        _ctx: ExecutionContext,
    ) -> Result<serde_json::Value, ExecutionError> {
        tokio::time::sleep(self.delay).await;
        Ok(serde_json::json!(task.name))
    }
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<SchedulerEvent>) -> Vec<SchedulerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[test]
fn dependency_free_task_is_scheduled_synchronously() {
    let scheduler = Scheduler::new(SchedulerConfig::default());
    let id = scheduler.add_task(TaskSpec::new("A").priority(5)).unwrap();
    assert_eq!(scheduler.get_task(&id).unwrap().status, TaskStatus::Scheduled);
}

#[tokio::test(start_paused = true)]
async fn dependent_task_unblocks_after_dependency_completes() {
    let scheduler = Scheduler::new(SchedulerConfig::default());
    scheduler
        .register_executor(Arc::new(SleepyExecutor {
            delay: Duration::from_secs(2),
        }))
        .unwrap();

    let a = scheduler.add_task(TaskSpec::new("A")).unwrap();
    let b = scheduler.add_task(TaskSpec::new("B").depends_on(&a)).unwrap();
    tokio::time::sleep(SETTLE).await;

    assert_eq!(scheduler.get_task(&a).unwrap().status, TaskStatus::Running);
    assert_eq!(scheduler.get_task(&b).unwrap().status, TaskStatus::Pending);

    // Every scheduled task has its dependencies completed.
    for task in scheduler.get_tasks(&TaskFilter::status([TaskStatus::Scheduled])) {
        for dep in &task.dependencies {
            assert_eq!(scheduler.get_task(dep).unwrap().status, TaskStatus::Completed);
        }
    }

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(scheduler.get_task(&a).unwrap().status, TaskStatus::Completed);
    let b_task = scheduler.get_task(&b).unwrap();
    assert_ne!(b_task.status, TaskStatus::Pending);
    assert!(b_task.scheduled_at.is_some());

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(scheduler.get_task(&b).unwrap().status, TaskStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn retries_are_bounded_with_single_exhaustion_event() {
    let scheduler = Scheduler::new(SchedulerConfig::default());
    let attempts = Arc::new(AtomicU32::new(0));
    scheduler
        .register_executor(Arc::new(FailingExecutor {
            attempts: attempts.clone(),
        }))
        .unwrap();
    let mut events = scheduler.subscribe();

    let id = scheduler
        .add_task(
            TaskSpec::new("doomed")
                .max_retries(2)
                .backoff(BackoffStrategy::Exponential, Duration::from_millis(500)),
        )
        .unwrap();

    // 500ms then 1s of backoff; give it plenty of room.
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    let task = scheduler.get_task(&id).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.retry_attempts, 2);
    assert!(task.retry_attempts <= task.max_retries);
    assert_eq!(task.error.as_deref(), Some("boom"));

    let events = drain(&mut events);
    let exhausted: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, SchedulerEvent::TaskRetryExhausted { .. }))
        .collect();
    assert_eq!(exhausted.len(), 1);

    let delays: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            SchedulerEvent::TaskRetrying { delay_ms, .. } => Some(*delay_ms),
            _ => None,
        })
        .collect();
    assert_eq!(delays, vec![500, 1000]);
    assert_eq!(
        events.iter().filter(|e| e.kind() == "task-failed").count(),
        3
    );

    // The budget is spent; manual retry is refused.
    assert!(!scheduler.retry_task(&id));
}

#[tokio::test(start_paused = true)]
async fn manual_retry_refused_once_budget_spent() {
    let config = SchedulerConfig {
        max_retries: 0,
        ..Default::default()
    };
    let scheduler = Scheduler::new(config);
    let attempts = Arc::new(AtomicU32::new(0));
    scheduler
        .register_executor(Arc::new(FailingExecutor {
            attempts: attempts.clone(),
        }))
        .unwrap();

    let id = scheduler.add_task(TaskSpec::new("once").max_retries(1)).unwrap();
    // The automatic retry consumes the single retry.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert!(!scheduler.retry_task(&id));

    let zero = scheduler.add_task(TaskSpec::new("never")).unwrap();
    tokio::time::sleep(SETTLE).await;
    assert_eq!(scheduler.get_task(&zero).unwrap().status, TaskStatus::Failed);
    assert!(!scheduler.retry_task(&zero));
}

#[test]
fn priority_first_orders_by_priority() {
    let scheduler = Scheduler::new(SchedulerConfig::default());
    scheduler.pause_queue(DEFAULT_QUEUE);
    for p in [1u8, 10, 5] {
        scheduler.add_task(TaskSpec::new(format!("p{p}")).priority(p)).unwrap();
    }
    let tasks = scheduler.get_tasks(&TaskFilter::default());
    let ordered = PriorityFirst.schedule(tasks, &SystemResources::default());
    let priorities: Vec<u8> = ordered.iter().map(|t| t.priority).collect();
    assert_eq!(priorities, vec![10, 5, 1]);
}

#[test]
fn overdue_task_raises_alarm() {
    let scheduler = Scheduler::new(SchedulerConfig::default());
    let mut events = scheduler.subscribe();
    let id = scheduler
        .add_task(TaskSpec::new("late").deadline(Utc::now() - chrono::Duration::seconds(10)))
        .unwrap();

    scheduler.check_deadlines();
    let overdue = drain(&mut events).into_iter().find_map(|e| match e {
        SchedulerEvent::TaskOverdue {
            task_id,
            overdue_ms,
        } => Some((task_id, overdue_ms)),
        _ => None,
    });
    let (task_id, overdue_ms) = overdue.expect("no overdue event");
    assert_eq!(task_id, id);
    assert!(overdue_ms > 0);
    assert_eq!(scheduler.get_task(&id).unwrap().status, TaskStatus::Scheduled);
}

#[tokio::test(start_paused = true)]
async fn deadline_tick_fires_while_running() {
    let config = SchedulerConfig {
        deadline_check_interval_ms: 200,
        ..Default::default()
    };
    let scheduler = Scheduler::new(config);
    let mut events = scheduler.subscribe();
    scheduler
        .add_task(TaskSpec::new("late").deadline(Utc::now() - chrono::Duration::seconds(10)))
        .unwrap();

    scheduler.start().unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;
    scheduler.stop().unwrap();

    let kinds: Vec<&str> = drain(&mut events).iter().map(|e| e.kind()).collect();
    assert!(kinds.contains(&"scheduler-started"));
    assert!(kinds.contains(&"task-overdue"));
    assert!(kinds.contains(&"scheduler-stopped"));
}

#[test]
fn cancelling_scheduled_task_removes_it_from_queue() {
    let scheduler = Scheduler::new(SchedulerConfig::default());
    let id = scheduler.add_task(TaskSpec::new("A")).unwrap();

    assert!(scheduler.cancel_task(&id));
    let task = scheduler.get_task(&id).unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);
    assert!(task.completed_at.is_some());
    let default = &scheduler.queue_stats()[0];
    assert_eq!(default.scheduled, 0);
}

#[tokio::test(start_paused = true)]
async fn success_rate_reflects_outcomes() {
    let scheduler = Scheduler::new(SchedulerConfig::default());
    assert_eq!(scheduler.get_metrics().success_rate, 0.0);

    scheduler
        .register_executor(Arc::new(SleepyExecutor {
            delay: Duration::from_millis(100),
        }))
        .unwrap();
    for i in 0..3 {
        scheduler.add_task(TaskSpec::new(format!("ok{i}"))).unwrap();
    }
    tokio::time::sleep(Duration::from_secs(1)).await;

    let metrics = scheduler.get_metrics();
    assert_eq!(metrics.completed, 3);
    assert_eq!(metrics.success_rate, 100.0);
    assert!((0.0..=100.0).contains(&metrics.success_rate));
}
