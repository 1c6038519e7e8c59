//! Dispatch order through a single-slot queue under each built-in strategy.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use taskmill_scheduler::{
    ExecutionContext, ExecutionError, Executor, Scheduler, SchedulerConfig, StrategyKind, Task,
    TaskSpec,
};

/// Records the order tasks start in.
struct Recorder {
    order: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Executor for Recorder {
    fn id(&self) -> &str {
        "recorder"
    }
    fn can_handle(&self, _task: &Task) -> bool {
        true
    }
    async fn execute(
        &self,
        task: Task,
        _ctx: ExecutionContext,
    ) -> Result<serde_json::Value, ExecutionError> {
        self.order.lock().unwrap().push(task.name.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(serde_json::Value::Null)
    }
}

/// Queue a batch while paused, then release it one slot at a time.
async fn run_batch(strategy: StrategyKind, specs: Vec<TaskSpec>) -> Vec<String> {
    let config = SchedulerConfig {
        strategy,
        ..Default::default()
    };
    let scheduler = Scheduler::new(config);
    scheduler.create_queue("serial", "Serial", 1, 0);
    scheduler.pause_queue("serial");

    let order = Arc::new(Mutex::new(Vec::new()));
    scheduler
        .register_executor(Arc::new(Recorder {
            order: order.clone(),
        }))
        .unwrap();

    for spec in specs {
        scheduler.add_task(spec.queue("serial")).unwrap();
    }
    scheduler.resume_queue("serial");
    tokio::time::sleep(Duration::from_secs(5)).await;

    let order = order.lock().unwrap().clone();
    order
}

#[tokio::test(start_paused = true)]
async fn priority_first_dispatch_order() {
    let order = run_batch(
        StrategyKind::PriorityFirst,
        vec![
            TaskSpec::new("low").priority(1),
            TaskSpec::new("high").priority(10),
            TaskSpec::new("mid").priority(5),
        ],
    )
    .await;
    assert_eq!(order, vec!["high", "mid", "low"]);
}

#[tokio::test(start_paused = true)]
async fn shortest_job_dispatch_order() {
    let order = run_batch(
        StrategyKind::ShortestJobFirst,
        vec![
            TaskSpec::new("long").estimated_duration(Duration::from_secs(600)),
            TaskSpec::new("unknown").priority(9),
            TaskSpec::new("short").estimated_duration(Duration::from_secs(1)),
        ],
    )
    .await;
    assert_eq!(order, vec!["short", "unknown", "long"]);
}

#[tokio::test(start_paused = true)]
async fn queue_priority_decides_competing_queues() {
    let scheduler = Scheduler::new(SchedulerConfig::default());
    scheduler.create_queue("bulk", "Bulk", 1, 0);
    scheduler.create_queue("urgent", "Urgent", 1, 10);
    scheduler.add_task(TaskSpec::new("b").queue("bulk")).unwrap();
    scheduler.add_task(TaskSpec::new("u").queue("urgent")).unwrap();

    // Both wait for an executor; the next tick serves the urgent queue first.
    let order = Arc::new(Mutex::new(Vec::new()));
    let recorder: Arc<dyn Executor> = Arc::new(Recorder {
        order: order.clone(),
    });
    let _scheduler = scheduler.with_executors([recorder]).unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(*order.lock().unwrap(), vec!["u", "b"]);
}
