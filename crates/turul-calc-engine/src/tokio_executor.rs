//! In-process executor: one spawned Tokio task per calculation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, TaskFailure};
use crate::executor::{WorkEvent, WorkEventKind, WorkExecutor, WorkHandle, WorkListener};
use crate::task::{CalculationTask, TaskId};

/// In-process executor running each task as its own Tokio task.
///
/// With a non-zero `max_in_flight` the executor refuses work once that many tasks
/// are running instead of queueing it.
pub struct TokioWorkExecutor {
    permits: Option<Arc<Semaphore>>,
    max_in_flight: usize,
    closed: AtomicBool,
}

impl TokioWorkExecutor {
    pub fn new() -> Self {
        Self::with_config(&EngineConfig::default())
    }

    pub fn with_config(config: &EngineConfig) -> Self {
        let permits = (config.max_in_flight > 0)
            .then(|| Arc::new(Semaphore::new(config.max_in_flight)));
        Self {
            permits,
            max_in_flight: config.max_in_flight,
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Default for TokioWorkExecutor {
    fn default() -> Self {
        Self::new()
    }
}

struct TokioWorkHandle {
    task: CalculationTask,
}

impl WorkHandle for TokioWorkHandle {
    fn task_id(&self) -> TaskId {
        self.task.id()
    }
    fn cancel(&self) {
        self.task.cancel();
    }
    fn is_cancelled(&self) -> bool {
        self.task.is_cancelled()
    }
}

#[async_trait]
impl WorkExecutor for TokioWorkExecutor {
    async fn start_work(
        &self,
        work: CalculationTask,
        listener: Arc<dyn WorkListener>,
    ) -> Result<Box<dyn WorkHandle>, EngineError> {
        if self.is_closed() {
            return Err(EngineError::Rejected("executor is closed".to_string()));
        }
        let permit = match &self.permits {
            Some(permits) => Some(Arc::clone(permits).try_acquire_owned().map_err(|_| {
                EngineError::Rejected(format!(
                    "executor saturated ({} tasks in flight)",
                    self.max_in_flight
                ))
            })?),
            None => None,
        };

        listener
            .on_work_event(WorkEvent::new(WorkEventKind::Accepted, work.clone()))
            .await;

        let handle = TokioWorkHandle { task: work.clone() };

        tokio::spawn(async move {
            listener
                .on_work_event(WorkEvent::new(WorkEventKind::Started, work.clone()))
                .await;

            // Run the fold in its own task so a panic surfaces as a JoinError
            // here instead of tearing down the completion path.
            let runner = work.clone();
            let joined = tokio::spawn(async move { runner.run().await }).await;
            // The slot is free before anyone hears about the completion.
            drop(permit);

            let completed = WorkEvent::new(WorkEventKind::Completed, work.clone());
            let event = match joined {
                Ok(Ok(outcome)) => {
                    debug!(task_id = %work.id(), %outcome, "Work finished");
                    completed
                }
                Ok(Err(failure)) => {
                    debug!(task_id = %work.id(), error = %failure, "Work failed");
                    completed.with_failure(failure)
                }
                Err(join_error) => {
                    warn!(task_id = %work.id(), error = %join_error, "Work aborted");
                    completed.with_failure(TaskFailure::Panicked(join_error.to_string()))
                }
            };
            listener.on_work_event(event).await;
        });

        Ok(Box::new(handle))
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("Tokio work executor closed to new work");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Operation;
    use crate::task::TaskOutcome;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct ChannelListener(mpsc::UnboundedSender<WorkEvent>);

    #[async_trait]
    impl WorkListener for ChannelListener {
        async fn on_work_event(&self, event: WorkEvent) {
            let _ = self.0.send(event);
        }
    }

    fn listener() -> (Arc<dyn WorkListener>, mpsc::UnboundedReceiver<WorkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(ChannelListener(tx)), rx)
    }

    async fn next_terminal(rx: &mut mpsc::UnboundedReceiver<WorkEvent>) -> WorkEvent {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("event within timeout")
                .expect("listener channel open");
            if event.is_terminal() {
                return event;
            }
        }
    }

    #[tokio::test]
    async fn test_start_and_complete_work() {
        let executor = TokioWorkExecutor::new();
        let (listener, mut rx) = listener();
        let task = CalculationTask::new(Operation::Sum, vec![1, 2, 3]);

        let handle = executor.start_work(task.clone(), listener).await.unwrap();
        assert_eq!(handle.task_id(), task.id());

        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind, WorkEventKind::Accepted);

        let done = next_terminal(&mut rx).await;
        assert_eq!(done.kind, WorkEventKind::Completed);
        assert_eq!(done.work, task);
        assert!(done.failure.is_none());
        assert_eq!(task.outcome(), Some(TaskOutcome::Value(6)));
    }

    #[tokio::test]
    async fn test_cancel_via_handle() {
        let executor = TokioWorkExecutor::new();
        let (listener, mut rx) = listener();
        let task = CalculationTask::new(Operation::Product, vec![3; 10])
            .with_step_delay(Duration::from_millis(100));

        let handle = executor.start_work(task.clone(), listener).await.unwrap();
        handle.cancel();
        assert!(handle.is_cancelled());

        let done = next_terminal(&mut rx).await;
        assert_eq!(done.kind, WorkEventKind::Completed);
        assert_eq!(task.outcome(), Some(TaskOutcome::Cancelled));
    }

    #[tokio::test]
    async fn test_failure_is_reported_in_event() {
        let executor = TokioWorkExecutor::new();
        let (listener, mut rx) = listener();
        let task = CalculationTask::new(Operation::Product, vec![i32::MIN, i32::MIN, i32::MIN]);

        executor.start_work(task, listener).await.unwrap();

        let done = next_terminal(&mut rx).await;
        assert!(matches!(done.failure, Some(TaskFailure::Overflow { .. })));
    }

    #[tokio::test]
    async fn test_saturated_executor_rejects() {
        let executor = TokioWorkExecutor::with_config(&EngineConfig {
            max_in_flight: 1,
            step_delay: Duration::ZERO,
        });
        let (listener, mut rx) = listener();
        let slow = CalculationTask::new(Operation::Sum, vec![1, 1])
            .with_step_delay(Duration::from_millis(200));

        executor
            .start_work(slow.clone(), Arc::clone(&listener))
            .await
            .unwrap();
        let second = CalculationTask::new(Operation::Sum, vec![1]);
        let result = executor.start_work(second, Arc::clone(&listener)).await;
        assert!(matches!(result, Err(EngineError::Rejected(_))));

        // The permit is returned once the slow task finishes.
        next_terminal(&mut rx).await;
        let third = CalculationTask::new(Operation::Sum, vec![1]);
        assert!(executor.start_work(third, listener).await.is_ok());
    }

    #[tokio::test]
    async fn test_closed_executor_rejects() {
        let executor = TokioWorkExecutor::new();
        executor.close().await;
        let (listener, _rx) = listener();
        let result = executor
            .start_work(CalculationTask::new(Operation::Sum, vec![1]), listener)
            .await;
        assert!(matches!(result, Err(EngineError::Rejected(_))));
    }
}
