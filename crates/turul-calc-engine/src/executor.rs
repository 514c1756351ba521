//! Pluggable execution of calculation tasks.
//!
//! An executor only runs work and reports its lifecycle; tracking and correlation
//! belong to the engine. The default is
//! [`TokioWorkExecutor`](crate::tokio_executor::TokioWorkExecutor).

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{EngineError, TaskFailure};
use crate::task::{CalculationTask, TaskId};

/// Opaque handle returned when work is started.
pub trait WorkHandle: Send + Sync {
    fn task_id(&self) -> TaskId;
    /// Ask the running work to release its thread as soon as possible.
    fn cancel(&self);
    fn is_cancelled(&self) -> bool;
}

/// Lifecycle stage reported by an executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkEventKind {
    Accepted,
    Started,
    Completed,
    Rejected,
}

/// A lifecycle notification for one unit of work.
///
/// `work` is value-equal to the submitted task but need not be the same value:
/// executors are free to hand back their own copy.
#[derive(Debug, Clone)]
pub struct WorkEvent {
    pub kind: WorkEventKind,
    pub work: CalculationTask,
    pub failure: Option<TaskFailure>,
}

impl WorkEvent {
    pub fn new(kind: WorkEventKind, work: CalculationTask) -> Self {
        Self {
            kind,
            work,
            failure: None,
        }
    }

    pub fn with_failure(mut self, failure: TaskFailure) -> Self {
        self.failure = Some(failure);
        self
    }

    /// `Completed` and `Rejected` end the life of the work; the others are progress.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            WorkEventKind::Completed | WorkEventKind::Rejected
        )
    }
}

/// Receives lifecycle events from an executor.
#[async_trait]
pub trait WorkListener: Send + Sync {
    async fn on_work_event(&self, event: WorkEvent);
}

/// Trait for running calculation work.
#[async_trait]
pub trait WorkExecutor: Send + Sync {
    /// Start running `work`, reporting its lifecycle to `listener`.
    ///
    /// An `Err` means the work was refused synchronously and will never run;
    /// no events are emitted for it after that.
    async fn start_work(
        &self,
        work: CalculationTask,
        listener: Arc<dyn WorkListener>,
    ) -> Result<Box<dyn WorkHandle>, EngineError>;

    /// Stop accepting new work. Work already started is unaffected.
    async fn close(&self) {}
}
