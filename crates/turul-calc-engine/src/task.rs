//! Calculation tasks: one cancellable fold over a sequence of operands.

use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::cancellation::CancellationHandle;
use crate::error::TaskFailure;
use crate::operation::Operation;

/// Stable identity of a task, assigned at creation (UUID v7 for temporal ordering).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What a task produced when it stopped running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskOutcome {
    /// The fold ran over every operand.
    Value(i64),
    /// There were no operands to fold.
    NoResult,
    /// Cancellation was observed at a checkpoint; partial progress is discarded.
    Cancelled,
}

impl TaskOutcome {
    /// The numeric result, if the fold completed.
    pub fn value(&self) -> Option<i64> {
        match self {
            TaskOutcome::Value(v) => Some(*v),
            TaskOutcome::NoResult | TaskOutcome::Cancelled => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskOutcome::Cancelled)
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskOutcome::Value(v) => write!(f, "{v}"),
            TaskOutcome::NoResult => f.write_str("no result"),
            TaskOutcome::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// One unit of cancellable work.
///
/// Cloning is cheap and yields a distinct value that shares the cancellation flag
/// and the result slot with the original. Equality and hashing consider only the
/// [`TaskId`], so a clone handed back by an executor compares equal to the task
/// that was submitted, and a `HashMap` keyed by tasks can be queried by `TaskId`.
#[derive(Clone)]
pub struct CalculationTask {
    id: TaskId,
    operation: Operation,
    operands: Arc<[i32]>,
    step_delay: Duration,
    cancellation: CancellationHandle,
    outcome: Arc<OnceLock<TaskOutcome>>,
}

impl CalculationTask {
    pub fn new(operation: Operation, operands: impl Into<Arc<[i32]>>) -> Self {
        Self {
            id: TaskId::new(),
            operation,
            operands: operands.into(),
            step_delay: Duration::ZERO,
            cancellation: CancellationHandle::new(),
            outcome: Arc::new(OnceLock::new()),
        }
    }

    /// Suspend for `delay` before each fold step (simulated processing time).
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn operands(&self) -> &[i32] {
        &self.operands
    }

    pub fn step_delay(&self) -> Duration {
        self.step_delay
    }

    /// Request cooperative cancellation. Idempotent and safe to race with `run`.
    pub fn cancel(&self) -> bool {
        let transitioned = self.cancellation.cancel();
        if transitioned {
            debug!(task_id = %self.id, "Cancellation requested");
        }
        transitioned
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// The outcome written by `run`, if it has finished successfully.
    pub fn outcome(&self) -> Option<TaskOutcome> {
        self.outcome.get().copied()
    }

    /// Execute the fold, record the outcome, and return it.
    ///
    /// The cancellation flag is checked before the first operand and again before
    /// every later one, after any step delay. Once it is observed the fold stops
    /// and the outcome is [`TaskOutcome::Cancelled`]; a task that has already
    /// passed its last checkpoint finishes with its full value.
    pub async fn run(&self) -> Result<TaskOutcome, TaskFailure> {
        if let Some(previous) = self.outcome() {
            return Ok(previous);
        }
        let outcome = self.fold().await?;
        Ok(*self.outcome.get_or_init(|| outcome))
    }

    async fn fold(&self) -> Result<TaskOutcome, TaskFailure> {
        if self.is_cancelled() {
            debug!(task_id = %self.id, "Cancelled before start");
            return Ok(TaskOutcome::Cancelled);
        }

        let mut acc: Option<i64> = None;
        for &operand in self.operands.iter() {
            if !self.step_delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.step_delay) => {}
                    _ = self.cancellation.cancelled() => {}
                }
            }
            if self.is_cancelled() {
                debug!(task_id = %self.id, partial = ?acc, "Cancellation observed, abandoning fold");
                return Ok(TaskOutcome::Cancelled);
            }
            acc = Some(match acc {
                None => i64::from(operand),
                Some(acc) => self.operation.combine(acc, operand)?,
            });
        }

        Ok(acc.map_or(TaskOutcome::NoResult, TaskOutcome::Value))
    }
}

impl PartialEq for CalculationTask {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for CalculationTask {}

impl Hash for CalculationTask {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Borrow<TaskId> for CalculationTask {
    fn borrow(&self) -> &TaskId {
        &self.id
    }
}

impl fmt::Debug for CalculationTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalculationTask")
            .field("id", &self.id)
            .field("operation", &self.operation)
            .field("operands", &self.operands.len())
            .field("cancelled", &self.is_cancelled())
            .field("outcome", &self.outcome())
            .finish()
    }
}

impl fmt::Display for CalculationTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CalculationTask[id={} operation={} operands={}]",
            self.id,
            self.operation,
            self.operands.len()
        )
    }
}
