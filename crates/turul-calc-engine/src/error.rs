//! Error types for the calculation engine.

use crate::operation::Operation;
use crate::task::TaskId;

/// Errors raised synchronously by the engine and its executors.
///
/// Failures of a task that was accepted and then ran are never reported through
/// this type; they travel through the completion path as [`TaskFailure`].
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Work rejected by executor: {0}")]
    Rejected(String),

    #[error("Execution engine has been shut down")]
    ShutDown,

    #[error("Task already submitted: {0}")]
    AlreadySubmitted(TaskId),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),
}

/// Failure of a task after it was handed to an executor.
///
/// Cloneable so it can be carried inside work events and completions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskFailure {
    #[error("{operation} overflowed the 64-bit accumulator at operand {operand}")]
    Overflow { operation: Operation, operand: i32 },

    #[error("Task panicked: {0}")]
    Panicked(String),

    #[error("Work rejected: {0}")]
    Rejected(String),
}
