//! Prelude module for convenient imports.
//!
//! ```rust,no_run
//! use turul_calc_engine::prelude::*;
//! ```

pub use crate::config::EngineConfig;
pub use crate::engine::{
    CompletionHandler, CompletionStatus, ExecutionEngine, ShutdownReport, TaskCompletion,
};
pub use crate::error::{EngineError, TaskFailure};
pub use crate::executor::{WorkEvent, WorkEventKind, WorkExecutor, WorkHandle, WorkListener};
pub use crate::operation::Operation;
pub use crate::task::{CalculationTask, TaskId, TaskOutcome};
pub use crate::tokio_executor::TokioWorkExecutor;
