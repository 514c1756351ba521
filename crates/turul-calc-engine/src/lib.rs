//! # Calculation Engine
//!
//! **Asynchronous SUM/PRODUCT tasks with cooperative cancellation and in-flight tracking.**
//!
//! A [`CalculationTask`] folds a sequence of integer operands with an [`Operation`],
//! checking its cancellation flag before every operand. The [`ExecutionEngine`]
//! hands tasks to a pluggable [`WorkExecutor`], keeps a registry of everything in
//! flight, and forwards exactly one [`TaskCompletion`] per accepted task to its
//! [`CompletionHandler`].
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use turul_calc_engine::prelude::*;
//!
//! struct PrintCompletion;
//!
//! impl CompletionHandler for PrintCompletion {
//!     fn on_completion(&self, completion: TaskCompletion) {
//!         println!("{} -> {:?}", completion.task, completion.outcome());
//!     }
//! }
//!
//! # async fn example() -> Result<(), EngineError> {
//! let engine = ExecutionEngine::with_config(EngineConfig::default());
//! let task = engine.new_task(Operation::Sum, &[1, 2, 3, 4]);
//! engine.submit(task.clone(), Arc::new(PrintCompletion)).await?;
//!
//! // Cancellation is cooperative: the task stops at its next checkpoint.
//! engine.cancel(&task.id()).await.ok();
//!
//! let report = engine.shutdown().await;
//! println!("cancelled {} task(s) on shutdown", report.cancelled.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **`CalculationTask`**: Cancellable fold; clones share the flag and the outcome slot
//! - **`WorkExecutor` trait**: How tasks run (default: [`TokioWorkExecutor`])
//! - **`ExecutionEngine`**: Registry of in-flight tasks, event correlation, shutdown
//! - **`CompletionHandler`**: Receives the normalized completion of each task

pub mod cancellation;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod operation;
pub mod prelude;
pub mod task;
pub mod tokio_executor;

// Re-exports for convenience
pub use cancellation::CancellationHandle;
pub use config::EngineConfig;
pub use engine::{
    CancelledTask, CompletionHandler, CompletionStatus, ExecutionEngine, ShutdownReport,
    TaskCompletion,
};
pub use error::{EngineError, TaskFailure};
pub use executor::{WorkEvent, WorkEventKind, WorkExecutor, WorkHandle, WorkListener};
pub use operation::{Operation, UnknownOperation};
pub use task::{CalculationTask, TaskId, TaskOutcome};
pub use tokio_executor::TokioWorkExecutor;
