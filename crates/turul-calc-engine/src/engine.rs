//! Execution engine: runs tasks on a [`WorkExecutor`] and correlates its events
//! back to the tasks that were submitted.
//!
//! The registry is the single arbiter of delivery: whoever removes a task's entry
//! (the correlator on a terminal event, or `shutdown`) delivers its completion,
//! and any later event for the same task finds nothing and is dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, TaskFailure};
use crate::executor::{WorkEvent, WorkEventKind, WorkExecutor, WorkHandle, WorkListener};
use crate::operation::Operation;
use crate::task::{CalculationTask, TaskId, TaskOutcome};
use crate::tokio_executor::TokioWorkExecutor;

/// How a tracked task left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    /// The executor ran the task to the end (value, no result, cancellation or failure).
    Completed,
    /// The executor refused the task after accepting it.
    Rejected,
    /// The engine shut down while the task was still in flight.
    Cancelled,
}

/// Normalized completion forwarded to the submitter.
#[derive(Debug, Clone)]
pub struct TaskCompletion {
    /// The task as originally submitted.
    pub task: CalculationTask,
    pub status: CompletionStatus,
    pub failure: Option<TaskFailure>,
}

impl TaskCompletion {
    /// Collapse status, failure and recorded outcome into a single result.
    pub fn outcome(&self) -> Result<TaskOutcome, TaskFailure> {
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        match self.status {
            CompletionStatus::Completed => Ok(self.task.outcome().unwrap_or(TaskOutcome::NoResult)),
            CompletionStatus::Cancelled => Ok(TaskOutcome::Cancelled),
            CompletionStatus::Rejected => Err(TaskFailure::Rejected(format!(
                "executor rejected {}",
                self.task
            ))),
        }
    }
}

/// Receives exactly one completion per accepted submission.
///
/// Called on whatever thread delivered the terminal event; implementations must
/// not block.
pub trait CompletionHandler: Send + Sync {
    fn on_completion(&self, completion: TaskCompletion);
}

/// A task withdrawn by [`ExecutionEngine::shutdown`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelledTask {
    pub task_id: TaskId,
    /// How long the task had been tracked when it was cancelled
    pub elapsed_ms: i64,
}

/// Summary of a shutdown.
#[derive(Debug, Clone, Default)]
pub struct ShutdownReport {
    pub cancelled: Vec<CancelledTask>,
}

struct RegistryEntry {
    submitted_at: DateTime<Utc>,
    handle: Option<Box<dyn WorkHandle>>,
    on_complete: Arc<dyn CompletionHandler>,
}

impl RegistryEntry {
    fn elapsed_ms(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.submitted_at)
            .num_milliseconds()
    }
}

type Registry = Arc<RwLock<HashMap<CalculationTask, RegistryEntry>>>;

/// Resolves executor events to the tasks that were actually submitted.
struct Correlator {
    registry: Registry,
}

#[async_trait]
impl WorkListener for Correlator {
    async fn on_work_event(&self, event: WorkEvent) {
        if !event.is_terminal() {
            debug!(task_id = %event.work.id(), kind = ?event.kind, "Work progress");
            return;
        }

        // Lookup is by value: the event may carry the executor's own copy of the
        // task, and the key handed back is the one that was registered.
        let removed = self.registry.write().await.remove_entry(&event.work);
        let Some((task, entry)) = removed else {
            warn!(
                task_id = %event.work.id(),
                kind = ?event.kind,
                "Completion event for untracked task ignored"
            );
            return;
        };

        let status = match event.kind {
            WorkEventKind::Rejected => CompletionStatus::Rejected,
            _ => CompletionStatus::Completed,
        };
        debug!(
            task_id = %task.id(),
            ?status,
            elapsed_ms = entry.elapsed_ms(Utc::now()),
            failed = event.failure.is_some(),
            "Task completed"
        );
        entry.on_complete.on_completion(TaskCompletion {
            task,
            status,
            failure: event.failure,
        });
    }
}

/// Runs calculation tasks asynchronously and tracks every task in flight.
pub struct ExecutionEngine {
    executor: Arc<dyn WorkExecutor>,
    registry: Registry,
    correlator: Arc<Correlator>,
    config: EngineConfig,
    shut_down: AtomicBool,
}

impl ExecutionEngine {
    /// Create an engine on top of the given executor.
    pub fn new(executor: Arc<dyn WorkExecutor>, config: EngineConfig) -> Self {
        let registry: Registry = Arc::new(RwLock::new(HashMap::new()));
        info!(
            max_in_flight = config.max_in_flight,
            step_delay_ms = config.step_delay.as_millis() as u64,
            "Execution engine started"
        );
        Self {
            executor,
            correlator: Arc::new(Correlator {
                registry: Arc::clone(&registry),
            }),
            registry,
            config,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Create an engine with the default `TokioWorkExecutor`.
    pub fn with_config(config: EngineConfig) -> Self {
        let executor = Arc::new(TokioWorkExecutor::with_config(&config));
        Self::new(executor, config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Build a task carrying this engine's step delay.
    pub fn new_task(&self, operation: Operation, operands: &[i32]) -> CalculationTask {
        CalculationTask::new(operation, operands).with_step_delay(self.config.step_delay)
    }

    /// Submit a task for asynchronous execution.
    ///
    /// On `Ok`, `on_complete` will be called exactly once. On `Err` it is never
    /// called and the task is not tracked. A submission that races with
    /// [`shutdown`](Self::shutdown) returns `Ok` and completes as cancelled, even
    /// if the executor then refuses it.
    pub async fn submit(
        &self,
        task: CalculationTask,
        on_complete: Arc<dyn CompletionHandler>,
    ) -> Result<(), EngineError> {
        {
            let mut registry = self.registry.write().await;
            // Checked under the lock so a concurrent shutdown either sees this
            // entry or we see its flag.
            if self.is_shut_down() {
                return Err(EngineError::ShutDown);
            }
            if registry.contains_key(&task) {
                return Err(EngineError::AlreadySubmitted(task.id()));
            }
            registry.insert(
                task.clone(),
                RegistryEntry {
                    submitted_at: Utc::now(),
                    handle: None,
                    on_complete,
                },
            );
        }
        debug!(task_id = %task.id(), operation = %task.operation(), "Submitting task");

        let listener: Arc<dyn WorkListener> = Arc::clone(&self.correlator) as Arc<dyn WorkListener>;
        match self.executor.start_work(task.clone(), listener).await {
            Ok(handle) => {
                // The task may already have completed and left the registry.
                if let Some(entry) = self.registry.write().await.get_mut(&task) {
                    entry.handle = Some(handle);
                }
                Ok(())
            }
            Err(e) => {
                let withdrawn = self.registry.write().await.remove(&task);
                if withdrawn.is_none() {
                    // A concurrent shutdown drained the entry and already
                    // delivered its cancelled completion.
                    debug!(task_id = %task.id(), error = %e, "Refused after shutdown withdrew the task");
                    return Ok(());
                }
                warn!(task_id = %task.id(), error = %e, "Task submission rejected");
                Err(e)
            }
        }
    }

    /// Request cancellation of one tracked task.
    ///
    /// The task still completes through the normal path, with a cancelled outcome
    /// if it had not yet passed its last checkpoint.
    pub async fn cancel(&self, task_id: &TaskId) -> Result<(), EngineError> {
        let registry = self.registry.read().await;
        let (task, entry) = registry
            .get_key_value(task_id)
            .ok_or(EngineError::TaskNotFound(*task_id))?;
        match &entry.handle {
            Some(handle) => handle.cancel(),
            None => {
                task.cancel();
            }
        }
        Ok(())
    }

    /// Cancel every tracked task and refuse further submissions.
    ///
    /// Each withdrawn task's handler receives a [`CompletionStatus::Cancelled`]
    /// completion now; the task itself stops at its next checkpoint and its own
    /// completion event is then ignored. Does not wait for tasks to stop.
    pub async fn shutdown(&self) -> ShutdownReport {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            debug!("Execution engine already shut down");
            return ShutdownReport::default();
        }
        self.executor.close().await;

        let drained: Vec<(CalculationTask, RegistryEntry)> =
            self.registry.write().await.drain().collect();
        info!(running = drained.len(), "Execution engine stopping");

        let now = Utc::now();
        let mut report = ShutdownReport::default();
        for (task, entry) in drained {
            let elapsed_ms = entry.elapsed_ms(now);
            info!(task_id = %task.id(), elapsed_ms, "Cancelling in-flight task");
            match &entry.handle {
                Some(handle) => handle.cancel(),
                None => {
                    task.cancel();
                }
            }
            report.cancelled.push(CancelledTask {
                task_id: task.id(),
                elapsed_ms,
            });
            entry.on_complete.on_completion(TaskCompletion {
                task,
                status: CompletionStatus::Cancelled,
                failure: None,
            });
        }

        info!(cancelled = report.cancelled.len(), "Execution engine stopped");
        report
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Number of tasks currently tracked.
    pub async fn in_flight(&self) -> usize {
        self.registry.read().await.len()
    }

    pub async fn is_tracked(&self, task_id: &TaskId) -> bool {
        self.registry.read().await.contains_key(task_id)
    }
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::with_config(EngineConfig::default())
    }
}
