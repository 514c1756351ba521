//! Client-facing calculator handle with blocking and callback calling conventions.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};
use turul_calc_engine::{TaskId, TaskOutcome};
use uuid::Uuid;

use crate::callback::{OperationObserver, ResultsCallback};
use crate::error::{CalculatorError, CalculatorResult};
use crate::managed::ManagedCalculator;

/// Identity of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(Uuid);

impl HandleId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for HandleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

pub(crate) struct HandleShared {
    id: HandleId,
    open: AtomicBool,
    owner: Mutex<ManagedCalculator>,
    timeout: Duration,
}

impl HandleShared {
    /// Close without telling the owner (it is the one closing us).
    pub(crate) fn force_close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            debug!(handle_id = %self.id, "Handle force-closed");
        }
    }
}

/// Lightweight client handle onto a [`ManagedCalculator`].
///
/// Clones refer to the same handle. Once closed, by the client or by its
/// resource, every call fails with [`CalculatorError::IllegalState`].
#[derive(Clone)]
pub struct CalculatorHandle {
    shared: Arc<HandleShared>,
}

impl CalculatorHandle {
    pub(crate) fn new(owner: ManagedCalculator, timeout: Duration) -> Self {
        Self {
            shared: Arc::new(HandleShared {
                id: HandleId::new(),
                open: AtomicBool::new(true),
                owner: Mutex::new(owner),
                timeout,
            }),
        }
    }

    pub fn id(&self) -> HandleId {
        self.shared.id
    }

    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::Acquire)
    }

    /// The resource this handle currently submits through.
    pub fn owner(&self) -> ManagedCalculator {
        self.shared.owner.lock().clone()
    }

    /// How long `perform_while_waiting` waits for a result.
    pub fn timeout(&self) -> Duration {
        self.shared.timeout
    }

    pub(crate) fn set_owner(&self, owner: ManagedCalculator) {
        *self.shared.owner.lock() = owner;
    }

    pub(crate) fn downgrade(&self) -> Weak<HandleShared> {
        Arc::downgrade(&self.shared)
    }

    fn ensure_open(&self) -> CalculatorResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(CalculatorError::illegal_state(format!(
                "handle {} is closed",
                self.shared.id
            )))
        }
    }

    /// Submit `operands` and wait for the result, up to the configured timeout.
    ///
    /// On timeout the task is left running; its eventual result is discarded.
    pub async fn perform_while_waiting(&self, operands: &[i32]) -> CalculatorResult<TaskOutcome> {
        self.ensure_open()?;
        let (observer, rx) = OperationObserver::channel();
        let task_id = self.owner().submit(operands, observer).await?;

        match tokio::time::timeout(self.shared.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CalculatorError::resource(format!(
                "completion for task {task_id} was lost"
            ))),
            Err(_) => {
                warn!(
                    handle_id = %self.shared.id,
                    %task_id,
                    timeout_ms = self.shared.timeout.as_millis() as u64,
                    "Gave up waiting for result"
                );
                Err(CalculatorError::Timeout(self.shared.timeout))
            }
        }
    }

    /// Submit `operands` and return once accepted; `callback` receives the result.
    pub async fn perform_with_callback(
        &self,
        operands: &[i32],
        callback: Arc<dyn ResultsCallback>,
    ) -> CalculatorResult<TaskId> {
        self.ensure_open()?;
        self.owner().submit(operands, callback).await
    }

    /// Ask the outstanding request, if any, to stop.
    pub async fn cancel(&self) -> bool {
        self.owner().cancel_pending().await
    }

    /// Return the handle to its resource. Later calls are no-ops.
    pub fn close(&self) {
        if !self.shared.open.swap(false, Ordering::AcqRel) {
            return;
        }
        self.owner().close_connection(self.shared.id);
    }
}

impl fmt::Debug for CalculatorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalculatorHandle")
            .field("id", &self.shared.id)
            .field("open", &self.is_open())
            .finish()
    }
}
