//! Result delivery for calls that do not wait.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;
use turul_calc_engine::TaskOutcome;

use crate::error::{CalculatorError, CalculatorResult};

/// Receives the result of a `perform_with_callback` call, exactly once.
///
/// Invoked on an engine thread; implementations must not block.
pub trait ResultsCallback: Send + Sync {
    fn on_success(&self, outcome: TaskOutcome);
    fn on_failure(&self, error: CalculatorError);
}

struct FnCallback<S, F> {
    on_success: S,
    on_failure: F,
}

impl<S, F> ResultsCallback for FnCallback<S, F>
where
    S: Fn(TaskOutcome) + Send + Sync,
    F: Fn(CalculatorError) + Send + Sync,
{
    fn on_success(&self, outcome: TaskOutcome) {
        (self.on_success)(outcome)
    }

    fn on_failure(&self, error: CalculatorError) {
        (self.on_failure)(error)
    }
}

/// Build a callback from a pair of closures.
pub fn callback_fn<S, F>(on_success: S, on_failure: F) -> Arc<dyn ResultsCallback>
where
    S: Fn(TaskOutcome) + Send + Sync + 'static,
    F: Fn(CalculatorError) + Send + Sync + 'static,
{
    Arc::new(FnCallback {
        on_success,
        on_failure,
    })
}

/// Bridges a callback into a oneshot channel for blocking calls.
pub(crate) struct OperationObserver {
    tx: Mutex<Option<oneshot::Sender<CalculatorResult<TaskOutcome>>>>,
}

impl OperationObserver {
    pub(crate) fn channel() -> (Arc<Self>, oneshot::Receiver<CalculatorResult<TaskOutcome>>) {
        let (tx, rx) = oneshot::channel();
        (
            Arc::new(Self {
                tx: Mutex::new(Some(tx)),
            }),
            rx,
        )
    }

    fn deliver(&self, result: CalculatorResult<TaskOutcome>) {
        let Some(tx) = self.tx.lock().take() else {
            return;
        };
        if tx.send(result).is_err() {
            debug!("Caller stopped waiting, late result discarded");
        }
    }
}

impl ResultsCallback for OperationObserver {
    fn on_success(&self, outcome: TaskOutcome) {
        self.deliver(Ok(outcome));
    }

    fn on_failure(&self, error: CalculatorError) {
        self.deliver(Err(error));
    }
}
