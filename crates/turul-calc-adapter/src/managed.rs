//! Managed calculator resource: the heavyweight unit between handles and the engine.
//!
//! A resource owns at most one attached [`CalculatorHandle`] and at most one
//! outstanding request. It is the completion target for the tasks it submits and
//! forwards each result to the callback stored with the request.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use turul_calc_engine::{
    CalculationTask, CompletionHandler, ExecutionEngine, Operation, TaskCompletion, TaskFailure,
    TaskId,
};
use uuid::Uuid;

use crate::callback::ResultsCallback;
use crate::config::AdapterConfig;
use crate::error::{CalculatorError, CalculatorResult};
use crate::handle::{CalculatorHandle, HandleId, HandleShared};
use crate::listener::{ConnectionEvent, ConnectionEventListener};

/// Identity of a managed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(Uuid);

impl ResourceId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ResourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Observable lifecycle state of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    /// Open with no request outstanding
    Idle,
    /// A request is outstanding
    Pending,
    /// Its handle was cleaned up, closed or moved away; reusable via `get_connection`
    Detached,
    /// Terminal
    Destroyed,
}

struct PendingRequest {
    task: CalculationTask,
    callback: Arc<dyn ResultsCallback>,
}

struct AttachedHandle {
    id: HandleId,
    shared: Weak<HandleShared>,
}

#[derive(Default)]
struct ResourceSlots {
    destroyed: bool,
    detached: bool,
    handle: Option<AttachedHandle>,
    pending: Option<PendingRequest>,
    listeners: Vec<Arc<dyn ConnectionEventListener>>,
}

pub(crate) struct ResourceInner {
    id: ResourceId,
    engine: Arc<ExecutionEngine>,
    operation: Operation,
    timeout: Duration,
    slots: Mutex<ResourceSlots>,
}

impl CompletionHandler for ResourceInner {
    fn on_completion(&self, completion: TaskCompletion) {
        let pending = {
            let mut slots = self.slots.lock();
            match &slots.pending {
                Some(pending) if pending.task == completion.task => slots.pending.take(),
                _ => None,
            }
        };
        let Some(pending) = pending else {
            warn!(
                resource_id = %self.id,
                task_id = %completion.task.id(),
                "Completion for a request this resource is not waiting on"
            );
            return;
        };

        debug!(
            resource_id = %self.id,
            task_id = %completion.task.id(),
            status = ?completion.status,
            "Request completed"
        );
        match completion.outcome() {
            Ok(outcome) => pending.callback.on_success(outcome),
            Err(TaskFailure::Rejected(reason)) => {
                pending.callback.on_failure(CalculatorError::Resource(reason))
            }
            Err(failure) => pending.callback.on_failure(CalculatorError::Execution(failure)),
        }
    }
}

/// A calculator resource bound to one [`Operation`].
///
/// Cheap to clone; clones refer to the same resource.
#[derive(Clone)]
pub struct ManagedCalculator {
    inner: Arc<ResourceInner>,
}

impl ManagedCalculator {
    pub fn new(engine: Arc<ExecutionEngine>, operation: Operation, config: &AdapterConfig) -> Self {
        let id = ResourceId::new();
        debug!(resource_id = %id, %operation, "Managed calculator created");
        Self {
            inner: Arc::new(ResourceInner {
                id,
                engine,
                operation,
                timeout: config.operation_timeout,
                slots: Mutex::new(ResourceSlots::default()),
            }),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.inner.id
    }

    pub fn operation(&self) -> Operation {
        self.inner.operation
    }

    pub fn state(&self) -> ResourceState {
        let slots = self.inner.slots.lock();
        if slots.destroyed {
            ResourceState::Destroyed
        } else if slots.pending.is_some() {
            ResourceState::Pending
        } else if slots.detached {
            ResourceState::Detached
        } else {
            ResourceState::Idle
        }
    }

    /// Create a handle attached to this resource.
    pub fn get_connection(&self) -> CalculatorResult<CalculatorHandle> {
        let mut slots = self.inner.slots.lock();
        if slots.destroyed {
            return Err(CalculatorError::illegal_state(format!(
                "resource {} is destroyed",
                self.inner.id
            )));
        }
        if let Some(attached) = &slots.handle {
            return Err(CalculatorError::illegal_state(format!(
                "resource {} already has handle {} attached",
                self.inner.id, attached.id
            )));
        }
        let handle = CalculatorHandle::new(self.clone(), self.inner.timeout);
        slots.handle = Some(AttachedHandle {
            id: handle.id(),
            shared: handle.downgrade(),
        });
        slots.detached = false;
        debug!(resource_id = %self.inner.id, handle_id = %handle.id(), "Handle attached");
        Ok(handle)
    }

    /// Submit one request over `operands`, delivering its result to `callback`.
    ///
    /// Fails with an illegal-state error if a request is already outstanding or the
    /// resource is destroyed; the outstanding request is unaffected.
    pub async fn submit(
        &self,
        operands: &[i32],
        callback: Arc<dyn ResultsCallback>,
    ) -> CalculatorResult<TaskId> {
        let task = {
            let mut slots = self.inner.slots.lock();
            if slots.destroyed {
                return Err(CalculatorError::illegal_state(format!(
                    "resource {} is destroyed",
                    self.inner.id
                )));
            }
            if let Some(pending) = &slots.pending {
                warn!(
                    resource_id = %self.inner.id,
                    pending_task = %pending.task.id(),
                    "Submit while a request is outstanding"
                );
                return Err(CalculatorError::illegal_state(format!(
                    "request {} is still pending on resource {}",
                    pending.task.id(),
                    self.inner.id
                )));
            }
            let task = self.inner.engine.new_task(self.inner.operation, operands);
            slots.pending = Some(PendingRequest {
                task: task.clone(),
                callback,
            });
            task
        };

        let task_id = task.id();
        let handler: Arc<dyn CompletionHandler> = Arc::clone(&self.inner) as Arc<dyn CompletionHandler>;
        if let Err(e) = self.inner.engine.submit(task, handler).await {
            let mut slots = self.inner.slots.lock();
            if slots
                .pending
                .as_ref()
                .is_some_and(|pending| pending.task.id() == task_id)
            {
                slots.pending = None;
            }
            return Err(e.into());
        }
        debug!(resource_id = %self.inner.id, %task_id, "Request submitted");
        Ok(task_id)
    }

    /// Ask the outstanding request, if any, to stop. Returns whether one was signalled.
    pub async fn cancel_pending(&self) -> bool {
        let task_id = self
            .inner
            .slots
            .lock()
            .pending
            .as_ref()
            .map(|pending| pending.task.id());
        match task_id {
            Some(task_id) => self.inner.engine.cancel(&task_id).await.is_ok(),
            None => false,
        }
    }

    /// Detach and force-close the attached handle, notifying listeners.
    ///
    /// An outstanding request keeps running and still reaches its callback.
    pub fn cleanup(&self) {
        let detached = {
            let mut slots = self.inner.slots.lock();
            slots.detached = true;
            slots.handle.take()
        };
        let Some(attached) = detached else {
            return;
        };
        if let Some(shared) = attached.shared.upgrade() {
            shared.force_close();
        }
        debug!(resource_id = %self.inner.id, handle_id = %attached.id, "Resource cleaned up");
        self.notify_closed(attached.id);
    }

    /// Clean up and permanently retire this resource. Idempotent.
    pub fn destroy(&self) {
        if self.inner.slots.lock().destroyed {
            return;
        }
        self.cleanup();
        let mut slots = self.inner.slots.lock();
        if !slots.destroyed {
            slots.destroyed = true;
            slots.listeners.clear();
            info!(resource_id = %self.inner.id, "Managed calculator destroyed");
        }
    }

    /// Re-point `handle` at this resource, detaching it from its current owner.
    pub fn associate(&self, handle: &CalculatorHandle) -> CalculatorResult<()> {
        if !handle.is_open() {
            return Err(CalculatorError::illegal_state(format!(
                "handle {} is closed",
                handle.id()
            )));
        }
        self.ensure_can_attach(handle.id())?;

        let previous = handle.owner();
        // The previous owner may already have dropped it during cleanup.
        if previous.id() != self.id() && previous.disassociate(handle).is_ok() {
            previous.notify_closed(handle.id());
        }

        {
            let mut slots = self.inner.slots.lock();
            slots.handle = Some(AttachedHandle {
                id: handle.id(),
                shared: handle.downgrade(),
            });
            slots.detached = false;
        }
        handle.set_owner(self.clone());
        debug!(resource_id = %self.inner.id, handle_id = %handle.id(), "Handle associated");
        Ok(())
    }

    /// Detach `handle` from this resource without closing it.
    pub fn disassociate(&self, handle: &CalculatorHandle) -> CalculatorResult<()> {
        let mut slots = self.inner.slots.lock();
        match &slots.handle {
            Some(attached) if attached.id == handle.id() => {
                slots.handle = None;
                slots.detached = true;
                debug!(resource_id = %self.inner.id, handle_id = %handle.id(), "Handle disassociated");
                Ok(())
            }
            _ => Err(CalculatorError::illegal_argument(format!(
                "handle {} is not associated with resource {}",
                handle.id(),
                self.inner.id
            ))),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn ConnectionEventListener>) {
        let mut slots = self.inner.slots.lock();
        if !slots.listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            slots.listeners.push(listener);
        }
    }

    pub fn remove_listener(&self, listener: &Arc<dyn ConnectionEventListener>) {
        self.inner
            .slots
            .lock()
            .listeners
            .retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// Called by a handle when its client closes it.
    pub(crate) fn close_connection(&self, handle_id: HandleId) {
        {
            let mut slots = self.inner.slots.lock();
            match &slots.handle {
                Some(attached) if attached.id == handle_id => {
                    slots.handle = None;
                    slots.detached = true;
                }
                _ => {
                    warn!(resource_id = %self.inner.id, %handle_id, "Close from a handle that is not attached");
                    return;
                }
            }
        }
        debug!(resource_id = %self.inner.id, %handle_id, "Handle closed by client");
        self.notify_closed(handle_id);
    }

    fn ensure_can_attach(&self, handle_id: HandleId) -> CalculatorResult<()> {
        let slots = self.inner.slots.lock();
        if slots.destroyed {
            return Err(CalculatorError::illegal_state(format!(
                "resource {} is destroyed",
                self.inner.id
            )));
        }
        match &slots.handle {
            Some(attached) if attached.id != handle_id => {
                Err(CalculatorError::illegal_state(format!(
                    "resource {} already has handle {} attached",
                    self.inner.id, attached.id
                )))
            }
            _ => Ok(()),
        }
    }

    /// Listeners run without the resource lock held so they may call back into it.
    fn notify_closed(&self, handle_id: HandleId) {
        let listeners = self.inner.slots.lock().listeners.clone();
        let event = ConnectionEvent {
            resource_id: self.inner.id,
            handle_id,
        };
        for listener in listeners {
            listener.connection_closed(&event);
        }
    }
}

impl fmt::Debug for ManagedCalculator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedCalculator")
            .field("id", &self.inner.id)
            .field("operation", &self.inner.operation)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::callback_fn;
    use turul_calc_engine::{EngineConfig, TaskOutcome};
    use tokio::sync::mpsc;

    fn engine(step_delay_ms: u64) -> Arc<ExecutionEngine> {
        Arc::new(ExecutionEngine::with_config(EngineConfig {
            max_in_flight: 0,
            step_delay: Duration::from_millis(step_delay_ms),
        }))
    }

    fn resource(engine: Arc<ExecutionEngine>, operation: Operation) -> ManagedCalculator {
        ManagedCalculator::new(engine, operation, &AdapterConfig::default())
    }

    fn channel_callback() -> (
        Arc<dyn ResultsCallback>,
        mpsc::UnboundedReceiver<CalculatorResult<TaskOutcome>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let err_tx = tx.clone();
        let callback = callback_fn(
            move |outcome| {
                let _ = tx.send(Ok(outcome));
            },
            move |error| {
                let _ = err_tx.send(Err(error));
            },
        );
        (callback, rx)
    }

    async fn recv(
        rx: &mut mpsc::UnboundedReceiver<CalculatorResult<TaskOutcome>>,
    ) -> CalculatorResult<TaskOutcome> {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("callback within timeout")
            .expect("callback channel open")
    }

    #[derive(Default)]
    struct RecordingListener(Mutex<Vec<ConnectionEvent>>);

    impl ConnectionEventListener for RecordingListener {
        fn connection_closed(&self, event: &ConnectionEvent) {
            self.0.lock().push(*event);
        }
    }

    #[tokio::test]
    async fn test_second_submit_while_pending_is_rejected() {
        let calculator = resource(engine(50), Operation::Sum);
        let (callback, mut rx) = channel_callback();

        calculator.submit(&[1, 2], Arc::clone(&callback)).await.unwrap();
        assert_eq!(calculator.state(), ResourceState::Pending);

        let second = calculator.submit(&[3], Arc::clone(&callback)).await;
        assert!(matches!(second, Err(CalculatorError::IllegalState(_))));

        assert_eq!(recv(&mut rx).await, Ok(TaskOutcome::Value(3)));
        assert_eq!(calculator.state(), ResourceState::Idle);

        // Accepted again right after the first completes.
        calculator.submit(&[3, 4], callback).await.unwrap();
        assert_eq!(recv(&mut rx).await, Ok(TaskOutcome::Value(7)));
    }

    #[tokio::test]
    async fn test_execution_failure_reaches_callback() {
        let calculator = resource(engine(0), Operation::Product);
        let (callback, mut rx) = channel_callback();

        calculator
            .submit(&[i32::MAX, i32::MAX, i32::MAX], callback)
            .await
            .unwrap();
        assert!(matches!(
            recv(&mut rx).await,
            Err(CalculatorError::Execution(TaskFailure::Overflow { .. }))
        ));
    }

    #[tokio::test]
    async fn test_submit_after_engine_shutdown_clears_pending() {
        let engine = engine(0);
        engine.shutdown().await;
        let calculator = resource(engine, Operation::Sum);
        let (callback, _rx) = channel_callback();

        let result = calculator.submit(&[1], callback).await;
        assert!(matches!(result, Err(CalculatorError::IllegalState(_))));
        assert_ne!(calculator.state(), ResourceState::Pending);
    }

    #[tokio::test]
    async fn test_cancel_pending() {
        let calculator = resource(engine(50), Operation::Sum);
        let (callback, mut rx) = channel_callback();
        assert!(!calculator.cancel_pending().await);

        calculator.submit(&[5, 5, 5, 5, 5], callback).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(calculator.cancel_pending().await);
        assert_eq!(recv(&mut rx).await, Ok(TaskOutcome::Cancelled));
    }

    #[test]
    fn test_single_handle_per_resource() {
        let calculator = resource(engine(0), Operation::Sum);
        assert_eq!(calculator.state(), ResourceState::Idle);
        let handle = calculator.get_connection().unwrap();
        assert_eq!(calculator.state(), ResourceState::Idle);
        assert!(matches!(
            calculator.get_connection(),
            Err(CalculatorError::IllegalState(_))
        ));
        assert_eq!(handle.owner().id(), calculator.id());
    }

    #[test]
    fn test_cleanup_force_closes_and_notifies() {
        let calculator = resource(engine(0), Operation::Sum);
        let listener = Arc::new(RecordingListener::default());
        calculator.add_listener(listener.clone());
        calculator.add_listener(listener.clone());
        let handle = calculator.get_connection().unwrap();

        calculator.cleanup();
        assert!(!handle.is_open());
        assert_eq!(calculator.state(), ResourceState::Detached);
        let events = listener.0.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].handle_id, handle.id());
        assert_eq!(events[0].resource_id, calculator.id());
        drop(events);

        // Still usable after cleanup.
        assert!(calculator.get_connection().is_ok());
    }

    #[test]
    fn test_removed_listener_is_not_notified() {
        let calculator = resource(engine(0), Operation::Sum);
        let recording = Arc::new(RecordingListener::default());
        let listener: Arc<dyn ConnectionEventListener> = recording.clone();
        calculator.add_listener(Arc::clone(&listener));
        calculator.remove_listener(&listener);
        calculator.get_connection().unwrap();
        calculator.cleanup();
        assert!(recording.0.lock().is_empty());
    }

    #[tokio::test]
    async fn test_destroy_is_terminal_and_idempotent() {
        let calculator = resource(engine(0), Operation::Sum);
        let handle = calculator.get_connection().unwrap();
        calculator.destroy();
        calculator.destroy();

        assert_eq!(calculator.state(), ResourceState::Destroyed);
        assert!(!handle.is_open());
        let (callback, _rx) = channel_callback();
        assert!(matches!(
            calculator.submit(&[1], callback).await,
            Err(CalculatorError::IllegalState(_))
        ));
        assert!(calculator.get_connection().is_err());
    }

    #[test]
    fn test_associate_moves_handle() {
        let engine = engine(0);
        let first = resource(Arc::clone(&engine), Operation::Sum);
        let second = resource(engine, Operation::Product);
        let handle = first.get_connection().unwrap();

        second.associate(&handle).unwrap();
        assert_eq!(handle.owner().id(), second.id());
        assert_eq!(first.state(), ResourceState::Detached);
        assert_eq!(second.state(), ResourceState::Idle);

        // No longer attached to the first resource.
        assert!(matches!(
            first.disassociate(&handle),
            Err(CalculatorError::IllegalArgument(_))
        ));
        second.disassociate(&handle).unwrap();
        assert_eq!(second.state(), ResourceState::Detached);
    }

    #[test]
    fn test_moving_handle_notifies_previous_owner() {
        let engine = engine(0);
        let first = resource(Arc::clone(&engine), Operation::Sum);
        let second = resource(engine, Operation::Sum);
        let listener = Arc::new(RecordingListener::default());
        first.add_listener(listener.clone());
        let handle = first.get_connection().unwrap();

        second.associate(&handle).unwrap();

        let events = listener.0.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].resource_id, first.id());
        assert_eq!(events[0].handle_id, handle.id());
        assert!(handle.is_open());
    }

    #[tokio::test]
    async fn test_completion_without_handle_returns_to_idle() {
        let calculator = resource(engine(0), Operation::Product);
        let (callback, mut rx) = channel_callback();

        calculator.submit(&[2, 3], callback).await.unwrap();
        assert_eq!(recv(&mut rx).await, Ok(TaskOutcome::Value(6)));
        assert_eq!(calculator.state(), ResourceState::Idle);

        calculator.cleanup();
        assert_eq!(calculator.state(), ResourceState::Detached);
        calculator.get_connection().unwrap();
        assert_eq!(calculator.state(), ResourceState::Idle);
    }

    #[test]
    fn test_associate_refuses_occupied_resource() {
        let engine = engine(0);
        let first = resource(Arc::clone(&engine), Operation::Sum);
        let second = resource(engine, Operation::Sum);
        let handle = first.get_connection().unwrap();
        let _occupant = second.get_connection().unwrap();

        assert!(matches!(
            second.associate(&handle),
            Err(CalculatorError::IllegalState(_))
        ));
        assert_eq!(handle.owner().id(), first.id());
    }
}
