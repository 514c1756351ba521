//! End-to-end scenarios through the connection manager.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use turul_calc_adapter::prelude::*;
use turul_calc_engine::EngineConfig;

fn config(step_delay_ms: u64, timeout_ms: u64) -> AdapterConfig {
    AdapterConfig {
        operation_timeout: Duration::from_millis(timeout_ms),
        engine: EngineConfig {
            max_in_flight: 0,
            step_delay: Duration::from_millis(step_delay_ms),
        },
    }
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

#[tokio::test]
async fn test_sum_and_product_scenarios() {
    let manager = ConnectionManager::new(AdapterConfig::default());

    let sum = manager.allocate(Operation::Sum).unwrap();
    assert_eq!(
        sum.perform_while_waiting(&[1, 2, 3, 4]).await,
        Ok(TaskOutcome::Value(10))
    );

    let product = manager.allocate(Operation::Product).unwrap();
    assert_eq!(
        product.perform_while_waiting(&[]).await,
        Ok(TaskOutcome::NoResult)
    );
    assert_eq!(
        product.perform_while_waiting(&[2, 3, 4]).await,
        Ok(TaskOutcome::Value(24))
    );
}

#[tokio::test]
async fn test_cancel_while_sleeping_between_checkpoints() {
    let manager = ConnectionManager::new(config(50, 5000));
    let handle = manager.allocate(Operation::Sum).unwrap();
    let (callback, mut rx) = channel_callback();

    handle
        .perform_with_callback(&[5, 5, 5, 5, 5], callback)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(handle.cancel().await);

    let result = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result, Ok(TaskOutcome::Cancelled));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_late_completion_after_timeout_is_dropped() {
    let manager = ConnectionManager::new(config(40, 50));
    let handle = manager.allocate(Operation::Product).unwrap();

    let result = handle.perform_while_waiting(&[1, 2, 3, 4, 5]).await;
    assert!(matches!(result, Err(CalculatorError::Timeout(_))));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(
        handle.owner().state(),
        ResourceState::Idle,
        "late completion frees the resource"
    );
    assert_eq!(
        handle.perform_while_waiting(&[]).await,
        Ok(TaskOutcome::NoResult)
    );
}

#[tokio::test]
async fn test_shutdown_with_two_in_flight() {
    let manager = ConnectionManager::new(config(100, 5000));
    let calls = Arc::new(AtomicUsize::new(0));
    let cancelled = Arc::new(AtomicUsize::new(0));

    for operation in Operation::ALL {
        let handle = manager.allocate(operation).unwrap();
        let on_ok_calls = Arc::clone(&calls);
        let on_ok_cancelled = Arc::clone(&cancelled);
        let on_err_calls = Arc::clone(&calls);
        let callback = callback_fn(
            move |outcome| {
                on_ok_calls.fetch_add(1, Ordering::SeqCst);
                if outcome.is_cancelled() {
                    on_ok_cancelled.fetch_add(1, Ordering::SeqCst);
                }
            },
            move |_| {
                on_err_calls.fetch_add(1, Ordering::SeqCst);
            },
        );
        handle
            .perform_with_callback(&[1, 2, 3, 4, 5], callback)
            .await
            .unwrap();
    }
    assert_eq!(manager.engine().in_flight().await, 2);

    let report = manager.shutdown().await;
    assert_eq!(report.cancelled.len(), 2);
    assert_eq!(manager.engine().in_flight().await, 0);
    assert_eq!(manager.live_resources(), 0);

    // Let the tasks observe cancellation and report back.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cancelled.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_saturated_engine_is_a_resource_failure() {
    let mut config = config(100, 5000);
    config.engine.max_in_flight = 1;
    let manager = ConnectionManager::new(config);
    let busy = manager.allocate(Operation::Sum).unwrap();
    let other = manager.allocate(Operation::Sum).unwrap();
    let (callback, _rx) = channel_callback();

    busy.perform_with_callback(&[1, 2], callback).await.unwrap();
    let refused = other.perform_while_waiting(&[1]).await;
    assert!(matches!(refused, Err(CalculatorError::Resource(_))));
    // Nothing is left pending on the refused resource.
    assert_eq!(other.owner().state(), ResourceState::Idle);
}
