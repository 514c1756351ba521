//! Allocation of managed calculators and their handles.
//!
//! No matching or reuse is performed: every allocation creates a fresh resource,
//! and a resource is destroyed as soon as its handle is closed.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info};
use turul_calc_engine::{ExecutionEngine, Operation, ShutdownReport};

use crate::config::AdapterConfig;
use crate::error::{CalculatorError, CalculatorResult};
use crate::handle::CalculatorHandle;
use crate::listener::{ConnectionEvent, ConnectionEventListener};
use crate::managed::{ManagedCalculator, ResourceId};

type LiveResources = Mutex<HashMap<ResourceId, ManagedCalculator>>;

/// Evicts a resource once its handle is closed.
struct PoolListener {
    live: Weak<LiveResources>,
}

impl ConnectionEventListener for PoolListener {
    fn connection_closed(&self, event: &ConnectionEvent) {
        let Some(live) = self.live.upgrade() else {
            return;
        };
        let removed = live.lock().remove(&event.resource_id);
        if let Some(resource) = removed {
            debug!(
                resource_id = %event.resource_id,
                handle_id = %event.handle_id,
                "Handle returned, evicting resource"
            );
            resource.destroy();
        }
    }
}

/// Owns the engine and every live managed calculator.
pub struct ConnectionManager {
    engine: Arc<ExecutionEngine>,
    config: AdapterConfig,
    live: Arc<LiveResources>,
    pool_listener: Arc<PoolListener>,
}

impl ConnectionManager {
    /// Create a manager with its own engine built from `config.engine`.
    pub fn new(config: AdapterConfig) -> Self {
        let engine = Arc::new(ExecutionEngine::with_config(config.engine.clone()));
        Self::with_engine(engine, config)
    }

    pub fn with_engine(engine: Arc<ExecutionEngine>, config: AdapterConfig) -> Self {
        let live: Arc<LiveResources> = Arc::new(Mutex::new(HashMap::new()));
        let pool_listener = Arc::new(PoolListener {
            live: Arc::downgrade(&live),
        });
        Self {
            engine,
            config,
            live,
            pool_listener,
        }
    }

    pub fn engine(&self) -> &Arc<ExecutionEngine> {
        &self.engine
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Create a fresh resource for `operation` and return a handle onto it.
    pub fn allocate(&self, operation: Operation) -> CalculatorResult<CalculatorHandle> {
        if self.engine.is_shut_down() {
            return Err(CalculatorError::illegal_state("connection manager is shut down"));
        }
        let resource = ManagedCalculator::new(Arc::clone(&self.engine), operation, &self.config);
        resource.add_listener(Arc::clone(&self.pool_listener) as Arc<dyn ConnectionEventListener>);
        let handle = resource.get_connection()?;
        self.live.lock().insert(resource.id(), resource.clone());
        info!(resource_id = %resource.id(), handle_id = %handle.id(), %operation, "Calculator allocated");
        Ok(handle)
    }

    /// Number of allocated resources whose handle has not yet left them.
    pub fn live_resources(&self) -> usize {
        self.live.lock().len()
    }

    /// Destroy every live resource, then shut the engine down.
    ///
    /// Requests still outstanding are cancelled and their callbacks receive a
    /// cancelled outcome.
    pub async fn shutdown(&self) -> ShutdownReport {
        let drained: Vec<ManagedCalculator> = self.live.lock().drain().map(|(_, r)| r).collect();
        info!(resources = drained.len(), "Connection manager shutting down");
        for resource in drained {
            resource.destroy();
        }
        self.engine.shutdown().await
    }
}

/// Client entry point: hands out connections for a chosen operation.
#[derive(Clone)]
pub struct CalculatorConnectionFactory {
    manager: Arc<ConnectionManager>,
}

impl CalculatorConnectionFactory {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }

    pub fn get_connection(&self, operation: Operation) -> CalculatorResult<CalculatorHandle> {
        self.manager.allocate(operation)
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }
}
