//! Adapter configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use turul_calc_engine::EngineConfig;
use turul_calc_engine::config::duration_ms;

/// Default time a blocking call waits for its result
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_millis(5000);

/// Configuration for managed calculators, their handles, and the engine beneath them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Bound on `perform_while_waiting`
    #[serde(with = "duration_ms")]
    pub operation_timeout: Duration,

    /// Engine settings
    pub engine: EngineConfig,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            engine: EngineConfig::default(),
        }
    }
}

impl AdapterConfig {
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.engine.step_delay = delay;
        self
    }
}
