//! Prelude module for convenient imports.
//!
//! ```rust,no_run
//! use turul_calc_adapter::prelude::*;
//! ```

pub use crate::callback::{ResultsCallback, callback_fn};
pub use crate::config::AdapterConfig;
pub use crate::error::{CalculatorError, CalculatorResult};
pub use crate::handle::CalculatorHandle;
pub use crate::managed::{ManagedCalculator, ResourceState};
pub use crate::manager::{CalculatorConnectionFactory, ConnectionManager};
pub use turul_calc_engine::{Operation, TaskOutcome};
