//! # Calculator Adapter
//!
//! **Managed calculator resources and client handles over `turul-calc-engine`.**
//!
//! A [`ConnectionManager`] allocates a fresh [`ManagedCalculator`] per request and
//! returns a [`CalculatorHandle`] onto it. Each resource allows one outstanding
//! request at a time; the handle offers two ways to observe its result.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use turul_calc_adapter::prelude::*;
//!
//! # async fn example() -> CalculatorResult<()> {
//! let manager = ConnectionManager::new(AdapterConfig::default());
//! let handle = manager.allocate(Operation::Sum)?;
//!
//! // Blocking convention: wait up to the configured timeout
//! let outcome = handle.perform_while_waiting(&[1, 2, 3, 4]).await?;
//! assert_eq!(outcome.value(), Some(10));
//!
//! // Callback convention: returns once the request is accepted
//! handle
//!     .perform_with_callback(
//!         &[5, 6],
//!         callback_fn(|outcome| println!("sum = {outcome}"), |e| eprintln!("{e}")),
//!     )
//!     .await?;
//!
//! handle.close();
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod callback;
pub mod config;
pub mod error;
pub mod handle;
pub mod listener;
pub mod managed;
pub mod manager;
pub mod prelude;

pub use callback::{ResultsCallback, callback_fn};
pub use config::AdapterConfig;
pub use error::{CalculatorError, CalculatorResult};
pub use handle::{CalculatorHandle, HandleId};
pub use listener::{ConnectionEvent, ConnectionEventListener};
pub use managed::{ManagedCalculator, ResourceId, ResourceState};
pub use manager::{CalculatorConnectionFactory, ConnectionManager};
