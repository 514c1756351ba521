//! Error types for calculator resources and handles

use std::time::Duration;

use thiserror::Error;
use turul_calc_engine::{EngineError, TaskFailure};

/// Result type for calculator operations
pub type CalculatorResult<T> = Result<T, CalculatorError>;

/// Errors surfaced to calculator clients
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CalculatorError {
    /// The resource or handle is not in a state that allows the call
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// The call's arguments do not match this resource
    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    /// A blocking call did not get its result in time
    #[error("Operation timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The engine refused or lost the work
    #[error("Resource error: {0}")]
    Resource(String),

    /// The task ran and failed
    #[error("Execution failed: {0}")]
    Execution(#[from] TaskFailure),
}

impl CalculatorError {
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState(message.into())
    }

    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::IllegalArgument(message.into())
    }

    pub fn resource(message: impl Into<String>) -> Self {
        Self::Resource(message.into())
    }
}

impl From<EngineError> for CalculatorError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Rejected(reason) => Self::Resource(reason),
            other => Self::IllegalState(other.to_string()),
        }
    }
}
