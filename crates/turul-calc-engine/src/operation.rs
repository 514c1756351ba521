//! The closed set of reducers a calculation can apply.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TaskFailure;

/// Binary reducer folded left-to-right over a sequence of operands.
///
/// The first operand seeds the accumulator; there is no identity element, so an
/// empty sequence has no result at all (rather than `0` or `1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    #[serde(alias = "ADD")]
    Sum,
    #[serde(alias = "MULTIPLY")]
    Product,
}

impl Operation {
    /// Every supported operation, in declaration order.
    pub const ALL: [Operation; 2] = [Operation::Sum, Operation::Product];

    /// Fold a single operand into the accumulator.
    pub fn combine(self, acc: i64, operand: i32) -> Result<i64, TaskFailure> {
        let wide = i64::from(operand);
        let combined = match self {
            Operation::Sum => acc.checked_add(wide),
            Operation::Product => acc.checked_mul(wide),
        };
        combined.ok_or(TaskFailure::Overflow {
            operation: self,
            operand,
        })
    }

    /// Apply the operation to a whole sequence without delays or cancellation.
    ///
    /// Returns `Ok(None)` for an empty sequence.
    pub fn apply(self, operands: &[i32]) -> Result<Option<i64>, TaskFailure> {
        let Some((first, rest)) = operands.split_first() else {
            return Ok(None);
        };
        rest.iter()
            .try_fold(i64::from(*first), |acc, &operand| self.combine(acc, operand))
            .map(Some)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Sum => f.write_str("SUM"),
            Operation::Product => f.write_str("PRODUCT"),
        }
    }
}

/// Returned when parsing a name that is not a known operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown operation: {0}")]
pub struct UnknownOperation(pub String);

impl FromStr for Operation {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SUM" | "ADD" => Ok(Operation::Sum),
            "PRODUCT" | "MULTIPLY" => Ok(Operation::Product),
            _ => Err(UnknownOperation(s.to_string())),
        }
    }
}
