//! Capacity ledger error types.

use alloy_primitives::{Address, U256};
use thiserror::Error;

use crate::ledger::ExceededReason;

/// Errors from capacity ledger operations.
#[derive(Debug, Error)]
pub enum CapacityError {
    /// A restriction parameter is out of range.
    #[error("invalid restriction: {field} {reason}")]
    InvalidRestriction {
        /// The offending parameter.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// A delegation batch contained no addresses.
    #[error("delegation batch is empty")]
    EmptyBatch,

    /// Usage was recorded for an address the delegator never delegated to.
    #[error("address {address} has no delegated capacity")]
    NotDelegated {
        /// The address.
        address: Address,
    },

    /// Recording the usage would exceed the active restriction.
    ///
    /// For [`ExceededReason::SpendLimit`] the amounts are in wei; for
    /// [`ExceededReason::RequestLimit`] they count requests.
    #[error("budget exceeded for {address} ({reason}): requested {requested}, available {available}")]
    BudgetExceeded {
        /// The delegatee.
        address: Address,
        /// Which limit was hit.
        reason: ExceededReason,
        /// What the usage needed.
        requested: U256,
        /// What was left in the current window.
        available: U256,
    },

    /// Internal ledger state is unusable.
    #[error("ledger storage error: {0}")]
    Storage(String),
}

impl CapacityError {
    /// Whether this is the expected over-budget outcome rather than misuse.
    #[must_use]
    pub fn is_budget_exceeded(&self) -> bool {
        matches!(self, Self::BudgetExceeded { .. })
    }
}

/// Result type for capacity operations.
pub type CapacityResult<T> = Result<T, CapacityError>;
