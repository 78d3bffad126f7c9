//! Engine error types.

use alloy_primitives::Address;
use thiserror::Error;

use keygate_auth::AuthError;
use keygate_capacity::CapacityError;
use keygate_chain::{ChainError, WaitError};
use keygate_conditions::ConditionError;

/// Errors from the access gate.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The authorization context was rejected.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The condition tree was malformed or could not be evaluated.
    #[error(transparent)]
    Condition(#[from] ConditionError),

    /// The paying delegator's ledger refused the charge.
    #[error(transparent)]
    Capacity(#[from] CapacityError),

    /// A chain read failed outside condition evaluation.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// A settlement wait did not complete.
    #[error(transparent)]
    Wait(#[from] WaitError),

    /// The request named a delegator with no ledger.
    #[error("no capacity ledger for delegator {delegator}")]
    UnknownDelegator {
        /// The delegator named in the request.
        delegator: Address,
    },

    /// A config value could not be turned into an engine setting.
    #[error("invalid config value for {field}: {reason}")]
    InvalidConfig {
        /// Dotted config path.
        field: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl EngineError {
    /// Whether retrying the same request later may succeed.
    ///
    /// Budget exhaustion counts as retryable: the rolling window frees room.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Auth(e) => e.is_retryable(),
            Self::Condition(e) => e.is_retryable(),
            Self::Capacity(e) => e.is_budget_exceeded(),
            Self::Chain(e) => e.is_retryable(),
            Self::Wait(WaitError::Timeout { .. }) => true,
            Self::Wait(WaitError::Source { source, .. }) => source.is_retryable(),
            Self::Wait(WaitError::Cancelled { .. })
            | Self::UnknownDelegator { .. }
            | Self::InvalidConfig { .. } => false,
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
