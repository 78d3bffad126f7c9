//! Condition construction and evaluation errors.

use keygate_chain::ChainError;
use thiserror::Error;

/// Errors from building or evaluating a condition tree.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConditionError {
    /// The condition tree or one of its leaves is not well-formed.
    #[error("malformed condition: {reason}")]
    Malformed {
        /// What is wrong with it.
        reason: String,
    },

    /// A remote predicate failed or returned something unusable.
    #[error("predicate {code_ref}::{function} failed: {reason}")]
    PredicateEvaluation {
        /// Content reference of the predicate program.
        code_ref: String,
        /// Entry point that was invoked.
        function: String,
        /// Why evaluation failed.
        reason: String,
    },

    /// Reading chain state for a leaf failed.
    #[error("chain read on {chain} failed: {source}")]
    ChainRead {
        /// Chain the leaf is scoped to.
        chain: String,
        /// The underlying read error.
        #[source]
        source: ChainError,
    },
}

impl ConditionError {
    /// Shorthand for [`ConditionError::Malformed`].
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }

    /// Whether retrying the same evaluation later may give a different outcome.
    ///
    /// Construction errors never are.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Malformed { .. } => false,
            Self::PredicateEvaluation { .. } => true,
            Self::ChainRead { source, .. } => source.is_retryable(),
        }
    }
}

/// Result type for condition operations.
pub type ConditionResult<T> = Result<T, ConditionError>;
