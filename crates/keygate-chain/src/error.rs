//! Chain read and consistency-wait error types.

use thiserror::Error;

/// Errors from reading chain state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    /// No reader is registered for the chain.
    #[error("no state reader registered for chain: {chain}")]
    UnknownChain {
        /// The chain that was asked for.
        chain: String,
    },

    /// A read did not complete within its timeout.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        /// The read that timed out.
        operation: String,
        /// The timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// The endpoint returned an error or could not be reached.
    #[error("rpc error: {0}")]
    Rpc(String),

    /// The endpoint answered with something that is not a valid response.
    #[error("invalid rpc response: {0}")]
    InvalidResponse(String),
}

impl ChainError {
    /// Whether a later retry of the same read may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Rpc(_))
    }
}

/// Result type for chain reads.
pub type ChainResult<T> = Result<T, ChainError>;

/// Errors from [`ConsistencyWaiter`](crate::ConsistencyWaiter).
///
/// Every variant carries the last observed counter value so the caller can
/// decide whether to retry. The waiter itself never retries past its deadline.
#[derive(Debug, Error)]
pub enum WaitError {
    /// The deadline passed before the counter reached the target.
    #[error("counter did not reach {target} within {elapsed_ms}ms (last observed: {last_observed:?})")]
    Timeout {
        /// Last value read from the source, if any read completed.
        last_observed: Option<u64>,
        /// The value the counter had to reach.
        target: u64,
        /// Time spent waiting, in milliseconds.
        elapsed_ms: u64,
    },

    /// The wait was cancelled by the caller.
    #[error("wait cancelled (last observed: {last_observed:?})")]
    Cancelled {
        /// Last value read from the source, if any read completed.
        last_observed: Option<u64>,
    },

    /// Reading the counter failed.
    #[error("counter read failed after {elapsed_ms}ms (last observed: {last_observed:?}): {source}")]
    Source {
        /// The underlying read error.
        #[source]
        source: ChainError,
        /// Last value read from the source before the failure.
        last_observed: Option<u64>,
        /// Time spent waiting, in milliseconds.
        elapsed_ms: u64,
    },
}

impl WaitError {
    /// The last counter value observed before the wait ended.
    #[must_use]
    pub fn last_observed(&self) -> Option<u64> {
        match self {
            Self::Timeout { last_observed, .. }
            | Self::Cancelled { last_observed }
            | Self::Source { last_observed, .. } => *last_observed,
        }
    }
}
