//! Waiting for independently observed state to catch up.
//!
//! [`ConsistencyWaiter::await_advance`] polls a monotonic counter until it
//! reaches `reference + required_margin`. The deadline is always finite.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{ChainResult, WaitError};
use crate::reader::ChainStateReader;

/// Default number of blocks to wait past the reference point.
pub const DEFAULT_REQUIRED_MARGIN: u64 = 2;

/// Default delay between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default upper bound on a whole wait.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(60);

/// Longest deadline a wait honours; longer ones are clamped to it.
pub const MAX_DEADLINE: Duration = Duration::from_secs(24 * 60 * 60);

/// Parameters of a consistency wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    /// How far past the reference point the counter must move.
    pub required_margin: u64,
    /// Delay between polls.
    pub poll_interval: Duration,
    /// Maximum time the wait may take, measured from its first poll.
    pub deadline: Duration,
}

impl WaitConfig {
    /// Create a config with the default deadline.
    #[must_use]
    pub fn new(required_margin: u64, poll_interval: Duration) -> Self {
        Self {
            required_margin,
            poll_interval,
            deadline: DEFAULT_DEADLINE,
        }
    }

    /// Set the deadline, clamped to [`MAX_DEADLINE`].
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline.min(MAX_DEADLINE);
        self
    }

    /// The deadline a wait actually uses.
    #[must_use]
    pub fn effective_deadline(&self) -> Duration {
        self.deadline.min(MAX_DEADLINE)
    }

    /// The counter value that ends the wait for a given reference point.
    #[must_use]
    pub fn target(&self, reference: u64) -> u64 {
        reference.saturating_add(self.required_margin)
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self::new(DEFAULT_REQUIRED_MARGIN, DEFAULT_POLL_INTERVAL)
    }
}

/// Blocks a caller until a counter has advanced far enough.
#[derive(Debug, Clone, Default)]
pub struct ConsistencyWaiter {
    config: WaitConfig,
    cancel: Option<CancellationToken>,
}

impl ConsistencyWaiter {
    /// Create a waiter.
    #[must_use]
    pub fn new(config: WaitConfig) -> Self {
        Self {
            config,
            cancel: None,
        }
    }

    /// Let the caller abort the wait through `token`.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The wait parameters.
    #[must_use]
    pub fn config(&self) -> &WaitConfig {
        &self.config
    }

    /// Poll `source` until it returns at least `reference + required_margin`.
    ///
    /// The first read happens immediately. A new poll is only scheduled if it
    /// would start before the deadline; reads themselves are also cut off at
    /// the deadline. Returns the observed value that satisfied the target.
    ///
    /// # Errors
    ///
    /// - [`WaitError::Timeout`] if the deadline passes first.
    /// - [`WaitError::Cancelled`] if the cancellation token fires.
    /// - [`WaitError::Source`] if a read fails; the waiter does not retry
    ///   failed reads.
    pub async fn await_advance<F, Fut>(&self, reference: u64, mut source: F) -> Result<u64, WaitError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ChainResult<u64>>,
    {
        let target = self.config.target(reference);
        let started = Instant::now();
        let Some(deadline) = started.checked_add(self.config.effective_deadline()) else {
            return Err(WaitError::Timeout {
                last_observed: None,
                target,
                elapsed_ms: 0,
            });
        };
        let mut last_observed = None;
        let mut polls: u32 = 0;

        loop {
            let read = tokio::select! {
                biased;
                () = cancelled(self.cancel.as_ref()) => {
                    return Err(WaitError::Cancelled { last_observed });
                },
                read = tokio::time::timeout_at(deadline, source()) => read,
            };
            polls = polls.saturating_add(1);

            let observed = match read {
                Ok(Ok(value)) => value,
                Ok(Err(source)) => {
                    return Err(WaitError::Source {
                        source,
                        last_observed,
                        elapsed_ms: elapsed_ms(started),
                    });
                },
                Err(_) => {
                    return Err(WaitError::Timeout {
                        last_observed,
                        target,
                        elapsed_ms: elapsed_ms(started),
                    });
                },
            };
            last_observed = Some(observed);

            if observed >= target {
                debug!(reference, target, observed, polls, "counter reached target");
                return Ok(observed);
            }

            let next_poll = Instant::now().checked_add(self.config.poll_interval);
            if next_poll.is_none_or(|at| at > deadline) {
                return Err(WaitError::Timeout {
                    last_observed,
                    target,
                    elapsed_ms: elapsed_ms(started),
                });
            }

            debug!(observed, target, "counter behind target, polling again");
            tokio::select! {
                biased;
                () = cancelled(self.cancel.as_ref()) => {
                    return Err(WaitError::Cancelled { last_observed });
                },
                () = tokio::time::sleep(self.config.poll_interval) => {},
            }
        }
    }

    /// Wait for `reader`'s block height to advance past `reference_block`.
    ///
    /// # Errors
    ///
    /// Same as [`await_advance`](Self::await_advance).
    pub async fn await_block_advance(
        &self,
        reader: &dyn ChainStateReader,
        reference_block: u64,
    ) -> Result<u64, WaitError> {
        self.await_advance(reference_block, || reader.block_height())
            .await
    }
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
