//! Explicit per-chain reader handles.

use alloy_primitives::{Address, U256};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ChainError, ChainResult};
use crate::reader::ChainStateReader;
use crate::types::{ChainId, TokenRef};

/// Default timeout for a single chain read.
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Chain state readers keyed by chain.
///
/// Passed into every operation that reads chain state; there is no global
/// provider. Cloning is cheap and shares the readers.
#[derive(Clone)]
pub struct ChainProviders {
    readers: HashMap<ChainId, Arc<dyn ChainStateReader>>,
    read_timeout: Duration,
}

impl ChainProviders {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            readers: HashMap::new(),
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Register (or replace) the reader for a chain.
    #[must_use]
    pub fn with_reader(mut self, chain: ChainId, reader: Arc<dyn ChainStateReader>) -> Self {
        self.readers.insert(chain, reader);
        self
    }

    /// Set the timeout applied to each read made through the registry.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// The per-read timeout.
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// The reader registered for `chain`.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::UnknownChain`] if none is registered.
    pub fn reader(&self, chain: &ChainId) -> ChainResult<Arc<dyn ChainStateReader>> {
        self.readers
            .get(chain)
            .cloned()
            .ok_or_else(|| ChainError::UnknownChain {
                chain: chain.to_string(),
            })
    }

    /// Whether a reader is registered for `chain`.
    #[must_use]
    pub fn contains(&self, chain: &ChainId) -> bool {
        self.readers.contains_key(chain)
    }

    /// Read a balance on `chain`, bounded by the read timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::UnknownChain`], [`ChainError::Timeout`], or the
    /// reader's own error.
    pub async fn balance(
        &self,
        chain: &ChainId,
        token: &TokenRef,
        owner: Address,
    ) -> ChainResult<U256> {
        let reader = self.reader(chain)?;
        self.bounded("balance read", reader.balance(token, owner))
            .await
    }

    /// Read the block height of `chain`, bounded by the read timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::UnknownChain`], [`ChainError::Timeout`], or the
    /// reader's own error.
    pub async fn block_height(&self, chain: &ChainId) -> ChainResult<u64> {
        let reader = self.reader(chain)?;
        self.bounded("block height read", reader.block_height())
            .await
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        read: impl Future<Output = ChainResult<T>>,
    ) -> ChainResult<T> {
        tokio::time::timeout(self.read_timeout, read)
            .await
            .map_err(|_| ChainError::Timeout {
                operation: operation.to_string(),
                timeout_ms: u64::try_from(self.read_timeout.as_millis()).unwrap_or(u64::MAX),
            })?
    }
}

impl Default for ChainProviders {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ChainProviders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut chains: Vec<&str> = self.readers.keys().map(ChainId::as_str).collect();
        chains.sort_unstable();
        f.debug_struct("ChainProviders")
            .field("chains", &chains)
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedReader {
        height: u64,
        delay: Duration,
    }

    #[async_trait]
    impl ChainStateReader for FixedReader {
        async fn balance(&self, _token: &TokenRef, _owner: Address) -> ChainResult<U256> {
            tokio::time::sleep(self.delay).await;
            Ok(U256::from(7u64))
        }

        async fn block_height(&self) -> ChainResult<u64> {
            tokio::time::sleep(self.delay).await;
            Ok(self.height)
        }
    }

    #[tokio::test]
    async fn test_unknown_chain() {
        let providers = ChainProviders::new();
        let err = providers
            .block_height(&ChainId::ethereum())
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::UnknownChain { .. }));
    }

    #[tokio::test]
    async fn test_reads_route_by_chain() {
        let providers = ChainProviders::new()
            .with_reader(
                ChainId::ethereum(),
                Arc::new(FixedReader {
                    height: 10,
                    delay: Duration::ZERO,
                }),
            )
            .with_reader(
                ChainId::new("basecamp"),
                Arc::new(FixedReader {
                    height: 20,
                    delay: Duration::ZERO,
                }),
            );

        assert_eq!(providers.block_height(&ChainId::ethereum()).await.unwrap(), 10);
        assert_eq!(
            providers
                .block_height(&ChainId::new("basecamp"))
                .await
                .unwrap(),
            20
        );
        let balance = providers
            .balance(&ChainId::ethereum(), &TokenRef::Native, Address::ZERO)
            .await
            .unwrap();
        assert_eq!(balance, U256::from(7u64));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout() {
        let providers = ChainProviders::new()
            .with_reader(
                ChainId::ethereum(),
                Arc::new(FixedReader {
                    height: 1,
                    delay: Duration::from_secs(30),
                }),
            )
            .with_read_timeout(Duration::from_secs(2));

        let err = providers
            .block_height(&ChainId::ethereum())
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::Timeout { timeout_ms: 2000, .. }));
        assert!(err.is_retryable());
    }
}
