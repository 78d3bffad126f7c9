//! The chain state read interface.

use alloy_primitives::{Address, U256};
use async_trait::async_trait;

use crate::error::ChainResult;
use crate::types::TokenRef;

/// Read access to one chain's state through one endpoint.
///
/// Implementations make no read-after-write promise: two readers for the same
/// chain (two RPC endpoints, two replicas) may observe different heights.
#[async_trait]
pub trait ChainStateReader: Send + Sync {
    /// Balance of `owner` in `token`, in the token's smallest unit.
    async fn balance(&self, token: &TokenRef, owner: Address) -> ChainResult<U256>;

    /// Latest block height this endpoint has observed.
    async fn block_height(&self) -> ChainResult<u64>;
}
