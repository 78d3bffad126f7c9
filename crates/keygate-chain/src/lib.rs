//! Keygate Chain - Chain state reads for predicate evaluation.
//!
//! This crate provides:
//! - The [`ChainStateReader`] interface evaluators read balances and block
//!   heights through
//! - [`ChainProviders`], explicit reader handles keyed by [`ChainId`]
//! - [`ConsistencyWaiter`], which blocks until a monotonic counter (block
//!   height) has advanced a safety margin past a reference point
//! - [`JsonRpcChainReader`], an Ethereum JSON-RPC implementation
//!
//! # Why wait at all
//!
//! A caller that just mutated chain state through one endpoint cannot assume
//! that the independent replicas evaluators read from have observed it yet.
//! Waiting for the block height to move `margin` blocks past the mutation's
//! block bridges that gap without synchronized clocks.
//!
//! # Example
//!
//! ```
//! use keygate_chain::{ConsistencyWaiter, WaitConfig};
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), keygate_chain::WaitError> {
//! let waiter = ConsistencyWaiter::new(
//!     WaitConfig::new(2, Duration::from_millis(10)).with_deadline(Duration::from_secs(5)),
//! );
//! let reached = waiter.await_advance(100, || async { Ok(102) }).await?;
//! assert_eq!(reached, 102);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod consistency;
mod error;
mod providers;
mod reader;
mod rpc;
mod types;

pub use consistency::{ConsistencyWaiter, MAX_DEADLINE, WaitConfig};
pub use error::{ChainError, ChainResult, WaitError};
pub use providers::ChainProviders;
pub use reader::ChainStateReader;
pub use rpc::JsonRpcChainReader;
pub use types::{ChainId, TokenRef};

/// Re-exported EVM primitives used across the public API.
pub use alloy_primitives::{Address, U256};
