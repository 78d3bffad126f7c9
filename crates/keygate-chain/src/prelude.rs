//! Prelude module - commonly used types for convenient import.
//!
//! Use `use keygate_chain::prelude::*;` to import all essential types.

// Errors
pub use crate::{ChainError, ChainResult, WaitError};

// Identifiers
pub use crate::{Address, ChainId, TokenRef, U256};

// Reading
pub use crate::{ChainProviders, ChainStateReader, JsonRpcChainReader};

// Consistency
pub use crate::{ConsistencyWaiter, WaitConfig};
