//! Chain identifiers and token references.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of the chain a predicate must be evaluated against
/// (e.g. `ethereum`, `basecamp`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(String);

impl ChainId {
    /// Create a chain identifier. Names are case-insensitive and stored lowercase.
    #[must_use]
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_ascii_lowercase())
    }

    /// The `ethereum` chain.
    #[must_use]
    pub fn ethereum() -> Self {
        Self::new("ethereum")
    }

    /// The chain name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the name is usable (non-empty, `[a-z0-9_-]`).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChainId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Which balance a comparison reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "address")]
pub enum TokenRef {
    /// The chain's native currency.
    Native,
    /// An ERC-20 token contract.
    Contract(Address),
}

impl fmt::Display for TokenRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::Contract(address) => write!(f, "erc20:{address}"),
        }
    }
}
