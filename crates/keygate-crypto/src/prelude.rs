//! Prelude module - commonly used types for convenient import.
//!
//! Use `use keygate_crypto::prelude::*;` to import all essential types.

// Errors
pub use crate::{CryptoError, CryptoResult};

// Key types
pub use crate::{KeyPair, PublicKey, Signer};

// Signature
pub use crate::Signature;

// Hashing
pub use crate::ContentHash;
