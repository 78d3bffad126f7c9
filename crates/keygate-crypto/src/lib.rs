//! Keygate Crypto - Signing identities and hashing for the authorization engine.
//!
//! This crate provides:
//! - Ed25519 key pairs with secure memory handling
//! - Signatures over authorization contexts
//! - The [`Signer`] seam used when an external signer holds the key
//! - BLAKE3 content hashing for gated resource identifiers
//!
//! # Example
//!
//! ```
//! use keygate_crypto::{KeyPair, ContentHash};
//!
//! let keypair = KeyPair::generate();
//!
//! let message = b"decrypt test data";
//! let signature = keypair.sign(message);
//! assert!(keypair.verify(message, &signature).is_ok());
//!
//! let hash = ContentHash::hash(message);
//! println!("Hash: {}", hash.to_hex());
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod hash;
mod keypair;
mod signature;
mod signer;

pub use error::{CryptoError, CryptoResult};
pub use hash::ContentHash;
pub use keypair::{KeyPair, PublicKey};
pub use signature::Signature;
pub use signer::Signer;
