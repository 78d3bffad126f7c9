//! Keygate Auth - Signed authorization contexts.
//!
//! An [`AuthorizationContext`] binds a [`Subject`] (a key and the address
//! derived from it) to a resource scope and a validity window, with
//! `domain` and `statement` strings against replay on other origins. The
//! subject signs the context through any [`Signer`](keygate_crypto::Signer).
//!
//! # Lifecycle
//!
//! ```text
//! issued ──► valid (now < expires_at) ──► expired (terminal)
//! ```
//!
//! There is no revocation: a context ends only by expiry, so lifetimes should
//! be kept short.
//!
//! # Example
//!
//! ```
//! use keygate_auth::prelude::*;
//! use keygate_crypto::KeyPair;
//!
//! # async fn run() -> Result<(), AuthError> {
//! let wallet = KeyPair::generate();
//! let context = AuthorizationContextIssuer::new()
//!     .issue_default(
//!         &wallet,
//!         vec![ResourceGrant::any(ResourceKind::ConditionDecryption)],
//!     )
//!     .await?;
//!
//! context.verify_proof()?;
//! assert_eq!(context.subject.address, address_of(&wallet.export_public_key()));
//! assert!(context.validate(ResourceKind::ConditionDecryption, "ab12", chrono::Utc::now()));
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

mod context;
mod error;
mod issuer;
mod resource;

pub use context::{
    AuthorizationContext, ContextState, SignatureScheme, Subject, ValidityWindow, address_of,
};
pub use error::{AuthError, AuthResult};
pub use issuer::{AuthorizationContextIssuer, DEFAULT_DOMAIN, DEFAULT_STATEMENT, DEFAULT_TTL};
pub use resource::{ResourceGrant, ResourceKind, ResourcePattern};
