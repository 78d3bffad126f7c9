//! Shared test utilities for keygate.
//!
//! Mocks for the chain and predicate interfaces, a reference ERC-20
//! threshold predicate, and fixtures. Use as a dev-dependency:
//!
//! ```toml
//! [dev-dependencies]
//! keygate-test.workspace = true
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod erc20;
pub mod fixtures;
pub mod mocks;

pub use erc20::*;
pub use fixtures::*;
pub use mocks::*;

/// Install a test subscriber honouring `RUST_LOG`. Safe to call repeatedly.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
