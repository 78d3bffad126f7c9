//! Attribute-gated access decisions.
//!
//! Ties the pieces together: a [`GatedResource`] binds a payload to a
//! condition tree, and the [`AccessGate`] releases it to a requester holding
//! a valid authorization context, charging the paying delegator's capacity
//! and evaluating the conditions against settled chain state.
//!
//! ```rust,no_run
//! use keygate_engine::{AccessGateBuilder, AccessRequest, GatedResource};
//! use keygate_conditions::{Comparator, ConditionBuilder};
//! use keygate_chain::{ChainId, U256};
//!
//! # async fn run(ctx: keygate_auth::AuthorizationContext) -> keygate_engine::EngineResult<()> {
//! let config = keygate_config::Config::load(None).map_err(|e| {
//!     keygate_engine::EngineError::InvalidConfig { field: "config".into(), reason: e.to_string() }
//! })?;
//! let gate = AccessGateBuilder::from_config(&config.config)?.build();
//!
//! let conditions = ConditionBuilder::new()
//!     .require_eth_balance(U256::from(1u64), Comparator::Ge)
//!     .on(ChainId::ethereum())
//!     .build()?;
//! let resource = GatedResource::new(b"secret", conditions)?;
//!
//! let decision = gate.authorize(&AccessRequest::new(&ctx, &resource)).await?;
//! println!("granted: {}", decision.is_granted());
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

mod builder;
mod error;
mod gate;
mod resource;

pub use builder::{AccessGateBuilder, DEFAULT_CLOCK_SKEW, issuer_from, restriction_from, wait_config_from};
pub use error::{EngineError, EngineResult};
pub use gate::{AccessDecision, AccessGate, AccessRequest, Charge, Payment};
pub use resource::GatedResource;
