//! Keygate Capacity - Delegated capacity ledgers.
//!
//! A delegator owns a [`CapacityLedger`] holding a [`Restriction`] and the set
//! of addresses allowed to spend against it. Each delegatee's usage is
//! limited over a rolling window of `period_secs` by both a request count and
//! a spend limit in wei. [`CapacityRegistry`] holds ledgers for many
//! delegators.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod ledger;
mod registry;
mod restriction;

pub use error::{CapacityError, CapacityResult};
pub use ledger::{CapacityLedger, ExceededReason, LedgerSnapshot, UsageRecord};
pub use registry::CapacityRegistry;
pub use restriction::Restriction;
