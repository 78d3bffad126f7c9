//! Keygate Conditions - Composable access conditions.
//!
//! An access condition is a tree of chain-scoped leaves joined by AND/OR:
//!
//! - [`WalletOwnership`]: the requester is a given wallet
//! - [`BalanceComparison`]: the requester's native or token balance compares
//!   against a threshold
//! - [`RemotePredicate`]: a content-addressed sandboxed program returns a
//!   value passing a [`ReturnValueTest`]
//!
//! Trees are built with the immutable [`ConditionBuilder`] and evaluated by
//! a [`ConditionEvaluator`], which reads chain state through explicit
//! [`ChainProviders`](keygate_chain::ChainProviders) and runs remote
//! predicates through a [`PredicateExecutor`].
//!
//! # Example
//!
//! ```
//! use keygate_conditions::prelude::*;
//!
//! let tree = ConditionBuilder::new()
//!     .require_remote_predicate(
//!         "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG",
//!         "go",
//!         vec!["0x5FbDB2315678afecb367f032d93F642f64180aa3".into(), 1_000u64.into()],
//!         ReturnValueTest::is_true(),
//!     )
//!     .on("ethereum")
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(tree.remote_predicates().len(), 1);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod builder;
mod code_ref;
mod error;
mod evaluator;
mod node;
mod predicate;
mod value;

pub use builder::ConditionBuilder;
pub use code_ref::CodeRef;
pub use error::{ConditionError, ConditionResult};
pub use evaluator::{
    ConditionEvaluator, DEFAULT_PREDICATE_TIMEOUT, EvaluationMode, FailurePolicy,
};
pub use node::{
    BalanceComparison, ConditionNode, MAX_TREE_DEPTH, RemotePredicate, WalletOwnership,
};
pub use predicate::{PredicateCall, PredicateExecutor};
pub use value::{
    Comparator, ConditionValue, MAX_ARGS, MAX_ARRAY_LEN, MAX_STRING_LEN, MAX_VALUE_DEPTH,
    ReturnValueTest,
};
