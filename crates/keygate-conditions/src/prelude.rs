//! Prelude module - commonly used types for convenient import.
//!
//! Use `use keygate_conditions::prelude::*;` to import all essential types.

// Errors
pub use crate::{ConditionError, ConditionResult};

// Tree
pub use crate::{BalanceComparison, ConditionNode, RemotePredicate, WalletOwnership};

// Construction
pub use crate::{CodeRef, Comparator, ConditionBuilder, ConditionValue, ReturnValueTest};

// Evaluation
pub use crate::{ConditionEvaluator, EvaluationMode, FailurePolicy, PredicateCall, PredicateExecutor};
