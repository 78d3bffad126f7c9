//! The remote predicate executor interface.
//!
//! Remote predicates are sandboxed programs stored under a content
//! reference. Evaluators hand the program its declared arguments and the
//! requester's verified address; the program returns one value. Programs may
//! have side effects or cost, so how often they run depends on the
//! evaluator's [`EvaluationMode`](crate::EvaluationMode).

use alloy_primitives::Address;
use async_trait::async_trait;
use keygate_chain::ChainId;
use serde::{Deserialize, Serialize};

use crate::code_ref::CodeRef;
use crate::error::ConditionResult;
use crate::node::RemotePredicate;
use crate::value::ConditionValue;

/// One invocation of a remote predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredicateCall {
    /// The program to run.
    pub code_ref: CodeRef,
    /// Entry point.
    pub function: String,
    /// Declared arguments, in order.
    pub args: Vec<ConditionValue>,
    /// Chain the leaf is scoped to.
    pub chain: ChainId,
    /// Verified address of the requester.
    pub requester: Address,
}

impl PredicateCall {
    /// Build the call for `leaf` on behalf of `requester`.
    #[must_use]
    pub fn for_leaf(leaf: &RemotePredicate, requester: Address) -> Self {
        Self {
            code_ref: leaf.code_ref.clone(),
            function: leaf.function.clone(),
            args: leaf.args.clone(),
            chain: leaf.chain.clone(),
            requester,
        }
    }
}

/// Runs remote predicate programs.
///
/// Implementations report failures as
/// [`ConditionError::PredicateEvaluation`](crate::ConditionError::PredicateEvaluation).
/// The evaluator bounds every call with its own timeout; implementations do
/// not need to.
#[async_trait]
pub trait PredicateExecutor: Send + Sync {
    /// Execute `call` and return the program's result.
    async fn execute(&self, call: &PredicateCall) -> ConditionResult<ConditionValue>;
}
