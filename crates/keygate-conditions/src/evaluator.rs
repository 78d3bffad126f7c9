//! Evaluating condition trees against a requester.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use futures::future::BoxFuture;
use keygate_chain::ChainProviders;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ConditionError, ConditionResult};
use crate::node::{BalanceComparison, ConditionNode, RemotePredicate};
use crate::predicate::{PredicateCall, PredicateExecutor};

/// Default bound on a single remote predicate call.
pub const DEFAULT_PREDICATE_TIMEOUT: Duration = Duration::from_secs(30);

/// Whether combinators evaluate both operands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    /// Both operands of every AND/OR are evaluated, concurrently, whatever
    /// the first one returns. Every remote predicate in the tree runs exactly
    /// once per evaluation.
    #[default]
    Eager,
    /// AND stops at the first false operand, OR at the first true one,
    /// left to right. Skipped remote predicates do not run.
    Lazy,
}

/// What a failing leaf contributes to the result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// The evaluation fails with the leaf's error.
    #[default]
    Propagate,
    /// The leaf counts as false and the failure is logged.
    Deny,
}

impl FromStr for EvaluationMode {
    type Err = ConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eager" => Ok(Self::Eager),
            "lazy" => Ok(Self::Lazy),
            other => Err(ConditionError::malformed(format!(
                "unknown evaluation mode: {other}"
            ))),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = ConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "propagate" => Ok(Self::Propagate),
            "deny" => Ok(Self::Deny),
            other => Err(ConditionError::malformed(format!(
                "unknown failure policy: {other}"
            ))),
        }
    }
}

/// Evaluates [`ConditionNode`] trees.
///
/// Chain state is read through the explicit [`ChainProviders`] handles;
/// remote predicates go to the configured [`PredicateExecutor`]. Given the
/// same observed chain state and predicate results, every evaluator returns
/// the same answer.
#[derive(Clone)]
pub struct ConditionEvaluator {
    providers: ChainProviders,
    executor: Option<Arc<dyn PredicateExecutor>>,
    mode: EvaluationMode,
    failure_policy: FailurePolicy,
    predicate_timeout: Duration,
}

impl ConditionEvaluator {
    /// Create an evaluator reading chain state through `providers`.
    #[must_use]
    pub fn new(providers: ChainProviders) -> Self {
        Self {
            providers,
            executor: None,
            mode: EvaluationMode::default(),
            failure_policy: FailurePolicy::default(),
            predicate_timeout: DEFAULT_PREDICATE_TIMEOUT,
        }
    }

    /// Set the remote predicate executor.
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn PredicateExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Set the evaluation mode.
    #[must_use]
    pub fn with_mode(mut self, mode: EvaluationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the failure policy.
    #[must_use]
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Set the bound on each remote predicate call.
    #[must_use]
    pub fn with_predicate_timeout(mut self, timeout: Duration) -> Self {
        self.predicate_timeout = timeout;
        self
    }

    /// The evaluation mode.
    #[must_use]
    pub fn mode(&self) -> EvaluationMode {
        self.mode
    }

    /// The failure policy.
    #[must_use]
    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// The chain providers.
    #[must_use]
    pub fn providers(&self) -> &ChainProviders {
        &self.providers
    }

    /// Evaluate `node` for a request made by `requester`.
    ///
    /// # Errors
    ///
    /// Returns [`ConditionError::Malformed`] for an invalid tree. Under
    /// [`FailurePolicy::Propagate`] also returns the first leaf failure
    /// ([`ConditionError::ChainRead`] or
    /// [`ConditionError::PredicateEvaluation`]).
    pub async fn evaluate(&self, node: &ConditionNode, requester: Address) -> ConditionResult<bool> {
        node.validate()?;
        let result = self.eval(node, requester).await?;
        debug!(%requester, result, mode = ?self.mode, "condition tree evaluated");
        Ok(result)
    }

    fn eval<'a>(
        &'a self,
        node: &'a ConditionNode,
        requester: Address,
    ) -> BoxFuture<'a, ConditionResult<bool>> {
        Box::pin(async move {
            match (node, self.mode) {
                (ConditionNode::And { left, right }, EvaluationMode::Eager) => {
                    let (l, r) =
                        futures::join!(self.eval(left, requester), self.eval(right, requester));
                    Ok(l? && r?)
                },
                (ConditionNode::Or { left, right }, EvaluationMode::Eager) => {
                    let (l, r) =
                        futures::join!(self.eval(left, requester), self.eval(right, requester));
                    Ok(l? || r?)
                },
                (ConditionNode::And { left, right }, EvaluationMode::Lazy) => {
                    if !self.eval(left, requester).await? {
                        return Ok(false);
                    }
                    self.eval(right, requester).await
                },
                (ConditionNode::Or { left, right }, EvaluationMode::Lazy) => {
                    if self.eval(left, requester).await? {
                        return Ok(true);
                    }
                    self.eval(right, requester).await
                },
                (leaf, _) => self.eval_leaf(leaf, requester).await,
            }
        })
    }

    async fn eval_leaf(&self, leaf: &ConditionNode, requester: Address) -> ConditionResult<bool> {
        let outcome = match leaf {
            ConditionNode::WalletOwnership(w) => Ok(w.address == requester),
            ConditionNode::BalanceComparison(b) => self.eval_balance(b, requester).await,
            ConditionNode::RemotePredicate(p) => self.eval_remote(p, requester).await,
            ConditionNode::And { .. } | ConditionNode::Or { .. } => {
                Err(ConditionError::malformed("combinator evaluated as a leaf"))
            },
        };

        match outcome {
            Ok(result) => {
                debug!(chain = ?leaf.chain().map(keygate_chain::ChainId::as_str), result, "leaf evaluated");
                Ok(result)
            },
            Err(e @ ConditionError::Malformed { .. }) => Err(e),
            Err(e) if self.failure_policy == FailurePolicy::Deny => {
                warn!(error = %e, "leaf evaluation failed, denying");
                Ok(false)
            },
            Err(e) => Err(e),
        }
    }

    async fn eval_balance(&self, leaf: &BalanceComparison, requester: Address) -> ConditionResult<bool> {
        let balance = self
            .providers
            .balance(&leaf.chain, &leaf.token, requester)
            .await
            .map_err(|source| ConditionError::ChainRead {
                chain: leaf.chain.to_string(),
                source,
            })?;
        Ok(leaf.comparator.apply(&balance, &leaf.threshold_wei))
    }

    async fn eval_remote(&self, leaf: &RemotePredicate, requester: Address) -> ConditionResult<bool> {
        let failure = |reason: String| ConditionError::PredicateEvaluation {
            code_ref: leaf.code_ref.to_string(),
            function: leaf.function.clone(),
            reason,
        };

        let executor = self
            .executor
            .as_ref()
            .ok_or_else(|| failure("no predicate executor configured".to_string()))?;
        let call = PredicateCall::for_leaf(leaf, requester);

        let returned = tokio::time::timeout(self.predicate_timeout, executor.execute(&call))
            .await
            .map_err(|_| {
                failure(format!(
                    "timed out after {}ms",
                    self.predicate_timeout.as_millis()
                ))
            })??;

        leaf.expected.matches(&returned).map_err(failure)
    }
}

impl fmt::Debug for ConditionEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionEvaluator")
            .field("providers", &self.providers)
            .field("has_executor", &self.executor.is_some())
            .field("mode", &self.mode)
            .field("failure_policy", &self.failure_policy)
            .field("predicate_timeout", &self.predicate_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ConditionBuilder;
    use crate::value::{Comparator, ConditionValue, ReturnValueTest};
    use alloy_primitives::U256;
    use async_trait::async_trait;
    use keygate_chain::{ChainError, ChainId, ChainResult, ChainStateReader, TokenRef};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const CID: &str = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";

    struct FixedBalance(Option<U256>);

    #[async_trait]
    impl ChainStateReader for FixedBalance {
        async fn balance(&self, _token: &TokenRef, _owner: Address) -> ChainResult<U256> {
            self.0
                .ok_or_else(|| ChainError::Rpc("endpoint unavailable".to_string()))
        }

        async fn block_height(&self) -> ChainResult<u64> {
            Ok(1)
        }
    }

    enum Script {
        Returns(ConditionValue),
        Fails,
        Hangs,
    }

    struct ScriptedExecutor {
        script: Script,
        calls: AtomicUsize,
    }

    impl ScriptedExecutor {
        fn new(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PredicateExecutor for ScriptedExecutor {
        async fn execute(&self, call: &PredicateCall) -> ConditionResult<ConditionValue> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.script {
                Script::Returns(value) => Ok(value.clone()),
                Script::Fails => Err(ConditionError::PredicateEvaluation {
                    code_ref: call.code_ref.to_string(),
                    function: call.function.clone(),
                    reason: "sandbox crashed".to_string(),
                }),
                Script::Hangs => std::future::pending().await,
            }
        }
    }

    fn requester() -> Address {
        Address::repeat_byte(0xaa)
    }

    fn evaluator(balance: Option<u64>, executor: Arc<ScriptedExecutor>) -> ConditionEvaluator {
        let providers = ChainProviders::new().with_reader(
            ChainId::ethereum(),
            Arc::new(FixedBalance(balance.map(U256::from))),
        );
        ConditionEvaluator::new(providers).with_executor(executor)
    }

    fn remote() -> ConditionBuilder {
        ConditionBuilder::new()
            .require_remote_predicate(CID, "go", vec![], ReturnValueTest::is_true())
            .on("ethereum")
    }

    fn balance_at_least(wei: u64) -> ConditionNode {
        ConditionBuilder::new()
            .require_eth_balance(U256::from(wei), Comparator::Ge)
            .on("ethereum")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_wallet_ownership() {
        let tree = ConditionBuilder::new()
            .require_wallet_ownership(requester())
            .on("ethereum")
            .build()
            .unwrap();
        let eval = evaluator(None, ScriptedExecutor::new(Script::Fails));
        assert!(eval.evaluate(&tree, requester()).await.unwrap());
        assert!(!eval.evaluate(&tree, Address::ZERO).await.unwrap());
    }

    #[tokio::test]
    async fn test_balance_threshold() {
        let tree = balance_at_least(100);
        let exec = ScriptedExecutor::new(Script::Fails);
        assert!(!evaluator(Some(99), exec.clone()).evaluate(&tree, requester()).await.unwrap());
        assert!(evaluator(Some(100), exec).evaluate(&tree, requester()).await.unwrap());
    }

    #[tokio::test]
    async fn test_true_predicate_and_false_balance_is_false() {
        let tree = remote().and().require(balance_at_least(100)).build().unwrap();
        for mode in [EvaluationMode::Eager, EvaluationMode::Lazy] {
            let exec = ScriptedExecutor::new(Script::Returns(true.into()));
            let eval = evaluator(Some(0), exec.clone()).with_mode(mode);
            assert!(!eval.evaluate(&tree, requester()).await.unwrap(), "{mode:?}");
            assert_eq!(exec.calls(), 1);
        }
    }

    #[tokio::test]
    async fn test_eager_runs_predicates_lazy_skips_them() {
        let tree = ConditionBuilder::new()
            .require(balance_at_least(100))
            .and()
            .require(remote().build().unwrap())
            .build()
            .unwrap();

        let exec = ScriptedExecutor::new(Script::Returns(true.into()));
        let eager = evaluator(Some(0), exec.clone());
        assert!(!eager.evaluate(&tree, requester()).await.unwrap());
        assert_eq!(exec.calls(), 1);

        let exec = ScriptedExecutor::new(Script::Returns(true.into()));
        let lazy = evaluator(Some(0), exec.clone()).with_mode(EvaluationMode::Lazy);
        assert!(!lazy.evaluate(&tree, requester()).await.unwrap());
        assert_eq!(exec.calls(), 0);
    }

    #[tokio::test]
    async fn test_predicate_failure_propagates_by_default() {
        let tree = remote().build().unwrap();
        let err = evaluator(Some(0), ScriptedExecutor::new(Script::Fails))
            .evaluate(&tree, requester())
            .await
            .unwrap_err();
        assert!(matches!(err, ConditionError::PredicateEvaluation { .. }));
    }

    #[tokio::test]
    async fn test_deny_policy_turns_failures_false() {
        let tree = remote().or().require_wallet_ownership(requester()).on("ethereum").build().unwrap();
        let eval = evaluator(Some(0), ScriptedExecutor::new(Script::Fails))
            .with_failure_policy(FailurePolicy::Deny);
        assert!(eval.evaluate(&tree, requester()).await.unwrap());
        assert!(!eval.evaluate(&tree, Address::ZERO).await.unwrap());
    }

    #[tokio::test]
    async fn test_chain_read_failure() {
        let tree = balance_at_least(1);
        let exec = ScriptedExecutor::new(Script::Fails);

        let err = evaluator(None, exec.clone())
            .evaluate(&tree, requester())
            .await
            .unwrap_err();
        assert!(matches!(err, ConditionError::ChainRead { .. }));
        assert!(err.is_retryable());

        let denied = evaluator(None, exec)
            .with_failure_policy(FailurePolicy::Deny)
            .evaluate(&tree, requester())
            .await
            .unwrap();
        assert!(!denied);
    }

    #[tokio::test(start_paused = true)]
    async fn test_predicate_timeout() {
        let tree = remote().build().unwrap();
        let err = evaluator(Some(0), ScriptedExecutor::new(Script::Hangs))
            .with_predicate_timeout(Duration::from_secs(5))
            .evaluate(&tree, requester())
            .await
            .unwrap_err();
        match err {
            ConditionError::PredicateEvaluation { reason, .. } => {
                assert!(reason.contains("timed out after 5000ms"));
            },
            other => panic!("expected predicate error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_mismatched_return_kind_is_an_error() {
        let tree = remote().build().unwrap();
        let err = evaluator(Some(0), ScriptedExecutor::new(Script::Returns("true".into())))
            .evaluate(&tree, requester())
            .await
            .unwrap_err();
        assert!(matches!(err, ConditionError::PredicateEvaluation { .. }));
    }

    #[tokio::test]
    async fn test_missing_executor() {
        let tree = remote().build().unwrap();
        let err = ConditionEvaluator::new(ChainProviders::new())
            .evaluate(&tree, requester())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no predicate executor"));
    }

    #[test]
    fn test_parse_mode_and_policy() {
        assert_eq!("Lazy".parse::<EvaluationMode>().unwrap(), EvaluationMode::Lazy);
        assert_eq!("deny".parse::<FailurePolicy>().unwrap(), FailurePolicy::Deny);
        assert!("sometimes".parse::<EvaluationMode>().is_err());
    }
}
