//! A reference remote predicate: ERC-20 balance threshold.
//!
//! `go(contract, required)` answers whether the requester holds at least
//! `required` units of the token at `contract`. Read failures answer `false`
//! rather than erroring, so a flaky endpoint denies instead of failing.

use async_trait::async_trait;
use tracing::debug;

use keygate_chain::{ChainProviders, TokenRef};
use keygate_conditions::{
    ConditionError, ConditionResult, ConditionValue, PredicateCall, PredicateExecutor,
};

/// Entry point the program exports.
pub const ERC20_THRESHOLD_FUNCTION: &str = "go";

/// Executes the ERC-20 threshold program against registered chain readers.
#[derive(Debug, Clone)]
pub struct Erc20ThresholdExecutor {
    providers: ChainProviders,
}

impl Erc20ThresholdExecutor {
    /// Run reads through `providers`.
    #[must_use]
    pub fn new(providers: ChainProviders) -> Self {
        Self { providers }
    }
}

fn bad_call(call: &PredicateCall, reason: impl Into<String>) -> ConditionError {
    ConditionError::PredicateEvaluation {
        code_ref: call.code_ref.to_string(),
        function: call.function.clone(),
        reason: reason.into(),
    }
}

#[async_trait]
impl PredicateExecutor for Erc20ThresholdExecutor {
    async fn execute(&self, call: &PredicateCall) -> ConditionResult<ConditionValue> {
        if call.function != ERC20_THRESHOLD_FUNCTION {
            return Err(bad_call(call, "unknown entry point"));
        }
        let (contract, required) = match call.args.as_slice() {
            [ConditionValue::Address(contract), ConditionValue::Uint(required)] => {
                (*contract, *required)
            },
            _ => return Err(bad_call(call, "expected (address contract, uint required)")),
        };

        let held = match self
            .providers
            .balance(&call.chain, &TokenRef::Contract(contract), call.requester)
            .await
        {
            Ok(held) => held,
            Err(e) => {
                debug!(error = %e, chain = %call.chain, "balance read failed; answering false");
                return Ok(ConditionValue::Bool(false));
            },
        };

        Ok(ConditionValue::Bool(held >= required))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{test_address, test_chain, test_code_ref};
    use crate::mocks::MockChainReader;
    use alloy_primitives::U256;
    use std::sync::Arc;

    fn call(args: Vec<ConditionValue>) -> PredicateCall {
        PredicateCall {
            code_ref: test_code_ref(),
            function: ERC20_THRESHOLD_FUNCTION.to_string(),
            args,
            chain: test_chain(),
            requester: test_address(1),
        }
    }

    fn executor(reader: MockChainReader) -> Erc20ThresholdExecutor {
        Erc20ThresholdExecutor::new(
            ChainProviders::new().with_reader(test_chain(), Arc::new(reader)),
        )
    }

    #[tokio::test]
    async fn test_threshold_boundary() {
        let token = test_address(0xee);
        let reader = MockChainReader::new().with_balance(
            TokenRef::Contract(token),
            test_address(1),
            U256::from(100u64),
        );
        let exec = executor(reader);

        let at = call(vec![token.into(), U256::from(100u64).into()]);
        assert_eq!(exec.execute(&at).await.unwrap(), ConditionValue::Bool(true));

        let above = call(vec![token.into(), U256::from(101u64).into()]);
        assert_eq!(exec.execute(&above).await.unwrap(), ConditionValue::Bool(false));
    }

    #[tokio::test]
    async fn test_read_failure_answers_false() {
        let reader = MockChainReader::new().with_balance_failures(1);
        let exec = executor(reader);

        let c = call(vec![test_address(0xee).into(), U256::ZERO.into()]);
        assert_eq!(exec.execute(&c).await.unwrap(), ConditionValue::Bool(false));
    }

    #[tokio::test]
    async fn test_bad_arguments_rejected() {
        let exec = executor(MockChainReader::new());

        let c = call(vec![ConditionValue::Bool(true)]);
        assert!(matches!(
            exec.execute(&c).await,
            Err(ConditionError::PredicateEvaluation { .. })
        ));

        let mut wrong_fn = call(vec![test_address(0xee).into(), U256::ZERO.into()]);
        wrong_fn.function = "main".to_string();
        assert!(exec.execute(&wrong_fn).await.is_err());
    }
}
