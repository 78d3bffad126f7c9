//! Condition trees built, stored and evaluated end to end.

#![allow(clippy::arithmetic_side_effects)]

use std::sync::Arc;

use alloy_primitives::U256;
use keygate_chain::{ChainProviders, TokenRef};
use keygate_conditions::{
    Comparator, ConditionBuilder, ConditionEvaluator, ConditionValue, EvaluationMode,
    ReturnValueTest,
};
use keygate_test::{
    ERC20_THRESHOLD_FUNCTION, Erc20ThresholdExecutor, MockChainReader, MockPredicateExecutor,
    TEST_CID, test_address, test_chain,
};

fn one_eth() -> U256 {
    U256::from(1_000_000_000_000_000_000u64)
}

#[test]
fn test_same_calls_build_same_tree() {
    let build = || {
        ConditionBuilder::new()
            .require_wallet_ownership(test_address(1))
            .on(test_chain())
            .or()
            .require_eth_balance(one_eth(), Comparator::Ge)
            .on(test_chain())
            .build()
            .unwrap()
    };

    let a = build();
    let b = build();
    assert_eq!(a, b);
    assert_eq!(a.canonical_bytes(), b.canonical_bytes());

    let other = ConditionBuilder::new()
        .require_eth_balance(one_eth(), Comparator::Ge)
        .on(test_chain())
        .or()
        .require_wallet_ownership(test_address(1))
        .on(test_chain())
        .build()
        .unwrap();
    assert_ne!(a.canonical_bytes(), other.canonical_bytes());
}

#[test]
fn test_tree_survives_json_storage() {
    let tree = ConditionBuilder::new()
        .require_remote_predicate(
            TEST_CID,
            ERC20_THRESHOLD_FUNCTION,
            vec![
                ConditionValue::from(test_address(7)),
                ConditionValue::from(U256::from(5u64)),
            ],
            ReturnValueTest::is_true(),
        )
        .on(test_chain())
        .and()
        .require_wallet_ownership(test_address(1))
        .on(test_chain())
        .build()
        .unwrap();

    let json = serde_json::to_string(&tree).unwrap();
    let restored: keygate_conditions::ConditionNode = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, tree);
    assert_eq!(restored.canonical_bytes(), tree.canonical_bytes());
}

#[tokio::test]
async fn test_passing_predicate_and_failing_balance_is_false() {
    let requester = test_address(1);
    let reader = MockChainReader::new();
    let executor = MockPredicateExecutor::returning(true);
    let providers = ChainProviders::new().with_reader(test_chain(), Arc::new(reader));

    let tree = ConditionBuilder::new()
        .require_remote_predicate(TEST_CID, "go", vec![], ReturnValueTest::is_true())
        .on(test_chain())
        .and()
        .require_eth_balance(one_eth(), Comparator::Ge)
        .on(test_chain())
        .build()
        .unwrap();

    for mode in [EvaluationMode::Eager, EvaluationMode::Lazy] {
        let evaluator = ConditionEvaluator::new(providers.clone())
            .with_executor(Arc::new(executor.clone()))
            .with_mode(mode);
        assert!(!evaluator.evaluate(&tree, requester).await.unwrap());
    }
    assert_eq!(executor.call_count(), 2);
}

#[tokio::test]
async fn test_erc20_threshold_program() {
    let contract = test_address(0xee);
    let holder = test_address(1);
    let reader = MockChainReader::new().with_balance(
        TokenRef::Contract(contract),
        holder,
        U256::from(500u64),
    );
    let providers = ChainProviders::new().with_reader(test_chain(), Arc::new(reader));
    let evaluator = ConditionEvaluator::new(providers.clone())
        .with_executor(Arc::new(Erc20ThresholdExecutor::new(providers)));

    let needs = |required: u64| {
        ConditionBuilder::new()
            .require_remote_predicate(
                TEST_CID,
                ERC20_THRESHOLD_FUNCTION,
                vec![
                    ConditionValue::from(contract),
                    ConditionValue::from(U256::from(required)),
                ],
                ReturnValueTest::is_true(),
            )
            .on(test_chain())
            .build()
            .unwrap()
    };

    assert!(evaluator.evaluate(&needs(500), holder).await.unwrap());
    assert!(!evaluator.evaluate(&needs(501), holder).await.unwrap());
    assert!(!evaluator.evaluate(&needs(1), test_address(2)).await.unwrap());
}
