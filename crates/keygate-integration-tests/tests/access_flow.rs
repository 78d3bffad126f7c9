//! Full access flow through the gate: context, capacity, conditions and
//! settlement.

#![allow(clippy::arithmetic_side_effects)]

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::U256;
use keygate_capacity::{CapacityError, Restriction};
use keygate_chain::{ChainProviders, TokenRef, WaitConfig};
use keygate_conditions::{
    Comparator, ConditionBuilder, ConditionValue, FailurePolicy, ReturnValueTest,
};
use keygate_engine::{AccessGate, AccessGateBuilder, AccessRequest, EngineError, GatedResource};
use keygate_test::{
    ERC20_THRESHOLD_FUNCTION, Erc20ThresholdExecutor, MockChainReader, TEST_CID, test_address,
    test_chain, test_key, test_key_address, test_scope,
};

fn one_eth() -> U256 {
    U256::from(1_000_000_000_000_000_000u64)
}

fn gate_over(reader: &MockChainReader) -> AccessGate {
    AccessGateBuilder::new()
        .with_reader(test_chain(), Arc::new(reader.clone()))
        .with_wait_config(WaitConfig::new(2, Duration::from_secs(1)))
        .with_default_restriction(Restriction::new(one_eth(), 100, 3600).unwrap())
        .build()
}

#[tokio::test(start_paused = true)]
async fn test_balance_gate_opens_after_transfer_settles() {
    let delegator = test_address(9);
    let requester = test_key_address(1);
    let reader = MockChainReader::new().at_height(100);
    let gate = gate_over(&reader);

    gate.delegator_ledger(delegator)
        .delegate_batch([requester])
        .unwrap();

    let conditions = ConditionBuilder::new()
        .require_eth_balance(one_eth(), Comparator::Ge)
        .on(test_chain())
        .build()
        .unwrap();
    let resource = GatedResource::new(b"sealed key material", conditions).unwrap();
    let ctx = gate
        .issue_context(&test_key(1), test_scope())
        .await
        .unwrap();
    let price = U256::from(1_000u64);
    let request = AccessRequest::new(&ctx, &resource).paid_by(delegator, price);

    let before = gate.authorize(&request).await.unwrap();
    assert!(!before.is_granted());
    assert_eq!(before.charge().unwrap().remaining_wei, one_eth() - price);

    // Transfer lands at block 100; the chain keeps producing blocks.
    reader.set_balance(TokenRef::Native, requester, one_eth() * U256::from(10u64));
    let chain = reader.clone();
    let miner = tokio::spawn(async move {
        for height in 101..=103 {
            tokio::time::sleep(Duration::from_millis(900)).await;
            chain.advance_to(height);
        }
    });

    let settled = gate.await_settlement(&test_chain(), 100).await.unwrap();
    assert!(settled >= 102);

    let after = gate.authorize(&request).await.unwrap();
    assert!(after.is_granted());
    assert_eq!(after.charge().unwrap().remaining_wei, one_eth() - price - price);
    miner.await.unwrap();
}

#[tokio::test]
async fn test_spend_limit_stops_paid_requests() {
    let delegator = test_address(9);
    let requester = test_key_address(1);
    let reader = MockChainReader::new();
    let gate = gate_over(&reader);
    gate.delegator_ledger(delegator)
        .delegate_batch([requester])
        .unwrap();

    let conditions = ConditionBuilder::new()
        .require_wallet_ownership(requester)
        .on(test_chain())
        .build()
        .unwrap();
    let resource = GatedResource::new(b"payload", conditions).unwrap();
    let ctx = gate
        .issue_context(&test_key(1), test_scope())
        .await
        .unwrap();

    let half = one_eth() / U256::from(2u64);
    for _ in 0..2 {
        let request = AccessRequest::new(&ctx, &resource).paid_by(delegator, half);
        assert!(gate.authorize(&request).await.unwrap().is_granted());
    }

    let request = AccessRequest::new(&ctx, &resource).paid_by(delegator, U256::from(1u64));
    let err = gate.authorize(&request).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Capacity(CapacityError::BudgetExceeded { .. })
    ));
    assert!(err.is_retryable());

    // Unpaid access is not metered.
    let free = AccessRequest::new(&ctx, &resource);
    assert!(gate.authorize(&free).await.unwrap().is_granted());
}

#[tokio::test]
async fn test_erc20_program_through_gate() {
    let contract = test_address(0xee);
    let holder = test_key_address(1);
    let reader = MockChainReader::new().with_balance(
        TokenRef::Contract(contract),
        holder,
        U256::from(50u64),
    );
    let providers = ChainProviders::new().with_reader(test_chain(), Arc::new(reader.clone()));
    let gate = AccessGateBuilder::new()
        .with_providers(providers.clone())
        .with_executor(Arc::new(Erc20ThresholdExecutor::new(providers)))
        .build();

    let conditions = ConditionBuilder::new()
        .require_remote_predicate(
            TEST_CID,
            ERC20_THRESHOLD_FUNCTION,
            vec![
                ConditionValue::from(contract),
                ConditionValue::from(U256::from(50u64)),
            ],
            ReturnValueTest::is_true(),
        )
        .on(test_chain())
        .build()
        .unwrap();
    let resource = GatedResource::new(b"payload", conditions).unwrap();
    assert_eq!(resource.predicate_programs().len(), 1);

    let holder_ctx = gate
        .issue_context(&test_key(1), test_scope())
        .await
        .unwrap();
    let other_ctx = gate
        .issue_context(&test_key(2), test_scope())
        .await
        .unwrap();

    assert!(
        gate.authorize(&AccessRequest::new(&holder_ctx, &resource))
            .await
            .unwrap()
            .is_granted()
    );
    assert!(
        !gate
            .authorize(&AccessRequest::new(&other_ctx, &resource))
            .await
            .unwrap()
            .is_granted()
    );
}

#[tokio::test]
async fn test_failure_policy_decides_unreadable_leaf() {
    let requester = test_key_address(1);
    let reader = MockChainReader::new().with_balance_failures(2);
    let conditions = ConditionBuilder::new()
        .require_eth_balance(U256::from(1u64), Comparator::Ge)
        .on(test_chain())
        .or()
        .require_wallet_ownership(requester)
        .on(test_chain())
        .build()
        .unwrap();
    let resource = GatedResource::new(b"payload", conditions).unwrap();

    let propagating = gate_over(&reader);
    let ctx = propagating
        .issue_context(&test_key(1), test_scope())
        .await
        .unwrap();
    let err = propagating
        .authorize(&AccessRequest::new(&ctx, &resource))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Condition(_)));

    let denying = AccessGateBuilder::new()
        .with_reader(test_chain(), Arc::new(reader.clone()))
        .with_failure_policy(FailurePolicy::Deny)
        .build();
    let decision = denying
        .authorize(&AccessRequest::new(&ctx, &resource))
        .await
        .unwrap();
    assert!(decision.is_granted());
    assert_eq!(reader.balance_calls(), 2);
}
