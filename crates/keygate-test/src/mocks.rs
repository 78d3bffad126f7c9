//! Mock chain readers and predicate executors.

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use keygate_chain::{ChainError, ChainResult, ChainStateReader, TokenRef};
use keygate_conditions::{ConditionError, ConditionResult, ConditionValue, PredicateCall, PredicateExecutor};

/// Scripted [`ChainStateReader`].
///
/// Block heights are served from a queue; once it drains, the last height
/// repeats. Balances not set read as zero. Clones share state, so a test can
/// keep a handle and mutate the chain after handing the reader out.
#[derive(Debug, Clone, Default)]
pub struct MockChainReader {
    balances: Arc<Mutex<HashMap<(TokenRef, Address), U256>>>,
    heights: Arc<Mutex<VecDeque<u64>>>,
    current_height: Arc<Mutex<u64>>,
    height_failures: Arc<AtomicUsize>,
    balance_failures: Arc<AtomicUsize>,
    balance_calls: Arc<AtomicUsize>,
    height_calls: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl MockChainReader {
    /// A reader at height 0 with no balances.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start at `height`.
    #[must_use]
    pub fn at_height(self, height: u64) -> Self {
        self.advance_to(height);
        self
    }

    /// Serve these heights in order before settling on the last one.
    #[must_use]
    pub fn with_heights(self, heights: impl IntoIterator<Item = u64>) -> Self {
        if let Ok(mut queue) = self.heights.lock() {
            queue.extend(heights);
        }
        self
    }

    /// Set a balance.
    #[must_use]
    pub fn with_balance(self, token: TokenRef, owner: Address, amount: U256) -> Self {
        self.set_balance(token, owner, amount);
        self
    }

    /// Delay every read by `delay`.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the next `n` block height reads with an RPC error.
    #[must_use]
    pub fn with_height_failures(self, n: usize) -> Self {
        self.height_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Fail the next `n` balance reads with an RPC error.
    #[must_use]
    pub fn with_balance_failures(self, n: usize) -> Self {
        self.balance_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Change a balance in place.
    pub fn set_balance(&self, token: TokenRef, owner: Address, amount: U256) {
        if let Ok(mut balances) = self.balances.lock() {
            balances.insert((token, owner), amount);
        }
    }

    /// Jump to `height`, discarding any queued heights.
    pub fn advance_to(&self, height: u64) {
        if let Ok(mut queue) = self.heights.lock() {
            queue.clear();
        }
        if let Ok(mut current) = self.current_height.lock() {
            *current = height;
        }
    }

    /// Number of balance reads served or failed.
    #[must_use]
    pub fn balance_calls(&self) -> usize {
        self.balance_calls.load(Ordering::SeqCst)
    }

    /// Number of block height reads served or failed.
    #[must_use]
    pub fn height_calls(&self) -> usize {
        self.height_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Decrement `counter` if positive; true if a failure was consumed.
fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl ChainStateReader for MockChainReader {
    async fn balance(&self, token: &TokenRef, owner: Address) -> ChainResult<U256> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if take_failure(&self.balance_failures) {
            return Err(ChainError::Rpc("injected balance failure".to_string()));
        }
        Ok(self
            .balances
            .lock()
            .ok()
            .and_then(|b| b.get(&(*token, owner)).copied())
            .unwrap_or(U256::ZERO))
    }

    async fn block_height(&self) -> ChainResult<u64> {
        self.height_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if take_failure(&self.height_failures) {
            return Err(ChainError::Rpc("injected height failure".to_string()));
        }
        let next = self.heights.lock().ok().and_then(|mut q| q.pop_front());
        let mut current = self
            .current_height
            .lock()
            .map_err(|_| ChainError::Rpc("mock state poisoned".to_string()))?;
        if let Some(height) = next {
            *current = height;
        }
        Ok(*current)
    }
}

/// Scripted [`PredicateExecutor`].
///
/// Returns queued results in order, then the fallback (default
/// `Bool(false)`). Every call is logged.
#[derive(Debug, Clone)]
pub struct MockPredicateExecutor {
    results: Arc<Mutex<VecDeque<ConditionResult<ConditionValue>>>>,
    fallback: ConditionValue,
    calls: Arc<Mutex<Vec<PredicateCall>>>,
    delay: Option<Duration>,
}

impl MockPredicateExecutor {
    /// An executor that answers `false` until told otherwise.
    #[must_use]
    pub fn new() -> Self {
        Self {
            results: Arc::new(Mutex::new(VecDeque::new())),
            fallback: ConditionValue::Bool(false),
            calls: Arc::new(Mutex::new(Vec::new())),
            delay: None,
        }
    }

    /// An executor that always answers `value`.
    #[must_use]
    pub fn returning(value: impl Into<ConditionValue>) -> Self {
        Self::new().with_fallback(value)
    }

    /// Answer used once the queue is empty.
    #[must_use]
    pub fn with_fallback(mut self, value: impl Into<ConditionValue>) -> Self {
        self.fallback = value.into();
        self
    }

    /// Queue one result.
    #[must_use]
    pub fn with_result(self, result: ConditionResult<ConditionValue>) -> Self {
        self.queue(result);
        self
    }

    /// Queue one failure with `reason`.
    #[must_use]
    pub fn with_failure(self, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        self.queue(Err(ConditionError::PredicateEvaluation {
            code_ref: String::new(),
            function: String::new(),
            reason,
        }));
        self
    }

    /// Sleep for `delay` before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue one result.
    pub fn queue(&self, result: ConditionResult<ConditionValue>) {
        if let Ok(mut guard) = self.results.lock() {
            guard.push_back(result);
        }
    }

    /// Calls received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<PredicateCall> {
        self.calls.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Number of calls received so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|g| g.len()).unwrap_or_default()
    }
}

impl Default for MockPredicateExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PredicateExecutor for MockPredicateExecutor {
    async fn execute(&self, call: &PredicateCall) -> ConditionResult<ConditionValue> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let queued = self.results.lock().ok().and_then(|mut q| q.pop_front());
        match queued {
            Some(Err(ConditionError::PredicateEvaluation { reason, .. })) => {
                Err(ConditionError::PredicateEvaluation {
                    code_ref: call.code_ref.to_string(),
                    function: call.function.clone(),
                    reason,
                })
            },
            Some(result) => result,
            None => Ok(self.fallback.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{test_address, test_chain, test_code_ref};

    #[tokio::test]
    async fn test_heights_drain_then_repeat() {
        let reader = MockChainReader::new().at_height(10).with_heights([11, 12]);

        assert_eq!(reader.block_height().await.unwrap(), 11);
        assert_eq!(reader.block_height().await.unwrap(), 12);
        assert_eq!(reader.block_height().await.unwrap(), 12);
        assert_eq!(reader.height_calls(), 3);
    }

    #[tokio::test]
    async fn test_injected_failures_then_recovery() {
        let reader = MockChainReader::new().at_height(5).with_height_failures(1);

        assert!(reader.block_height().await.is_err());
        assert_eq!(reader.block_height().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_balances_shared_between_clones() {
        let reader = MockChainReader::new();
        let handle = reader.clone();
        let owner = test_address(1);

        assert_eq!(
            reader.balance(&TokenRef::Native, owner).await.unwrap(),
            U256::ZERO
        );
        handle.set_balance(TokenRef::Native, owner, U256::from(9u64));
        assert_eq!(
            reader.balance(&TokenRef::Native, owner).await.unwrap(),
            U256::from(9u64)
        );
        assert_eq!(handle.balance_calls(), 2);
    }

    #[tokio::test]
    async fn test_executor_queue_then_fallback() {
        let executor = MockPredicateExecutor::returning(true)
            .with_result(Ok(ConditionValue::Bool(false)))
            .with_failure("boom");
        let call = PredicateCall {
            code_ref: test_code_ref(),
            function: "go".to_string(),
            args: vec![],
            chain: test_chain(),
            requester: test_address(2),
        };

        assert_eq!(executor.execute(&call).await.unwrap(), ConditionValue::Bool(false));
        let err = executor.execute(&call).await.unwrap_err();
        assert!(matches!(
            err,
            ConditionError::PredicateEvaluation { ref function, .. } if function == "go"
        ));
        assert_eq!(executor.execute(&call).await.unwrap(), ConditionValue::Bool(true));
        assert_eq!(executor.call_count(), 3);
        assert_eq!(executor.calls()[0].requester, test_address(2));
    }
}
