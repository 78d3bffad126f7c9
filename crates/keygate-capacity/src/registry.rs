//! Ledgers for many delegators.

use std::sync::Arc;

use alloy_primitives::Address;
use dashmap::DashMap;

use crate::ledger::CapacityLedger;
use crate::restriction::Restriction;

/// Concurrent map from delegator to its [`CapacityLedger`].
///
/// Operations on different delegators never contend; each ledger serializes
/// its own usage recording.
#[derive(Debug, Clone, Default)]
pub struct CapacityRegistry {
    ledgers: Arc<DashMap<Address, Arc<CapacityLedger>>>,
}

impl CapacityRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The ledger for `delegator`, if one exists.
    #[must_use]
    pub fn ledger(&self, delegator: &Address) -> Option<Arc<CapacityLedger>> {
        self.ledgers.get(delegator).map(|entry| Arc::clone(entry.value()))
    }

    /// The ledger for `delegator`, creating it with `restriction` if absent.
    ///
    /// An existing ledger keeps its own restriction.
    pub fn get_or_create(&self, delegator: Address, restriction: Restriction) -> Arc<CapacityLedger> {
        Arc::clone(
            self.ledgers
                .entry(delegator)
                .or_insert_with(|| Arc::new(CapacityLedger::new(delegator, restriction)))
                .value(),
        )
    }

    /// Register a ledger, replacing any previous one for the same delegator.
    pub fn insert(&self, ledger: CapacityLedger) -> Arc<CapacityLedger> {
        let ledger = Arc::new(ledger);
        self.ledgers.insert(ledger.delegator(), Arc::clone(&ledger));
        ledger
    }

    /// Remove and return the ledger for `delegator`.
    pub fn remove(&self, delegator: &Address) -> Option<Arc<CapacityLedger>> {
        self.ledgers.remove(delegator).map(|(_, ledger)| ledger)
    }

    /// Number of registered delegators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ledgers.len()
    }

    /// Whether no delegator is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ledgers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;

    #[test]
    fn test_get_or_create_keeps_existing() {
        let registry = CapacityRegistry::new();
        let delegator = Address::repeat_byte(1);
        let first = registry.get_or_create(delegator, Restriction::new(U256::from(10u64), 1, 60).unwrap());
        let second = registry.get_or_create(delegator, Restriction::new(U256::from(99u64), 9, 60).unwrap());

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.restriction().total_max_price_wei, U256::from(10u64));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_insert_and_remove() {
        let registry = CapacityRegistry::new();
        let delegator = Address::repeat_byte(2);
        registry.insert(CapacityLedger::new(
            delegator,
            Restriction::new(U256::ZERO, 1, 60).unwrap(),
        ));
        assert!(registry.ledger(&delegator).is_some());
        assert!(registry.remove(&delegator).is_some());
        assert!(registry.is_empty());
    }
}
