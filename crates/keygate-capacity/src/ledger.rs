//! Per-delegator capacity ledger.
//!
//! A [`CapacityLedger`] belongs to one delegator. It holds the delegator's
//! active [`Restriction`], the set of delegatee addresses, and each
//! delegatee's usage history. Every delegatee gets its own rolling window:
//! within any `period_secs` span it may make at most `requests_per_period`
//! requests and spend at most `total_max_price_wei`.
//!
//! The restriction, the delegatees and the usage history live behind one
//! [`RwLock`]. [`CapacityLedger::record_usage`] reads the restriction, checks
//! and commits under a single write guard, so concurrent callers can never
//! jointly overspend a window, and a restriction change lands either wholly
//! before or wholly after any given usage.
//!
//! History is kept for the longest period any restriction on the ledger has
//! used, so widening the period counts usage made under the narrower one.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use alloy_primitives::{Address, U256};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{CapacityError, CapacityResult};
use crate::restriction::Restriction;

/// Which limit a usage would have exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExceededReason {
    /// The window's spend limit.
    SpendLimit,
    /// The window's request count.
    RequestLimit,
}

impl fmt::Display for ExceededReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SpendLimit => write!(f, "spend limit"),
            Self::RequestLimit => write!(f, "request limit"),
        }
    }
}

/// One recorded usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// The delegatee that used capacity.
    pub address: Address,
    /// When the usage was recorded.
    pub at: DateTime<Utc>,
    /// What it cost, in wei.
    pub amount_wei: U256,
}

#[derive(Debug, Clone, Copy)]
struct UsageEntry {
    at: DateTime<Utc>,
    amount_wei: U256,
}

#[derive(Debug)]
struct LedgerState {
    restriction: Restriction,
    /// Longest `period_secs` ever applied.
    retain_secs: u64,
    delegated: BTreeSet<Address>,
    usage: HashMap<Address, VecDeque<UsageEntry>>,
}

impl LedgerState {
    fn new(restriction: Restriction) -> Self {
        Self {
            restriction,
            retain_secs: restriction.period_secs,
            delegated: BTreeSet::new(),
            usage: HashMap::new(),
        }
    }

    /// Start of the retention horizon ending at `now`.
    fn retain_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        i64::try_from(self.retain_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|horizon| now.checked_sub_signed(horizon))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    fn window_usage(&self, address: &Address, now: DateTime<Utc>) -> Option<WindowUsage> {
        self.delegated.contains(address).then(|| {
            WindowUsage::of(
                self.usage.get(address),
                window_start(&self.restriction, now),
            )
        })
    }
}

/// Window totals for one delegatee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WindowUsage {
    requests: u32,
    spent_wei: U256,
}

impl WindowUsage {
    fn of(entries: Option<&VecDeque<UsageEntry>>, window_start: DateTime<Utc>) -> Self {
        let mut usage = Self {
            requests: 0,
            spent_wei: U256::ZERO,
        };
        for entry in entries.into_iter().flatten().filter(|e| e.at > window_start) {
            usage.requests = usage.requests.saturating_add(1);
            usage.spent_wei = usage.spent_wei.saturating_add(entry.amount_wei);
        }
        usage
    }
}

/// A delegator's capacity ledger.
///
/// # Example
///
/// ```
/// use keygate_capacity::{CapacityLedger, Restriction};
/// use alloy_primitives::{Address, U256};
///
/// let delegator = Address::repeat_byte(1);
/// let delegatee = Address::repeat_byte(2);
/// let ledger = CapacityLedger::new(
///     delegator,
///     Restriction::new(U256::from(100u64), 10, 3600).unwrap(),
/// );
///
/// ledger.delegate_batch([delegatee]).unwrap();
/// assert_eq!(ledger.get_balance(&delegatee), U256::from(100u64));
///
/// let left = ledger.record_usage(delegatee, U256::from(30u64)).unwrap();
/// assert_eq!(left, U256::from(70u64));
/// ```
pub struct CapacityLedger {
    delegator: Address,
    state: RwLock<LedgerState>,
}

impl CapacityLedger {
    /// Create a ledger for `delegator` with no delegatees.
    #[must_use]
    pub fn new(delegator: Address, restriction: Restriction) -> Self {
        Self {
            delegator,
            state: RwLock::new(LedgerState::new(restriction)),
        }
    }

    /// The delegator that owns this ledger.
    #[must_use]
    pub fn delegator(&self) -> Address {
        self.delegator
    }

    /// The active restriction.
    #[must_use]
    pub fn restriction(&self) -> Restriction {
        self.read_state().restriction
    }

    /// Replace the active restriction.
    ///
    /// Usage still inside the new window counts against the new limits,
    /// including usage made under an earlier, shorter period.
    ///
    /// # Errors
    ///
    /// Returns [`CapacityError::InvalidRestriction`] if the period is not
    /// positive, or [`CapacityError::Storage`] if the lock is poisoned.
    pub fn set_restriction(
        &self,
        total_max_price_wei: U256,
        requests_per_period: u32,
        period_secs: u64,
    ) -> CapacityResult<()> {
        let restriction = Restriction::new(total_max_price_wei, requests_per_period, period_secs)?;
        self.apply_restriction(restriction)
    }

    /// Replace the active restriction with an already validated one.
    ///
    /// # Errors
    ///
    /// Returns [`CapacityError::InvalidRestriction`] if the period is not
    /// positive, or [`CapacityError::Storage`] if the lock is poisoned.
    pub fn apply_restriction(&self, restriction: Restriction) -> CapacityResult<()> {
        restriction.validate()?;
        let mut state = self.write_state()?;
        state.restriction = restriction;
        state.retain_secs = state.retain_secs.max(restriction.period_secs);
        info!(
            delegator = %self.delegator,
            max_price_wei = %restriction.total_max_price_wei,
            requests_per_period = restriction.requests_per_period,
            period_secs = restriction.period_secs,
            "capacity restriction set"
        );
        Ok(())
    }

    /// Add delegatees. Addresses already delegated are left as they are.
    ///
    /// Returns how many addresses were newly added.
    ///
    /// # Errors
    ///
    /// Returns [`CapacityError::EmptyBatch`] for an empty batch, or
    /// [`CapacityError::Storage`] if the lock is poisoned.
    pub fn delegate_batch(
        &self,
        addresses: impl IntoIterator<Item = Address>,
    ) -> CapacityResult<usize> {
        let batch: BTreeSet<Address> = addresses.into_iter().collect();
        if batch.is_empty() {
            return Err(CapacityError::EmptyBatch);
        }
        let mut state = self.write_state()?;
        let before = state.delegated.len();
        state.delegated.extend(batch);
        let added = state.delegated.len().saturating_sub(before);
        info!(
            delegator = %self.delegator,
            added,
            total = state.delegated.len(),
            "capacity delegated"
        );
        Ok(added)
    }

    /// Whether `address` is a delegatee.
    #[must_use]
    pub fn is_delegated(&self, address: &Address) -> bool {
        self.read_state().delegated.contains(address)
    }

    /// All delegatees, in address order.
    #[must_use]
    pub fn delegated_addresses(&self) -> Vec<Address> {
        self.read_state().delegated.iter().copied().collect()
    }

    /// Spend remaining for `address` in the window ending now.
    ///
    /// Non-delegated addresses have a balance of zero.
    #[must_use]
    pub fn get_balance(&self, address: &Address) -> U256 {
        self.get_balance_at(address, Utc::now())
    }

    /// Spend remaining for `address` in the window ending at `now`.
    #[must_use]
    pub fn get_balance_at(&self, address: &Address, now: DateTime<Utc>) -> U256 {
        let state = self.read_state();
        state.window_usage(address, now).map_or(U256::ZERO, |usage| {
            state.restriction.total_max_price_wei.saturating_sub(usage.spent_wei)
        })
    }

    /// Requests remaining for `address` in the window ending at `now`.
    #[must_use]
    pub fn remaining_requests_at(&self, address: &Address, now: DateTime<Utc>) -> u32 {
        let state = self.read_state();
        state.window_usage(address, now).map_or(0, |usage| {
            state.restriction.requests_per_period.saturating_sub(usage.requests)
        })
    }

    /// Record one request costing `amount_wei` by `address`, now.
    ///
    /// Returns the spend remaining in the window after this usage.
    ///
    /// # Errors
    ///
    /// See [`record_usage_at`](Self::record_usage_at).
    pub fn record_usage(&self, address: Address, amount_wei: U256) -> CapacityResult<U256> {
        self.record_usage_at(address, amount_wei, Utc::now())
    }

    /// Record one request costing `amount_wei` by `address` at `now`.
    ///
    /// The restriction lookup, the check and the commit happen under one
    /// write lock: of several concurrent calls competing for the last slot of
    /// a window, exactly one succeeds. A failed call changes nothing.
    ///
    /// # Errors
    ///
    /// - [`CapacityError::NotDelegated`] if `address` is not a delegatee.
    /// - [`CapacityError::BudgetExceeded`] if the window's request count or
    ///   spend limit would be exceeded.
    /// - [`CapacityError::Storage`] if the lock is poisoned.
    pub fn record_usage_at(
        &self,
        address: Address,
        amount_wei: U256,
        now: DateTime<Utc>,
    ) -> CapacityResult<U256> {
        let mut state = self.write_state()?;
        if !state.delegated.contains(&address) {
            return Err(CapacityError::NotDelegated { address });
        }
        let restriction = state.restriction;
        let start = window_start(&restriction, now);
        let horizon = state.retain_from(now);

        let entries = state.usage.entry(address).or_default();
        while entries.front().is_some_and(|e| e.at <= horizon) {
            entries.pop_front();
        }
        let usage = WindowUsage::of(Some(&*entries), start);

        if usage.requests >= restriction.requests_per_period {
            debug!(%address, requests = usage.requests, "request limit reached");
            return Err(CapacityError::BudgetExceeded {
                address,
                reason: ExceededReason::RequestLimit,
                requested: U256::from(1u64),
                available: U256::from(
                    restriction.requests_per_period.saturating_sub(usage.requests),
                ),
            });
        }

        let available = restriction.total_max_price_wei.saturating_sub(usage.spent_wei);
        if amount_wei > available {
            debug!(%address, %amount_wei, %available, "spend limit reached");
            return Err(CapacityError::BudgetExceeded {
                address,
                reason: ExceededReason::SpendLimit,
                requested: amount_wei,
                available,
            });
        }

        entries.push_back(UsageEntry { at: now, amount_wei });
        let remaining = available.saturating_sub(amount_wei);
        debug!(
            delegator = %self.delegator,
            %address,
            %amount_wei,
            %remaining,
            "capacity usage recorded"
        );
        Ok(remaining)
    }

    fn read_state(&self) -> RwLockReadGuard<'_, LedgerState> {
        self.state.read().unwrap_or_else(|e| {
            warn!("capacity ledger lock poisoned, recovering");
            e.into_inner()
        })
    }

    fn write_state(&self) -> CapacityResult<RwLockWriteGuard<'_, LedgerState>> {
        self.state
            .write()
            .map_err(|e| CapacityError::Storage(e.to_string()))
    }
}

fn window_start(restriction: &Restriction, now: DateTime<Utc>) -> DateTime<Utc> {
    restriction
        .window()
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

impl fmt::Debug for CapacityLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read_state();
        f.debug_struct("CapacityLedger")
            .field("delegator", &self.delegator)
            .field("restriction", &state.restriction)
            .field("delegated", &state.delegated.len())
            .finish_non_exhaustive()
    }
}

/// Serializable ledger state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// The ledger's owner.
    pub delegator: Address,
    /// The active restriction.
    pub restriction: Restriction,
    /// Delegatees, in address order.
    pub delegated: Vec<Address>,
    /// Usage history, oldest first per delegatee.
    pub usage: Vec<UsageRecord>,
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
}

impl CapacityLedger {
    /// Capture the ledger's state.
    #[must_use]
    pub fn snapshot(&self) -> LedgerSnapshot {
        let state = self.read_state();
        let mut usage: Vec<UsageRecord> = state
            .usage
            .iter()
            .flat_map(|(address, entries)| {
                entries.iter().map(|e| UsageRecord {
                    address: *address,
                    at: e.at,
                    amount_wei: e.amount_wei,
                })
            })
            .collect();
        usage.sort_by_key(|r| (r.address, r.at));

        LedgerSnapshot {
            delegator: self.delegator,
            restriction: state.restriction,
            delegated: state.delegated.iter().copied().collect(),
            usage,
            taken_at: Utc::now(),
        }
    }

    /// Rebuild a ledger from a snapshot.
    ///
    /// Usage for addresses that are not delegated is dropped, since it could
    /// never be charged against anything.
    ///
    /// # Errors
    ///
    /// Returns [`CapacityError::InvalidRestriction`] if the snapshot's
    /// restriction is invalid.
    pub fn restore(snapshot: LedgerSnapshot) -> CapacityResult<Self> {
        snapshot.restriction.validate()?;
        let delegated: BTreeSet<Address> = snapshot.delegated.into_iter().collect();

        let mut usage: HashMap<Address, VecDeque<UsageEntry>> = HashMap::new();
        let mut records = snapshot.usage;
        records.sort_by_key(|r| r.at);
        for record in records {
            if !delegated.contains(&record.address) {
                warn!(address = %record.address, "dropping usage for non-delegated address");
                continue;
            }
            usage.entry(record.address).or_default().push_back(UsageEntry {
                at: record.at,
                amount_wei: record.amount_wei,
            });
        }

        let mut state = LedgerState::new(snapshot.restriction);
        state.delegated = delegated;
        state.usage = usage;
        Ok(Self {
            delegator: snapshot.delegator,
            state: RwLock::new(state),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use std::sync::Arc;

    fn addr(n: u8) -> Address {
        Address::repeat_byte(n)
    }

    fn wei(n: u64) -> U256 {
        U256::from(n)
    }

    fn ledger(max: u64, requests: u32, period: u64) -> CapacityLedger {
        let ledger = CapacityLedger::new(addr(1), Restriction::new(wei(max), requests, period).unwrap());
        ledger.delegate_batch([addr(2)]).unwrap();
        ledger
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_request_limit_and_rolling_reset() {
        let n = 5;
        let ledger = ledger(1_000, n, 3600);

        for i in 0..n {
            let at = t0() + TimeDelta::seconds(i64::from(i));
            ledger.record_usage_at(addr(2), wei(1), at).unwrap();
        }
        let err = ledger
            .record_usage_at(addr(2), wei(1), t0() + TimeDelta::seconds(10))
            .unwrap_err();
        assert!(matches!(
            err,
            CapacityError::BudgetExceeded {
                reason: ExceededReason::RequestLimit,
                ..
            }
        ));

        // The first usage leaves the window exactly one period after it was made.
        let after = t0() + TimeDelta::seconds(3600);
        assert_eq!(ledger.remaining_requests_at(&addr(2), after), 1);
        ledger.record_usage_at(addr(2), wei(1), after).unwrap();
        assert!(ledger.record_usage_at(addr(2), wei(1), after).is_err());

        let much_later = t0() + TimeDelta::seconds(7200);
        assert_eq!(ledger.remaining_requests_at(&addr(2), much_later), n);
    }

    #[test]
    fn test_spend_limit() {
        let ledger = ledger(100, 10, 60);
        assert_eq!(ledger.record_usage_at(addr(2), wei(60), t0()).unwrap(), wei(40));

        let err = ledger.record_usage_at(addr(2), wei(41), t0()).unwrap_err();
        match err {
            CapacityError::BudgetExceeded {
                reason,
                requested,
                available,
                ..
            } => {
                assert_eq!(reason, ExceededReason::SpendLimit);
                assert_eq!(requested, wei(41));
                assert_eq!(available, wei(40));
            },
            other => panic!("unexpected error: {other:?}"),
        }

        // The failed call committed nothing.
        assert_eq!(ledger.get_balance_at(&addr(2), t0()), wei(40));
        assert_eq!(ledger.record_usage_at(addr(2), wei(40), t0()).unwrap(), U256::ZERO);
        assert_eq!(
            ledger.get_balance_at(&addr(2), t0() + TimeDelta::seconds(61)),
            wei(100)
        );
    }

    #[test]
    fn test_non_delegated() {
        let ledger = ledger(100, 10, 60);
        assert_eq!(ledger.get_balance(&addr(9)), U256::ZERO);
        assert!(matches!(
            ledger.record_usage(addr(9), wei(1)),
            Err(CapacityError::NotDelegated { .. })
        ));
    }

    #[test]
    fn test_delegate_batch_is_idempotent() {
        let ledger = ledger(100, 10, 60);
        assert_eq!(ledger.delegate_batch([addr(2), addr(3)]).unwrap(), 1);
        assert_eq!(ledger.delegate_batch([addr(3), addr(3)]).unwrap(), 0);
        assert_eq!(ledger.delegated_addresses(), vec![addr(2), addr(3)]);
        assert!(matches!(
            ledger.delegate_batch(std::iter::empty()),
            Err(CapacityError::EmptyBatch)
        ));
    }

    #[test]
    fn test_set_restriction_applies_to_history() {
        let ledger = ledger(100, 10, 60);
        ledger.record_usage_at(addr(2), wei(50), t0()).unwrap();
        ledger.set_restriction(wei(80), 10, 60).unwrap();
        assert_eq!(ledger.get_balance_at(&addr(2), t0()), wei(30));
        assert!(ledger.set_restriction(wei(80), 10, 0).is_err());
        assert_eq!(ledger.restriction().total_max_price_wei, wei(80));
    }

    #[test]
    fn test_widened_period_counts_earlier_usage() {
        let ledger = ledger(100, 10, 3600);
        ledger.set_restriction(wei(100), 10, 60).unwrap();
        ledger.record_usage_at(addr(2), wei(40), t0()).unwrap();

        // Past the 60s window, but still inside the longest period applied.
        let later = t0() + TimeDelta::seconds(120);
        assert_eq!(ledger.get_balance_at(&addr(2), later), wei(100));
        ledger.record_usage_at(addr(2), wei(10), later).unwrap();

        ledger.set_restriction(wei(100), 10, 3600).unwrap();
        assert_eq!(ledger.get_balance_at(&addr(2), later), wei(50));
        assert_eq!(ledger.remaining_requests_at(&addr(2), later), 8);
        assert_eq!(ledger.snapshot().usage.len(), 2);
    }

    #[test]
    fn test_history_beyond_longest_period_is_trimmed() {
        let ledger = ledger(100, 10, 60);
        ledger.record_usage_at(addr(2), wei(40), t0()).unwrap();
        ledger
            .record_usage_at(addr(2), wei(10), t0() + TimeDelta::seconds(120))
            .unwrap();
        assert_eq!(ledger.snapshot().usage.len(), 1);
    }

    #[test]
    fn test_restriction_change_during_usage() {
        // Each usage is judged against one restriction: the loose one, or the
        // tight one once it lands. Either way the tight budget ends up spent.
        let ledger = Arc::new(ledger(1_000, 100, 3600));
        let successes: usize = std::thread::scope(|scope| {
            let users: Vec<_> = (0..8)
                .map(|_| {
                    let ledger = Arc::clone(&ledger);
                    scope.spawn(move || ledger.record_usage_at(addr(2), wei(10), t0()).is_ok())
                })
                .collect();
            let setter = {
                let ledger = Arc::clone(&ledger);
                scope.spawn(move || ledger.set_restriction(wei(10), 100, 3600).unwrap())
            };
            setter.join().unwrap();
            users
                .into_iter()
                .map(|h| usize::from(h.join().unwrap()))
                .sum()
        });
        assert!((1..=8).contains(&successes));
        assert_eq!(ledger.restriction().total_max_price_wei, wei(10));
        assert_eq!(ledger.get_balance_at(&addr(2), t0()), U256::ZERO);
        assert!(ledger.record_usage_at(addr(2), wei(10), t0()).is_err());
    }

    #[test]
    fn test_zero_requests_per_period_blocks_everything() {
        let ledger = ledger(100, 0, 60);
        assert!(ledger.record_usage(addr(2), U256::ZERO).unwrap_err().is_budget_exceeded());
    }

    #[test]
    fn test_concurrent_usage_never_overspends() {
        let ledger = Arc::new(ledger(100, 1_000, 3600));
        let successes: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    let ledger = Arc::clone(&ledger);
                    scope.spawn(move || ledger.record_usage_at(addr(2), wei(30), t0()).is_ok())
                })
                .collect();
            handles
                .into_iter()
                .map(|h| usize::from(h.join().unwrap()))
                .sum()
        });
        assert_eq!(successes, 3);
        assert_eq!(ledger.get_balance_at(&addr(2), t0()), wei(10));
    }

    #[test]
    fn test_snapshot_restore() {
        let ledger = ledger(100, 10, 60);
        ledger.delegate_batch([addr(3)]).unwrap();
        ledger.record_usage_at(addr(2), wei(25), t0()).unwrap();
        ledger.record_usage_at(addr(3), wei(5), t0()).unwrap();

        let snapshot = ledger.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let restored = CapacityLedger::restore(serde_json::from_str(&json).unwrap()).unwrap();

        assert_eq!(restored.delegator(), addr(1));
        assert_eq!(restored.delegated_addresses(), vec![addr(2), addr(3)]);
        assert_eq!(restored.get_balance_at(&addr(2), t0()), wei(75));
        assert_eq!(restored.get_balance_at(&addr(3), t0()), wei(95));
    }

    #[test]
    fn test_restore_drops_foreign_usage_and_bad_restrictions() {
        let mut snapshot = ledger(100, 10, 60).snapshot();
        snapshot.usage.push(UsageRecord {
            address: addr(7),
            at: t0(),
            amount_wei: wei(1),
        });
        let restored = CapacityLedger::restore(snapshot.clone()).unwrap();
        assert!(restored.snapshot().usage.is_empty());

        snapshot.restriction.period_secs = 0;
        assert!(CapacityLedger::restore(snapshot).is_err());
    }
}
