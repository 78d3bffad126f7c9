//! Rate and spend restrictions.

use std::time::Duration;

use alloy_primitives::U256;
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::error::{CapacityError, CapacityResult};

/// Limits a delegator places on each delegatee, over a rolling window.
///
/// # Example
///
/// ```
/// use keygate_capacity::Restriction;
/// use alloy_primitives::U256;
///
/// let r = Restriction::new(U256::from(1_000u64), 100, 3600).unwrap();
/// assert_eq!(r.period().as_secs(), 3600);
/// assert!(Restriction::new(U256::ZERO, 1, 0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restriction {
    /// Maximum spend per delegatee within one window, in wei.
    pub total_max_price_wei: U256,
    /// Maximum number of requests per delegatee within one window.
    pub requests_per_period: u32,
    /// Window length in seconds. Always positive.
    pub period_secs: u64,
}

impl Restriction {
    /// Create a restriction.
    ///
    /// # Errors
    ///
    /// Returns [`CapacityError::InvalidRestriction`] if `period_secs` is zero.
    pub fn new(
        total_max_price_wei: U256,
        requests_per_period: u32,
        period_secs: u64,
    ) -> CapacityResult<Self> {
        let restriction = Self {
            total_max_price_wei,
            requests_per_period,
            period_secs,
        };
        restriction.validate()?;
        Ok(restriction)
    }

    /// Create a restriction from signed inputs, as read from config files or
    /// other loosely typed sources.
    ///
    /// # Errors
    ///
    /// Returns [`CapacityError::InvalidRestriction`] if `requests_per_period`
    /// is negative or too large, or `period_secs` is not positive.
    pub fn from_signed(
        total_max_price_wei: U256,
        requests_per_period: i64,
        period_secs: i64,
    ) -> CapacityResult<Self> {
        let requests = u32::try_from(requests_per_period).map_err(|_| {
            CapacityError::InvalidRestriction {
                field: "requests_per_period",
                reason: format!("must be between 0 and {}, got {requests_per_period}", u32::MAX),
            }
        })?;
        let period = u64::try_from(period_secs)
            .ok()
            .filter(|p| *p > 0)
            .ok_or_else(|| CapacityError::InvalidRestriction {
                field: "period_secs",
                reason: format!("must be positive, got {period_secs}"),
            })?;
        Self::new(total_max_price_wei, requests, period)
    }

    /// Check the restriction's invariants.
    ///
    /// # Errors
    ///
    /// Returns [`CapacityError::InvalidRestriction`] if `period_secs` is zero
    /// or too large to represent as a time span.
    pub fn validate(&self) -> CapacityResult<()> {
        if self.period_secs == 0 {
            return Err(CapacityError::InvalidRestriction {
                field: "period_secs",
                reason: "must be positive, got 0".to_string(),
            });
        }
        if self.window().is_none() {
            return Err(CapacityError::InvalidRestriction {
                field: "period_secs",
                reason: format!("{} is too large", self.period_secs),
            });
        }
        Ok(())
    }

    /// The window length.
    #[must_use]
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    /// The window length as a signed time delta, if representable.
    pub(crate) fn window(&self) -> Option<TimeDelta> {
        i64::try_from(self.period_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
    }
}
