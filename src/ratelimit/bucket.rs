//! Token bucket implementation with intervallic refill.

use std::time::{Duration, Instant};

use crate::error::{Result, TollgateError};

/// A validated capacity/period pair describing one limit window.
///
/// Construction is the only place limit parameters are checked, so a
/// `Limit` in hand is always serviceable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    capacity: u64,
    period: Duration,
}

impl Limit {
    /// Create a new limit of `capacity` tokens restored every `period`.
    ///
    /// Returns a configuration error when `capacity` is zero or `period`
    /// is zero.
    pub fn new(capacity: u64, period: Duration) -> Result<Self> {
        if capacity == 0 {
            return Err(TollgateError::Config(
                "limit capacity must be greater than zero".to_string(),
            ));
        }
        if period.is_zero() {
            return Err(TollgateError::Config(
                "limit period must be greater than zero".to_string(),
            ));
        }
        Ok(Self { capacity, period })
    }

    /// Maximum tokens the window holds.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Wall-clock duration over which `capacity` tokens are restored.
    pub fn period(&self) -> Duration {
        self.period
    }
}

/// A single refillable token counter.
///
/// Refill is intervallic: the full capacity is restored once per period,
/// at period boundaries, rather than leaking in continuously. The refill
/// is computed lazily from elapsed time at consumption or inspection, so
/// no timer is needed.
#[derive(Debug)]
pub struct TokenBucket {
    limit: Limit,
    available: u64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket whose refill boundary starts at `now`.
    pub fn new(limit: Limit, now: Instant) -> Self {
        Self {
            limit,
            available: limit.capacity(),
            last_refill: now,
        }
    }

    /// Consume one token if available. Returns `false` with no mutation
    /// when the bucket is empty.
    pub fn try_consume(&mut self, now: Instant) -> bool {
        if self.available(now) == 0 {
            return false;
        }
        self.deduct();
        true
    }

    /// Current token count after lazy refill. Read-only with respect to
    /// consumption.
    pub fn available(&mut self, now: Instant) -> u64 {
        self.refill(now);
        self.available
    }

    /// Remove one token. Callers must have observed `available(now) >= 1`
    /// first; the count saturates rather than going negative.
    pub(crate) fn deduct(&mut self) {
        self.available = self.available.saturating_sub(1);
    }

    /// Advance the refill boundary and restore tokens for every full
    /// period that has elapsed. A `now` earlier than the last boundary
    /// (clock skew) awards nothing.
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let period = self.limit.period().as_nanos();
        let periods = elapsed.as_nanos() / period;
        if periods == 0 {
            return;
        }

        // Each full period restores the whole capacity, capped at capacity,
        // so any number of elapsed periods leaves the bucket full. Advance
        // the boundary to the most recent one consumed, keeping the
        // fractional remainder for the next refill.
        self.available = self.limit.capacity();
        let remainder = Duration::from_nanos((elapsed.as_nanos() % period) as u64);
        self.last_refill = now - remainder;
    }
}
