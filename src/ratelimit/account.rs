//! Per-client bucket account composing multiple limit windows.

use std::time::Instant;

use parking_lot::Mutex;

use super::bucket::{Limit, TokenBucket};

/// A client's rate-limit state: one token bucket per configured window.
///
/// A request is admitted only when every window has a token, and
/// consumption debits all windows together. The windows live behind a
/// single mutex so concurrent requests for the same client serialize
/// their accounting; requests for different clients never contend.
pub struct BucketAccount {
    windows: Mutex<Vec<TokenBucket>>,
}

impl BucketAccount {
    /// Create an account with one full bucket per limit, all starting
    /// their refill boundary at `now`.
    ///
    /// An empty limit set produces an account that denies everything;
    /// store construction rejects that configuration before any account
    /// is built.
    pub fn new(limits: &[Limit], now: Instant) -> Self {
        let windows = limits
            .iter()
            .map(|limit| TokenBucket::new(*limit, now))
            .collect();
        Self {
            windows: Mutex::new(windows),
        }
    }

    /// Attempt to consume one token from every window, all-or-nothing.
    ///
    /// All windows are lazily refilled and checked first; only when each
    /// one has a token are they all debited. A failing window leaves every
    /// other window untouched, so a rejected request costs nothing.
    pub fn try_consume(&self, now: Instant) -> bool {
        let mut windows = self.windows.lock();
        if windows.is_empty() {
            return false;
        }
        if windows.iter_mut().any(|w| w.available(now) == 0) {
            return false;
        }
        for window in windows.iter_mut() {
            window.deduct();
        }
        true
    }

    /// Tokens the client can still spend: the minimum across windows,
    /// since the most binding window decides admission.
    pub fn available(&self, now: Instant) -> u64 {
        let mut windows = self.windows.lock();
        windows
            .iter_mut()
            .map(|w| w.available(now))
            .min()
            .unwrap_or(0)
    }
}
