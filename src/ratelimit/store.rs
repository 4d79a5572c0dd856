//! Bounded, idle-expiring store of per-client bucket accounts.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, trace};

use super::account::BucketAccount;
use super::bucket::Limit;
use crate::error::{Result, TollgateError};

/// Maps rate-limit keys to their bucket accounts.
///
/// The store is the only process-wide mutable structure. Lookups are
/// atomic get-or-create per key, so concurrent first-time requests for the
/// same client always share one account. The entry count is bounded:
/// entries idle past the TTL are dropped first, and when the store is
/// still full the least-recently-used entry is evicted. Eviction discards
/// accumulated token state; a client reappearing after eviction starts
/// with a fresh, full account.
pub struct BucketStore {
    entries: DashMap<String, StoreEntry>,
    limits: Vec<Limit>,
    max_entries: usize,
    idle_ttl: Duration,
}

struct StoreEntry {
    account: Arc<BucketAccount>,
    last_access: Instant,
}

impl BucketStore {
    /// Create a store that hands out accounts with the given limit
    /// windows, holding at most `max_entries` clients and evicting entries
    /// idle for `idle_ttl` or longer.
    pub fn new(limits: Vec<Limit>, max_entries: usize, idle_ttl: Duration) -> Result<Self> {
        if limits.is_empty() {
            return Err(TollgateError::Config(
                "at least one limit window is required".to_string(),
            ));
        }
        if max_entries == 0 {
            return Err(TollgateError::Config(
                "max_entries must be greater than zero".to_string(),
            ));
        }
        if idle_ttl.is_zero() {
            return Err(TollgateError::Config(
                "idle_ttl must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            entries: DashMap::new(),
            limits,
            max_entries,
            idle_ttl,
        })
    }

    /// Return the account for `key`, creating a fresh one on first sight.
    ///
    /// Get-or-create is atomic with respect to concurrent callers for the
    /// same key: exactly one account instance exists per key at a time.
    /// The entry's last-access instant is touched on every call.
    pub fn resolve(&self, key: &str, now: Instant) -> Arc<BucketAccount> {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(key) {
            self.purge_idle(now);
            while self.entries.len() >= self.max_entries && self.evict_lru() {}
        }

        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| {
                trace!(key = %key, "Creating bucket account");
                StoreEntry {
                    account: Arc::new(BucketAccount::new(&self.limits, now)),
                    last_access: now,
                }
            });
        entry.last_access = now;
        entry.account.clone()
    }

    /// Drop every entry idle for the TTL or longer.
    ///
    /// Best-effort housekeeping: callers may run it opportunistically or
    /// from a low-priority timer. Correctness never depends on when it
    /// runs, only the memory bound does.
    pub fn purge_idle(&self, now: Instant) {
        let before = self.entries.len();
        let ttl = self.idle_ttl;
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.last_access) < ttl);
        let evicted = before - self.entries.len();
        if evicted > 0 {
            debug!(evicted = evicted, "Purged idle bucket accounts");
        }
    }

    /// Evict the entry with the oldest last-access instant.
    ///
    /// The scan is linear but only runs when the store has hit its entry
    /// cap, which is off the common path.
    fn evict_lru(&self) -> bool {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().last_access)
            .map(|entry| entry.key().clone());

        match oldest {
            Some(key) => {
                debug!(key = %key, "Evicting least-recently-used bucket account");
                self.entries.remove(&key);
                true
            }
            None => false,
        }
    }

    /// Number of client entries currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
