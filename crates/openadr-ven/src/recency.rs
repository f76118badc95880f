//! Bounded record of already dispatched events.

use std::collections::{BTreeSet, HashMap};

use openadr_types::{OutpointKey, UnixSeconds};

/// Set of outpoint keys, each kept until its expiry time.
///
/// Entries expire at their event's window end, after which the overlay no
/// longer reports the event as active. When full, the entry that expires
/// first is evicted.
#[derive(Debug)]
pub struct RecencyCache {
    expiries: HashMap<OutpointKey, UnixSeconds>,
    by_expiry: BTreeSet<(UnixSeconds, OutpointKey)>,
    capacity: usize,
    min_retention: i64,
}

impl RecencyCache {
    /// `min_retention` (seconds) keeps entries alive for at least that long
    /// after insertion, covering clock skew between the VEN and the overlay.
    pub fn new(capacity: usize, min_retention: i64) -> Self {
        Self {
            expiries: HashMap::new(),
            by_expiry: BTreeSet::new(),
            capacity: capacity.max(1),
            min_retention: min_retention.max(0),
        }
    }

    pub fn len(&self) -> usize {
        self.expiries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expiries.is_empty()
    }

    /// Whether `key` is recorded and not yet expired at `now`.
    pub fn contains(&self, key: &OutpointKey, now: UnixSeconds) -> bool {
        self.expiries.get(key).is_some_and(|&expiry| now < expiry)
    }

    /// Records `key` until `expires_at`. Re-recording a key replaces its
    /// expiry.
    pub fn insert(&mut self, key: OutpointKey, expires_at: UnixSeconds, now: UnixSeconds) {
        let expiry = expires_at.max(now.saturating_add(self.min_retention));

        if let Some(old) = self.expiries.insert(key, expiry) {
            self.by_expiry.remove(&(old, key));
        } else if self.expiries.len() > self.capacity {
            if let Some((_, evicted)) = self.by_expiry.pop_first() {
                self.expiries.remove(&evicted);
                tracing::debug!(key = %evicted, "recency cache full, evicted entry");
            }
        }
        self.by_expiry.insert((expiry, key));
    }

    /// Drops every entry expired at `now`; returns how many were dropped.
    pub fn prune(&mut self, now: UnixSeconds) -> usize {
        let mut removed = 0;
        while let Some(&(expiry, key)) = self.by_expiry.first() {
            if expiry > now {
                break;
            }
            self.by_expiry.pop_first();
            self.expiries.remove(&key);
            removed += 1;
        }
        removed
    }
}
