// ============================================
// File: crates/veilink-relay/src/services/cache.rs
// ============================================
//! # Destination Cache
//!
//! ## Creation Reason
//! Outbound packets are addressed by label, but datagrams need the full
//! identity. The cache keeps resolved identities and parks packets
//! while a lookup is in flight.
//!
//! ## Main Functionality
//! - Positive entries: label → identity (from lookups or inbound
//!   datagrams)
//! - Pending entries: a small FIFO of packets per label awaiting a
//!   lookup, oldest dropped on overflow
//! - Negative entries: failed labels are not looked up again until the
//!   TTL passes
//!
//! ## Lookup State
//! ```text
//!   Miss ──enqueue──► Pending ──resolved──► Hit (packets flushed)
//!                        │
//!                        └──failed/timed out──► Negative ──ttl──► Miss
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Owned and mutated by the dispatcher task only; no locking
//!
//! ## Last Modified
//! v0.1.0 - Initial destination cache

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use veilink_core::identity::{Identity, Label};

// ============================================
// CacheState
// ============================================

/// Result of consulting the cache for a label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheState {
    /// Identity known.
    Hit(Identity),
    /// Lookup in flight; packets are being queued.
    Pending,
    /// Recent lookup failed.
    Negative,
    /// Nothing known.
    Miss,
}

struct PendingLookup {
    started: Instant,
    packets: VecDeque<Vec<u8>>,
}

// ============================================
// DestinationCache
// ============================================

/// Label → identity cache with pending queues and negative entries.
pub struct DestinationCache {
    resolved: HashMap<Label, Identity>,
    pending: HashMap<Label, PendingLookup>,
    failed: HashMap<Label, Instant>,
    pending_limit: usize,
    lookup_timeout: Duration,
    negative_ttl: Duration,
}

impl DestinationCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(pending_limit: usize, lookup_timeout: Duration, negative_ttl: Duration) -> Self {
        Self {
            resolved: HashMap::new(),
            pending: HashMap::new(),
            failed: HashMap::new(),
            pending_limit: pending_limit.max(1),
            lookup_timeout,
            negative_ttl,
        }
    }

    /// Consults the cache. Expired negative entries are forgotten.
    pub fn lookup(&mut self, label: &Label, now: Instant) -> CacheState {
        if let Some(identity) = self.resolved.get(label) {
            return CacheState::Hit(identity.clone());
        }
        if self.pending.contains_key(label) {
            return CacheState::Pending;
        }
        match self.failed.get(label) {
            Some(until) if *until > now => CacheState::Negative,
            Some(_) => {
                self.failed.remove(label);
                CacheState::Miss
            }
            None => CacheState::Miss,
        }
    }

    /// Parks `packet` until `label` resolves. Returns `true` when this
    /// starts a new lookup, which the caller must then issue.
    pub fn enqueue(&mut self, label: &Label, packet: Vec<u8>, now: Instant) -> bool {
        let mut started = false;
        let entry = self.pending.entry(label.clone()).or_insert_with(|| {
            started = true;
            PendingLookup {
                started: now,
                packets: VecDeque::new(),
            }
        });

        if entry.packets.len() >= self.pending_limit {
            entry.packets.pop_front();
        }
        entry.packets.push_back(packet);
        started
    }

    /// Records a successful lookup; returns the packets parked for it.
    pub fn resolved(&mut self, identity: Identity) -> Vec<Vec<u8>> {
        let label = identity.label().clone();
        self.failed.remove(&label);
        self.resolved.insert(label.clone(), identity);
        self.pending
            .remove(&label)
            .map(|pending| pending.packets.into())
            .unwrap_or_default()
    }

    /// Records a failed lookup; returns how many parked packets were
    /// dropped. A label already resolved (e.g. learned from an inbound
    /// datagram meanwhile) stays resolved.
    pub fn failed(&mut self, label: &Label, now: Instant) -> usize {
        let dropped = self
            .pending
            .remove(label)
            .map_or(0, |pending| pending.packets.len());
        if !self.resolved.contains_key(label) {
            self.failed.insert(label.clone(), now + self.negative_ttl);
        }
        dropped
    }

    /// Records an identity seen on an inbound datagram.
    pub fn learn(&mut self, identity: &Identity) -> Vec<Vec<u8>> {
        if self.resolved.contains_key(identity.label()) {
            return Vec::new();
        }
        self.resolved(identity.clone())
    }

    /// Fails every lookup pending longer than the lookup timeout.
    /// Returns the labels that timed out.
    pub fn expire(&mut self, now: Instant) -> Vec<Label> {
        let timeout = self.lookup_timeout;
        let expired: Vec<Label> = self
            .pending
            .iter()
            .filter(|(_, pending)| now.duration_since(pending.started) >= timeout)
            .map(|(label, _)| label.clone())
            .collect();

        for label in &expired {
            self.failed(label, now);
        }
        self.failed.retain(|_, until| *until > now);
        expired
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }

    /// Labels with a lookup in flight.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl std::fmt::Debug for DestinationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DestinationCache")
            .field("resolved", &self.resolved.len())
            .field("pending", &self.pending.len())
            .field("failed", &self.failed.len())
            .finish()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(30);
    const TTL: Duration = Duration::from_secs(60);

    fn identity(seed: u8) -> Identity {
        Identity::from_bytes(vec![seed; 387]).unwrap()
    }

    #[test]
    fn test_miss_then_pending_then_hit() {
        let now = Instant::now();
        let mut cache = DestinationCache::new(8, TIMEOUT, TTL);
        let peer = identity(1);
        let label = peer.label().clone();

        assert_eq!(cache.lookup(&label, now), CacheState::Miss);
        assert!(cache.enqueue(&label, vec![1], now));
        assert!(!cache.enqueue(&label, vec![2], now));
        assert_eq!(cache.lookup(&label, now), CacheState::Pending);

        let flushed = cache.resolved(peer.clone());
        assert_eq!(flushed, vec![vec![1], vec![2]]);
        assert_eq!(cache.lookup(&label, now), CacheState::Hit(peer));
        assert_eq!(cache.pending_count(), 0);
    }

    #[test]
    fn test_pending_queue_drops_oldest() {
        let now = Instant::now();
        let mut cache = DestinationCache::new(2, TIMEOUT, TTL);
        let peer = identity(1);

        for byte in 1..=4u8 {
            cache.enqueue(peer.label(), vec![byte], now);
        }
        assert_eq!(cache.resolved(peer), vec![vec![3], vec![4]]);
    }

    #[test]
    fn test_failure_is_negative_until_ttl() {
        let now = Instant::now();
        let mut cache = DestinationCache::new(8, TIMEOUT, TTL);
        let label = identity(1).label().clone();

        cache.enqueue(&label, vec![1], now);
        assert_eq!(cache.failed(&label, now), 1);
        assert_eq!(cache.lookup(&label, now), CacheState::Negative);
        assert_eq!(cache.lookup(&label, now + TTL), CacheState::Miss);
    }

    #[test]
    fn test_expire_times_out_pending() {
        let now = Instant::now();
        let mut cache = DestinationCache::new(8, TIMEOUT, TTL);
        let label = identity(1).label().clone();

        cache.enqueue(&label, vec![1], now);
        assert!(cache.expire(now + Duration::from_secs(1)).is_empty());

        let expired = cache.expire(now + TIMEOUT);
        assert_eq!(expired, vec![label.clone()]);
        assert_eq!(cache.lookup(&label, now + TIMEOUT), CacheState::Negative);
    }

    #[test]
    fn test_learn_flushes_pending_and_survives_late_failure() {
        let now = Instant::now();
        let mut cache = DestinationCache::new(8, TIMEOUT, TTL);
        let peer = identity(1);

        cache.enqueue(peer.label(), vec![9], now);
        assert_eq!(cache.learn(&peer), vec![vec![9]]);
        assert!(cache.learn(&peer).is_empty());

        cache.failed(peer.label(), now);
        assert_eq!(cache.lookup(peer.label(), now), CacheState::Hit(peer));
    }
}
