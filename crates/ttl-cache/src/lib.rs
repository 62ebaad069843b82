//! # TTL Cache
//!
//! A key-value store where every entry expires after its own time-to-live.
//!
//! Expiry deadlines are kept in a min-heap. Reads and iteration ignore
//! entries whose deadline has passed, and [`TtlCache::purge_expired`] removes
//! them, so no timer is held per entry. Re-setting a key supersedes its
//! previous deadline and [`TtlCache::clear`] drops every pending deadline with
//! the entries.
//!
//! Time is read from [`tokio::time::Instant`] so a paused tokio clock drives
//! expiry in tests.

use std::borrow::Borrow;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::hash::Hash;
use std::time::Duration;

use tokio::time::Instant;

/// Key-value store with per-entry expiry.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: HashMap<K, Entry<V>>,
    expiries: BinaryHeap<Reverse<Expiry<K>>>,
    generation: u64,
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
    generation: u64,
}

impl<V> Entry<V> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

// Heap ordering only considers the deadline and generation.
#[derive(Debug)]
struct Expiry<K> {
    at: Instant,
    generation: u64,
    key: K,
}

impl<K> PartialEq for Expiry<K> {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.generation == other.generation
    }
}

impl<K> Eq for Expiry<K> {}

impl<K> PartialOrd for Expiry<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for Expiry<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at.cmp(&other.at).then(self.generation.cmp(&other.generation))
    }
}

impl<K, V> Default for TtlCache<K, V> {
    fn default() -> Self {
        Self { entries: HashMap::new(), expiries: BinaryHeap::new(), generation: 0 }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `value` for `key`, expiring after `ttl`. Any previous value and
    /// its deadline are replaced. Returns the previous value if it was live.
    pub fn set(&mut self, key: K, value: V, ttl: Duration) -> Option<V> {
        let now = Instant::now();
        self.generation += 1;
        let expires_at = now + ttl;

        self.expiries.push(Reverse(Expiry {
            at: expires_at,
            generation: self.generation,
            key: key.clone(),
        }));
        let previous =
            self.entries.insert(key, Entry { value, expires_at, generation: self.generation });

        self.compact();
        previous.filter(|entry| entry.is_live(now)).map(|entry| entry.value)
    }

    /// Get the live value for `key`.
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        self.entries.get(key).filter(|entry| entry.is_live(now)).map(|entry| &entry.value)
    }

    #[must_use]
    pub fn has<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Remove `key`, cancelling its expiry. Returns the value if it was live.
    pub fn delete<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        self.entries.remove(key).filter(|entry| entry.is_live(now)).map(|entry| entry.value)
    }

    /// Drop every entry along with its pending expiry.
    pub fn clear(&mut self) {
        self.expiries.clear();
        self.entries.clear();
    }

    /// Live entries at the time of the call.
    pub fn entries(&self) -> impl Iterator<Item = (&K, &V)> {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(move |(_, entry)| entry.is_live(now))
            .map(|(key, entry)| (key, &entry.value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries().map(|(key, _)| key)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries().map(|(_, value)| value)
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Earliest pending deadline, if any. May belong to a superseded entry.
    #[must_use]
    pub fn next_expiry(&self) -> Option<Instant> {
        self.expiries.peek().map(|Reverse(expiry)| expiry.at)
    }

    /// Remove every entry whose deadline has passed, returning them. Each
    /// entry is returned at most once.
    pub fn purge_expired(&mut self) -> Vec<(K, V)> {
        let now = Instant::now();
        let mut expired = Vec::new();

        while let Some(Reverse(next)) = self.expiries.peek() {
            if next.at > now {
                break;
            }
            let Some(Reverse(expiry)) = self.expiries.pop() else {
                break;
            };
            let current =
                self.entries.get(&expiry.key).is_some_and(|entry| entry.generation == expiry.generation);
            if current && let Some(entry) = self.entries.remove(&expiry.key) {
                expired.push((expiry.key, entry.value));
            }
        }

        expired
    }

    // Superseded deadlines stay in the heap until they are due; rebuild it
    // when they outnumber the live ones.
    fn compact(&mut self) {
        if self.expiries.len() <= 2 * self.entries.len() + 16 {
            return;
        }
        self.expiries = self
            .entries
            .iter()
            .map(|(key, entry)| {
                Reverse(Expiry {
                    at: entry.expires_at,
                    generation: entry.generation,
                    key: key.clone(),
                })
            })
            .collect();
    }
}
