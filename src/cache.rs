//! Short-lived memoization owned by whoever renders results.
//!
//! Entries are keyed by a SHA-256 fingerprint of the serialized query
//! parameters. Everything here is advisory: any entry may be dropped at any
//! time and the caller recomputes.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// # Errors
    ///
    /// Returns the serializer error if `params` cannot be encoded as JSON.
    pub fn of<P: Serialize + ?Sized>(params: &P) -> Result<Self, serde_json::Error> {
        let bytes = serde_json::to_vec(params)?;
        Ok(Self(Sha256::digest(&bytes).into()))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0[..8] {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

struct Entry<V> {
    stored_at: Instant,
    value: V,
}

pub struct QueryCache<V> {
    ttl: Duration,
    entries: HashMap<Fingerprint, Entry<V>>,
}

impl<V: Clone> QueryCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fresh value for `key`, evicting it if it has expired.
    pub fn get(&mut self, key: &Fingerprint) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    fn get_at(&mut self, key: &Fingerprint, now: Instant) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(entry) => now.saturating_duration_since(entry.stored_at) >= self.ttl,
            None => return None,
        };
        if expired {
            self.entries.remove(key);
            tracing::debug!(key = %key, "cache entry expired");
            return None;
        }
        self.entries.get(key).map(|e| e.value.clone())
    }

    pub fn insert(&mut self, key: Fingerprint, value: V) {
        self.entries.insert(
            key,
            Entry {
                stored_at: Instant::now(),
                value,
            },
        );
    }

    /// Return the cached value for `params` or compute, store and return it.
    ///
    /// # Errors
    ///
    /// Propagates fingerprinting failures; `compute` itself is infallible.
    pub fn get_or_compute<P, F>(&mut self, params: &P, compute: F) -> Result<V, serde_json::Error>
    where
        P: Serialize + ?Sized,
        F: FnOnce() -> V,
    {
        let key = Fingerprint::of(params)?;
        if let Some(hit) = self.get(&key) {
            tracing::debug!(key = %key, "cache hit");
            return Ok(hit);
        }
        tracing::debug!(key = %key, "cache miss");
        let value = compute();
        self.insert(key, value.clone());
        Ok(value)
    }

    pub fn invalidate(&mut self, key: &Fingerprint) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drop every expired entry.
    pub fn purge_expired(&mut self) {
        let now = Instant::now();
        let ttl = self.ttl;
        self.entries
            .retain(|_, e| now.saturating_duration_since(e.stored_at) < ttl);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::filter::RecordFilter;

    #[test]
    fn fingerprint_tracks_parameter_content() {
        let a = RecordFilter {
            dish_name: Some("Gyoza".to_string()),
            ..RecordFilter::default()
        };
        let b = a.clone();
        let c = RecordFilter {
            dish_name: Some("Won".to_string()),
            ..RecordFilter::default()
        };
        assert_eq!(Fingerprint::of(&a).unwrap(), Fingerprint::of(&b).unwrap());
        assert_ne!(Fingerprint::of(&a).unwrap(), Fingerprint::of(&c).unwrap());
    }

    #[test]
    fn second_lookup_is_served_from_cache() {
        let mut cache = QueryCache::new(Duration::from_secs(60));
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            42
        };
        assert_eq!(cache.get_or_compute("stats", compute).unwrap(), 42);
        assert_eq!(cache.get_or_compute("stats", compute).unwrap(), 42);
        assert_eq!(calls.get(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn zero_ttl_never_serves_stale_values() {
        let mut cache = QueryCache::new(Duration::ZERO);
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            calls.get()
        };
        assert_eq!(cache.get_or_compute("k", compute).unwrap(), 1);
        assert_eq!(cache.get_or_compute("k", compute).unwrap(), 2);
    }

    #[test]
    fn entries_expire_after_ttl() {
        let mut cache = QueryCache::new(Duration::from_secs(15));
        let key = Fingerprint::of("dashboard").unwrap();
        cache.insert(key, 7);
        let later = Instant::now() + Duration::from_secs(16);
        assert_eq!(cache.get_at(&key, later), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn manual_invalidation() {
        let mut cache = QueryCache::new(Duration::from_secs(60));
        let key = Fingerprint::of(&("alerts", 7)).unwrap();
        cache.insert(key, vec![1, 2]);
        assert!(cache.invalidate(&key));
        assert!(!cache.invalidate(&key));

        cache.insert(key, vec![3]);
        cache.clear();
        assert!(cache.get(&key).is_none());
    }
}
