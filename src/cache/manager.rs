//! TTL cache with an in-memory tier and an optional durable tier
//!
//! Provides a `TtlCache` that stores serializable values under
//! `{namespace}:{key}` together with their creation time and time-to-live.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use super::store::DurableStore;
use crate::clock::{system_clock, SharedClock};

/// TTL used by `set` when the caller does not pass one
pub const DEFAULT_TTL: std::time::Duration = std::time::Duration::from_secs(300);

/// Errors returned by cache writes
#[derive(Debug, Error)]
pub enum CacheError {
    /// The value could not be encoded as JSON
    #[error("Failed to encode cache value: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Wrapper stored in both tiers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheEntry {
    /// The cached value
    data: serde_json::Value,
    /// When the value was cached
    created_at: DateTime<Utc>,
    /// Time-to-live in milliseconds
    ttl: u64,
}

impl CacheEntry {
    fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).max(Duration::zero())
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.age(now).num_milliseconds() >= self.ttl as i64
    }

    /// Fresh while younger than half the TTL
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        (self.age(now).num_milliseconds() as u64).saturating_mul(2) < self.ttl
    }
}

/// A valid entry returned by `get`
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit<T> {
    pub value: T,
    /// Seconds since the value was cached
    pub age_seconds: u64,
    /// Whether the entry is younger than half its TTL
    pub is_fresh: bool,
}

/// Result of `peek`, which also returns expired entries
#[derive(Debug, Clone, PartialEq)]
pub struct CachedData<T> {
    pub value: T,
    pub age_seconds: u64,
    /// Whether the entry is younger than half its TTL
    pub is_fresh: bool,
    /// Whether the entry has outlived its TTL
    pub is_expired: bool,
}

/// Namespaced TTL cache
///
/// Constructed once and shared by reference (`Arc<TtlCache>`) between the
/// fetch orchestrator and the refresh scheduler.
#[derive(Debug)]
pub struct TtlCache {
    memory: DashMap<String, CacheEntry>,
    durable: Option<Arc<dyn DurableStore>>,
    clock: SharedClock,
    default_ttl: std::time::Duration,
}

impl TtlCache {
    /// Creates a cache over an optional durable tier using the system clock
    pub fn new(durable: Option<Arc<dyn DurableStore>>) -> Self {
        Self {
            memory: DashMap::new(),
            durable,
            clock: system_clock(),
            default_ttl: DEFAULT_TTL,
        }
    }

    /// Creates a cache with no durable tier
    pub fn memory_only() -> Self {
        Self::new(None)
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_default_ttl(mut self, ttl: std::time::Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    fn full_key(namespace: &str, key: &str) -> String {
        format!("{}:{}", namespace, key)
    }

    /// Stores `value` with the default TTL
    pub fn set<T: Serialize>(&self, namespace: &str, key: &str, value: &T) -> Result<(), CacheError> {
        self.set_with_ttl(namespace, key, value, self.default_ttl)
    }

    /// Stores `value`, replacing any existing entry wholesale
    ///
    /// Durable-tier failures are never returned: after a failed write the cache
    /// purges expired durable entries and retries once, and otherwise keeps the
    /// entry in memory only.
    pub fn set_with_ttl<T: Serialize>(
        &self,
        namespace: &str,
        key: &str,
        value: &T,
        ttl: std::time::Duration,
    ) -> Result<(), CacheError> {
        let entry = CacheEntry {
            data: serde_json::to_value(value)?,
            created_at: self.clock.now(),
            ttl: ttl.as_millis() as u64,
        };
        let full_key = Self::full_key(namespace, key);

        self.persist(&full_key, &entry);
        self.memory.insert(full_key, entry);
        Ok(())
    }

    fn persist(&self, full_key: &str, entry: &CacheEntry) {
        let Some(store) = &self.durable else {
            return;
        };

        let raw = match serde_json::to_string(entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = full_key, error = %e, "Failed to encode durable cache entry");
                return;
            }
        };

        let Err(first_error) = store.save(full_key, &raw) else {
            return;
        };

        let purged = self.purge_durable(store.as_ref());
        debug!(key = full_key, error = %first_error, purged, "Durable write failed, retrying after purge");

        if let Err(e) = store.save(full_key, &raw) {
            warn!(key = full_key, error = %e, "Durable write failed twice; keeping entry in memory only");
            // an older durable copy must not shadow the new value later
            if let Err(e) = store.remove(full_key) {
                debug!(key = full_key, error = %e, "Failed to remove stale durable entry");
            }
        }
    }

    /// Looks an entry up in memory, then in the durable tier
    ///
    /// A durable hit is copied back into memory.
    fn lookup(&self, full_key: &str) -> Option<CacheEntry> {
        if let Some(entry) = self.memory.get(full_key).map(|e| e.value().clone()) {
            return Some(entry);
        }

        let store = self.durable.as_ref()?;
        let raw = match store.load(full_key) {
            Ok(raw) => raw?,
            Err(e) => {
                debug!(key = full_key, error = %e, "Durable cache read failed");
                return None;
            }
        };

        match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) => {
                self.memory.insert(full_key.to_string(), entry.clone());
                Some(entry)
            }
            Err(e) => {
                debug!(key = full_key, error = %e, "Discarding unreadable durable entry");
                let _ = store.remove(full_key);
                None
            }
        }
    }

    /// Returns the entry if it is still within its TTL
    ///
    /// Expired entries are deleted from both tiers and reported as absent.
    pub fn get<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> Option<CacheHit<T>> {
        let full_key = Self::full_key(namespace, key);
        let entry = self.lookup(&full_key)?;
        let now = self.clock.now();

        if entry.is_expired(now) {
            debug!(key = %full_key, "Cache entry expired");
            self.remove_key(&full_key);
            return None;
        }

        let value = decode(&full_key, &entry)?;
        Some(CacheHit {
            value,
            age_seconds: entry.age(now).num_seconds() as u64,
            is_fresh: entry.is_fresh(now),
        })
    }

    /// Returns the entry even if it has expired, without deleting it
    pub fn peek<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> Option<CachedData<T>> {
        let full_key = Self::full_key(namespace, key);
        let entry = self.lookup(&full_key)?;
        let now = self.clock.now();

        let value = decode(&full_key, &entry)?;
        Some(CachedData {
            value,
            age_seconds: entry.age(now).num_seconds() as u64,
            is_fresh: entry.is_fresh(now),
            is_expired: entry.is_expired(now),
        })
    }

    pub fn delete(&self, namespace: &str, key: &str) {
        self.remove_key(&Self::full_key(namespace, key));
    }

    fn remove_key(&self, full_key: &str) {
        self.memory.remove(full_key);
        if let Some(store) = &self.durable {
            if let Err(e) = store.remove(full_key) {
                debug!(key = full_key, error = %e, "Failed to remove durable entry");
            }
        }
    }

    /// Removes every entry in `namespace` from both tiers
    pub fn clear_namespace(&self, namespace: &str) {
        let prefix = format!("{}:", namespace);
        self.memory.retain(|k, _| !k.starts_with(&prefix));

        if let Some(store) = &self.durable {
            match store.keys() {
                Ok(keys) => {
                    for key in keys.iter().filter(|k| k.starts_with(&prefix)) {
                        let _ = store.remove(key);
                    }
                }
                Err(e) => warn!(namespace, error = %e, "Failed to list durable keys"),
            }
        }
    }

    /// Removes expired entries from both tiers and returns how many were dropped
    pub fn clear_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.memory.len();
        self.memory.retain(|_, entry| !entry.is_expired(now));
        let from_memory = before - self.memory.len();

        let from_durable = self
            .durable
            .as_ref()
            .map(|store| self.purge_durable(store.as_ref()))
            .unwrap_or(0);

        from_memory + from_durable
    }

    /// Removes everything from both tiers
    pub fn clear_all(&self) {
        self.memory.clear();
        if let Some(store) = &self.durable {
            match store.keys() {
                Ok(keys) => {
                    for key in keys {
                        let _ = store.remove(&key);
                    }
                }
                Err(e) => warn!(error = %e, "Failed to list durable keys"),
            }
        }
    }

    /// Deletes expired or unreadable durable entries
    fn purge_durable(&self, store: &dyn DurableStore) -> usize {
        let now = self.clock.now();
        let keys = match store.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Failed to list durable keys");
                return 0;
            }
        };

        let mut removed = 0;
        for key in keys {
            let stale = match store.load(&key) {
                Ok(Some(raw)) => serde_json::from_str::<CacheEntry>(&raw)
                    .map(|entry| entry.is_expired(now))
                    .unwrap_or(true),
                Ok(None) => false,
                Err(_) => false,
            };
            if stale && store.remove(&key).is_ok() {
                removed += 1;
            }
        }
        removed
    }
}

fn decode<T: DeserializeOwned>(full_key: &str, entry: &CacheEntry) -> Option<T> {
    match serde_json::from_value(entry.data.clone()) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(key = full_key, error = %e, "Cached value has an unexpected shape");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{DiskStore, MemoryStore};
    use crate::clock::ManualClock;
    use crate::geo::LatLon;
    use chrono::TimeZone;
    use serde::{Deserialize, Serialize};
    use std::time::Duration as StdDuration;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestData {
        status: String,
        value: i32,
    }

    fn start_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 8, 0, 0).unwrap()
    }

    fn create_test_cache() -> (TtlCache, Arc<ManualClock>, Arc<MemoryStore>) {
        let clock = Arc::new(ManualClock::new(start_time()));
        let store = Arc::new(MemoryStore::new());
        let cache = TtlCache::new(Some(store.clone() as Arc<dyn DurableStore>)).with_clock(clock.clone());
        (cache, clock, store)
    }

    fn heavy() -> TestData {
        TestData {
            status: "heavy".to_string(),
            value: 3,
        }
    }

    #[test]
    fn test_set_then_get_round_trips() {
        let (cache, _clock, _store) = create_test_cache();

        cache.set("traffic", "area1", &heavy()).expect("Set should succeed");
        let hit: CacheHit<TestData> = cache.get("traffic", "area1").expect("Should hit");

        assert_eq!(hit.value, heavy());
        assert_eq!(hit.age_seconds, 0);
        assert!(hit.is_fresh);
    }

    #[test]
    fn test_get_returns_none_after_ttl() {
        let (cache, clock, _store) = create_test_cache();

        cache
            .set_with_ttl("traffic", "area1", &heavy(), StdDuration::from_millis(1000))
            .unwrap();
        clock.advance(Duration::milliseconds(1500));

        assert!(cache.get::<TestData>("traffic", "area1").is_none());
    }

    #[test]
    fn test_entry_expires_exactly_at_ttl() {
        let (cache, clock, _store) = create_test_cache();

        cache
            .set_with_ttl("traffic", "edge", &heavy(), StdDuration::from_millis(1000))
            .unwrap();
        clock.advance(Duration::milliseconds(999));
        assert!(cache.get::<TestData>("traffic", "edge").is_some());

        clock.advance(Duration::milliseconds(1));
        assert!(cache.get::<TestData>("traffic", "edge").is_none());
    }

    #[test]
    fn test_expired_entry_is_deleted_lazily_and_recheck_is_none() {
        let (cache, clock, store) = create_test_cache();

        cache
            .set_with_ttl("traffic", "area1", &heavy(), StdDuration::from_millis(1000))
            .unwrap();
        assert!(store.load("traffic:area1").unwrap().is_some());

        clock.advance(Duration::milliseconds(1500));
        // Still present until someone looks at it
        assert!(store.load("traffic:area1").unwrap().is_some());

        assert!(cache.get::<TestData>("traffic", "area1").is_none());
        assert!(store.load("traffic:area1").unwrap().is_none());
        assert!(cache.get::<TestData>("traffic", "area1").is_none());
    }

    #[test]
    fn test_is_fresh_flips_at_half_ttl() {
        let (cache, clock, _store) = create_test_cache();

        cache
            .set_with_ttl("geocode", "q", &heavy(), StdDuration::from_secs(100))
            .unwrap();
        clock.advance(Duration::seconds(49));
        assert!(cache.get::<TestData>("geocode", "q").unwrap().is_fresh);

        clock.advance(Duration::seconds(2));
        let hit = cache.get::<TestData>("geocode", "q").unwrap();
        assert!(!hit.is_fresh);
        assert_eq!(hit.age_seconds, 51);
    }

    #[test]
    fn test_get_rehydrates_memory_from_durable_tier() {
        let (cache, clock, store) = create_test_cache();
        cache.set("route", "a-b", &heavy()).unwrap();

        // A second cache over the same store starts with an empty memory tier
        let restarted = TtlCache::new(Some(store.clone() as Arc<dyn DurableStore>)).with_clock(clock.clone());
        let hit: CacheHit<TestData> = restarted.get("route", "a-b").expect("Durable hit");
        assert_eq!(hit.value, heavy());

        // Now served from memory even if the durable copy disappears
        store.remove("route:a-b").unwrap();
        assert!(restarted.get::<TestData>("route", "a-b").is_some());
    }

    #[test]
    fn test_durable_hit_applies_expiry_check() {
        let (cache, clock, store) = create_test_cache();
        cache
            .set_with_ttl("route", "old", &heavy(), StdDuration::from_secs(10))
            .unwrap();
        clock.advance(Duration::seconds(11));

        let restarted = TtlCache::new(Some(store.clone() as Arc<dyn DurableStore>)).with_clock(clock.clone());
        assert!(restarted.get::<TestData>("route", "old").is_none());
        assert!(store.load("route:old").unwrap().is_none());
    }

    #[test]
    fn test_overwrite_replaces_whole_entry() {
        let (cache, clock, _store) = create_test_cache();
        cache
            .set_with_ttl("traffic", "k", &heavy(), StdDuration::from_secs(10))
            .unwrap();
        clock.advance(Duration::seconds(8));

        let light = TestData {
            status: "light".to_string(),
            value: 1,
        };
        cache
            .set_with_ttl("traffic", "k", &light, StdDuration::from_secs(10))
            .unwrap();
        clock.advance(Duration::seconds(5));

        let hit: CacheHit<TestData> = cache.get("traffic", "k").expect("New TTL applies");
        assert_eq!(hit.value, light);
        assert_eq!(hit.age_seconds, 5);
    }

    #[test]
    fn test_peek_returns_expired_entry_without_deleting() {
        let (cache, clock, store) = create_test_cache();
        cache
            .set_with_ttl("traffic", "k", &heavy(), StdDuration::from_secs(1))
            .unwrap();
        clock.advance(Duration::seconds(30));

        let stale: CachedData<TestData> = cache.peek("traffic", "k").expect("Peek keeps stale data");
        assert!(stale.is_expired);
        assert_eq!(stale.value, heavy());
        assert!(store.load("traffic:k").unwrap().is_some());
    }

    #[test]
    fn test_get_with_wrong_type_is_none() {
        let (cache, _clock, _store) = create_test_cache();
        cache.set("traffic", "k", &"just a string").unwrap();
        assert!(cache.get::<TestData>("traffic", "k").is_none());
    }

    #[test]
    fn test_clear_namespace_only_touches_that_namespace() {
        let (cache, _clock, store) = create_test_cache();
        cache.set("traffic", "a", &1).unwrap();
        cache.set("traffic", "b", &2).unwrap();
        cache.set("geocode", "a", &3).unwrap();

        cache.clear_namespace("traffic");

        assert!(cache.get::<i32>("traffic", "a").is_none());
        assert!(cache.get::<i32>("traffic", "b").is_none());
        assert_eq!(cache.get::<i32>("geocode", "a").unwrap().value, 3);
        assert_eq!(store.keys().unwrap(), vec!["geocode:a".to_string()]);
    }

    #[test]
    fn test_clear_expired_removes_only_expired_entries() {
        let (cache, clock, store) = create_test_cache();
        cache.set_with_ttl("t", "short", &1, StdDuration::from_secs(1)).unwrap();
        cache.set_with_ttl("t", "long", &2, StdDuration::from_secs(60)).unwrap();
        clock.advance(Duration::seconds(5));

        let removed = cache.clear_expired();

        assert_eq!(removed, 2, "one memory entry and one durable entry");
        assert!(store.load("t:short").unwrap().is_none());
        assert!(cache.peek::<i32>("t", "short").is_none());
        assert_eq!(cache.get::<i32>("t", "long").unwrap().value, 2);
    }

    #[test]
    fn test_clear_all_empties_both_tiers() {
        let (cache, _clock, store) = create_test_cache();
        cache.set("a", "1", &1).unwrap();
        cache.set("b", "2", &2).unwrap();

        cache.clear_all();

        assert!(cache.get::<i32>("a", "1").is_none());
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn test_quota_failure_purges_expired_and_retries() {
        let clock = Arc::new(ManualClock::new(start_time()));
        let store = Arc::new(MemoryStore::with_quota(250));
        let cache = TtlCache::new(Some(store.clone() as Arc<dyn DurableStore>)).with_clock(clock.clone());
        let payload = "x".repeat(100);

        cache
            .set_with_ttl("tiles", "old", &payload, StdDuration::from_secs(1))
            .unwrap();
        clock.advance(Duration::seconds(2));
        cache
            .set_with_ttl("tiles", "new", &payload, StdDuration::from_secs(60))
            .unwrap();

        assert!(store.load("tiles:old").unwrap().is_none(), "expired entry purged");
        assert!(store.load("tiles:new").unwrap().is_some(), "retry succeeded");
    }

    #[test]
    fn test_quota_failure_degrades_to_memory_only() {
        let clock = Arc::new(ManualClock::new(start_time()));
        let store = Arc::new(MemoryStore::with_quota(250));
        let cache = TtlCache::new(Some(store.clone() as Arc<dyn DurableStore>)).with_clock(clock.clone());
        let payload = "x".repeat(100);

        cache.set_with_ttl("tiles", "a", &payload, StdDuration::from_secs(60)).unwrap();
        cache
            .set_with_ttl("tiles", "b", &payload, StdDuration::from_secs(60))
            .expect("Durable failure is not raised");

        assert!(store.load("tiles:b").unwrap().is_none());
        assert_eq!(cache.get::<String>("tiles", "b").unwrap().value, payload);
    }

    #[test]
    fn test_disk_tier_survives_restart() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let clock = Arc::new(ManualClock::new(start_time()));
        let store: Arc<dyn DurableStore> = Arc::new(DiskStore::with_dir(temp_dir.path().to_path_buf()));

        let cache = TtlCache::new(Some(store.clone())).with_clock(clock.clone());
        cache.set("geocode", "q=main st", &heavy()).unwrap();
        drop(cache);

        let restarted = TtlCache::new(Some(store)).with_clock(clock);
        let hit: CacheHit<TestData> = restarted.get("geocode", "q=main st").expect("Read from disk");
        assert_eq!(hit.value, heavy());
    }

    #[test]
    fn test_disk_tier_reloads_coordinates_bit_exact() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let clock = Arc::new(ManualClock::new(start_time()));
        let store: Arc<dyn DurableStore> = Arc::new(DiskStore::with_dir(temp_dir.path().to_path_buf()));

        // spread of full-precision values across the valid range
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            (seed >> 11) as f64 / (1u64 << 53) as f64
        };
        let mut points: Vec<LatLon> = (0..2_000)
            .map(|_| LatLon {
                lat: next() * 180.0 - 90.0,
                lon: next() * 360.0 - 180.0,
            })
            .collect();
        points.push(LatLon {
            lat: 49.2827,
            lon: -123.39149387506633,
        });

        let cache = TtlCache::new(Some(store.clone())).with_clock(clock.clone());
        cache.set("route", "a-b", &points).unwrap();
        drop(cache);

        let restarted = TtlCache::new(Some(store)).with_clock(clock);
        let hit: CacheHit<Vec<LatLon>> = restarted.get("route", "a-b").expect("Read from disk");
        let mismatched = hit
            .value
            .iter()
            .zip(&points)
            .filter(|(got, want)| got.lat.to_bits() != want.lat.to_bits() || got.lon.to_bits() != want.lon.to_bits())
            .count();
        assert_eq!(mismatched, 0);
        assert_eq!(hit.value.len(), points.len());
    }

    #[test]
    fn test_disk_tier_stores_long_keys() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let clock = Arc::new(ManualClock::new(start_time()));
        let store: Arc<dyn DurableStore> = Arc::new(DiskStore::with_dir(temp_dir.path().to_path_buf()));
        let signature = format!("limit=10&q={}", "main street & 1st avenue: city hall ".repeat(8));
        assert!(signature.len() > 255);

        let cache = TtlCache::new(Some(store.clone())).with_clock(clock.clone());
        cache.set("geocode", &signature, &heavy()).unwrap();
        drop(cache);

        assert!(store.load(&format!("geocode:{}", signature)).unwrap().is_some());
        let restarted = TtlCache::new(Some(store)).with_clock(clock);
        assert_eq!(restarted.get::<TestData>("geocode", &signature).unwrap().value, heavy());

        restarted.clear_namespace("geocode");
        let fresh_start = TtlCache::new(Some(Arc::new(DiskStore::with_dir(temp_dir.path().to_path_buf())) as Arc<dyn DurableStore>));
        assert!(fresh_start.get::<TestData>("geocode", &signature).is_none());
    }
}
