//! TTL-keyed cache shared by the data domains
//!
//! Thread-safe store mapping a string key to a JSON payload plus cache and
//! expiry timestamps. Keys follow the `"<domain>:<k>=<v>;..."` convention
//! produced by [`cache_key`]. Expired entries are evicted lazily on
//! [`CacheStore::get`]; the non-evicting [`CacheStore::lookup`] keeps them
//! around so the orchestrator can serve them as a stale-on-error fallback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

/// Parameters excluded from cache keys so credentials never become part of
/// a key that might be logged or persisted.
const SENSITIVE_PARAMS: &[&str] = &["apikey", "api_key", "appid", "key", "token", "auth"];

/// Thread-safe TTL cache
pub struct CacheStore {
    /// Entries keyed by `"<domain>:<params>"`
    entries: DashMap<String, CacheEntry>,
    /// Cache statistics
    stats: CacheStats,
}

/// A cached payload with TTL metadata
struct CacheEntry {
    /// The cached JSON value
    value: Value,
    /// Wall-clock cache time, surfaced unmodified on stale reads
    cached_at: DateTime<Utc>,
    /// Monotonic store time used for expiry math
    stored: Instant,
    /// Time-to-live
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.stored.elapsed() > self.ttl
    }
}

/// Outcome of a non-evicting cache lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Entry exists and is within its TTL
    Fresh(Value),
    /// Entry exists but its TTL has elapsed
    Stale {
        /// The expired payload
        value: Value,
        /// When the payload was originally cached
        cached_at: DateTime<Utc>,
    },
    /// No entry for this key
    Miss,
}

/// Cache statistics tracked atomically
#[derive(Debug, Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    stale_hits: AtomicU64,
}

/// Snapshot of cache statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStatsSnapshot {
    /// Fresh entries served
    pub hits: u64,
    /// Lookups that found nothing usable
    pub misses: u64,
    /// Expired or purged entries removed
    pub evictions: u64,
    /// Lookups that found only an expired entry
    pub stale_hits: u64,
    /// Current number of entries (including expired ones not yet evicted)
    pub size: usize,
}

impl CacheStore {
    /// Create a new empty cache
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            stats: CacheStats::default(),
        }
    }

    /// Get a payload if an entry exists and is within its TTL
    ///
    /// Expired entries are evicted on read and reported as a miss.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self.entries.get(key) {
            Some(entry) if entry.is_expired() => {
                drop(entry);
                self.entries.remove(key);
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Some(entry) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Non-evicting lookup distinguishing fresh, stale, and missing entries
    ///
    /// Stale entries are left in place: they are the last-resort payload when
    /// every fetch path fails, and are only dropped once a refresh overwrites
    /// them or the cleanup horizon purges them.
    pub fn lookup(&self, key: &str) -> Lookup {
        match self.entries.get(key) {
            Some(entry) if entry.is_expired() => {
                self.stats.stale_hits.fetch_add(1, Ordering::Relaxed);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                Lookup::Stale {
                    value: entry.value.clone(),
                    cached_at: entry.cached_at,
                }
            }
            Some(entry) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Lookup::Fresh(entry.value.clone())
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                Lookup::Miss
            }
        }
    }

    /// Store a payload under `key` with the given TTL, overwriting any
    /// previous entry
    pub fn set(&self, key: &str, value: Value, ttl: Duration) {
        debug_assert!(!ttl.is_zero(), "cache TTL must be positive");
        let entry = CacheEntry {
            value,
            cached_at: Utc::now(),
            stored: Instant::now(),
            ttl,
        };
        self.entries.insert(key.to_string(), entry);
    }

    /// Remove all entries
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Remove all entries whose key starts with `prefix`, returning the
    /// number removed
    ///
    /// Used for targeted invalidation, e.g. every forecast entry for one
    /// location via the `"forecast:loc=..."` prefix.
    pub fn clear_prefix(&self, prefix: &str) -> usize {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();

        let count = keys.len();
        for key in keys {
            self.entries.remove(&key);
        }
        count
    }

    /// Remove entries stored longer ago than `horizon`, regardless of their
    /// own TTL, returning the number removed
    ///
    /// This bounds storage growth independently of per-entry TTLs and is the
    /// only path that discards stale-on-error fallback entries.
    pub fn purge_older_than(&self, horizon: Duration) -> usize {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.value().stored.elapsed() > horizon)
            .map(|entry| entry.key().clone())
            .collect();

        let count = keys.len();
        for key in &keys {
            self.entries.remove(key);
        }
        if count > 0 {
            self.stats
                .evictions
                .fetch_add(count as u64, Ordering::Relaxed);
            debug!(purged = count, "Purged entries past the cleanup horizon");
        }
        count
    }

    /// Number of entries currently stored (including expired ones awaiting
    /// eviction)
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get a statistics snapshot
    #[must_use]
    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            stale_hits: self.stats.stale_hits.load(Ordering::Relaxed),
            size: self.entries.len(),
        }
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a deterministic cache key: `"<domain>:<k>=<v>;..."`
///
/// Parameters are sorted by key (then value) so equivalent requests map to
/// the same entry regardless of argument order. Credential-bearing
/// parameters are excluded from the key entirely.
#[must_use]
pub fn cache_key(domain: &str, params: &[(&str, &str)]) -> String {
    let mut pairs: Vec<(&str, &str)> = params
        .iter()
        .copied()
        .filter(|(k, _)| {
            let lower = k.to_ascii_lowercase();
            !SENSITIVE_PARAMS.contains(&lower.as_str())
        })
        .collect();
    pairs.sort_unstable_by(|a, b| a.0.cmp(b.0).then(a.1.cmp(b.1)));

    let joined = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(";");
    format!("{domain}:{joined}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_then_get() {
        let cache = CacheStore::new();
        let value = json!({"temp": 18});

        cache.set("weather:loc=paris", value.clone(), Duration::from_secs(600));
        assert_eq!(cache.get("weather:loc=paris"), Some(value));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_miss_on_unknown_key() {
        let cache = CacheStore::new();
        assert_eq!(cache.get("weather:loc=nowhere"), None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_expired_entry_is_evicted_on_get() {
        let cache = CacheStore::new();
        cache.set("k", json!(1), Duration::from_millis(5));

        std::thread::sleep(Duration::from_millis(10));

        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.stats().evictions, 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lookup_keeps_stale_entry_with_original_timestamp() {
        let cache = CacheStore::new();
        let before = Utc::now();
        cache.set("k", json!({"temp": 18}), Duration::from_millis(5));
        let after = Utc::now();
        assert!(matches!(cache.lookup("k"), Lookup::Fresh(_)));

        std::thread::sleep(Duration::from_millis(10));

        match cache.lookup("k") {
            Lookup::Stale { value, cached_at } => {
                assert_eq!(value, json!({"temp": 18}));
                assert!(cached_at >= before && cached_at <= after);
            }
            other => panic!("expected stale entry, got {other:?}"),
        }
        // Still present: lookup never evicts
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().stale_hits, 1);
    }

    #[test]
    fn test_overwrite_refreshes_entry() {
        let cache = CacheStore::new();
        cache.set("k", json!(1), Duration::from_millis(5));
        std::thread::sleep(Duration::from_millis(10));

        cache.set("k", json!(2), Duration::from_secs(60));
        assert_eq!(cache.get("k"), Some(json!(2)));
    }

    #[test]
    fn test_clear_prefix_targets_one_domain() {
        let cache = CacheStore::new();
        cache.set("forecast:loc=paris", json!(1), Duration::from_secs(60));
        cache.set("forecast:loc=oslo", json!(2), Duration::from_secs(60));
        cache.set("weather:loc=paris", json!(3), Duration::from_secs(60));

        let removed = cache.clear_prefix("forecast:");
        assert_eq!(removed, 2);
        assert_eq!(cache.get("weather:loc=paris"), Some(json!(3)));
        assert_eq!(cache.get("forecast:loc=paris"), None);
    }

    #[test]
    fn test_purge_older_than_ignores_ttl() {
        let cache = CacheStore::new();
        // Long TTL, but stored before the horizon
        cache.set("old", json!(1), Duration::from_secs(3600));
        std::thread::sleep(Duration::from_millis(10));
        cache.set("new", json!(2), Duration::from_secs(3600));

        let removed = cache.purge_older_than(Duration::from_millis(5));
        assert_eq!(removed, 1);
        assert_eq!(cache.get("old"), None);
        assert_eq!(cache.get("new"), Some(json!(2)));
    }

    #[test]
    fn test_cache_key_sorts_params() {
        let a = cache_key("weather", &[("units", "metric"), ("loc", "paris")]);
        let b = cache_key("weather", &[("loc", "paris"), ("units", "metric")]);
        assert_eq!(a, b);
        assert_eq!(a, "weather:loc=paris;units=metric");
    }

    #[test]
    fn test_cache_key_excludes_credentials() {
        let key = cache_key(
            "weather",
            &[("loc", "paris"), ("appid", "s3cret"), ("APIKEY", "x")],
        );
        assert_eq!(key, "weather:loc=paris");
    }

    #[test]
    fn test_cache_key_empty_params() {
        assert_eq!(cache_key("feeds", &[]), "feeds:");
    }
}
