use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

const DEFAULT_TTL_SECS: u64 = 600;
const DEFAULT_SECTOR_TTL_SECS: u64 = 24 * 3600;
const DEFAULT_SESSION_TTL_SECS: u64 = 3600;

/// Keyed store whose entries expire `ttl` after insertion.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, (Instant, V)>>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, (Instant, V)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        let entries = self.lock();
        let (inserted, value) = entries.get(key)?;
        (now.saturating_duration_since(*inserted) < self.ttl).then(|| value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    pub fn insert_at(&self, key: K, value: V, now: Instant) {
        self.lock().insert(key, (now, value));
    }

    pub fn invalidate(&self, key: &K) -> bool {
        self.lock().remove(key).is_some()
    }

    pub fn invalidate_all(&self) {
        self.lock().clear();
    }

    /// Drops expired entries and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, (inserted, _)| now.saturating_duration_since(*inserted) < ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-kind cache lifetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub prices: Duration,
    pub flows: Duration,
    pub fundamentals: Duration,
    pub sectors: Duration,
    pub session: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            prices: Duration::from_secs(DEFAULT_TTL_SECS),
            flows: Duration::from_secs(DEFAULT_TTL_SECS),
            fundamentals: Duration::from_secs(DEFAULT_TTL_SECS),
            sectors: Duration::from_secs(DEFAULT_SECTOR_TTL_SECS),
            session: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
        }
    }
}

impl CacheTtls {
    pub fn from_env() -> Self {
        let d = Self::default();
        let secs = |name: &str, fallback: Duration| {
            std::env::var(name)
                .ok()
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(fallback)
        };
        Self {
            prices: secs("CACHE_TTL_PRICES_SECS", d.prices),
            flows: secs("CACHE_TTL_FLOWS_SECS", d.flows),
            fundamentals: secs("CACHE_TTL_FUNDAMENTALS_SECS", d.fundamentals),
            sectors: secs("CACHE_TTL_SECTORS_SECS", d.sectors),
            session: secs("CACHE_TTL_SESSION_SECS", d.session),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_expire_after_ttl() {
        let cache: TtlCache<&str, i32> = TtlCache::new(Duration::from_secs(10));
        let t0 = Instant::now();
        cache.insert_at("a", 1, t0);
        assert_eq!(cache.get_at(&"a", t0 + Duration::from_secs(9)), Some(1));
        assert_eq!(cache.get_at(&"a", t0 + Duration::from_secs(10)), None);
        assert_eq!(cache.get_at(&"b", t0), None);
    }

    #[test]
    fn explicit_invalidation() {
        let cache: TtlCache<u32, String> = TtlCache::new(Duration::from_secs(60));
        cache.insert(1, "x".to_string());
        cache.insert(2, "y".to_string());
        assert!(cache.invalidate(&1));
        assert!(!cache.invalidate(&1));
        assert_eq!(cache.get(&2).as_deref(), Some("y"));
        cache.invalidate_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn purge_drops_only_expired() {
        let cache: TtlCache<u32, u32> = TtlCache::new(Duration::from_secs(5));
        let t0 = Instant::now();
        cache.insert_at(1, 1, t0);
        cache.insert_at(2, 2, t0 + Duration::from_secs(4));
        assert_eq!(cache.purge_expired_at(t0 + Duration::from_secs(6)), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_at(&2, t0 + Duration::from_secs(6)), Some(2));
    }
}
