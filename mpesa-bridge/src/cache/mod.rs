//! Expiring key/value cache for credentials.
//!
//! [`CredentialCache`] keeps values such as OAuth access tokens between calls. Entries carry
//! an optional absolute expiry; there is no background sweeper. Every read or write first
//! purges expired entries, and the backing store is rewritten only when something changed.
//!
//! Two backends implement [`CacheStore`]:
//!
//! - [`MemoryStore`]: a mutex-guarded map, private to the process. The default.
//! - [`FileStore`]: a JSON file shared between processes, guarded by an exclusive lock on a
//!   sidecar file and replaced atomically on write.

use std::{collections::BTreeMap, fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{
    clock::{Clock, SystemClock},
    error::Result,
};

mod file;
mod memory;

pub use file::{CACHE_FILE_NAME, FileStore};
pub use memory::MemoryStore;

/// All entries of a store, keyed by cache key.
pub type Entries = BTreeMap<String, CacheEntry>;

/// A cached value and its expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The cached value.
    pub value: Value,
    /// Unix timestamp (seconds) at which the entry expires; `None` never expires.
    pub expires_at: Option<i64>,
}

impl CacheEntry {
    /// Returns true once `now` has reached the expiry.
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Storage behind a [`CredentialCache`].
///
/// Implementations give `update` exclusive access to the full entry map for the duration of
/// the call and persist the map afterwards if the callback reports a change.
pub trait CacheStore: fmt::Debug + Send + Sync {
    /// Runs `f` with exclusive access to the entries.
    ///
    /// `f` returns true if it modified the map.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the store cannot be locked or written.
    fn update(&self, f: &mut dyn FnMut(&mut Entries) -> bool) -> Result<()>;
}

/// TTL cache with lazy eviction.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use mpesa_bridge::{
///     cache::{CredentialCache, MemoryStore},
///     clock::ManualClock,
/// };
/// use serde_json::json;
///
/// let clock = Arc::new(ManualClock::from_timestamp(1_700_000_000));
/// let cache = CredentialCache::new(Arc::new(MemoryStore::new()), clock.clone());
///
/// cache.put("token", json!("abc"), Some(60)).unwrap();
/// assert_eq!(cache.get("token").unwrap(), Some(json!("abc")));
///
/// clock.advance_secs(61);
/// assert_eq!(cache.get("token").unwrap(), None);
/// ```
#[derive(Debug, Clone)]
pub struct CredentialCache {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
}

impl Default for CredentialCache {
    fn default() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(SystemClock))
    }
}

impl CredentialCache {
    /// Creates a cache over `store`, reading time from `clock`.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Returns the value for `key`, or `None` if absent or expired.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the store cannot be accessed.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        let now = self.clock.unix_timestamp();
        let mut found = None;
        self.store.update(&mut |entries| {
            let purged = purge(entries, now);
            found = entries.get(key).map(|entry| entry.value.clone());
            purged
        })?;
        debug!(key, hit = found.is_some(), "cache lookup");
        Ok(found)
    }

    /// Returns the value for `key`, or `default`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the store cannot be accessed.
    pub fn get_or(&self, key: &str, default: Value) -> Result<Value> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// Stores `value` under `key` for `ttl_secs` seconds, or forever when `None`.
    ///
    /// A TTL of zero stores an entry that is already expired.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the store cannot be written.
    pub fn put(&self, key: &str, value: Value, ttl_secs: Option<u64>) -> Result<()> {
        let now = self.clock.unix_timestamp();
        let expires_at =
            ttl_secs.map(|ttl| now.saturating_add(i64::try_from(ttl).unwrap_or(i64::MAX)));
        let mut entry = Some(CacheEntry { value, expires_at });
        self.store.update(&mut |entries| {
            purge(entries, now);
            if let Some(entry) = entry.take() {
                entries.insert(key.to_owned(), entry);
            }
            true
        })
    }

    /// Returns true if `key` holds an unexpired value.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the store cannot be accessed.
    pub fn has(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Removes `key`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the store cannot be written.
    pub fn forget(&self, key: &str) -> Result<()> {
        let now = self.clock.unix_timestamp();
        self.store.update(&mut |entries| {
            let purged = purge(entries, now);
            entries.remove(key).is_some() || purged
        })
    }

    /// Removes every entry.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the store cannot be written.
    pub fn clear(&self) -> Result<()> {
        self.store.update(&mut |entries| {
            let changed = !entries.is_empty();
            entries.clear();
            changed
        })
    }
}

/// Drops expired entries, returning true if any were removed.
fn purge(entries: &mut Entries, now: i64) -> bool {
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_expired(now));
    entries.len() != before
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::clock::ManualClock;

    fn cache() -> (CredentialCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::from_timestamp(1_000));
        (CredentialCache::new(Arc::new(MemoryStore::new()), clock.clone()), clock)
    }

    #[test]
    fn test_put_then_get() {
        let (cache, _) = cache();
        cache.put("k", json!("v"), Some(10)).unwrap();
        assert_eq!(cache.get("k").unwrap(), Some(json!("v")));
        assert!(cache.has("k").unwrap());
    }

    #[test]
    fn test_expiry_is_lazy_and_exact() {
        let (cache, clock) = cache();
        cache.put("k", json!("v"), Some(10)).unwrap();

        clock.advance_secs(9);
        assert!(cache.has("k").unwrap());

        clock.advance_secs(1);
        assert_eq!(cache.get("k").unwrap(), None);
        assert_eq!(cache.get_or("k", json!("default")).unwrap(), json!("default"));
    }

    #[test]
    fn test_no_ttl_never_expires() {
        let (cache, clock) = cache();
        cache.put("k", json!(1), None).unwrap();
        clock.advance_secs(10_000_000);
        assert_eq!(cache.get("k").unwrap(), Some(json!(1)));
    }

    #[test]
    fn test_zero_ttl_is_expired() {
        let (cache, _) = cache();
        cache.put("k", json!(1), Some(0)).unwrap();
        assert!(!cache.has("k").unwrap());
    }

    #[test]
    fn test_forget_and_clear() {
        let (cache, _) = cache();
        cache.put("a", json!(1), None).unwrap();
        cache.put("b", json!(2), None).unwrap();

        cache.forget("a").unwrap();
        assert!(!cache.has("a").unwrap());
        assert!(cache.has("b").unwrap());

        cache.clear().unwrap();
        assert!(!cache.has("b").unwrap());
    }

    #[test]
    fn test_expired_entries_purged_on_write() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::from_timestamp(0));
        let cache = CredentialCache::new(store.clone(), clock.clone());

        cache.put("old", json!(1), Some(5)).unwrap();
        clock.advance_secs(5);
        cache.put("new", json!(2), None).unwrap();

        assert_eq!(store.snapshot().keys().collect::<Vec<_>>(), ["new"]);
    }

    #[test]
    fn test_entry_expiry_boundary() {
        let entry = CacheEntry { value: json!(1), expires_at: Some(100) };
        assert!(!entry.is_expired(99));
        assert!(entry.is_expired(100));
        assert!(!CacheEntry { value: json!(1), expires_at: None }.is_expired(i64::MAX));
    }
}
