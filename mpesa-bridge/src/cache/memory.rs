//! In-process cache storage.

use std::sync::{Mutex, PoisonError};

use super::{CacheStore, Entries};
use crate::error::Result;

/// Mutex-guarded map private to this process.
///
/// Clones of a [`CredentialCache`](super::CredentialCache) built over the same `Arc` share
/// entries; separate processes do not. Use [`FileStore`](super::FileStore) to share tokens
/// across processes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<Entries>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the current entries, expired ones included.
    #[must_use]
    pub fn snapshot(&self) -> Entries {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl CacheStore for MemoryStore {
    fn update(&self, f: &mut dyn FnMut(&mut Entries) -> bool) -> Result<()> {
        // The map holds plain data, so a panic elsewhere cannot leave it half-updated.
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut entries);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::cache::CacheEntry;

    #[test]
    fn test_update_mutates_entries() {
        let store = MemoryStore::new();
        store
            .update(&mut |entries| {
                entries.insert("k".to_owned(), CacheEntry { value: json!(1), expires_at: None });
                true
            })
            .unwrap();
        assert_eq!(store.snapshot().len(), 1);
    }

    #[test]
    fn test_shared_across_threads() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = std::sync::Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .update(&mut |entries| {
                            entries.insert(
                                format!("k{i}"),
                                CacheEntry { value: json!(i), expires_at: None },
                            );
                            true
                        })
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.snapshot().len(), 8);
    }
}
