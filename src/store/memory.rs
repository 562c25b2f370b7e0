//! In-memory session storage.

use super::{SessionStore, StoreKey};
use crate::error::SessionError;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::instrument;

/// In-memory session storage.
///
/// Uses `Arc<RwLock<HashMap>>` for thread-safe access. Useful for
/// testing and ephemeral sessions that should not outlive the process.
/// The store is Clone and can be shared across the application.
#[derive(Debug, Clone)]
pub struct MemorySessionStore {
    inner: Arc<RwLock<HashMap<StoreKey, String>>>,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySessionStore {
    /// Create a new empty MemorySessionStore.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get the number of occupied entries.
    pub fn len(&self) -> usize {
        self.inner.read().expect("lock poisoned").len()
    }

    /// Check if storage is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().expect("lock poisoned").is_empty()
    }

    /// Clear all stored entries.
    pub fn clear(&self) {
        self.inner.write().expect("lock poisoned").clear();
    }
}

impl SessionStore for MemorySessionStore {
    #[instrument(skip(self))]
    fn get(&self, key: StoreKey) -> Result<Option<String>, SessionError> {
        let guard = self.inner.read().expect("lock poisoned");
        Ok(guard.get(&key).cloned())
    }

    #[instrument(skip(self, value))]
    fn put(&self, key: StoreKey, value: &str) -> Result<(), SessionError> {
        let mut guard = self.inner.write().expect("lock poisoned");
        guard.insert(key, value.to_string());
        Ok(())
    }

    #[instrument(skip(self))]
    fn remove(&self, key: StoreKey) -> Result<(), SessionError> {
        let mut guard = self.inner.write().expect("lock poisoned");
        guard.remove(&key);
        Ok(())
    }

    /// One critical section, so racing takers cannot both see the value.
    #[instrument(skip(self))]
    fn take(&self, key: StoreKey) -> Result<Option<String>, SessionError> {
        let mut guard = self.inner.write().expect("lock poisoned");
        Ok(guard.remove(&key))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_new_is_empty() {
        let store = MemorySessionStore::new();
        assert!(store.get(StoreKey::Tokens).unwrap().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_memory_put_and_get() {
        let store = MemorySessionStore::new();
        store.put(StoreKey::Verifier, "abc123").unwrap();
        assert_eq!(store.get(StoreKey::Verifier).unwrap().as_deref(), Some("abc123"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_memory_remove() {
        let store = MemorySessionStore::new();
        store.put(StoreKey::State, "s").unwrap();
        store.remove(StoreKey::State).unwrap();
        assert!(store.get(StoreKey::State).unwrap().is_none());
        // Removing again is fine.
        store.remove(StoreKey::State).unwrap();
    }

    #[test]
    fn test_memory_clones_share_state() {
        let store = MemorySessionStore::new();
        let clone = store.clone();
        store.put(StoreKey::RedirectPath, "/tables").unwrap();
        assert_eq!(
            clone.get(StoreKey::RedirectPath).unwrap().as_deref(),
            Some("/tables")
        );
    }

    #[test]
    fn test_memory_clear() {
        let store = MemorySessionStore::new();
        for key in StoreKey::ALL {
            store.put(key, "x").unwrap();
        }
        assert_eq!(store.len(), 4);
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_memory_concurrent_takes_yield_one_value() {
        let store = MemorySessionStore::new();
        store.put(StoreKey::State, "s").unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.take(StoreKey::State).unwrap())
            })
            .collect();
        let taken: Vec<Option<String>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(taken.iter().flatten().count(), 1);
        assert!(store.is_empty());
    }
}
