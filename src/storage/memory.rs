use async_trait::async_trait;
use dashmap::DashMap;
use super::traits::{KeyValueStore, StorageError};

/// Process-local store. Survives engine restarts within one process, which
/// is enough for embedding and tests; use [`super::FileStore`] across processes.
pub struct InMemoryStore {
    data: DashMap<String, Vec<u8>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Get current key count
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Clear all keys
    pub fn clear(&self) {
        self.data.clear();
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.data.get(key).map(|r| r.value().clone()))
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.data.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.data.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.data.contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_store_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = InMemoryStore::new();

        store.put("events", b"[1,2,3]").await.unwrap();

        let result = store.get("events").await.unwrap();
        assert_eq!(result.as_deref(), Some(&b"[1,2,3]"[..]));
    }

    #[tokio::test]
    async fn test_get_nonexistent_returns_none() {
        let store = InMemoryStore::new();

        let result = store.get("nonexistent").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemoryStore::new();

        store.put("to-delete", b"x").await.unwrap();
        assert_eq!(store.len(), 1);

        store.delete("to-delete").await.unwrap();
        assert_eq!(store.len(), 0);
        assert!(!store.exists("to-delete").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_nonexistent_is_ok() {
        let store = InMemoryStore::new();

        // Should not error
        let result = store.delete("nonexistent").await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = InMemoryStore::new();

        store.put("same-key", b"v1").await.unwrap();
        store.put("same-key", b"v2").await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("same-key").await.unwrap().unwrap(), b"v2");
    }

    #[tokio::test]
    async fn test_clear() {
        let store = InMemoryStore::new();

        for i in 0..10 {
            store.put(&format!("key-{}", i), b"v").await.unwrap();
        }
        assert_eq!(store.len(), 10);

        store.clear();

        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        use std::sync::Arc;

        let store = Arc::new(InMemoryStore::new());
        let mut handles = vec![];

        // Spawn 10 tasks that each write 10 keys
        for batch in 0..10 {
            let store_clone = store.clone();
            let handle = tokio::spawn(async move {
                for i in 0..10 {
                    let key = format!("batch-{}-key-{}", batch, i);
                    store_clone.put(&key, b"v").await.unwrap();
                }
            });
            handles.push(handle);
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.len(), 100);
    }
}
