/*!
In-memory storage backend.
*/

use super::{SlotInfo, StorageBackend};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, PoisonError, RwLock};

/// Memory-based storage backend
///
/// Slots live in a shared map, so clones of a `MemoryStorage` see the same data.
/// Useful for tests and for ephemeral state that should not touch the filesystem.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    slots: Arc<RwLock<HashMap<String, (Bytes, DateTime<Utc>)>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current content of a slot without going through the async API
    pub fn contents(&self, slot: &str) -> Option<Bytes> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(slot)
            .map(|(data, _)| data.clone())
    }

    /// Put raw bytes into a slot directly, bypassing the engine
    pub fn insert_raw(&self, slot: &str, data: impl Into<Bytes>) {
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(slot.to_string(), (data.into(), Utc::now()));
    }

    pub fn len(&self) -> usize {
        self.slots.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn read(&self, slot: &str) -> io::Result<Option<Bytes>> {
        Ok(self.contents(slot))
    }

    async fn write(&self, slot: &str, data: Bytes) -> io::Result<()> {
        self.insert_raw(slot, data);
        Ok(())
    }

    async fn delete(&self, slot: &str) -> io::Result<()> {
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(slot);
        Ok(())
    }

    async fn exists(&self, slot: &str) -> io::Result<bool> {
        Ok(self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(slot))
    }

    async fn list(&self) -> io::Result<Vec<SlotInfo>> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        let mut infos: Vec<SlotInfo> = slots
            .iter()
            .map(|(name, (data, modified))| SlotInfo {
                name: name.clone(),
                size: data.len() as u64,
                modified: Some(*modified),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_storage_basic_operations() {
        let storage = MemoryStorage::new();

        assert_eq!(storage.read("a.dat").await.unwrap(), None);
        storage.write("a.dat", Bytes::from_static(b"abc")).await.unwrap();
        assert!(storage.exists("a.dat").await.unwrap());
        assert_eq!(storage.read("a.dat").await.unwrap().unwrap(), &b"abc"[..]);

        storage.truncate("a.dat").await.unwrap();
        assert!(storage.exists("a.dat").await.unwrap());
        assert!(storage.read("a.dat").await.unwrap().unwrap().is_empty());

        storage.delete("a.dat").await.unwrap();
        storage.delete("a.dat").await.unwrap();
        assert!(!storage.exists("a.dat").await.unwrap());
    }

    #[tokio::test]
    async fn test_clones_share_data_and_list_sorted() {
        let storage = MemoryStorage::new();
        let other = storage.clone();
        storage.insert_raw("b.dat", &b"22"[..]);
        other.insert_raw("a.dat", &b"1"[..]);

        let names: Vec<_> = storage
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|info| (info.name, info.size))
            .collect();
        assert_eq!(names, vec![("a.dat".to_string(), 1), ("b.dat".to_string(), 2)]);
        assert_eq!(other.len(), 2);
    }
}
