//! In-memory slot storage for tests and ephemeral sessions

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::SlotStorage;
use crate::crypto::secure_memory::wipe;
use crate::error::Result;

#[derive(Default)]
pub struct MemorySlotStorage {
    slots: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemorySlotStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SlotStorage for MemorySlotStorage {
    async fn read(&self, slot: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.slots.read().get(slot).cloned())
    }

    async fn write(&self, slot: &str, data: &[u8]) -> Result<()> {
        let previous = self.slots.write().insert(slot.to_string(), data.to_vec());
        if let Some(mut old) = previous {
            wipe(&mut old);
        }
        Ok(())
    }

    async fn delete(&self, slot: &str) -> Result<()> {
        if let Some(mut old) = self.slots.write().remove(slot) {
            wipe(&mut old);
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.slots.read().keys().cloned().collect())
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

impl Drop for MemorySlotStorage {
    fn drop(&mut self) {
        for data in self.slots.get_mut().values_mut() {
            wipe(data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_roundtrip() {
        let storage = MemorySlotStorage::new();
        storage.write("a", b"one").await.unwrap();
        storage.write("a", b"two").await.unwrap();

        assert_eq!(storage.read("a").await.unwrap().as_deref(), Some(&b"two"[..]));
        assert_eq!(storage.list().await.unwrap(), vec!["a".to_string()]);

        storage.delete("a").await.unwrap();
        storage.delete("a").await.unwrap();
        assert!(storage.read("a").await.unwrap().is_none());
    }
}
