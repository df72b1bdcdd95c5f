//! File-backed slot storage
//!
//! Each slot is one file named by the hex encoding of the slot name, so any
//! slot name is a safe file name. Writes go to a temp file first and are
//! renamed into place. Files are created with mode `0600` on Unix.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::SlotStorage;
use crate::error::{KeyVaultError, Result};

const SLOT_EXT: &str = "slot";
const TEMP_EXT: &str = "tmp";

pub struct FileSlotStorage {
    root: PathBuf,
}

impl FileSlotStorage {
    /// Opens (creating if needed) a storage directory with `0700` permissions
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| storage_err("create vault directory", &root, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            tokio::fs::set_permissions(&root, perms)
                .await
                .map_err(|e| storage_err("restrict vault directory", &root, e))?;
        }

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn slot_path(&self, slot: &str) -> PathBuf {
        self.root
            .join(format!("{}.{}", hex::encode(slot.as_bytes()), SLOT_EXT))
    }

    fn slot_name(path: &Path) -> Option<String> {
        if path.extension()? != SLOT_EXT {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let bytes = hex::decode(stem).ok()?;
        String::from_utf8(bytes).ok()
    }
}

fn storage_err(action: &str, path: &Path, e: std::io::Error) -> KeyVaultError {
    KeyVaultError::Storage(format!("{} ({}): {}", action, path.display(), e))
}

#[async_trait]
impl SlotStorage for FileSlotStorage {
    async fn read(&self, slot: &str) -> Result<Option<Vec<u8>>> {
        let path = self.slot_path(slot);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_err("read slot", &path, e)),
        }
    }

    async fn write(&self, slot: &str, data: &[u8]) -> Result<()> {
        let path = self.slot_path(slot);
        // Unique temp name so concurrent writers never share one.
        let temp_path = path.with_extension(format!("{:016x}.{}", rand::random::<u64>(), TEMP_EXT));

        tokio::fs::write(&temp_path, data)
            .await
            .map_err(|e| storage_err("write slot", &temp_path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&temp_path, perms)
                .await
                .map_err(|e| storage_err("restrict slot", &temp_path, e))?;
        }

        tokio::fs::rename(&temp_path, &path)
            .await
            .map_err(|e| storage_err("commit slot", &path, e))?;

        debug!(path = %path.display(), bytes = data.len(), "slot written");
        Ok(())
    }

    async fn delete(&self, slot: &str) -> Result<()> {
        let path = self.slot_path(slot);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_err("delete slot", &path, e)),
        }
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| storage_err("list vault directory", &self.root, e))?;

        let mut slots = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| storage_err("list vault directory", &self.root, e))?
        {
            match Self::slot_name(&entry.path()) {
                Some(name) => slots.push(name),
                None => warn!(path = %entry.path().display(), "ignoring foreign file in vault directory"),
            }
        }

        Ok(slots)
    }

    async fn is_healthy(&self) -> bool {
        tokio::fs::metadata(&self.root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_slot_roundtrip() {
        let dir = tempdir().unwrap();
        let storage = FileSlotStorage::open(dir.path()).await.unwrap();

        storage.write("api_key#meta", b"sealed").await.unwrap();
        assert_eq!(
            storage.read("api_key#meta").await.unwrap().as_deref(),
            Some(&b"sealed"[..])
        );
        assert_eq!(storage.list().await.unwrap(), vec!["api_key#meta".to_string()]);

        storage.delete("api_key#meta").await.unwrap();
        assert!(storage.read("api_key#meta").await.unwrap().is_none());
        storage.delete("api_key#meta").await.unwrap();
    }

    #[tokio::test]
    async fn test_slot_names_with_path_characters_are_safe() {
        let dir = tempdir().unwrap();
        let storage = FileSlotStorage::open(dir.path()).await.unwrap();

        storage.write("../escape/attempt", b"x").await.unwrap();
        assert!(storage.slot_path("../escape/attempt").starts_with(dir.path()));
        assert_eq!(storage.list().await.unwrap(), vec!["../escape/attempt".to_string()]);
    }

    #[tokio::test]
    async fn test_reopen_sees_existing_slots() {
        let dir = tempdir().unwrap();
        {
            let storage = FileSlotStorage::open(dir.path()).await.unwrap();
            storage.write("persisted", b"1").await.unwrap();
        }
        let storage = FileSlotStorage::open(dir.path()).await.unwrap();
        assert!(storage.is_healthy().await);
        assert!(storage.read("persisted").await.unwrap().is_some());
    }
}
