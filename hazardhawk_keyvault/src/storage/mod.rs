//! Durable slot storage backing the vault
//!
//! A slot is one named, opaque byte blob. The vault only ever hands sealed
//! (encrypted) bytes to a backend, so backends need no crypto of their own.

mod file;
mod memory;

pub use file::FileSlotStorage;
pub use memory::MemorySlotStorage;

use async_trait::async_trait;

use crate::error::Result;

/// Async slot storage backend
#[async_trait]
pub trait SlotStorage: Send + Sync {
    /// Read a slot; `None` when it does not exist
    async fn read(&self, slot: &str) -> Result<Option<Vec<u8>>>;

    /// Create or overwrite a slot
    async fn write(&self, slot: &str, data: &[u8]) -> Result<()>;

    /// Delete a slot; deleting a missing slot succeeds
    async fn delete(&self, slot: &str) -> Result<()>;

    /// Names of all slots, in no particular order
    async fn list(&self) -> Result<Vec<String>>;

    /// Cheap health check
    async fn is_healthy(&self) -> bool;
}
