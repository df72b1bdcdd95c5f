//! Master key protection paths
//!
//! The vault master key is guarded by a [`KeyProtector`]. Two paths exist:
//!
//! - [`KeychainProtector`]: the OS keychain holds the key (hardware-backed
//!   where the platform supports it).
//! - [`SoftwareProtector`]: the key is wrapped with AES-256-GCM under an
//!   Argon2id KEK derived from device binding material, and the wrapped
//!   record lives in a vault bookkeeping slot.

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretBox, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::crypto::{
    derive_kek, fill_random, generate_salt, unwrap_key, wrap_key, Argon2Config, SealedBlob,
    SecretKey,
};
use crate::error::{KeyVaultError, Result};
use crate::storage::SlotStorage;

/// Bookkeeping slot holding the software-wrapped master key
pub const MASTER_SLOT: &str = "#master";

const MASTER_AAD: &[u8] = b"HAZARDHAWK:vault:master:v1";

/// Which path protects the master key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionPath {
    HardwareBacked,
    Software,
}

impl ProtectionPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HardwareBacked => "hardware_backed",
            Self::Software => "software",
        }
    }
}

/// Guards the vault master key
#[async_trait]
pub trait KeyProtector: Send + Sync {
    fn path(&self) -> ProtectionPath;

    /// Returns the master key, creating and protecting a fresh one on first use
    async fn load_or_create_master_key(&self) -> Result<SecretKey>;

    /// Removes the protected master key; everything sealed under it is lost
    async fn destroy_master_key(&self) -> Result<()>;
}

fn generate_master_key() -> Result<SecretKey> {
    let mut key = Box::new([0u8; 32]);
    fill_random(key.as_mut())?;
    Ok(SecretBox::new(key))
}

// ═══════════════════════════════════════════════════════════════════════════
// Keychain (hardware-backed) path
// ═══════════════════════════════════════════════════════════════════════════

/// Master key held by the OS keychain
pub struct KeychainProtector {
    service: String,
    account: String,
}

impl KeychainProtector {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }
}

#[cfg(target_os = "macos")]
impl KeychainProtector {
    fn read_key(&self) -> Result<Option<SecretKey>> {
        use security_framework::passwords::get_generic_password;

        match get_generic_password(&self.service, &self.account) {
            Ok(data) => {
                let mut raw = hex::decode(&data).map_err(|e| {
                    KeyVaultError::Format(format!("keychain data is not valid hex: {}", e))
                })?;
                if raw.len() != 32 {
                    crate::crypto::wipe(&mut raw);
                    return Err(KeyVaultError::Format(format!(
                        "keychain key has wrong length: {} (expected 32)",
                        raw.len()
                    )));
                }
                let mut key = Box::new([0u8; 32]);
                key.copy_from_slice(&raw);
                crate::crypto::wipe(&mut raw);
                Ok(Some(SecretBox::new(key)))
            }
            Err(e) => {
                // errSecItemNotFound is the expected "not stored yet" case.
                let msg = e.to_string();
                if msg.contains("not found") || msg.contains("-25300") {
                    Ok(None)
                } else {
                    Err(KeyVaultError::Storage(format!("keychain read failed: {}", e)))
                }
            }
        }
    }

    fn write_key(&self, key: &SecretKey) -> Result<()> {
        use security_framework::passwords::set_generic_password;

        let mut hex_key = hex::encode(key.expose_secret());
        let result = set_generic_password(&self.service, &self.account, hex_key.as_bytes())
            .map_err(|e| KeyVaultError::Storage(format!("keychain write failed: {}", e)));
        crate::crypto::secure_memory::wipe_string(&mut hex_key);
        result
    }

    fn delete_key(&self) -> Result<()> {
        use security_framework::passwords::delete_generic_password;

        match delete_generic_password(&self.service, &self.account) {
            Ok(()) => Ok(()),
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("not found") || msg.contains("-25300") {
                    Ok(())
                } else {
                    Err(KeyVaultError::Storage(format!("keychain delete failed: {}", e)))
                }
            }
        }
    }
}

#[cfg(not(target_os = "macos"))]
impl KeychainProtector {
    fn read_key(&self) -> Result<Option<SecretKey>> {
        Err(self.unsupported())
    }

    fn write_key(&self, _key: &SecretKey) -> Result<()> {
        Err(self.unsupported())
    }

    fn delete_key(&self) -> Result<()> {
        Err(self.unsupported())
    }

    fn unsupported(&self) -> KeyVaultError {
        KeyVaultError::Unavailable(format!(
            "no supported keychain on {} for service '{}'",
            std::env::consts::OS,
            self.service
        ))
    }
}

#[async_trait]
impl KeyProtector for KeychainProtector {
    fn path(&self) -> ProtectionPath {
        ProtectionPath::HardwareBacked
    }

    async fn load_or_create_master_key(&self) -> Result<SecretKey> {
        if let Some(key) = self.read_key()? {
            debug!(service = %self.service, "master key loaded from keychain");
            return Ok(key);
        }

        let key = generate_master_key()?;
        self.write_key(&key)?;
        info!(service = %self.service, "new master key stored in keychain");
        Ok(key)
    }

    async fn destroy_master_key(&self) -> Result<()> {
        self.delete_key()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Software path
// ═══════════════════════════════════════════════════════════════════════════

/// Persisted form of the software-wrapped master key
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WrappedMasterKey {
    version: u8,
    /// Base64 Argon2 salt
    salt: String,
    kdf: Argon2Config,
    wrapped: SealedBlob,
    created_at: DateTime<Utc>,
}

/// Master key wrapped under an Argon2id KEK
pub struct SoftwareProtector {
    storage: Arc<dyn SlotStorage>,
    binding: SecretString,
    kdf: Argon2Config,
}

impl SoftwareProtector {
    pub fn new(storage: Arc<dyn SlotStorage>, binding: SecretString, kdf: Argon2Config) -> Self {
        Self {
            storage,
            binding,
            kdf,
        }
    }

    /// Binds the KEK to this host, plus an optional application passphrase
    pub fn device_bound(
        storage: Arc<dyn SlotStorage>,
        passphrase: Option<SecretString>,
        kdf: Argon2Config,
    ) -> Self {
        let host = sysinfo::System::host_name().unwrap_or_else(|| "hazardhawk-device".into());
        let binding = match passphrase {
            Some(p) => format!("{}:{}", host, p.expose_secret()),
            None => host,
        };
        Self::new(storage, SecretString::from(binding), kdf)
    }

    async fn create(&self) -> Result<SecretKey> {
        let master = generate_master_key()?;
        let salt = generate_salt()?;
        let kek = derive_kek(&self.binding, &salt, &self.kdf)?;

        let record = WrappedMasterKey {
            version: 1,
            salt: BASE64.encode(salt),
            kdf: self.kdf.clone(),
            wrapped: wrap_key(&master, &kek, MASTER_AAD)?,
            created_at: Utc::now(),
        };

        self.storage
            .write(MASTER_SLOT, &serde_json::to_vec(&record)?)
            .await?;
        info!("new software-protected master key created");
        Ok(master)
    }
}

#[async_trait]
impl KeyProtector for SoftwareProtector {
    fn path(&self) -> ProtectionPath {
        ProtectionPath::Software
    }

    async fn load_or_create_master_key(&self) -> Result<SecretKey> {
        let Some(data) = self.storage.read(MASTER_SLOT).await? else {
            return self.create().await;
        };

        let record: WrappedMasterKey = serde_json::from_slice(&data)
            .map_err(|e| KeyVaultError::Format(format!("wrapped master key: {}", e)))?;
        if record.version != 1 {
            return Err(KeyVaultError::Format(format!(
                "unsupported master key record version {}",
                record.version
            )));
        }

        let salt = BASE64.decode(&record.salt)?;
        // The stored parameters win so a config change never locks the vault.
        let kek = derive_kek(&self.binding, &salt, &record.kdf)?;
        let master = unwrap_key(&record.wrapped, &kek, MASTER_AAD)?;
        debug!("software-protected master key unwrapped");
        Ok(master)
    }

    async fn destroy_master_key(&self) -> Result<()> {
        self.storage.delete(MASTER_SLOT).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemorySlotStorage;

    fn protector(storage: Arc<dyn SlotStorage>, binding: &str) -> SoftwareProtector {
        SoftwareProtector::new(
            storage,
            SecretString::from(binding.to_string()),
            Argon2Config::insecure_fast(),
        )
    }

    #[tokio::test]
    async fn test_software_master_key_is_stable() {
        let storage: Arc<dyn SlotStorage> = Arc::new(MemorySlotStorage::new());

        let first = protector(storage.clone(), "device-1")
            .load_or_create_master_key()
            .await
            .unwrap();
        let second = protector(storage.clone(), "device-1")
            .load_or_create_master_key()
            .await
            .unwrap();

        assert_eq!(first.expose_secret(), second.expose_secret());
    }

    #[tokio::test]
    async fn test_software_wrong_binding_fails() {
        let storage: Arc<dyn SlotStorage> = Arc::new(MemorySlotStorage::new());
        protector(storage.clone(), "device-1")
            .load_or_create_master_key()
            .await
            .unwrap();

        let err = protector(storage, "device-2")
            .load_or_create_master_key()
            .await
            .unwrap_err();
        assert!(matches!(err, KeyVaultError::Crypto(_)));
    }

    #[tokio::test]
    async fn test_destroy_then_recreate_yields_new_key() {
        let storage: Arc<dyn SlotStorage> = Arc::new(MemorySlotStorage::new());
        let p = protector(storage, "device-1");

        let first = p.load_or_create_master_key().await.unwrap();
        p.destroy_master_key().await.unwrap();
        let second = p.load_or_create_master_key().await.unwrap();

        assert_ne!(first.expose_secret(), second.expose_secret());
    }

    #[cfg(not(target_os = "macos"))]
    #[tokio::test]
    async fn test_keychain_unavailable_off_macos() {
        let p = KeychainProtector::new("hazardhawk-test", "master_key");
        assert!(matches!(
            p.load_or_create_master_key().await,
            Err(KeyVaultError::Unavailable(_))
        ));
    }
}
