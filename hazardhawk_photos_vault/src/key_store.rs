//! Content keys persisted as credential vault records
//!
//! Records:
//! ```text
//! content-key.<key_id>             JSON key record (base64 key bytes)
//! content-key.active.<purpose>     key id of the active key for a purpose
//! ```
//!
//! Records live outside the secret namespace, so listing or clearing user
//! secrets never touches them. Keys are resolved by id on every operation,
//! so payloads stay decryptable across restarts and rotations.

use std::collections::HashMap;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use hazardhawk_keyvault::CredentialVault;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use zeroize::Zeroizing;

use crate::crypto::{ContentKey, KeyHandle, KeyPurpose};
use crate::error::{EngineError, EngineResult};

const KEY_PREFIX: &str = "content-key.";
const ACTIVE_PREFIX: &str = "content-key.active.";
const RECORD_VERSION: u8 = 1;

pub(crate) fn key_record(key_id: &str) -> String {
    format!("{}{}", KEY_PREFIX, key_id)
}

fn active_record(purpose: KeyPurpose) -> String {
    format!("{}{}", ACTIVE_PREFIX, purpose.as_str())
}

/// Key ids come from payloads read off disk, so only uuid-shaped ids are accepted
fn validate_key_id(key_id: &str) -> EngineResult<()> {
    let well_formed = !key_id.is_empty()
        && key_id.len() <= 64
        && key_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if well_formed {
        Ok(())
    } else {
        Err(EngineError::Format(format!("malformed key id: {:?}", key_id)))
    }
}

#[derive(Serialize, Deserialize)]
struct KeyRecord {
    version: u8,
    key_id: String,
    purpose: KeyPurpose,
    created_at: DateTime<Utc>,
    /// Base64 key bytes
    key: Zeroizing<String>,
}

pub struct ContentKeyStore {
    vault: Arc<CredentialVault>,
    /// Serialises active-key changes; `active` is only written while held
    active_lock: Mutex<()>,
    /// Active key handles by purpose; ids only, never key material
    active: RwLock<HashMap<KeyPurpose, KeyHandle>>,
}

impl ContentKeyStore {
    pub fn new(vault: Arc<CredentialVault>) -> Self {
        Self {
            vault,
            active_lock: Mutex::new(()),
            active: RwLock::new(HashMap::new()),
        }
    }

    pub fn vault(&self) -> &Arc<CredentialVault> {
        &self.vault
    }

    /// Generates and persists a new key; it does not become active
    pub async fn create_key(&self, purpose: KeyPurpose) -> EngineResult<KeyHandle> {
        let key = ContentKey::generate()?;
        let handle = KeyHandle {
            key_id: uuid::Uuid::new_v4().to_string(),
            purpose,
            created_at: Utc::now(),
        };

        let record = KeyRecord {
            version: RECORD_VERSION,
            key_id: handle.key_id.clone(),
            purpose,
            created_at: handle.created_at,
            key: Zeroizing::new(BASE64.encode(key.expose())),
        };
        let json = Zeroizing::new(serde_json::to_vec(&record)?);
        self.vault
            .put_record(&key_record(&handle.key_id), &json)
            .await?;

        log::info!("Created content key {} ({})", handle.key_id, purpose.as_str());
        Ok(handle)
    }

    async fn load_record(&self, key_id: &str) -> EngineResult<KeyRecord> {
        validate_key_id(key_id)?;
        let json = self
            .vault
            .get_record(&key_record(key_id))
            .await?
            .ok_or_else(|| EngineError::KeyNotFound(key_id.to_string()))?;

        let record: KeyRecord = serde_json::from_slice(&json)
            .map_err(|e| EngineError::Format(format!("content key record: {}", e)))?;

        if record.version != RECORD_VERSION || record.key_id != key_id {
            return Err(EngineError::Format(format!(
                "content key record for {} is inconsistent",
                key_id
            )));
        }
        Ok(record)
    }

    /// Loads key material by id; the returned key wipes itself on drop
    pub async fn load_key(&self, key_id: &str) -> EngineResult<(ContentKey, KeyPurpose)> {
        let record = self.load_record(key_id).await?;
        let raw = Zeroizing::new(BASE64.decode(record.key.as_str())?);
        Ok((ContentKey::from_slice(&raw)?, record.purpose))
    }

    pub async fn load_handle(&self, key_id: &str) -> EngineResult<KeyHandle> {
        let record = self.load_record(key_id).await?;
        Ok(KeyHandle {
            key_id: record.key_id.clone(),
            purpose: record.purpose,
            created_at: record.created_at,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ACTIVE KEYS
    // ═══════════════════════════════════════════════════════════════════════

    /// Key id the persisted pointer names for `purpose`
    pub async fn stored_active_key_id(&self, purpose: KeyPurpose) -> EngineResult<Option<String>> {
        match self.vault.get_record(&active_record(purpose)).await? {
            Some(bytes) => std::str::from_utf8(&bytes)
                .map(|id| Some(id.to_string()))
                .map_err(|_| EngineError::Format("active key pointer is not UTF-8".into())),
            None => Ok(None),
        }
    }

    pub fn cached_active(&self, purpose: KeyPurpose) -> Option<KeyHandle> {
        self.active.read().get(&purpose).cloned()
    }

    /// Purposes with a resolved active key
    pub fn active_count(&self) -> usize {
        self.active.read().len()
    }

    pub async fn active_key_id(&self, purpose: KeyPurpose) -> EngineResult<Option<String>> {
        match self.cached_active(purpose) {
            Some(handle) => Ok(Some(handle.key_id)),
            None => self.stored_active_key_id(purpose).await,
        }
    }

    /// Resolves the persisted pointers into the cache
    ///
    /// A pointer to a missing key is left alone; [`Self::ensure_active`]
    /// replaces it on first use.
    pub async fn load_active(&self) -> EngineResult<()> {
        let _guard = self.active_lock.lock().await;
        for purpose in KeyPurpose::ALL {
            let Some(key_id) = self.stored_active_key_id(purpose).await? else {
                continue;
            };
            match self.load_handle(&key_id).await {
                Ok(handle) => {
                    self.active.write().insert(purpose, handle);
                }
                Err(EngineError::KeyNotFound(_)) => {
                    log::warn!("Active {} key {} is missing", purpose.as_str(), key_id);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Active key for `purpose`, created on first use
    pub async fn ensure_active(&self, purpose: KeyPurpose) -> EngineResult<KeyHandle> {
        if let Some(handle) = self.cached_active(purpose) {
            return Ok(handle);
        }

        let _guard = self.active_lock.lock().await;
        if let Some(handle) = self.cached_active(purpose) {
            return Ok(handle);
        }

        if let Some(key_id) = self.stored_active_key_id(purpose).await? {
            match self.load_handle(&key_id).await {
                Ok(handle) => {
                    self.active.write().insert(purpose, handle.clone());
                    return Ok(handle);
                }
                Err(EngineError::KeyNotFound(_)) => {
                    log::warn!(
                        "Active {} key {} is missing, creating a replacement",
                        purpose.as_str(),
                        key_id
                    );
                }
                Err(e) => return Err(e),
            }
        }

        self.activate_new(purpose).await
    }

    /// Makes a fresh key active for `purpose`
    ///
    /// With `expected_current`, nothing happens when another caller already
    /// replaced that key; the current active key is returned instead.
    pub async fn rotate_active(
        &self,
        purpose: KeyPurpose,
        expected_current: Option<&str>,
    ) -> EngineResult<KeyHandle> {
        let _guard = self.active_lock.lock().await;
        if let Some(expected) = expected_current {
            if let Some(current) = self.stored_active_key_id(purpose).await? {
                if current != expected {
                    let handle = self.load_handle(&current).await?;
                    self.active.write().insert(purpose, handle.clone());
                    return Ok(handle);
                }
            }
        }

        self.activate_new(purpose).await
    }

    /// Drops the cached handle when it still names `key_id`
    pub async fn forget_active(&self, purpose: KeyPurpose, key_id: &str) {
        let _guard = self.active_lock.lock().await;
        let mut active = self.active.write();
        if active.get(&purpose).is_some_and(|h| h.key_id == key_id) {
            active.remove(&purpose);
        }
    }

    /// Caller holds `active_lock`
    async fn activate_new(&self, purpose: KeyPurpose) -> EngineResult<KeyHandle> {
        let handle = self.create_key(purpose).await?;
        self.vault
            .put_record(&active_record(purpose), handle.key_id.as_bytes())
            .await?;
        self.active.write().insert(purpose, handle.clone());
        Ok(handle)
    }

    pub async fn delete_key(&self, key_id: &str) -> EngineResult<()> {
        validate_key_id(key_id)?;
        self.vault.remove_record(&key_record(key_id)).await?;
        Ok(())
    }
}
