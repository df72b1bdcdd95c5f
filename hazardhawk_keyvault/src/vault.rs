//! Credential vault - encrypted key/value secret store with metadata and audit trail
//!
//! Layout in slot storage:
//!
//! ```text
//! <key>              sealed secret value
//! <key>#meta         sealed SecretMetadata (JSON)
//! #record.<name>     sealed bookkeeping record owned by a vault client
//! #audit             sealed audit head (retained sequence range)
//! #audit.<index>     sealed audit segment
//! #master            software-wrapped master key (software path only)
//! #protection        protection path record + key canary
//! ```
//!
//! Records hold state that clients keep next to their secrets, such as
//! content keys. They never show up in [`CredentialVault::list_keys`],
//! survive [`CredentialVault::clear_all`] and are read without touching
//! metadata or the audit trail.
//!
//! Every sealed slot uses XChaCha20-Poly1305 under an HKDF subkey of the
//! master key, with the slot name as associated data, so slots cannot be
//! swapped on disk without detection.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::audit::{
    segment_slot, AuditAction, AuditEvent, AuditExport, AuditHead, AuditSegment, AuditTrail,
    AuditWrite, AUDIT_SLOT,
};
use crate::capability::{
    CapabilityProvider, SecurityCapabilityDescriptor, SecurityLevel, SystemCapabilityProvider,
};
use crate::config::{VaultConfig, RESERVED_MARKER};
use crate::crypto::{
    derive_key_32, open, purposes, seal, wipe_with_passes, AeadCipher, Argon2Config, SealedBlob,
    SecretKey, SecureBuffer,
};
use crate::error::{KeyVaultError, Result};
use crate::protector::{KeyProtector, KeychainProtector, ProtectionPath, SoftwareProtector};
use crate::storage::{FileSlotStorage, MemorySlotStorage, SlotStorage};
use crate::types::SecretMetadata;

/// Bookkeeping slot pinning the protection path chosen at creation
pub const PROTECTION_SLOT: &str = "#protection";

const META_SUFFIX: &str = "#meta";
const RECORD_PREFIX: &str = "#record.";
const CANARY: &[u8] = b"HAZARDHAWK:vault:canary:v1";

fn meta_slot(key: &str) -> String {
    format!("{}{}", key, META_SUFFIX)
}

fn record_slot(name: &str) -> String {
    format!("{}{}", RECORD_PREFIX, name)
}

fn is_secret_slot(slot: &str) -> bool {
    !slot.contains(RESERVED_MARKER)
}

#[derive(Debug, Serialize, Deserialize)]
struct ProtectionRecord {
    version: u8,
    path: ProtectionPath,
    created_at: DateTime<Utc>,
    canary: SealedBlob,
}

enum KeyAccess {
    Ready {
        master: SecretKey,
        path: ProtectionPath,
    },
    Unavailable(String),
}

/// Trail plus segment work a failed append left behind
#[derive(Default)]
struct AuditState {
    trail: AuditTrail,
    unsynced: AuditWrite,
}

/// Point-in-time vault health summary
#[derive(Debug, Clone, Serialize)]
pub struct VaultStatus {
    pub available: bool,
    pub protection_path: Option<ProtectionPath>,
    pub security_level: SecurityLevel,
    pub secret_count: usize,
    pub audit_events: usize,
    pub unavailable_reason: Option<String>,
}

/// Durable encrypted secret store
pub struct CredentialVault {
    config: VaultConfig,
    storage: Arc<dyn SlotStorage>,
    access: KeyAccess,
    capability: SecurityCapabilityDescriptor,
    audit: Mutex<AuditState>,
    /// Serialises value + metadata updates so a secret and its shadow never diverge
    write_lock: Mutex<()>,
}

impl CredentialVault {
    // ═══════════════════════════════════════════════════════════════════════
    // CONSTRUCTION
    // ═══════════════════════════════════════════════════════════════════════

    /// Opens the on-disk vault at `config.vault_dir`
    ///
    /// Only directory creation can fail here. Key protection problems leave
    /// the vault in the unavailable state instead (see [`Self::is_available`]).
    pub async fn open(config: VaultConfig) -> Result<Self> {
        config.validate()?;
        let storage: Arc<dyn SlotStorage> =
            Arc::new(FileSlotStorage::open(&config.vault_dir).await?);

        let passphrase = std::env::var(&config.passphrase_env)
            .ok()
            .filter(|p| !p.is_empty())
            .map(SecretString::from);
        let software: Arc<dyn KeyProtector> = Arc::new(SoftwareProtector::device_bound(
            storage.clone(),
            passphrase,
            config.kdf.clone(),
        ));

        let account = keychain_account(&config.vault_dir.to_string_lossy());
        let hardware: Arc<dyn KeyProtector> = Arc::new(KeychainProtector::new(
            config.keychain_service.clone(),
            account,
        ));

        Ok(Self::with_components(
            config,
            storage,
            &SystemCapabilityProvider::new(),
            Some(hardware),
            software,
        )
        .await)
    }

    /// Ephemeral vault with software protection, for tests and dry runs
    pub async fn open_in_memory(config: VaultConfig) -> Self {
        let storage: Arc<dyn SlotStorage> = Arc::new(MemorySlotStorage::new());
        let kdf = Argon2Config::insecure_fast();
        let software: Arc<dyn KeyProtector> = Arc::new(SoftwareProtector::new(
            storage.clone(),
            SecretString::from("in-memory"),
            kdf,
        ));

        Self::with_components(
            config,
            storage,
            &crate::capability::StaticCapabilityProvider(SecurityCapabilityDescriptor::standard()),
            None,
            software,
        )
        .await
    }

    /// Assembles a vault from explicit parts
    ///
    /// A new vault tries the hardware protector first (when the capability
    /// descriptor says hardware is there) and falls back once to software.
    /// An existing vault always reuses the path it was created with.
    pub async fn with_components(
        config: VaultConfig,
        storage: Arc<dyn SlotStorage>,
        capability: &dyn CapabilityProvider,
        hardware: Option<Arc<dyn KeyProtector>>,
        software: Arc<dyn KeyProtector>,
    ) -> Self {
        let capability = capability.detect();

        let mut vault = Self {
            config,
            storage,
            access: KeyAccess::Unavailable("not initialised".into()),
            capability,
            audit: Mutex::new(AuditState::default()),
            write_lock: Mutex::new(()),
        };

        if let Err(e) = vault.config.validate() {
            error!(error = %e, "invalid vault configuration, vault disabled");
            vault.access = KeyAccess::Unavailable(e.to_string());
            return vault;
        }

        vault.access = match vault.initialise_key_access(hardware, software).await {
            Ok((master, path)) => match vault.load_audit(&master).await {
                Ok(trail) => {
                    vault.audit = Mutex::new(AuditState {
                        trail,
                        unsynced: AuditWrite::default(),
                    });
                    info!(
                        path = path.as_str(),
                        level = vault.capability.level.as_str(),
                        "credential vault ready"
                    );
                    KeyAccess::Ready { master, path }
                }
                Err(e) => {
                    error!(error = %e, "audit trail unreadable, vault disabled");
                    KeyAccess::Unavailable(format!("audit trail unreadable: {}", e))
                }
            },
            Err(e) => {
                error!(error = %e, "no key protector available, vault disabled");
                KeyAccess::Unavailable(e.to_string())
            }
        };

        vault
    }

    async fn initialise_key_access(
        &self,
        hardware: Option<Arc<dyn KeyProtector>>,
        software: Arc<dyn KeyProtector>,
    ) -> Result<(SecretKey, ProtectionPath)> {
        if let Some(record) = self.read_protection_record().await? {
            let protector = match record.path {
                ProtectionPath::Software => software,
                ProtectionPath::HardwareBacked => hardware.ok_or_else(|| {
                    KeyVaultError::Unavailable(
                        "vault is pinned to hardware-backed protection, none present".into(),
                    )
                })?,
            };

            let master = protector.load_or_create_master_key().await?;
            let slot_key = derive_key_32(&master, purposes::SLOT_ENCRYPTION)?;
            let mut canary = open(&record.canary, PROTECTION_SLOT.as_bytes(), &slot_key)
                .map_err(|_| {
                    KeyVaultError::Unavailable("master key does not match vault contents".into())
                })?;
            self.scrub(&mut canary);

            debug!(path = record.path.as_str(), "reusing pinned protection path");
            return Ok((master, record.path));
        }

        let mut candidates: Vec<Arc<dyn KeyProtector>> = Vec::with_capacity(2);
        if self.capability.hardware_backed {
            if let Some(hw) = hardware {
                candidates.push(hw);
            }
        }
        candidates.push(software);

        let mut last_error = None;
        for protector in candidates {
            let path = protector.path();
            match protector.load_or_create_master_key().await {
                Ok(master) => {
                    self.write_protection_record(&master, path).await?;
                    return Ok((master, path));
                }
                Err(e) => {
                    warn!(path = path.as_str(), error = %e, "key protector failed, falling back");
                    last_error = Some(e);
                }
            }
        }

        Err(KeyVaultError::Unavailable(format!(
            "all key protectors failed: {}",
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    async fn read_protection_record(&self) -> Result<Option<ProtectionRecord>> {
        match self.storage.read(PROTECTION_SLOT).await? {
            Some(data) => serde_json::from_slice(&data)
                .map(Some)
                .map_err(|e| KeyVaultError::Format(format!("protection record: {}", e))),
            None => Ok(None),
        }
    }

    async fn write_protection_record(&self, master: &SecretKey, path: ProtectionPath) -> Result<()> {
        let slot_key = derive_key_32(master, purposes::SLOT_ENCRYPTION)?;
        let record = ProtectionRecord {
            version: 1,
            path,
            created_at: Utc::now(),
            canary: seal(CANARY, PROTECTION_SLOT.as_bytes(), &slot_key, AeadCipher::default())?,
        };
        self.storage
            .write(PROTECTION_SLOT, &serde_json::to_vec(&record)?)
            .await
    }

    async fn load_audit(&self, master: &SecretKey) -> Result<AuditTrail> {
        let slot_key = derive_key_32(master, purposes::SLOT_ENCRYPTION)?;
        let Some(head) = self.read_audit_json::<AuditHead>(&slot_key, AUDIT_SLOT).await? else {
            return Ok(AuditTrail::new());
        };

        let mut segments = Vec::new();
        for index in head.segments() {
            let slot = segment_slot(index);
            let segment = self
                .read_audit_json::<AuditSegment>(&slot_key, &slot)
                .await?
                .ok_or_else(|| KeyVaultError::Integrity(format!("audit segment {} missing", slot)))?;
            segments.push(segment);
        }

        let trail = AuditTrail::restore(head, segments)?;
        debug!(events = trail.len(), "audit trail loaded");
        Ok(trail)
    }

    async fn read_audit_json<T: serde::de::DeserializeOwned>(
        &self,
        slot_key: &SecretKey,
        slot: &str,
    ) -> Result<Option<T>> {
        match self.read_sealed(slot_key, slot).await? {
            Some(plain) => serde_json::from_slice(&plain)
                .map(Some)
                .map_err(|e| KeyVaultError::Integrity(format!("{}: {}", slot, e))),
            None => Ok(None),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // SECRETS
    // ═══════════════════════════════════════════════════════════════════════

    /// Encrypts and stores `value` under `key`, overwriting any previous value
    pub async fn store(
        &self,
        key: &str,
        value: &str,
        metadata: Option<SecretMetadata>,
    ) -> Result<()> {
        let slot_key = self.slot_key()?;
        self.config.validate_key(key)?;
        self.config.validate_value(value)?;

        let result = async {
            let _guard = self.write_lock.lock().await;

            let now = Utc::now();
            let meta = match metadata {
                Some(mut m) => {
                    m.updated_at = now;
                    m
                }
                None => match self.read_metadata(&slot_key, key).await? {
                    Some(mut existing) => {
                        existing.updated_at = now;
                        existing
                    }
                    None => SecretMetadata::default(),
                },
            };

            self.write_sealed(&slot_key, key, value.as_bytes()).await?;
            self.write_metadata(&slot_key, key, &meta).await?;
            debug!(key, compliance = meta.compliance_level.as_str(), "secret stored");
            Ok(())
        }
        .await;

        self.finish(AuditAction::Store, Some(key), result).await
    }

    /// Decrypts the value under `key`; `Ok(None)` when absent
    pub async fn get(&self, key: &str) -> Result<Option<SecretString>> {
        let slot_key = self.slot_key()?;
        self.config.validate_key(key)?;

        let result = async {
            let _guard = self.write_lock.lock().await;

            let Some(plain) = self.read_sealed(&slot_key, key).await? else {
                return Ok(None);
            };
            let value = std::str::from_utf8(&plain)
                .map_err(|_| KeyVaultError::Format(format!("secret '{}' is not valid UTF-8", key)))?
                .to_string();

            if let Some(mut meta) = self.read_metadata(&slot_key, key).await? {
                meta.touch_access();
                self.write_metadata(&slot_key, key, &meta).await?;
            }

            Ok(Some(SecretString::from(value)))
        }
        .await;

        self.finish(AuditAction::Retrieve, Some(key), result).await
    }

    /// Deletes a secret and its metadata; removing an absent key succeeds
    pub async fn remove(&self, key: &str) -> Result<()> {
        self.slot_key()?;
        self.config.validate_key(key)?;

        let result = async {
            let _guard = self.write_lock.lock().await;
            self.storage.delete(key).await?;
            self.storage.delete(&meta_slot(key)).await?;
            debug!(key, "secret removed");
            Ok(())
        }
        .await;

        self.finish(AuditAction::Remove, Some(key), result).await
    }

    /// Removes every secret and metadata shadow; records and the audit trail stay
    pub async fn clear_all(&self) -> Result<()> {
        self.slot_key()?;

        let result = async {
            let _guard = self.write_lock.lock().await;
            let mut removed = 0usize;
            for slot in self.storage.list().await? {
                if is_secret_slot(&slot) || slot.ends_with(META_SUFFIX) {
                    self.storage.delete(&slot).await?;
                    removed += 1;
                }
            }
            info!(removed, "vault cleared");
            Ok(())
        }
        .await;

        self.finish(AuditAction::ClearAll, None, result).await
    }

    /// Secret key ids, sorted, without bookkeeping or shadow slots
    pub async fn list_keys(&self) -> Result<Vec<String>> {
        self.slot_key()?;
        let mut keys: Vec<String> = self
            .storage
            .list()
            .await?
            .into_iter()
            .filter(|slot| is_secret_slot(slot))
            .collect();
        keys.sort();
        Ok(keys)
    }

    pub async fn contains(&self, key: &str) -> Result<bool> {
        self.slot_key()?;
        self.config.validate_key(key)?;
        Ok(self.storage.read(key).await?.is_some())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // RECORDS
    // ═══════════════════════════════════════════════════════════════════════

    /// Seals `data` into the bookkeeping record `name`, replacing any previous record
    pub async fn put_record(&self, name: &str, data: &[u8]) -> Result<()> {
        let slot_key = self.slot_key()?;
        self.config.validate_key(name)?;
        if data.is_empty() || data.len() > self.config.max_value_len {
            return Err(KeyVaultError::Validation(format!(
                "record '{}' must hold between 1 and {} bytes",
                name, self.config.max_value_len
            )));
        }

        let result = async {
            let _guard = self.write_lock.lock().await;
            self.write_sealed(&slot_key, &record_slot(name), data).await?;
            debug!(name, "record written");
            Ok(())
        }
        .await;

        self.finish(AuditAction::RecordWrite, Some(name), result).await
    }

    /// Opens the record `name`; `Ok(None)` when absent
    ///
    /// Reads are not audited and take no lock.
    pub async fn get_record(&self, name: &str) -> Result<Option<SecureBuffer>> {
        let slot_key = self.slot_key()?;
        self.config.validate_key(name)?;
        self.read_sealed(&slot_key, &record_slot(name)).await
    }

    /// Deletes the record `name`; removing an absent record succeeds
    pub async fn remove_record(&self, name: &str) -> Result<()> {
        self.slot_key()?;
        self.config.validate_key(name)?;

        let result = async {
            let _guard = self.write_lock.lock().await;
            self.storage.delete(&record_slot(name)).await?;
            debug!(name, "record removed");
            Ok(())
        }
        .await;

        self.finish(AuditAction::RecordRemove, Some(name), result).await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // METADATA
    // ═══════════════════════════════════════════════════════════════════════

    pub async fn get_metadata(&self, key: &str) -> Result<Option<SecretMetadata>> {
        let slot_key = self.slot_key()?;
        self.config.validate_key(key)?;
        self.read_metadata(&slot_key, key).await
    }

    /// Replaces the metadata of an existing secret
    pub async fn update_metadata(&self, key: &str, metadata: SecretMetadata) -> Result<()> {
        let slot_key = self.slot_key()?;
        self.config.validate_key(key)?;

        let result = async {
            let _guard = self.write_lock.lock().await;
            if self.storage.read(key).await?.is_none() {
                return Err(KeyVaultError::Validation(format!(
                    "no secret stored under '{}'",
                    key
                )));
            }
            self.write_metadata(&slot_key, key, &metadata).await
        }
        .await;

        self.finish(AuditAction::UpdateMetadata, Some(key), result).await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // HEALTH
    // ═══════════════════════════════════════════════════════════════════════

    /// Non-throwing health check
    pub async fn is_available(&self) -> bool {
        matches!(self.access, KeyAccess::Ready { .. }) && self.storage.is_healthy().await
    }

    /// Active protection path, `None` when unavailable
    pub fn protection_path(&self) -> Option<ProtectionPath> {
        match &self.access {
            KeyAccess::Ready { path, .. } => Some(*path),
            KeyAccess::Unavailable(_) => None,
        }
    }

    /// Descriptor detected at construction
    pub fn capability(&self) -> &SecurityCapabilityDescriptor {
        &self.capability
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub async fn status(&self) -> VaultStatus {
        let secret_count = match self.list_keys().await {
            Ok(keys) => keys.len(),
            Err(_) => 0,
        };
        VaultStatus {
            available: self.is_available().await,
            protection_path: self.protection_path(),
            security_level: self.capability.level,
            secret_count,
            audit_events: self.audit.lock().await.trail.len(),
            unavailable_reason: match &self.access {
                KeyAccess::Unavailable(reason) => Some(reason.clone()),
                KeyAccess::Ready { .. } => None,
            },
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // AUDIT
    // ═══════════════════════════════════════════════════════════════════════

    /// Copy of the retained audit events
    pub async fn audit_events(&self) -> Result<Vec<AuditEvent>> {
        self.slot_key()?;
        Ok(self.audit.lock().await.trail.events())
    }

    /// Signs and returns all retained events, then purges them from the vault
    pub async fn export_and_purge_audit(&self) -> Result<AuditExport> {
        let master = self.master()?;
        let sign_key = derive_key_32(master, purposes::AUDIT_SIGN)?;
        let slot_key = self.slot_key()?;

        let mut state = self.audit.lock().await;
        let mut working = state.trail.clone();
        let (export, purge) = working.drain_export(&sign_key)?;
        let write = std::mem::take(&mut state.unsynced).then(purge).then(working.record(
            AuditEvent::new(AuditAction::Export, None, true),
            self.config.max_audit_events,
        ));
        if let Err(e) = self.persist_audit(&slot_key, &working, &write).await {
            state.unsynced = write;
            return Err(e);
        }
        state.trail = working;

        info!(events = export.events.len(), "audit trail exported and purged");
        Ok(export)
    }

    /// Checks an export's signature against this vault's signing key
    pub fn verify_audit_export(&self, export: &AuditExport) -> Result<bool> {
        let sign_key = derive_key_32(self.master()?, purposes::AUDIT_SIGN)?;
        Ok(export.verify(&sign_key))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // INTERNALS
    // ═══════════════════════════════════════════════════════════════════════

    fn master(&self) -> Result<&SecretKey> {
        match &self.access {
            KeyAccess::Ready { master, .. } => Ok(master),
            KeyAccess::Unavailable(reason) => Err(KeyVaultError::Unavailable(reason.clone())),
        }
    }

    /// Fresh slot subkey; zeroized when the caller drops it
    fn slot_key(&self) -> Result<SecretKey> {
        derive_key_32(self.master()?, purposes::SLOT_ENCRYPTION)
    }

    fn scrub(&self, data: &mut [u8]) {
        wipe_with_passes(data, self.config.wipe_passes);
    }

    /// Opens a sealed slot; the plaintext is wiped when the buffer drops
    async fn read_sealed(&self, slot_key: &SecretKey, slot: &str) -> Result<Option<SecureBuffer>> {
        let Some(data) = self.storage.read(slot).await? else {
            return Ok(None);
        };
        let blob = SealedBlob::from_json(&data)?;
        let plain = open(&blob, slot.as_bytes(), slot_key)?;
        Ok(Some(SecureBuffer::from_vec(plain).with_passes(self.config.wipe_passes)))
    }

    async fn write_sealed(&self, slot_key: &SecretKey, slot: &str, plain: &[u8]) -> Result<()> {
        let blob = seal(plain, slot.as_bytes(), slot_key, AeadCipher::default())?;
        self.storage.write(slot, &blob.to_json()?).await
    }

    async fn read_metadata(&self, slot_key: &SecretKey, key: &str) -> Result<Option<SecretMetadata>> {
        match self.read_sealed(slot_key, &meta_slot(key)).await? {
            Some(plain) => serde_json::from_slice(&plain)
                .map(Some)
                .map_err(|e| KeyVaultError::Format(format!("metadata for '{}': {}", key, e))),
            None => Ok(None),
        }
    }

    async fn write_metadata(
        &self,
        slot_key: &SecretKey,
        key: &str,
        metadata: &SecretMetadata,
    ) -> Result<()> {
        let json = serde_json::to_vec(metadata)?;
        self.write_sealed(slot_key, &meta_slot(key), &json).await
    }

    /// Rewrites touched segments, then the head, then drops retired segments
    ///
    /// Events past the head's range are ignored on load, so a crash between
    /// the steps leaves a readable trail.
    async fn persist_audit(
        &self,
        slot_key: &SecretKey,
        trail: &AuditTrail,
        write: &AuditWrite,
    ) -> Result<()> {
        for &index in &write.rewrite {
            let segment = trail.segment(index);
            let json = serde_json::to_vec(&segment)?;
            self.write_sealed(slot_key, &segment_slot(index), &json).await?;
        }
        let head = serde_json::to_vec(trail.head())?;
        self.write_sealed(slot_key, AUDIT_SLOT, &head).await?;
        for &index in &write.retire {
            self.storage.delete(&segment_slot(index)).await?;
        }
        Ok(())
    }

    async fn record_audit(&self, action: AuditAction, key: Option<&str>, success: bool) -> Result<()> {
        let slot_key = self.slot_key()?;
        let mut state = self.audit.lock().await;
        let appended = state
            .trail
            .record(AuditEvent::new(action, key, success), self.config.max_audit_events);
        let write = std::mem::take(&mut state.unsynced).then(appended);
        let persisted = self.persist_audit(&slot_key, &state.trail, &write).await;
        if persisted.is_err() {
            state.unsynced = write;
        }
        persisted
    }

    /// Appends the audit event for an operation and merges the outcomes
    async fn finish<T>(
        &self,
        action: AuditAction,
        key: Option<&str>,
        result: Result<T>,
    ) -> Result<T> {
        let audited = self.record_audit(action, key, result.is_ok()).await;
        match (result, audited) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => {
                error!(?action, error = %e, "audit append failed");
                Err(e)
            }
            (Err(e), Err(audit_err)) => {
                warn!(?action, error = %audit_err, "audit append failed after operation error");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
        }
    }
}

fn keychain_account(vault_dir: &str) -> String {
    let digest = Sha256::digest(vault_dir.as_bytes());
    format!("vault-master-{}", &hex::encode(digest)[..16])
}
