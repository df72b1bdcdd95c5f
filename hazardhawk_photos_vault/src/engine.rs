//! Content encryption engine for photos and thumbnails
//!
//! Every payload is sealed with AES-256-GCM under the active content key for
//! its purpose. The associated data binds the algorithm, key id, kind and
//! content id; a SHA-256 checksum of the plaintext is verified on every
//! decryption as a second integrity signal. Content keys live in the
//! credential vault and are loaded by id per operation, then wiped.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use hazardhawk_keyvault::{
    wipe_with_passes, CredentialVault, ProtectionPath, SecurityCapabilityDescriptor,
};
use tokio_util::sync::CancellationToken;

use crate::batch::{run_ordered, BatchItem, ProgressFn};
use crate::config::EngineConfig;
use crate::crypto::{
    decrypt_detached, encrypt_detached, ContentKey, IntegrityDescriptor, KeyHandle, KeyPurpose,
};
use crate::error::{EngineError, EngineResult};
use crate::key_store::ContentKeyStore;
use crate::metrics::{EncryptionMetrics, MetricsAccumulator};
use crate::payload::{associated_data, CompressionHint, EncryptedPayload, PayloadKind, ALGORITHM};
use crate::rotation::{KeyRotation, RotationLedger, RotationStatus};

pub struct ContentEncryptionEngine {
    config: EngineConfig,
    keys: ContentKeyStore,
    capability: SecurityCapabilityDescriptor,
    hardware_backed: bool,
    metrics: MetricsAccumulator,
    ledger: RotationLedger,
}

impl ContentEncryptionEngine {
    // ═══════════════════════════════════════════════════════════════════════
    // CONSTRUCTION
    // ═══════════════════════════════════════════════════════════════════════

    /// Engine over `vault`, reusing the capability the vault detected
    pub async fn new(vault: Arc<CredentialVault>, config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        if !vault.is_available().await {
            return Err(EngineError::Unavailable(
                "credential vault is not available".into(),
            ));
        }

        let capability = vault.capability().clone();
        let hardware_backed = capability.hardware_backed
            && vault.protection_path() == Some(ProtectionPath::HardwareBacked);
        let keys = ContentKeyStore::new(vault);
        keys.load_active().await?;

        log::info!(
            "Content encryption engine ready (level: {}, hardware-backed: {}, active keys: {})",
            capability.level.as_str(),
            hardware_backed,
            keys.active_count()
        );

        Ok(Self {
            config,
            keys,
            capability,
            hardware_backed,
            metrics: MetricsAccumulator::new(),
            ledger: RotationLedger::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn capability(&self) -> &SecurityCapabilityDescriptor {
        &self.capability
    }

    // ═══════════════════════════════════════════════════════════════════════
    // KEYS
    // ═══════════════════════════════════════════════════════════════════════

    /// Generates and persists a 256-bit key; raw bytes never leave the engine
    pub async fn generate_key(&self, purpose: KeyPurpose) -> EngineResult<KeyHandle> {
        self.keys.create_key(purpose).await
    }

    pub async fn active_key_id(&self, purpose: KeyPurpose) -> EngineResult<Option<String>> {
        self.keys.active_key_id(purpose).await
    }

    async fn active_handle(&self, purpose: KeyPurpose) -> EngineResult<KeyHandle> {
        let handle = self.keys.ensure_active(purpose).await?;

        if self.config.rotation.auto_rotate && self.config.rotation.is_due(handle.created_at) {
            let rotated = self
                .keys
                .rotate_active(purpose, Some(&handle.key_id))
                .await?;
            if rotated.key_id != handle.key_id {
                log::info!(
                    "Auto-rotated {} key {} -> {}",
                    purpose.as_str(),
                    handle.key_id,
                    rotated.key_id
                );
                self.metrics.record_rotation(rotated.created_at);
            }
            return Ok(rotated);
        }

        Ok(handle)
    }

    /// Makes a new key active for the purpose of `old_key_id`
    ///
    /// Existing payloads are not touched; they keep decrypting under the old
    /// key until migrated with [`Self::reencrypt`].
    pub async fn rotate_encryption_key(&self, old_key_id: &str) -> EngineResult<KeyRotation> {
        let old = self.keys.load_handle(old_key_id).await?;
        let new = self.keys.rotate_active(old.purpose, None).await?;

        let rotated_at = Utc::now();
        self.metrics.record_rotation(rotated_at);

        let rotation = KeyRotation {
            new_key_id: new.key_id,
            old_key_id: old.key_id,
            rotated_at,
            pending_reencrypt_count: self.ledger.pending_for(old_key_id),
        };
        log::info!(
            "Rotated {} key {} -> {} ({} payloads pending)",
            old.purpose.as_str(),
            rotation.old_key_id,
            rotation.new_key_id,
            rotation.pending_reencrypt_count
        );
        Ok(rotation)
    }

    /// Deletes a superseded key; the active key cannot be retired
    pub async fn retire_key(&self, key_id: &str) -> EngineResult<()> {
        let handle = self.keys.load_handle(key_id).await?;
        if self.active_key_id(handle.purpose).await?.as_deref() == Some(key_id) {
            return Err(EngineError::Validation(format!(
                "key {} is active for {}",
                key_id,
                handle.purpose.as_str()
            )));
        }

        let pending = self.ledger.pending_for(key_id);
        if pending > 0 {
            log::warn!("Retiring key {} with {} payloads not migrated", key_id, pending);
        }
        self.keys.delete_key(key_id).await?;
        self.ledger.forget(key_id);
        Ok(())
    }

    pub async fn rotation_status(&self, purpose: KeyPurpose) -> EngineResult<RotationStatus> {
        let active = self.active_handle(purpose).await?;
        Ok(RotationStatus::evaluate(&self.config.rotation, &active))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // SINGLE PAYLOADS
    // ═══════════════════════════════════════════════════════════════════════

    pub async fn encrypt_photo(
        &self,
        payload: &[u8],
        photo_id: &str,
        compression: CompressionHint,
    ) -> EngineResult<EncryptedPayload> {
        self.encrypt(PayloadKind::Photo, payload, photo_id, compression)
            .await
    }

    pub async fn decrypt_photo(&self, encrypted: &EncryptedPayload) -> EngineResult<Vec<u8>> {
        self.decrypt(PayloadKind::Photo, encrypted).await
    }

    pub async fn encrypt_thumbnail(
        &self,
        payload: &[u8],
        photo_id: &str,
        compression: CompressionHint,
    ) -> EngineResult<EncryptedPayload> {
        self.encrypt(PayloadKind::Thumbnail, payload, photo_id, compression)
            .await
    }

    pub async fn decrypt_thumbnail(&self, encrypted: &EncryptedPayload) -> EngineResult<Vec<u8>> {
        self.decrypt(PayloadKind::Thumbnail, encrypted).await
    }

    /// Decrypts and checks the checksum; plaintext is wiped, never returned
    pub async fn verify_photo_integrity(&self, encrypted: &EncryptedPayload) -> bool {
        self.verify(PayloadKind::Photo, encrypted).await
    }

    pub async fn verify_thumbnail_integrity(&self, encrypted: &EncryptedPayload) -> bool {
        self.verify(PayloadKind::Thumbnail, encrypted).await
    }

    /// Moves a payload onto the active key for its kind
    pub async fn reencrypt(&self, encrypted: &EncryptedPayload) -> EngineResult<EncryptedPayload> {
        let mut plaintext = self.decrypt(encrypted.kind, encrypted).await?;
        let result = self
            .encrypt(
                encrypted.kind,
                &plaintext,
                &encrypted.content_id,
                encrypted.compression,
            )
            .await;
        self.scrub(&mut plaintext);

        let migrated = result?;
        if migrated.key_id != encrypted.key_id {
            self.ledger.note_migrated(&encrypted.key_id);
        }
        Ok(migrated)
    }

    async fn encrypt(
        &self,
        kind: PayloadKind,
        data: &[u8],
        content_id: &str,
        compression: CompressionHint,
    ) -> EngineResult<EncryptedPayload> {
        let started = Instant::now();
        match self.seal(kind, data, content_id, compression).await {
            Ok(payload) => {
                self.metrics.record_encrypt(kind, data.len(), started.elapsed());
                self.ledger.note_encrypted(&payload.key_id);
                Ok(payload)
            }
            Err(e) => {
                self.metrics.record_encryption_failure();
                log::warn!("{} encryption failed for {}: {}", kind.as_str(), content_id, e);
                Err(e)
            }
        }
    }

    async fn decrypt(&self, kind: PayloadKind, encrypted: &EncryptedPayload) -> EngineResult<Vec<u8>> {
        let started = Instant::now();
        match self.open(kind, encrypted).await {
            Ok(plaintext) => {
                self.metrics
                    .record_decrypt(kind, plaintext.len(), started.elapsed());
                Ok(plaintext)
            }
            Err(e) => {
                self.metrics.record_decryption_failure();
                if matches!(e, EngineError::Integrity(_)) {
                    self.metrics.record_integrity_failure();
                }
                log::warn!(
                    "{} decryption failed for {}: {}",
                    kind.as_str(),
                    encrypted.content_id,
                    e
                );
                Err(e)
            }
        }
    }

    async fn verify(&self, kind: PayloadKind, encrypted: &EncryptedPayload) -> bool {
        match self.open(kind, encrypted).await {
            Ok(mut plaintext) => {
                self.scrub(&mut plaintext);
                true
            }
            Err(e) => {
                if matches!(e, EngineError::Integrity(_)) {
                    self.metrics.record_integrity_failure();
                }
                log::debug!("Integrity check failed for {}: {}", encrypted.content_id, e);
                false
            }
        }
    }

    async fn seal(
        &self,
        kind: PayloadKind,
        data: &[u8],
        content_id: &str,
        compression: CompressionHint,
    ) -> EngineResult<EncryptedPayload> {
        if content_id.trim().is_empty() {
            return Err(EngineError::Validation("content id must not be blank".into()));
        }
        if data.is_empty() {
            return Err(EngineError::Validation("payload is empty".into()));
        }
        let max = self.config.max_size(kind);
        if data.len() as u64 > max {
            return Err(EngineError::SizeExceeded {
                size: data.len() as u64,
                max,
            });
        }

        let (handle, key) = self.active_key(kind.purpose()).await?;

        let integrity = IntegrityDescriptor::compute(data);
        let aad = associated_data(ALGORITHM, &handle.key_id, kind, content_id);
        let sealed = encrypt_detached(&key, data, &aad);
        drop(key);
        let sealed = sealed?;

        Ok(EncryptedPayload {
            ciphertext: sealed.ciphertext,
            nonce: sealed.nonce.to_vec(),
            tag: sealed.tag.to_vec(),
            algorithm: ALGORITHM.to_string(),
            key_id: handle.key_id,
            content_id: content_id.to_string(),
            kind,
            compression,
            original_size: data.len() as u64,
            created_at: Utc::now(),
            integrity,
        })
    }

    /// Active handle plus key material
    ///
    /// An active key whose record has vanished is dropped from the cache and
    /// resolved again once, which creates a replacement.
    async fn active_key(&self, purpose: KeyPurpose) -> EngineResult<(KeyHandle, ContentKey)> {
        let handle = self.active_handle(purpose).await?;
        match self.keys.load_key(&handle.key_id).await {
            Ok((key, _)) => Ok((handle, key)),
            Err(EngineError::KeyNotFound(missing)) => {
                log::warn!(
                    "Active {} key {} vanished, resolving again",
                    purpose.as_str(),
                    missing
                );
                self.keys.forget_active(purpose, &missing).await;
                let handle = self.active_handle(purpose).await?;
                let (key, _) = self.keys.load_key(&handle.key_id).await?;
                Ok((handle, key))
            }
            Err(e) => Err(e),
        }
    }

    fn scrub(&self, plaintext: &mut [u8]) {
        wipe_with_passes(plaintext, self.keys.vault().config().wipe_passes);
    }

    async fn open(&self, kind: PayloadKind, encrypted: &EncryptedPayload) -> EngineResult<Vec<u8>> {
        encrypted.validate_format(kind)?;

        let (key, purpose) = self.keys.load_key(&encrypted.key_id).await?;
        if purpose != kind.purpose() {
            return Err(EngineError::Format(format!(
                "key {} is a {} key",
                encrypted.key_id,
                purpose.as_str()
            )));
        }

        let opened = decrypt_detached(
            &key,
            &encrypted.nonce,
            &encrypted.ciphertext,
            &encrypted.tag,
            &encrypted.associated_data(),
        );
        drop(key);
        let mut plaintext = opened?;

        if !encrypted.integrity.matches(&plaintext)? {
            self.scrub(&mut plaintext);
            return Err(EngineError::Integrity(format!(
                "checksum mismatch for {}",
                encrypted.content_id
            )));
        }
        Ok(plaintext)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // BATCHES
    // ═══════════════════════════════════════════════════════════════════════

    /// Encrypts items in order; the first failure aborts the batch
    pub async fn encrypt_photo_batch(
        &self,
        items: Vec<BatchItem>,
        on_progress: Option<ProgressFn<'_>>,
        cancel: Option<&CancellationToken>,
    ) -> EngineResult<Vec<EncryptedPayload>> {
        run_ordered(
            items,
            self.config.batch_concurrency,
            on_progress,
            cancel,
            |item| async move {
                self.encrypt_photo(&item.data, &item.content_id, item.compression)
                    .await
            },
        )
        .await
    }

    pub async fn decrypt_photo_batch(
        &self,
        items: &[EncryptedPayload],
        on_progress: Option<ProgressFn<'_>>,
        cancel: Option<&CancellationToken>,
    ) -> EngineResult<Vec<Vec<u8>>> {
        run_ordered(
            items.iter().collect::<Vec<&EncryptedPayload>>(),
            self.config.batch_concurrency,
            on_progress,
            cancel,
            |payload| self.decrypt_photo(payload),
        )
        .await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // METRICS
    // ═══════════════════════════════════════════════════════════════════════

    pub fn get_encryption_metrics(&self) -> EncryptionMetrics {
        self.metrics
            .snapshot(self.hardware_backed, self.keys.active_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hazardhawk_keyvault::VaultConfig;
    use parking_lot::Mutex;
    use std::collections::HashSet;

    async fn engine_with(config: EngineConfig) -> ContentEncryptionEngine {
        let vault = Arc::new(CredentialVault::open_in_memory(VaultConfig::default()).await);
        ContentEncryptionEngine::new(vault, config).await.unwrap()
    }

    async fn engine() -> ContentEncryptionEngine {
        engine_with(EngineConfig::default()).await
    }

    fn jpeg_like(len: usize) -> Vec<u8> {
        let mut data: Vec<u8> = (0..len).map(|i| (i * 31 % 251) as u8).collect();
        data[..3].copy_from_slice(&[0xFF, 0xD8, 0xFF]);
        data
    }

    #[tokio::test]
    async fn test_photo_roundtrip_500kb() {
        let engine = engine().await;
        let photo = jpeg_like(500 * 1024);

        let encrypted = engine
            .encrypt_photo(&photo, "photo-1", CompressionHint::Jpeg)
            .await
            .unwrap();
        assert_eq!(encrypted.nonce.len(), crate::crypto::NONCE_LEN);
        assert_eq!(encrypted.tag.len(), crate::crypto::TAG_LEN);
        assert_eq!(encrypted.encrypted_size(), photo.len() + crate::crypto::TAG_LEN);
        assert_eq!(encrypted.original_size, photo.len() as u64);

        let decrypted = engine.decrypt_photo(&encrypted).await.unwrap();
        assert_eq!(decrypted, photo);
    }

    #[tokio::test]
    async fn test_oversize_rejected_without_payload() {
        let engine = engine_with(EngineConfig {
            max_photo_size: 1024,
            ..Default::default()
        })
        .await;

        let result = engine
            .encrypt_photo(&vec![0u8; 1025], "photo-big", CompressionHint::None)
            .await;
        assert!(matches!(
            result,
            Err(EngineError::SizeExceeded { size: 1025, max: 1024 })
        ));
    }

    #[tokio::test]
    async fn test_blank_id_and_empty_payload() {
        let engine = engine().await;
        assert!(matches!(
            engine.encrypt_photo(b"x", "  ", CompressionHint::None).await,
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            engine.encrypt_photo(b"", "p", CompressionHint::None).await,
            Err(EngineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_metrics_count_successes_and_failures() {
        let engine = engine_with(EngineConfig {
            max_photo_size: 100,
            ..Default::default()
        })
        .await;

        for i in 0..3 {
            engine
                .encrypt_photo(b"small photo", &format!("p{}", i), CompressionHint::None)
                .await
                .unwrap();
        }
        assert!(engine
            .encrypt_photo(&[0u8; 101], "too-big", CompressionHint::None)
            .await
            .is_err());

        let metrics = engine.get_encryption_metrics();
        assert_eq!(metrics.photos_encrypted, 3);
        assert_eq!(metrics.encryption_failures, 1);
        assert_eq!(metrics.bytes_encrypted, 33);
        assert_eq!(metrics.active_key_count, 1);
        assert!(!metrics.hardware_backed);
    }

    #[tokio::test]
    async fn test_nonce_unique_over_10k_encryptions() {
        let engine = engine().await;
        let mut nonces = HashSet::with_capacity(10_000);

        for i in 0..10_000 {
            let encrypted = engine
                .encrypt_photo(b"nonce check", &format!("p{}", i), CompressionHint::None)
                .await
                .unwrap();
            assert!(nonces.insert(encrypted.nonce), "nonce reused at {}", i);
        }
    }

    #[tokio::test]
    async fn test_any_bit_flip_is_detected() {
        let engine = engine().await;
        let encrypted = engine
            .encrypt_photo(b"evidence: missing guardrail", "photo-7", CompressionHint::None)
            .await
            .unwrap();

        for field in 0..3 {
            let len = match field {
                0 => encrypted.ciphertext.len(),
                1 => encrypted.nonce.len(),
                _ => encrypted.tag.len(),
            };
            for byte in 0..len {
                for bit in 0..8 {
                    let mut tampered = encrypted.clone();
                    let target = match field {
                        0 => &mut tampered.ciphertext,
                        1 => &mut tampered.nonce,
                        _ => &mut tampered.tag,
                    };
                    target[byte] ^= 1 << bit;
                    let err = engine.decrypt_photo(&tampered).await.unwrap_err();
                    assert!(err.is_tamper_evident(), "undetected flip: {}", err);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_checksum_mismatch_is_integrity_error() {
        let engine = engine().await;
        let mut encrypted = engine
            .encrypt_photo(b"original", "photo-9", CompressionHint::None)
            .await
            .unwrap();
        encrypted.integrity = IntegrityDescriptor::compute(b"something else");

        assert!(matches!(
            engine.decrypt_photo(&encrypted).await,
            Err(EngineError::Integrity(_))
        ));
        assert!(!engine.verify_photo_integrity(&encrypted).await);
        assert_eq!(engine.get_encryption_metrics().integrity_failures, 2);
    }

    #[tokio::test]
    async fn test_payload_bound_to_content_id_and_kind() {
        let engine = engine().await;
        let mut encrypted = engine
            .encrypt_photo(b"photo", "photo-1", CompressionHint::None)
            .await
            .unwrap();

        assert!(matches!(
            engine.decrypt_thumbnail(&encrypted).await,
            Err(EngineError::Format(_))
        ));

        encrypted.content_id = "photo-2".into();
        assert!(matches!(
            engine.decrypt_photo(&encrypted).await,
            Err(EngineError::Crypto(_))
        ));
    }

    #[tokio::test]
    async fn test_thumbnails_use_their_own_key() {
        let engine = engine().await;
        let photo = engine
            .encrypt_photo(b"full", "photo-1", CompressionHint::None)
            .await
            .unwrap();
        let thumb = engine
            .encrypt_thumbnail(b"thumb", "photo-1", CompressionHint::None)
            .await
            .unwrap();

        assert_ne!(photo.key_id, thumb.key_id);
        assert_eq!(engine.decrypt_thumbnail(&thumb).await.unwrap(), b"thumb");
        assert!(engine.verify_thumbnail_integrity(&thumb).await);

        let metrics = engine.get_encryption_metrics();
        assert_eq!(metrics.thumbnails_encrypted, 1);
        assert_eq!(metrics.thumbnails_decrypted, 1);
        assert_eq!(metrics.active_key_count, 2);
    }

    #[tokio::test]
    async fn test_batch_fail_fast_with_progress() {
        let engine = engine().await;
        let mut payloads = Vec::new();
        for i in 0..5 {
            payloads.push(
                engine
                    .encrypt_photo(format!("photo {}", i).as_bytes(), &format!("p{}", i), CompressionHint::None)
                    .await
                    .unwrap(),
            );
        }
        payloads[2].nonce.truncate(4);

        let seen = Mutex::new(Vec::new());
        let progress = |current: usize, total: usize| seen.lock().push((current, total));
        let result = engine
            .decrypt_photo_batch(&payloads, Some(&progress), None)
            .await;

        assert!(matches!(result, Err(EngineError::Format(_))));
        assert_eq!(*seen.lock(), vec![(1, 5), (2, 5)]);
    }

    #[tokio::test]
    async fn test_batch_roundtrip() {
        let engine = engine().await;
        let items: Vec<BatchItem> = (0..6)
            .map(|i| BatchItem::new(vec![i as u8; 100 + i], format!("p{}", i)))
            .collect();

        let encrypted = engine.encrypt_photo_batch(items, None, None).await.unwrap();
        assert_eq!(encrypted.len(), 6);
        assert_eq!(encrypted[3].content_id, "p3");

        let decrypted = engine
            .decrypt_photo_batch(&encrypted, None, None)
            .await
            .unwrap();
        assert_eq!(decrypted[5], vec![5u8; 105]);
    }

    #[tokio::test]
    async fn test_rotation_keeps_old_payloads_readable() {
        let engine = engine().await;
        let old = engine
            .encrypt_photo(b"before rotation", "photo-1", CompressionHint::None)
            .await
            .unwrap();
        engine
            .encrypt_photo(b"also before", "photo-2", CompressionHint::None)
            .await
            .unwrap();

        let rotation = engine.rotate_encryption_key(&old.key_id).await.unwrap();
        assert_eq!(rotation.old_key_id, old.key_id);
        assert_ne!(rotation.new_key_id, old.key_id);
        assert_eq!(rotation.pending_reencrypt_count, 2);
        assert_eq!(
            engine.active_key_id(KeyPurpose::PhotoEncryption).await.unwrap(),
            Some(rotation.new_key_id.clone())
        );

        assert_eq!(engine.decrypt_photo(&old).await.unwrap(), b"before rotation");

        let migrated = engine.reencrypt(&old).await.unwrap();
        assert_eq!(migrated.key_id, rotation.new_key_id);
        assert_eq!(migrated.content_id, "photo-1");
        assert_eq!(engine.decrypt_photo(&migrated).await.unwrap(), b"before rotation");

        let again = engine.rotate_encryption_key(&rotation.new_key_id).await.unwrap();
        assert_eq!(again.pending_reencrypt_count, 1);
        assert!(engine.get_encryption_metrics().last_rotation.is_some());
    }

    #[tokio::test]
    async fn test_retire_key() {
        let engine = engine().await;
        let old = engine
            .encrypt_photo(b"data", "photo-1", CompressionHint::None)
            .await
            .unwrap();

        assert!(matches!(
            engine.retire_key(&old.key_id).await,
            Err(EngineError::Validation(_))
        ));

        engine.rotate_encryption_key(&old.key_id).await.unwrap();
        engine.retire_key(&old.key_id).await.unwrap();
        assert!(matches!(
            engine.decrypt_photo(&old).await,
            Err(EngineError::KeyNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_auto_rotation_when_due() {
        let mut config = EngineConfig::default();
        config.rotation.rotation_interval_days = 0;
        config.rotation.auto_rotate = true;
        let engine = engine_with(config).await;

        let first = engine
            .encrypt_photo(b"one", "p1", CompressionHint::None)
            .await
            .unwrap();
        let second = engine
            .encrypt_photo(b"two", "p2", CompressionHint::None)
            .await
            .unwrap();

        assert_ne!(first.key_id, second.key_id);
        assert_eq!(engine.decrypt_photo(&first).await.unwrap(), b"one");
    }

    #[tokio::test]
    async fn test_rotation_status() {
        let engine = engine().await;
        let status = engine
            .rotation_status(KeyPurpose::ThumbnailEncryption)
            .await
            .unwrap();
        assert!(!status.needs_rotation);
        assert_eq!(status.purpose, KeyPurpose::ThumbnailEncryption);
    }

    #[tokio::test]
    async fn test_generate_key_returns_handle_only() {
        let engine = engine().await;
        let handle = engine.generate_key(KeyPurpose::PhotoEncryption).await.unwrap();
        assert_eq!(handle.purpose, KeyPurpose::PhotoEncryption);
        assert!(!handle.key_id.is_empty());
        // Generating does not change the active key.
        assert_eq!(
            engine.active_key_id(KeyPurpose::PhotoEncryption).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_photo_ops_leave_audit_trail_alone() {
        let engine = engine().await;
        let encrypted = engine
            .encrypt_photo(b"first", "p0", CompressionHint::None)
            .await
            .unwrap();
        let vault = engine.keys.vault().clone();
        let baseline = vault.audit_events().await.unwrap().len();

        for i in 0..50 {
            engine
                .encrypt_photo(b"photo", &format!("p{}", i), CompressionHint::None)
                .await
                .unwrap();
            engine.decrypt_photo(&encrypted).await.unwrap();
        }
        assert_eq!(vault.audit_events().await.unwrap().len(), baseline);
    }

    #[tokio::test]
    async fn test_clear_all_keeps_content_keys() {
        let engine = engine().await;
        let before = engine
            .encrypt_photo(b"site photo", "photo-1", CompressionHint::None)
            .await
            .unwrap();
        let vault = engine.keys.vault().clone();
        vault.store("api_key_x", "secret123", None).await.unwrap();

        vault.clear_all().await.unwrap();

        assert!(vault.list_keys().await.unwrap().is_empty());
        assert_eq!(engine.decrypt_photo(&before).await.unwrap(), b"site photo");
        let after = engine
            .encrypt_photo(b"next photo", "photo-2", CompressionHint::None)
            .await
            .unwrap();
        assert_eq!(after.key_id, before.key_id);
    }

    #[tokio::test]
    async fn test_vanished_active_key_is_replaced() {
        let engine = engine().await;
        let first = engine
            .encrypt_photo(b"one", "p1", CompressionHint::None)
            .await
            .unwrap();
        engine
            .keys
            .vault()
            .remove_record(&crate::key_store::key_record(&first.key_id))
            .await
            .unwrap();

        let second = engine
            .encrypt_photo(b"two", "p2", CompressionHint::None)
            .await
            .unwrap();
        assert_ne!(second.key_id, first.key_id);
        assert_eq!(engine.decrypt_photo(&second).await.unwrap(), b"two");
        assert_eq!(
            engine.active_key_id(KeyPurpose::PhotoEncryption).await.unwrap(),
            Some(second.key_id)
        );
        assert_eq!(engine.get_encryption_metrics().encryption_failures, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_use_creates_one_key() {
        let engine = Arc::new(engine().await);

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let engine = engine.clone();
                tokio::spawn(async move {
                    engine
                        .encrypt_photo(b"photo", &format!("p{}", i), CompressionHint::None)
                        .await
                })
            })
            .collect();

        let mut key_ids = HashSet::new();
        for handle in handles {
            key_ids.insert(handle.await.unwrap().unwrap().key_id);
        }

        assert_eq!(key_ids.len(), 1);
        let metrics = engine.get_encryption_metrics();
        assert_eq!(metrics.photos_encrypted, 16);
        assert_eq!(metrics.encryption_failures, 0);
        assert_eq!(metrics.active_key_count, 1);
        assert_eq!(
            engine
                .keys
                .stored_active_key_id(KeyPurpose::PhotoEncryption)
                .await
                .unwrap(),
            key_ids.into_iter().next()
        );
    }

    #[tokio::test]
    async fn test_batch_cancel_reports_completed() {
        let engine = engine().await;
        let token = CancellationToken::new();
        let cancel_after_two = |current: usize, _total: usize| {
            if current == 2 {
                token.cancel();
            }
        };
        let items: Vec<BatchItem> = (0..8)
            .map(|i| BatchItem::new(vec![i as u8; 64], format!("p{}", i)))
            .collect();

        let result = engine
            .encrypt_photo_batch(items, Some(&cancel_after_two), Some(&token))
            .await;

        let completed = match result {
            Err(EngineError::Cancelled { completed }) => completed,
            other => panic!("expected cancellation, got {:?}", other.map(|v| v.len())),
        };
        assert!(completed >= 2 && completed < 8);
        // In-flight items finish, so every started encryption is counted.
        let metrics = engine.get_encryption_metrics();
        assert_eq!(metrics.photos_encrypted as usize, completed);
        assert_eq!(metrics.encryption_failures, 0);
    }
}
