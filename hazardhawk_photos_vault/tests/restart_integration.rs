//! Restart Integration Tests
//!
//! Payloads must stay decryptable by a fresh engine over the same on-disk
//! vault: content keys are looked up by id, never regenerated.

use std::path::Path;
use std::sync::Arc;

use hazardhawk_keyvault::crypto::Argon2Config;
use hazardhawk_keyvault::{
    CredentialVault, FileSlotStorage, KeyProtector, SecurityCapabilityDescriptor, SlotStorage,
    SoftwareProtector, StaticCapabilityProvider, VaultConfig,
};
use hazardhawk_photos_vault::{
    CompressionHint, ContentEncryptionEngine, EncryptedPayload, EngineConfig, EngineError,
    KeyPurpose,
};
use secrecy::SecretString;
use tempfile::tempdir;

async fn open_engine(dir: &Path) -> ContentEncryptionEngine {
    let storage: Arc<dyn SlotStorage> = Arc::new(FileSlotStorage::open(dir).await.unwrap());
    let software: Arc<dyn KeyProtector> = Arc::new(SoftwareProtector::new(
        storage.clone(),
        SecretString::from("site-tablet-17"),
        Argon2Config::insecure_fast(),
    ));
    let vault = CredentialVault::with_components(
        VaultConfig::with_dir(dir),
        storage,
        &StaticCapabilityProvider(SecurityCapabilityDescriptor::standard()),
        None,
        software,
    )
    .await;

    ContentEncryptionEngine::new(Arc::new(vault), EngineConfig::default())
        .await
        .unwrap()
}

/// Regression test: a payload written before a restart decrypts afterwards.
#[tokio::test]
async fn test_payload_decrypts_after_restart() {
    let dir = tempdir().unwrap();
    let photo = b"scaffold tie-in missing on level 3".to_vec();

    let stored = {
        let engine = open_engine(dir.path()).await;
        let encrypted = engine
            .encrypt_photo(&photo, "photo-1", CompressionHint::Jpeg)
            .await
            .unwrap();
        encrypted.to_bytes().unwrap()
    };

    let engine = open_engine(dir.path()).await;
    let payload = EncryptedPayload::from_bytes(&stored).unwrap();
    assert_eq!(engine.decrypt_photo(&payload).await.unwrap(), photo);
    assert!(engine.verify_photo_integrity(&payload).await);
}

/// The active key survives a restart; a new engine does not mint another.
#[tokio::test]
async fn test_active_key_is_reused_after_restart() {
    let dir = tempdir().unwrap();

    let first_key = {
        let engine = open_engine(dir.path()).await;
        engine
            .encrypt_thumbnail(b"thumb", "photo-1", CompressionHint::None)
            .await
            .unwrap()
            .key_id
    };

    let engine = open_engine(dir.path()).await;
    assert_eq!(
        engine
            .active_key_id(KeyPurpose::ThumbnailEncryption)
            .await
            .unwrap(),
        Some(first_key.clone())
    );
    let next = engine
        .encrypt_thumbnail(b"thumb 2", "photo-2", CompressionHint::None)
        .await
        .unwrap();
    assert_eq!(next.key_id, first_key);
    assert_eq!(engine.get_encryption_metrics().active_key_count, 1);
}

/// Rotation before a restart leaves both generations decryptable.
#[tokio::test]
async fn test_rotated_payloads_decrypt_after_restart() {
    let dir = tempdir().unwrap();

    let (old, new) = {
        let engine = open_engine(dir.path()).await;
        let old = engine
            .encrypt_photo(b"old generation", "photo-1", CompressionHint::None)
            .await
            .unwrap();
        engine.rotate_encryption_key(&old.key_id).await.unwrap();
        let new = engine
            .encrypt_photo(b"new generation", "photo-2", CompressionHint::None)
            .await
            .unwrap();
        (old.to_bytes().unwrap(), new.to_bytes().unwrap())
    };

    let engine = open_engine(dir.path()).await;
    let old = EncryptedPayload::from_bytes(&old).unwrap();
    let new = EncryptedPayload::from_bytes(&new).unwrap();
    assert_ne!(old.key_id, new.key_id);
    assert_eq!(engine.decrypt_photo(&old).await.unwrap(), b"old generation");
    assert_eq!(engine.decrypt_photo(&new).await.unwrap(), b"new generation");
}

/// Corrupting the container on disk is caught before any plaintext is returned.
#[tokio::test]
async fn test_on_disk_tampering_detected() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path()).await;

    let mut bytes = engine
        .encrypt_photo(b"ppe violation: no hard hat", "photo-1", CompressionHint::None)
        .await
        .unwrap()
        .to_bytes()
        .unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;

    let payload = EncryptedPayload::from_bytes(&bytes).unwrap();
    let err = engine.decrypt_photo(&payload).await.unwrap_err();
    assert!(matches!(err, EngineError::Crypto(_)));
}
