//! HazardHawk Photos Vault - AEAD Encryption
//!
//! AES-256-GCM with the authentication tag kept apart from the ciphertext,
//! so payloads carry ciphertext, nonce and tag as separate fields.

use aes_gcm::{
    aead::{generic_array::GenericArray, AeadInPlace, KeyInit},
    Aes256Gcm, Nonce,
};

use super::keys::{generate_nonce, ContentKey, NONCE_LEN, TAG_LEN};
use crate::error::{EngineError, EngineResult};

/// Output of a detached encryption
pub struct DetachedCiphertext {
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_LEN],
}

/// Encrypt with AES-256-GCM under a fresh random nonce
pub fn encrypt_detached(
    key: &ContentKey,
    plaintext: &[u8],
    aad: &[u8],
) -> EngineResult<DetachedCiphertext> {
    let cipher = Aes256Gcm::new_from_slice(key.expose())
        .map_err(|e| EngineError::Unavailable(format!("cipher init failed: {}", e)))?;

    let nonce = generate_nonce()?;
    let mut buffer = plaintext.to_vec();

    let tag = match cipher.encrypt_in_place_detached(Nonce::from_slice(&nonce), aad, &mut buffer) {
        Ok(tag) => tag,
        Err(_) => {
            hazardhawk_keyvault::wipe(&mut buffer);
            return Err(EngineError::Crypto("encryption failed".into()));
        }
    };

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(&tag);

    Ok(DetachedCiphertext {
        nonce,
        ciphertext: buffer,
        tag: tag_bytes,
    })
}

/// Decrypt with AES-256-GCM; any tampering fails authentication
pub fn decrypt_detached(
    key: &ContentKey,
    nonce: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
    aad: &[u8],
) -> EngineResult<Vec<u8>> {
    if nonce.len() != NONCE_LEN {
        return Err(EngineError::Format(format!(
            "invalid nonce length: expected {}, got {}",
            NONCE_LEN,
            nonce.len()
        )));
    }
    if tag.len() != TAG_LEN {
        return Err(EngineError::Format(format!(
            "invalid tag length: expected {}, got {}",
            TAG_LEN,
            tag.len()
        )));
    }

    let cipher = Aes256Gcm::new_from_slice(key.expose())
        .map_err(|e| EngineError::Unavailable(format!("cipher init failed: {}", e)))?;

    let mut buffer = ciphertext.to_vec();
    let opened = cipher.decrypt_in_place_detached(
        Nonce::from_slice(nonce),
        aad,
        &mut buffer,
        GenericArray::from_slice(tag),
    );

    match opened {
        Ok(()) => Ok(buffer),
        Err(_) => {
            hazardhawk_keyvault::wipe(&mut buffer);
            Err(EngineError::Crypto(
                "authentication failed - wrong key or corrupted".into(),
            ))
        }
    }
}
