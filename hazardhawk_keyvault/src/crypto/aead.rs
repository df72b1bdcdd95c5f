//! AEAD encryption - AES-256-GCM and XChaCha20-Poly1305

use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit, Payload},
    Aes256Gcm, Nonce as AesNonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use secrecy::{ExposeSecret, SecretBox};
use serde::{Deserialize, Serialize};

use crate::crypto::secure_memory::wipe;
use crate::error::{KeyVaultError, Result};

/// AEAD cipher selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AeadCipher {
    /// AES-256-GCM (12-byte nonce)
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
    /// XChaCha20-Poly1305 (24-byte nonce) - preferred for vault slots
    #[serde(rename = "xchacha20-poly1305")]
    XChaCha20Poly1305,
}

impl Default for AeadCipher {
    fn default() -> Self {
        Self::XChaCha20Poly1305
    }
}

impl AeadCipher {
    pub fn nonce_len(&self) -> usize {
        match self {
            Self::Aes256Gcm => 12,
            Self::XChaCha20Poly1305 => 24,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Aes256Gcm => "AES-256-GCM",
            Self::XChaCha20Poly1305 => "XChaCha20-Poly1305",
        }
    }
}

/// Authentication tag length shared by both ciphers
pub const AEAD_TAG_LEN: usize = 16;

/// Sealed slot contents as persisted by the vault
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedBlob {
    pub cipher: AeadCipher,
    /// Base64 nonce
    pub nonce: String,
    /// Base64 ciphertext with appended tag
    pub ciphertext: String,
}

impl SealedBlob {
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| KeyVaultError::Format(e.to_string()))
    }
}

/// Fills `buf` from the OS CSPRNG
pub fn fill_random(buf: &mut [u8]) -> Result<()> {
    getrandom::getrandom(buf)
        .map_err(|e| KeyVaultError::Unavailable(format!("secure random source failed: {}", e)))
}

/// Encrypts `data` bound to `aad`
pub fn seal(
    data: &[u8],
    aad: &[u8],
    key: &SecretBox<[u8; 32]>,
    cipher: AeadCipher,
) -> Result<SealedBlob> {
    let (nonce, ciphertext) = match cipher {
        AeadCipher::Aes256Gcm => {
            let c = Aes256Gcm::new(GenericArray::from_slice(key.expose_secret()));
            let mut nonce_bytes = [0u8; 12];
            fill_random(&mut nonce_bytes)?;
            let ct = c
                .encrypt(AesNonce::from_slice(&nonce_bytes), Payload { msg: data, aad })
                .map_err(|e| KeyVaultError::Crypto(format!("AES-GCM encryption failed: {}", e)))?;
            (nonce_bytes.to_vec(), ct)
        }
        AeadCipher::XChaCha20Poly1305 => {
            let c = XChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(key.expose_secret()));
            let mut nonce_bytes = [0u8; 24];
            fill_random(&mut nonce_bytes)?;
            let ct = c
                .encrypt(XNonce::from_slice(&nonce_bytes), Payload { msg: data, aad })
                .map_err(|e| KeyVaultError::Crypto(format!("XChaCha20 encryption failed: {}", e)))?;
            (nonce_bytes.to_vec(), ct)
        }
    };

    Ok(SealedBlob {
        cipher,
        nonce: BASE64.encode(nonce),
        ciphertext: BASE64.encode(ciphertext),
    })
}

/// Decrypts a sealed blob; authentication failure is a crypto error
pub fn open(blob: &SealedBlob, aad: &[u8], key: &SecretBox<[u8; 32]>) -> Result<Vec<u8>> {
    let nonce = BASE64.decode(&blob.nonce)?;
    let ciphertext = BASE64.decode(&blob.ciphertext)?;

    if nonce.len() != blob.cipher.nonce_len() {
        return Err(KeyVaultError::Format(format!(
            "Invalid {} nonce length: {}",
            blob.cipher.name(),
            nonce.len()
        )));
    }
    if ciphertext.len() < AEAD_TAG_LEN {
        return Err(KeyVaultError::Format("Ciphertext shorter than tag".into()));
    }

    let payload = Payload {
        msg: ciphertext.as_slice(),
        aad,
    };

    let decrypted = match blob.cipher {
        AeadCipher::Aes256Gcm => {
            let c = Aes256Gcm::new(GenericArray::from_slice(key.expose_secret()));
            c.decrypt(AesNonce::from_slice(&nonce), payload)
        }
        AeadCipher::XChaCha20Poly1305 => {
            let c = XChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(key.expose_secret()));
            c.decrypt(XNonce::from_slice(&nonce), payload)
        }
    };

    decrypted.map_err(|_| KeyVaultError::Crypto("Authentication failed - wrong key or tampered data".into()))
}

/// Wraps a 32-byte key under a KEK
pub fn wrap_key(
    key: &SecretBox<[u8; 32]>,
    kek: &SecretBox<[u8; 32]>,
    aad: &[u8],
) -> Result<SealedBlob> {
    seal(key.expose_secret(), aad, kek, AeadCipher::Aes256Gcm)
}

/// Unwraps a key previously wrapped with [`wrap_key`]
pub fn unwrap_key(
    blob: &SealedBlob,
    kek: &SecretBox<[u8; 32]>,
    aad: &[u8],
) -> Result<SecretBox<[u8; 32]>> {
    let mut plaintext = open(blob, aad, kek)?;

    if plaintext.len() != 32 {
        wipe(&mut plaintext);
        return Err(KeyVaultError::Format("Invalid wrapped key length".into()));
    }

    let mut key = Box::new([0u8; 32]);
    key.copy_from_slice(&plaintext);
    wipe(&mut plaintext);
    Ok(SecretBox::new(key))
}
