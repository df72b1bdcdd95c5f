//! HazardHawk Photos Vault - Content Keys
//!
//! Raw key material stays inside [`ContentKey`] and is wiped on drop.
//! Callers only ever see a [`KeyHandle`].

use chrono::{DateTime, Utc};
use hazardhawk_keyvault::crypto::fill_random;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Key length for AES-256
pub const KEY_LEN: usize = 32;

/// Shortest key the engine accepts
pub const MIN_KEY_LEN: usize = KEY_LEN;

/// Nonce length for AES-GCM
pub const NONCE_LEN: usize = 12;

/// GCM authentication tag length
pub const TAG_LEN: usize = 16;

/// What a content key encrypts; affects labelling only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPurpose {
    PhotoEncryption,
    ThumbnailEncryption,
}

impl KeyPurpose {
    pub const ALL: [KeyPurpose; 2] = [KeyPurpose::PhotoEncryption, KeyPurpose::ThumbnailEncryption];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PhotoEncryption => "photo_encryption",
            Self::ThumbnailEncryption => "thumbnail_encryption",
        }
    }
}

impl std::str::FromStr for KeyPurpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "photo" | "photo_encryption" => Ok(Self::PhotoEncryption),
            "thumbnail" | "thumb" | "thumbnail_encryption" => Ok(Self::ThumbnailEncryption),
            other => Err(format!("unknown key purpose: {}", other)),
        }
    }
}

/// Public reference to a persisted content key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyHandle {
    pub key_id: String,
    pub purpose: KeyPurpose,
    pub created_at: DateTime<Utc>,
}

/// 256-bit content key, wiped with the secure memory utility on drop
pub struct ContentKey {
    bytes: [u8; KEY_LEN],
}

impl ContentKey {
    /// Fresh key from the OS CSPRNG
    pub(crate) fn generate() -> EngineResult<Self> {
        let mut bytes = [0u8; KEY_LEN];
        fill_random(&mut bytes).map_err(|e| EngineError::Unavailable(e.to_string()))?;
        Ok(Self { bytes })
    }

    pub(crate) fn from_slice(raw: &[u8]) -> EngineResult<Self> {
        if raw.len() != KEY_LEN {
            return Err(EngineError::Format(format!(
                "invalid key length: expected {}, got {}",
                KEY_LEN,
                raw.len()
            )));
        }
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(raw);
        Ok(Self { bytes })
    }

    pub(crate) fn expose(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl Drop for ContentKey {
    fn drop(&mut self) {
        hazardhawk_keyvault::wipe(&mut self.bytes);
    }
}

impl std::fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ContentKey([REDACTED])")
    }
}

/// Random nonce for AES-GCM
pub fn generate_nonce() -> EngineResult<[u8; NONCE_LEN]> {
    let mut nonce = [0u8; NONCE_LEN];
    fill_random(&mut nonce).map_err(|e| EngineError::Unavailable(e.to_string()))?;
    Ok(nonce)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keys_differ() {
        let k1 = ContentKey::generate().unwrap();
        let k2 = ContentKey::generate().unwrap();
        assert_ne!(k1.expose(), k2.expose());
    }

    #[test]
    fn test_short_key_rejected() {
        assert!(matches!(
            ContentKey::from_slice(&[0u8; 16]),
            Err(EngineError::Format(_))
        ));
        assert!(ContentKey::from_slice(&[7u8; KEY_LEN]).is_ok());
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = ContentKey::from_slice(&[0xAB; KEY_LEN]).unwrap();
        assert_eq!(format!("{:?}", key), "ContentKey([REDACTED])");
    }

    #[test]
    fn test_purpose_parse() {
        assert_eq!("photo".parse::<KeyPurpose>().unwrap(), KeyPurpose::PhotoEncryption);
        assert_eq!("thumb".parse::<KeyPurpose>().unwrap(), KeyPurpose::ThumbnailEncryption);
        assert!("index".parse::<KeyPurpose>().is_err());
    }
}
