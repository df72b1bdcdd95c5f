//! Encrypted payload model and container format
//!
//! Container layout:
//! ```text
//! [MAGIC 8B]["HHAWKENC"]
//! [VERSION 1B][0x01]
//! [HEADER_LEN 4B][big-endian]
//! [HEADER JSON][every field except ciphertext]
//! [CIPHERTEXT variable][AES-256-GCM, tag stored in header]
//! ```

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::{IntegrityDescriptor, KeyPurpose, NONCE_LEN, TAG_LEN};
use crate::error::{EngineError, EngineResult};

/// Magic bytes identifying a HazardHawk encrypted payload
pub const MAGIC: &[u8; 8] = b"HHAWKENC";

/// Current container version
pub const CONTAINER_VERSION: u8 = 0x01;

/// Algorithm id written into every payload
pub const ALGORITHM: &str = "AES-256-GCM";

const PREAMBLE_LEN: usize = MAGIC.len() + 1 + 4;
const MAX_HEADER_LEN: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Photo,
    Thumbnail,
}

impl PayloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Thumbnail => "thumbnail",
        }
    }

    pub fn purpose(&self) -> KeyPurpose {
        match self {
            Self::Photo => KeyPurpose::PhotoEncryption,
            Self::Thumbnail => KeyPurpose::ThumbnailEncryption,
        }
    }
}

/// Compression the caller applied before encryption; carried, never acted on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionHint {
    #[default]
    None,
    Jpeg,
    Heic,
    Png,
    Webp,
}

impl CompressionHint {
    /// Guess from a file extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Self::Jpeg,
            "heic" | "heif" => Self::Heic,
            "png" => Self::Png,
            "webp" => Self::Webp,
            _ => Self::None,
        }
    }
}

/// Photo or thumbnail sealed by the engine
///
/// The engine keeps no copy; the caller owns and persists it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
    pub tag: Vec<u8>,
    pub algorithm: String,
    /// Opaque content key id, never the key itself
    pub key_id: String,
    pub content_id: String,
    pub kind: PayloadKind,
    pub compression: CompressionHint,
    pub original_size: u64,
    pub created_at: DateTime<Utc>,
    pub integrity: IntegrityDescriptor,
}

#[derive(Serialize, Deserialize)]
struct PayloadHeader {
    nonce: String,
    tag: String,
    algorithm: String,
    key_id: String,
    content_id: String,
    kind: PayloadKind,
    compression: CompressionHint,
    original_size: u64,
    created_at: DateTime<Utc>,
    integrity: IntegrityDescriptor,
}

/// AEAD associated data binding a ciphertext to its key, kind and content id
pub fn associated_data(algorithm: &str, key_id: &str, kind: PayloadKind, content_id: &str) -> Vec<u8> {
    format!("{}|{}|{}|{}", algorithm, key_id, kind.as_str(), content_id).into_bytes()
}

impl EncryptedPayload {
    pub fn associated_data(&self) -> Vec<u8> {
        associated_data(&self.algorithm, &self.key_id, self.kind, &self.content_id)
    }

    pub fn encrypted_size(&self) -> usize {
        self.ciphertext.len() + self.tag.len()
    }

    /// Structural checks run before any key lookup
    pub fn validate_format(&self, expected: PayloadKind) -> EngineResult<()> {
        if self.algorithm != ALGORITHM {
            return Err(EngineError::Format(format!(
                "unsupported algorithm: {}",
                self.algorithm
            )));
        }
        if self.kind != expected {
            return Err(EngineError::Format(format!(
                "expected {} payload, got {}",
                expected.as_str(),
                self.kind.as_str()
            )));
        }
        if self.nonce.len() != NONCE_LEN {
            return Err(EngineError::Format(format!(
                "invalid nonce length: expected {}, got {}",
                NONCE_LEN,
                self.nonce.len()
            )));
        }
        if self.tag.len() != TAG_LEN {
            return Err(EngineError::Format(format!(
                "invalid tag length: expected {}, got {}",
                TAG_LEN,
                self.tag.len()
            )));
        }
        if self.ciphertext.len() as u64 != self.original_size {
            return Err(EngineError::Format(format!(
                "ciphertext length {} does not match original size {}",
                self.ciphertext.len(),
                self.original_size
            )));
        }
        if self.key_id.trim().is_empty() {
            return Err(EngineError::Format("missing key id".into()));
        }
        Ok(())
    }

    /// Serialize to the container format
    pub fn to_bytes(&self) -> EngineResult<Vec<u8>> {
        let header = PayloadHeader {
            nonce: BASE64.encode(&self.nonce),
            tag: BASE64.encode(&self.tag),
            algorithm: self.algorithm.clone(),
            key_id: self.key_id.clone(),
            content_id: self.content_id.clone(),
            kind: self.kind,
            compression: self.compression,
            original_size: self.original_size,
            created_at: self.created_at,
            integrity: self.integrity.clone(),
        };
        let header = serde_json::to_vec(&header)?;
        let header_len = u32::try_from(header.len())
            .map_err(|_| EngineError::Format("header too large".into()))?;

        let mut out = Vec::with_capacity(PREAMBLE_LEN + header.len() + self.ciphertext.len());
        out.extend_from_slice(MAGIC);
        out.push(CONTAINER_VERSION);
        out.extend_from_slice(&header_len.to_be_bytes());
        out.extend_from_slice(&header);
        out.extend_from_slice(&self.ciphertext);
        Ok(out)
    }

    /// Parse the container format
    pub fn from_bytes(data: &[u8]) -> EngineResult<Self> {
        if data.len() < PREAMBLE_LEN {
            return Err(EngineError::Format("container too small".into()));
        }
        if &data[..MAGIC.len()] != MAGIC {
            return Err(EngineError::Format("invalid magic bytes".into()));
        }

        let version = data[MAGIC.len()];
        if version != CONTAINER_VERSION {
            return Err(EngineError::Format(format!(
                "unsupported container version: {}",
                version
            )));
        }

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&data[MAGIC.len() + 1..PREAMBLE_LEN]);
        let header_len = u32::from_be_bytes(len_bytes) as usize;
        if header_len > MAX_HEADER_LEN || PREAMBLE_LEN + header_len > data.len() {
            return Err(EngineError::Format(format!(
                "invalid header length: {}",
                header_len
            )));
        }

        let header: PayloadHeader =
            serde_json::from_slice(&data[PREAMBLE_LEN..PREAMBLE_LEN + header_len])
                .map_err(|e| EngineError::Format(format!("invalid header: {}", e)))?;

        Ok(Self {
            ciphertext: data[PREAMBLE_LEN + header_len..].to_vec(),
            nonce: BASE64.decode(&header.nonce)?,
            tag: BASE64.decode(&header.tag)?,
            algorithm: header.algorithm,
            key_id: header.key_id,
            content_id: header.content_id,
            kind: header.kind,
            compression: header.compression,
            original_size: header.original_size,
            created_at: header.created_at,
            integrity: header.integrity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EncryptedPayload {
        EncryptedPayload {
            ciphertext: vec![1, 2, 3, 4],
            nonce: vec![0u8; NONCE_LEN],
            tag: vec![9u8; TAG_LEN],
            algorithm: ALGORITHM.to_string(),
            key_id: "key-1".into(),
            content_id: "photo-1".into(),
            kind: PayloadKind::Photo,
            compression: CompressionHint::Jpeg,
            original_size: 4,
            created_at: Utc::now(),
            integrity: IntegrityDescriptor::compute(b"abcd"),
        }
    }

    #[test]
    fn test_container_roundtrip() {
        let payload = sample();
        let bytes = payload.to_bytes().unwrap();
        assert_eq!(&bytes[..8], MAGIC);
        assert_eq!(EncryptedPayload::from_bytes(&bytes).unwrap(), payload);
    }

    #[test]
    fn test_bad_magic_and_version() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            EncryptedPayload::from_bytes(&bytes),
            Err(EngineError::Format(_))
        ));

        let mut bytes = sample().to_bytes().unwrap();
        bytes[8] = 0x02;
        assert!(matches!(
            EncryptedPayload::from_bytes(&bytes),
            Err(EngineError::Format(_))
        ));
    }

    #[test]
    fn test_truncated_header_rejected() {
        let bytes = sample().to_bytes().unwrap();
        assert!(EncryptedPayload::from_bytes(&bytes[..20]).is_err());
        assert!(EncryptedPayload::from_bytes(&bytes[..5]).is_err());
    }

    #[test]
    fn test_validate_format() {
        let payload = sample();
        assert!(payload.validate_format(PayloadKind::Photo).is_ok());
        assert!(payload.validate_format(PayloadKind::Thumbnail).is_err());

        let mut bad = sample();
        bad.nonce.pop();
        assert!(matches!(bad.validate_format(PayloadKind::Photo), Err(EngineError::Format(_))));

        let mut bad = sample();
        bad.algorithm = "DES".into();
        assert!(matches!(bad.validate_format(PayloadKind::Photo), Err(EngineError::Format(_))));
    }

    #[test]
    fn test_compression_from_extension() {
        assert_eq!(CompressionHint::from_extension("JPG"), CompressionHint::Jpeg);
        assert_eq!(CompressionHint::from_extension("tiff"), CompressionHint::None);
    }
}
