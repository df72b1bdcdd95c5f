//! Error types for the HazardHawk credential vault

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyVaultError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid format: {0}")]
    Format(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Integrity check failed: {0}")]
    Integrity(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Vault unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid vault JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),
}

pub type Result<T> = std::result::Result<T, KeyVaultError>;

impl KeyVaultError {
    /// Errors that indicate tampering or key compromise rather than a bad call.
    pub fn is_security_critical(&self) -> bool {
        matches!(
            self,
            Self::Integrity(_) | Self::Crypto(_) | Self::KeyDerivationFailed(_)
        )
    }

    /// Tampered or undecryptable data, as opposed to a storage "load failed".
    pub fn is_tamper_evident(&self) -> bool {
        matches!(self, Self::Integrity(_) | Self::Crypto(_))
    }

    /// Caller can fix the input and retry.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Storage(_) | Self::Io(_))
    }
}
