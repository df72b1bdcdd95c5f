//! HazardHawk Photos Vault - Error Types

use hazardhawk_keyvault::KeyVaultError;
use thiserror::Error;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine error types
#[derive(Error, Debug)]
pub enum EngineError {
    // ═══════════════════════════════════════════════════════════════
    // INPUT ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Payload too large: {size} bytes (max: {max})")]
    SizeExceeded { size: u64, max: u64 },

    #[error("Invalid payload format: {0}")]
    Format(String),

    // ═══════════════════════════════════════════════════════════════
    // CRYPTO ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Cryptographic failure: {0}")]
    Crypto(String),

    #[error("Integrity check failed - payload corrupted or tampered: {0}")]
    Integrity(String),

    // ═══════════════════════════════════════════════════════════════
    // KEY ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Content key not found: {0}")]
    KeyNotFound(String),

    #[error("Key storage error: {0}")]
    Storage(String),

    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    // ═══════════════════════════════════════════════════════════════
    // BATCH / IO
    // ═══════════════════════════════════════════════════════════════

    #[error("Batch cancelled after {completed} completed items")]
    Cancelled { completed: usize },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Check if this is a security-critical error
    pub fn is_security_critical(&self) -> bool {
        matches!(
            self,
            EngineError::Integrity(_) | EngineError::Crypto(_) | EngineError::Unavailable(_)
        )
    }

    /// Tampering or wrong-key evidence, as opposed to a storage failure
    pub fn is_tamper_evident(&self) -> bool {
        matches!(self, EngineError::Integrity(_) | EngineError::Crypto(_))
    }

    /// Per-item failures the caller may retry or discard
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::Validation(_)
                | EngineError::SizeExceeded { .. }
                | EngineError::Format(_)
                | EngineError::Crypto(_)
                | EngineError::Integrity(_)
                | EngineError::KeyNotFound(_)
        )
    }
}

impl From<KeyVaultError> for EngineError {
    fn from(e: KeyVaultError) -> Self {
        match e {
            KeyVaultError::Validation(msg) => EngineError::Validation(msg),
            KeyVaultError::Format(msg) => EngineError::Format(msg),
            KeyVaultError::Crypto(msg) => EngineError::Crypto(msg),
            KeyVaultError::Integrity(msg) => EngineError::Integrity(msg),
            KeyVaultError::Unavailable(msg) => EngineError::Unavailable(msg),
            KeyVaultError::Io(err) => EngineError::Io(err),
            other => EngineError::Storage(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Serialization(e.to_string())
    }
}

impl From<base64::DecodeError> for EngineError {
    fn from(e: base64::DecodeError) -> Self {
        EngineError::Format(format!("invalid base64: {}", e))
    }
}
