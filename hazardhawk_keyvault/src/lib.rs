//! # HazardHawk KeyVault
//!
//! Device-local secret storage for the HazardHawk safety platform.
//!
//! ## Features:
//! - Encrypted key/value secrets with per-secret compliance metadata
//! - Hardware-backed master key with automatic software fallback
//! - Bounded, signed audit trail of every access
//! - Secure memory wiping for plaintext and key buffers
//! - Platform security capability detection

pub mod audit;
pub mod capability;
pub mod config;
pub mod crypto;
pub mod error;
pub mod protector;
pub mod storage;
pub mod types;
pub mod vault;

// Re-exports
pub use audit::{AuditAction, AuditEvent, AuditExport};
pub use capability::{
    CachedCapabilityProvider, CapabilityProvider, SecurityCapabilityDescriptor, SecurityLevel,
    SecurityStateChange, StaticCapabilityProvider, SystemCapabilityProvider,
};
pub use config::VaultConfig;
pub use crypto::{wipe, wipe_with_passes, SecureBuffer};
pub use error::{KeyVaultError, Result};
pub use protector::{KeyProtector, KeychainProtector, ProtectionPath, SoftwareProtector};
pub use storage::{FileSlotStorage, MemorySlotStorage, SlotStorage};
pub use types::{ComplianceLevel, SecretMetadata};
pub use vault::{CredentialVault, VaultStatus};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// System name
pub const SYSTEM_NAME: &str = "HAZARDHAWK_KEYVAULT";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
        assert_eq!(SYSTEM_NAME, "HAZARDHAWK_KEYVAULT");
    }
}
