//! Vault configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::crypto::secure_memory::DEFAULT_WIPE_PASSES;
use crate::crypto::Argon2Config;
use crate::error::{KeyVaultError, Result};

/// Marker reserved for shadow and bookkeeping slots
pub const RESERVED_MARKER: char = '#';

/// Upper bound on random wipe passes
pub const MAX_WIPE_PASSES: usize = 16;

/// Typed vault configuration, loadable from JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Directory holding the slot files
    pub vault_dir: PathBuf,

    /// Audit events retained before the oldest are dropped
    pub max_audit_events: usize,

    /// Random passes before the final zero-fill when plaintext is wiped
    pub wipe_passes: usize,

    /// Argon2id parameters for the software protection path
    pub kdf: Argon2Config,

    /// Environment variable holding an optional software-path passphrase
    pub passphrase_env: String,

    /// Keychain service name for the hardware path
    pub keychain_service: String,

    /// Maximum secret key id length (bytes)
    pub max_key_len: usize,

    /// Maximum secret value length (bytes)
    pub max_value_len: usize,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            vault_dir: default_vault_dir(),
            max_audit_events: 10_000,
            wipe_passes: DEFAULT_WIPE_PASSES,
            kdf: Argon2Config::default(),
            passphrase_env: "HAZARDHAWK_VAULT_PASSPHRASE".into(),
            keychain_service: "hazardhawk".into(),
            max_key_len: 256,
            max_value_len: 64 * 1024,
        }
    }
}

/// `<local data dir>/hazardhawk/vault`, falling back to `./.hazardhawk/vault`
pub fn default_vault_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("hazardhawk").join("vault"))
        .unwrap_or_else(|| PathBuf::from(".hazardhawk").join("vault"))
}

impl VaultConfig {
    pub fn with_dir(vault_dir: impl Into<PathBuf>) -> Self {
        Self {
            vault_dir: vault_dir.into(),
            ..Default::default()
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: VaultConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_audit_events == 0 {
            return Err(KeyVaultError::Validation(
                "max_audit_events must be at least 1".into(),
            ));
        }
        if self.wipe_passes == 0 || self.wipe_passes > MAX_WIPE_PASSES {
            return Err(KeyVaultError::Validation(format!(
                "wipe_passes must be between 1 and {}",
                MAX_WIPE_PASSES
            )));
        }
        if self.max_key_len == 0 || self.max_value_len == 0 {
            return Err(KeyVaultError::Validation(
                "key and value limits must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Checks a caller-supplied secret key id
    pub fn validate_key(&self, key: &str) -> Result<()> {
        if key.trim().is_empty() {
            return Err(KeyVaultError::Validation("key must not be blank".into()));
        }
        if key.len() > self.max_key_len {
            return Err(KeyVaultError::Validation(format!(
                "key exceeds maximum length of {} bytes",
                self.max_key_len
            )));
        }
        if key.contains(RESERVED_MARKER) {
            return Err(KeyVaultError::Validation(format!(
                "key must not contain reserved character '{}'",
                RESERVED_MARKER
            )));
        }
        Ok(())
    }

    /// Checks a caller-supplied secret value
    pub fn validate_value(&self, value: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(KeyVaultError::Validation("value must not be blank".into()));
        }
        if value.len() > self.max_value_len {
            return Err(KeyVaultError::Validation(format!(
                "value exceeds maximum length of {} bytes",
                self.max_value_len
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = VaultConfig::default();
        assert_eq!(config.max_audit_events, 10_000);
        assert_eq!(config.wipe_passes, DEFAULT_WIPE_PASSES);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_wipe_passes_bounds() {
        let mut config = VaultConfig::default();
        config.wipe_passes = 0;
        assert!(matches!(config.validate(), Err(KeyVaultError::Validation(_))));
        config.wipe_passes = MAX_WIPE_PASSES + 1;
        assert!(config.validate().is_err());
        config.wipe_passes = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_key_validation() {
        let config = VaultConfig::default();
        assert!(config.validate_key("api_key_x").is_ok());
        assert!(config.validate_key("").is_err());
        assert!(config.validate_key("   ").is_err());
        assert!(config.validate_key("api#meta").is_err());
        assert!(config.validate_key(&"k".repeat(257)).is_err());
    }

    #[test]
    fn test_value_validation() {
        let config = VaultConfig::default();
        assert!(config.validate_value("secret123").is_ok());
        assert!(config.validate_value(" ").is_err());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vault.json");

        let mut config = VaultConfig::with_dir(dir.path().join("vault"));
        config.max_audit_events = 50;
        config.wipe_passes = 7;
        config.save(&path).unwrap();

        let loaded = VaultConfig::load(&path).unwrap();
        assert_eq!(loaded.max_audit_events, 50);
        assert_eq!(loaded.wipe_passes, 7);
        assert_eq!(loaded.vault_dir, config.vault_dir);
    }
}
