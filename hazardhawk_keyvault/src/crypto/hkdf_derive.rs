//! HKDF derivation of purpose-bound subkeys from the vault master key

use hkdf::Hkdf;
use secrecy::{ExposeSecret, SecretBox};
use sha2::Sha256;

use crate::error::{KeyVaultError, Result};

/// Derives a fixed-length subkey for `purpose`
pub fn derive_subkey_fixed<const N: usize>(
    master: &SecretBox<[u8; 32]>,
    purpose: &str,
) -> Result<SecretBox<[u8; N]>> {
    let hk = Hkdf::<Sha256>::new(None, master.expose_secret());
    let mut output = Box::new([0u8; N]);
    hk.expand(purpose.as_bytes(), output.as_mut())
        .map_err(|e| KeyVaultError::KeyDerivationFailed(e.to_string()))?;

    Ok(SecretBox::new(output))
}

/// Derives a 32-byte subkey (the common case)
pub fn derive_key_32(master: &SecretBox<[u8; 32]>, purpose: &str) -> Result<SecretBox<[u8; 32]>> {
    derive_subkey_fixed::<32>(master, purpose)
}

/// Derivation purposes used by the vault
pub mod purposes {
    pub const SLOT_ENCRYPTION: &str = "HAZARDHAWK:vault:slots:v1";
    pub const AUDIT_SIGN: &str = "HAZARDHAWK:vault:audit-sign:v1";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_deterministic() {
        let master = SecretBox::new(Box::new([42u8; 32]));
        let key1 = derive_key_32(&master, "test").unwrap();
        let key2 = derive_key_32(&master, "test").unwrap();
        assert_eq!(key1.expose_secret(), key2.expose_secret());
    }

    #[test]
    fn test_different_purposes_different_keys() {
        let master = SecretBox::new(Box::new([42u8; 32]));
        let key1 = derive_key_32(&master, purposes::SLOT_ENCRYPTION).unwrap();
        let key2 = derive_key_32(&master, purposes::AUDIT_SIGN).unwrap();
        assert_ne!(key1.expose_secret(), key2.expose_secret());
    }
}
