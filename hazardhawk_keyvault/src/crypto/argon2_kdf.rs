//! Argon2id KDF deriving the software-path KEK from device binding material

use argon2::{Algorithm, Argon2, Params, Version};
use secrecy::{ExposeSecret, SecretBox, SecretString};
use serde::{Deserialize, Serialize};

use crate::crypto::aead::fill_random;
use crate::error::{KeyVaultError, Result};

/// Salt length stored next to the wrapped master key
pub const SALT_LEN: usize = 16;

/// Argon2id configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argon2Config {
    /// Iterations (time cost)
    pub time_cost: u32,
    /// Memory in KiB
    pub memory_cost_kib: u32,
    /// Lanes
    pub parallelism: u32,
}

impl Default for Argon2Config {
    fn default() -> Self {
        Self {
            time_cost: 3,
            memory_cost_kib: 64 * 1024, // 64 MiB
            parallelism: 2,
        }
    }
}

impl Argon2Config {
    /// Minimal cost, only for tests and throwaway vaults
    pub fn insecure_fast() -> Self {
        Self {
            time_cost: 1,
            memory_cost_kib: 1024,
            parallelism: 1,
        }
    }
}

/// Derives a 32-byte key encryption key from binding material
pub fn derive_kek(
    material: &SecretString,
    salt: &[u8],
    config: &Argon2Config,
) -> Result<SecretBox<[u8; 32]>> {
    const PEPPER: &[u8] = b"HAZARDHAWK_KEYVAULT_v1_PEPPER";

    let params = Params::new(
        config.memory_cost_kib,
        config.time_cost,
        config.parallelism,
        Some(32),
    )
    .map_err(|e| KeyVaultError::KeyDerivationFailed(format!("Invalid Argon2 params: {}", e)))?;

    let argon2 = Argon2::new_with_secret(PEPPER, Algorithm::Argon2id, Version::V0x13, params)
        .map_err(|e| KeyVaultError::KeyDerivationFailed(format!("Argon2 init failed: {}", e)))?;

    let mut output = Box::new([0u8; 32]);
    argon2
        .hash_password_into(material.expose_secret().as_bytes(), salt, output.as_mut())
        .map_err(|e| KeyVaultError::KeyDerivationFailed(format!("Hashing failed: {}", e)))?;

    Ok(SecretBox::new(output))
}

/// Generates a random salt
pub fn generate_salt() -> Result<[u8; SALT_LEN]> {
    let mut salt = [0u8; SALT_LEN];
    fill_random(&mut salt)?;
    Ok(salt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_kek_deterministic() {
        let material = SecretString::from("host-a:passphrase");
        let salt = [1u8; SALT_LEN];
        let config = Argon2Config::insecure_fast();

        let kek1 = derive_kek(&material, &salt, &config).unwrap();
        let kek2 = derive_kek(&material, &salt, &config).unwrap();
        assert_eq!(kek1.expose_secret(), kek2.expose_secret());
    }

    #[test]
    fn test_different_salt_different_kek() {
        let material = SecretString::from("host-a");
        let config = Argon2Config::insecure_fast();

        let kek1 = derive_kek(&material, &[1u8; SALT_LEN], &config).unwrap();
        let kek2 = derive_kek(&material, &[2u8; SALT_LEN], &config).unwrap();
        assert_ne!(kek1.expose_secret(), kek2.expose_secret());
    }

    #[test]
    fn test_invalid_params_rejected() {
        let config = Argon2Config {
            time_cost: 0,
            ..Argon2Config::insecure_fast()
        };
        let result = derive_kek(&SecretString::from("x"), &[0u8; SALT_LEN], &config);
        assert!(matches!(result, Err(KeyVaultError::KeyDerivationFailed(_))));
    }
}
