//! Plaintext checksum carried next to the ciphertext
//!
//! A second integrity signal independent of the GCM tag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{EngineError, EngineResult};

pub const HASH_ALGORITHM: &str = "SHA-256";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityDescriptor {
    /// Hex digest of the plaintext
    pub checksum: String,
    pub hash_algorithm: String,
    pub created_at: DateTime<Utc>,
}

impl IntegrityDescriptor {
    pub fn compute(plaintext: &[u8]) -> Self {
        Self {
            checksum: hex::encode(Sha256::digest(plaintext)),
            hash_algorithm: HASH_ALGORITHM.to_string(),
            created_at: Utc::now(),
        }
    }

    /// Recomputes the checksum over `plaintext` and compares in constant time
    pub fn matches(&self, plaintext: &[u8]) -> EngineResult<bool> {
        if self.hash_algorithm != HASH_ALGORITHM {
            return Err(EngineError::Format(format!(
                "unsupported hash algorithm: {}",
                self.hash_algorithm
            )));
        }
        let Ok(expected) = hex::decode(&self.checksum) else {
            return Ok(false);
        };
        let computed = Sha256::digest(plaintext);

        if expected.len() != computed.len() {
            return Ok(false);
        }
        let diff = computed
            .iter()
            .zip(expected.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));
        Ok(diff == 0)
    }
}
