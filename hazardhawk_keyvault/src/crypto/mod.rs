//! Cryptographic building blocks - Argon2id, AEAD, HKDF, secure memory

pub mod aead;
pub mod argon2_kdf;
pub mod hkdf_derive;
pub mod secure_memory;

pub use aead::{fill_random, open, seal, unwrap_key, wrap_key, AeadCipher, SealedBlob};
pub use argon2_kdf::{derive_kek, generate_salt, Argon2Config};
pub use hkdf_derive::{derive_key_32, derive_subkey_fixed, purposes};
pub use secure_memory::{wipe, wipe_with_passes, SecureBuffer};

/// Zeroize-on-drop wrapper for 256-bit keys
pub type SecretKey = secrecy::SecretBox<[u8; 32]>;
